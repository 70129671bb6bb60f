//! CLI entry point. Pure orchestration: parse arguments, validate them,
//! hand off to `session::compile`, write the result, render errors.
//! Contains no algorithmic logic of its own.

use std::process::ExitCode;
use std::time::Instant;

use clap::{CommandFactory, Parser};
use log::error;

use hicuts_compiler::config::Config;
use hicuts_compiler::error::Error;
use hicuts_compiler::session::compile;

fn main() -> ExitCode {
    let process_start = Instant::now();
    env_logger::init();

    let config = Config::parse();
    if config.usage {
        Config::command().print_long_help().expect("stdout is writable");
        return ExitCode::SUCCESS;
    }

    match run(&config, process_start) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, process_start: Instant) -> Result<(), Error> {
    config.validate()?;

    let report = compile(config, process_start)?;
    if config.verbose {
        log::info!(
            "compiled {} chain(s), {} classifiable sub-ruleset(s)",
            report.num_chains,
            report.num_domains
        );
    }

    std::fs::write(config.outfile(), report.output).map_err(|e| Error::io(config.outfile(), e))?;
    Ok(())
}
