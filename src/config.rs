//! Command-line configuration: option parsing (`clap`) plus the
//! domain-range validation the derive macro can't express on its own.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Search {
    Linear,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DimChoiceArg {
    #[clap(name = "max-dist")]
    MaxDist,
    #[clap(name = "least-max")]
    LeastMax,
}

/// Compiles a linear packet-filter ruleset into an equivalent ruleset
/// whose dispatch cost is logarithmic in rule count, via the HiCuts
/// geometric classification algorithm.
#[derive(Parser, Debug)]
#[command(name = "hicutsc", version)]
pub struct Config {
    /// Max rules per leaf.
    #[arg(long, default_value_t = 4)]
    pub binth: u32,

    /// Space-expansion factor bounding per-cut blow-up.
    #[arg(long, default_value_t = 4)]
    pub spfac: u32,

    /// Dispatch style for internal nodes.
    #[arg(long, value_enum, default_value_t = Search::Linear)]
    pub search: Search,

    /// Dimension-selection heuristic.
    #[arg(long = "dim-choice", value_enum, default_value_t = DimChoiceArg::MaxDist)]
    pub dim_choice: DimChoiceArg,

    /// Minimum sub-ruleset length worth building a tree for.
    #[arg(long = "min-rules", default_value_t = 10)]
    pub min_rules: u32,

    /// Tie-break RNG seed.
    #[arg(long = "random-seed", default_value_t = 0)]
    pub random_seed: u32,

    /// Input ruleset. Required unless `--usage` is given.
    #[arg(long)]
    pub infile: Option<PathBuf>,

    /// Output ruleset. Required unless `--usage` is given.
    #[arg(long)]
    pub outfile: Option<PathBuf>,

    /// Emit a stage-timing progress trace.
    #[arg(long)]
    pub verbose: bool,

    /// Print usage and exit without compiling anything.
    #[arg(long)]
    pub usage: bool,
}

impl Config {
    /// Range-check the numeric options clap's derive can't bound on its
    /// own, per spec §6's `[1, 65536]`-style ranges, and require
    /// `--infile`/`--outfile` unless `--usage` was given.
    pub fn validate(&self) -> Result<()> {
        check_range("--binth", self.binth, 1, 65536)?;
        check_range("--spfac", self.spfac, 1, 65536)?;
        if self.min_rules == 0 {
            return Err(Error::argument("--min-rules must be a positive integer"));
        }
        check_range("--random-seed", self.random_seed, 0, 65535)?;
        if !self.usage {
            if self.infile.is_none() {
                return Err(Error::argument("--infile is required"));
            }
            if self.outfile.is_none() {
                return Err(Error::argument("--outfile is required"));
            }
        }
        Ok(())
    }

    /// The input path. Only meaningful after `validate()` has succeeded
    /// with `--usage` unset.
    pub fn infile(&self) -> &Path {
        self.infile.as_deref().expect("validate() ensures infile is present")
    }

    /// The output path. Only meaningful after `validate()` has succeeded
    /// with `--usage` unset.
    pub fn outfile(&self) -> &Path {
        self.outfile.as_deref().expect("validate() ensures outfile is present")
    }
}

fn check_range(name: &str, value: u32, low: u32, high: u32) -> Result<()> {
    if value < low || value > high {
        return Err(Error::argument(format!(
            "{name} must be in [{low}, {high}], got '{value}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            binth: 4,
            spfac: 4,
            search: Search::Linear,
            dim_choice: DimChoiceArg::MaxDist,
            min_rules: 10,
            random_seed: 0,
            infile: Some(PathBuf::from("in.rules")),
            outfile: Some(PathBuf::from("out.rules")),
            verbose: false,
            usage: false,
        }
    }

    #[test]
    fn default_shaped_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn out_of_range_binth_is_rejected() {
        let mut cfg = base_config();
        cfg.binth = 0;
        assert!(cfg.validate().is_err());
        cfg.binth = 100_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_min_rules_is_rejected() {
        let mut cfg = base_config();
        cfg.min_rules = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_seed_is_rejected() {
        let mut cfg = base_config();
        cfg.random_seed = 70000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_infile_or_outfile_is_rejected_unless_usage_is_set() {
        let mut cfg = base_config();
        cfg.infile = None;
        assert!(cfg.validate().is_err());
        cfg.usage = true;
        assert!(cfg.validate().is_ok());
    }
}
