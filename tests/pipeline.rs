//! End-to-end pipeline tests: write a ruleset to a temp file, run the
//! full `session::compile` pipeline over it, and check the framed
//! output shape spec.md §6/§8 describes.

use std::io::Write;
use std::time::Instant;

use clap::Parser;
use tempfile::NamedTempFile;

use hicuts_compiler::config::Config;
use hicuts_compiler::session::compile;

fn write_ruleset(lines: &[&str]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    f.flush().unwrap();
    f
}

fn parse_config(infile: &str, outfile: &str, extra: &[&str]) -> Config {
    let mut args = vec!["hicutsc", "--infile", infile, "--outfile", outfile];
    args.extend_from_slice(extra);
    Config::parse_from(args)
}

#[test]
fn below_min_rules_is_emitted_verbatim_modulo_framing() {
    let input = write_ruleset(&[
        "*filter",
        ":INPUT ACCEPT [0:0]",
        "-A INPUT -p tcp --dport 80 -j ACCEPT",
        "-A INPUT -p tcp --dport 443 -j ACCEPT",
        "COMMIT",
    ]);
    let outfile = NamedTempFile::new().unwrap();
    let config = parse_config(
        input.path().to_str().unwrap(),
        outfile.path().to_str().unwrap(),
        &["--min-rules", "10"],
    );
    config.validate().unwrap();

    let report = compile(&config, Instant::now()).unwrap();
    assert_eq!(report.num_domains, 0);
    assert!(report.output.starts_with("*filter\n"));
    assert!(report.output.contains("-A INPUT -p tcp --dport 80 -j ACCEPT"));
    assert!(report.output.contains("-A INPUT -p tcp --dport 443 -j ACCEPT"));
    assert!(report.output.trim_end().ends_with("COMMIT"));
    assert!(report.output.contains(":INPUT ACCEPT [0:0]"));
}

#[test]
fn classifiable_run_gets_a_subchain_and_tree() {
    let mut lines = vec!["*filter".to_string(), ":INPUT ACCEPT [0:0]".to_string()];
    for i in 0..20u32 {
        lines.push(format!("-A INPUT -p tcp --sport {i}:{i} -j DROP"));
    }
    lines.push("COMMIT".to_string());
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    let input = write_ruleset(&line_refs);
    let outfile = NamedTempFile::new().unwrap();
    let config = parse_config(
        input.path().to_str().unwrap(),
        outfile.path().to_str().unwrap(),
        &["--min-rules", "10", "--binth", "4"],
    );
    config.validate().unwrap();

    let report = compile(&config, Instant::now()).unwrap();
    assert_eq!(report.num_domains, 1);
    assert!(report.output.contains("-A INPUT -j INPUT_0"));
    assert!(report.output.contains("# Total runtime:"));
}

#[test]
fn binary_search_dispatch_round_trips_through_the_pipeline() {
    let mut lines = vec!["*filter".to_string(), ":FORWARD DROP [0:0]".to_string()];
    for i in 0..16u32 {
        lines.push(format!("-A FORWARD -p udp --dport {i}:{i} -j ACCEPT"));
    }
    lines.push("COMMIT".to_string());
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    let input = write_ruleset(&line_refs);
    let outfile = NamedTempFile::new().unwrap();
    let config = parse_config(
        input.path().to_str().unwrap(),
        outfile.path().to_str().unwrap(),
        &["--min-rules", "10", "--binth", "2", "--search", "binary"],
    );
    config.validate().unwrap();

    let report = compile(&config, Instant::now()).unwrap();
    assert_eq!(report.num_domains, 1);

    // Every jump target mentioned in the body must be declared, ACCEPT/
    // DROP/REJECT, or the chain's own name (the top-level entry jump).
    let declared: Vec<&str> = report
        .output
        .lines()
        .filter_map(|l| l.strip_prefix(':').map(|rest| rest.split_whitespace().next().unwrap()))
        .collect();
    for line in report.output.lines() {
        if let Some(pos) = line.find("-j ") {
            let target = line[pos + 3..].trim();
            let ok = matches!(target, "ACCEPT" | "DROP" | "REJECT")
                || declared.contains(&target)
                || target == "FORWARD";
            assert!(ok, "undeclared jump target '{target}' in line: {line}");
        }
    }
}

#[test]
fn out_of_range_binth_is_rejected_before_compiling() {
    let input = write_ruleset(&["*filter", "COMMIT"]);
    let outfile = NamedTempFile::new().unwrap();
    let config = parse_config(
        input.path().to_str().unwrap(),
        outfile.path().to_str().unwrap(),
        &["--binth", "0"],
    );
    assert!(config.validate().is_err());
}
