//! Compilation session: owns the RNG and wires the five pipeline stages
//! together (ingest, chain grouping, sub-ruleset extraction, HiCuts tree
//! construction, emission). `main` only calls into here and renders the
//! result; every stage below is a pure transformation over in-memory
//! structures.

use std::time::{Duration, Instant};

use log::info;

use crate::chains::{extract_domains, group_rules_by_chain};
use crate::config::{Config, DimChoiceArg, Search};
use crate::emit::{emit_chain, frame_output};
use crate::error::Result;
use crate::ingest::{parse_ruleset, read_lines};
use crate::rng::TieBreakRng;
use crate::tree::{build_tree, CutAlgo, DimChoice, TreeNode};

/// The final framed ruleset text, ready to be written to `--outfile`.
pub struct CompileReport {
    pub output: String,
    pub num_chains: usize,
    pub num_domains: usize,
}

/// Run the full pipeline over `config`. `process_start` anchors the
/// total-runtime comment to the moment the process began, per spec —
/// not to when this function was entered.
pub fn compile(config: &Config, process_start: Instant) -> Result<CompileReport> {
    let parse_start = Instant::now();
    let lines = read_lines(config.infile())?;
    let (rules, policies) = parse_ruleset(&lines);
    let parse_time = parse_start.elapsed();
    info!("parsed {} rules from {:?}", rules.len(), config.infile());

    let extraction_start = Instant::now();
    let chain_groups = group_rules_by_chain(&rules);
    let min_rules = config.min_rules as usize;
    let per_chain_domains: Vec<_> = chain_groups
        .iter()
        .map(|g| extract_domains(&g.rules, min_rules))
        .collect();
    let extraction_time = extraction_start.elapsed();
    let num_domains: usize = per_chain_domains.iter().map(Vec::len).sum();
    info!(
        "{} chains, {} classifiable sub-rulesets (min_rules={})",
        chain_groups.len(),
        num_domains,
        min_rules
    );

    let dim_choice = match config.dim_choice {
        DimChoiceArg::MaxDist => DimChoice::MaxDistinct,
        DimChoiceArg::LeastMax => DimChoice::LeastMaxRules,
    };
    let cut_algo = CutAlgo::Equidistant;
    let spfac = config.spfac as usize;
    let binth = config.binth as usize;
    let mut rng = TieBreakRng::new(config.random_seed as u64);

    let build_start = Instant::now();
    let mut per_chain_trees: Vec<Vec<TreeNode>> = Vec::with_capacity(chain_groups.len());
    for (group, domains) in chain_groups.iter().zip(per_chain_domains.iter()) {
        let mut trees = Vec::with_capacity(domains.len());
        for domain in domains {
            let domain_rules: Vec<crate::rule::Rule> =
                group.rules[domain.start..domain.end].iter().map(|r| (*r).clone()).collect();
            let mut root = TreeNode::new_root(&domain_rules);
            build_tree(&mut root, &domain_rules, spfac, binth, dim_choice, cut_algo, &mut rng);
            trees.push(root);
        }
        per_chain_trees.push(trees);
    }
    let build_time = build_start.elapsed();
    info!("built {} HiCuts tree(s)", num_domains);

    let emit_start = Instant::now();
    let search = config.search;
    let mut body: Vec<String> = Vec::new();
    let mut declared: Vec<String> = Vec::new();
    for ((group, domains), trees) in chain_groups.iter().zip(per_chain_domains.iter()).zip(per_chain_trees) {
        let out = emit_chain(group.chain, &group.rules, domains, trees, &policies, search);
        body.extend(out.lines);
        for name in out.declared_chains() {
            if !declared.iter().any(|c| c == name) {
                declared.push(name.clone());
            }
        }
    }
    let emit_time = emit_start.elapsed();
    info!("emitted {} rule lines", body.len());

    let total = process_start.elapsed();
    let comments = stage_comments(total, parse_time, extraction_time, build_time, emit_time);
    let output = frame_output(&policies, &declared, &body, &comments);

    Ok(CompileReport { output, num_chains: chain_groups.len(), num_domains })
}

fn stage_comments(
    total: Duration,
    parse: Duration,
    extraction: Duration,
    build: Duration,
    emit: Duration,
) -> Vec<String> {
    vec![
        format!("Total runtime: {:.6}s", total.as_secs_f64()),
        format!("parsing: {:.6}s", parse.as_secs_f64()),
        format!("sub-ruleset extraction: {:.6}s", extraction.as_secs_f64()),
        format!("HiCuts transformation: {:.6}s", build.as_secs_f64()),
        format!("emission: {:.6}s", emit.as_secs_f64()),
    ]
}
