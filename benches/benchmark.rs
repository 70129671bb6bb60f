//! Benchmarks HiCuts tree construction time across rule-set sizes and
//! heuristic combinations. There is no runtime classifier in this crate
//! to benchmark (see DESIGN.md), so this times `build_tree` itself.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use hicuts_compiler::geometry::{Interval, Rect};
use hicuts_compiler::rng::TieBreakRng;
use hicuts_compiler::rule::{Action, Protocol, Rule};
use hicuts_compiler::tree::{build_tree, CutAlgo, DimChoice, TreeNode};

fn generate_rules(seed: u64, n: usize) -> Vec<Rule> {
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut rules = Vec::with_capacity(n);
    for _ in 0..n {
        let sport_lo: u32 = rng.gen_range(0..=60000);
        let dport = [80u32, 443, 53, 8080][rng.gen_range(0..4)];
        let src: u32 = rng.gen();
        let dst: u32 = rng.gen();
        let rect = Rect::new([
            Interval::new(sport_lo, sport_lo + rng.gen_range(0..5000)),
            Interval::exact(dport),
            Interval::new(src, src.saturating_add(256)),
            Interval::new(dst, dst.saturating_add(256)),
        ]);
        rules.push(Rule {
            rect,
            protocol: if rng.gen_bool(0.5) { Protocol::Tcp } else { Protocol::Udp },
            action: Action::Accept,
            chain: "INPUT".to_string(),
            source_text: "-A INPUT -j ACCEPT".to_string(),
            applicable: true,
        });
    }
    rules
}

fn benchmark_tree_construction(c: &mut Criterion) {
    let rule_counts = [100usize, 300, 500, 700, 900, 1000, 3000, 5000];

    let mut group = c.benchmark_group("HiCutsBuild");
    group.sample_size(20);

    for &n_rules in &rule_counts {
        let rules = generate_rules(42, n_rules);

        group.bench_function(BenchmarkId::new("Equidistant/MaxDistinct", n_rules), |b| {
            b.iter(|| {
                let mut root = TreeNode::new_root(&rules);
                let mut rng = TieBreakRng::new(0);
                build_tree(&mut root, &rules, 4, 4, DimChoice::MaxDistinct, CutAlgo::Equidistant, &mut rng);
                root
            })
        });

        group.bench_function(BenchmarkId::new("Equidistant/LeastMaxRules", n_rules), |b| {
            b.iter(|| {
                let mut root = TreeNode::new_root(&rules);
                let mut rng = TieBreakRng::new(0);
                build_tree(&mut root, &rules, 4, 4, DimChoice::LeastMaxRules, CutAlgo::Equidistant, &mut rng);
                root
            })
        });

        group.bench_function(BenchmarkId::new("Unequal/MaxDistinct", n_rules), |b| {
            b.iter(|| {
                let mut root = TreeNode::new_root(&rules);
                let mut rng = TieBreakRng::new(0);
                build_tree(&mut root, &rules, 4, 4, DimChoice::MaxDistinct, CutAlgo::Unequal, &mut rng);
                root
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_tree_construction);
criterion_main!(benches);
