//! The emitter: walks chains, domains, and trees and produces the
//! compiled ruleset text — chain naming, dispatch (linear/binary), leaf
//! and passthrough rule emission, and output framing.

use std::collections::VecDeque;

use crate::chains::Domain;
use crate::config::Search;
use crate::geometry::Interval;
use crate::rule::{self, is_builtin_chain, Action, CutDim, DefaultPolicies, Policy, Protocol, Rule};
use crate::tree::TreeNode;

pub fn build_chain_name(chain: &str, i: usize) -> String {
    format!("{chain}_{i}")
}

pub fn build_tree_chain_name(chain: &str, tree: usize, node_id: usize) -> String {
    format!("{chain}_{tree}_{node_id}")
}

pub fn build_bin_search_name(chain: &str, tree: usize, cc: usize, k: usize) -> String {
    format!("{chain}_{tree}_{cc}_{k}")
}

fn format_ip(v: u32) -> String {
    format!("{}.{}.{}.{}", v >> 24, (v >> 16) & 0xff, (v >> 8) & 0xff, v & 0xff)
}

fn proto_flag(proto: Protocol) -> &'static str {
    proto.as_flag().unwrap_or("tcp")
}

fn predicate(cut_dim: CutDim, proto: Protocol, iv: Interval) -> String {
    match cut_dim {
        CutDim::SrcPort => format!("-p {} --sport {}:{}", proto_flag(proto), iv.low, iv.high),
        CutDim::DstPort => format!("-p {} --dport {}:{}", proto_flag(proto), iv.low, iv.high),
        CutDim::SrcAddr => format!("-m iprange --src-range {}-{}", format_ip(iv.low), format_ip(iv.high)),
        CutDim::DstAddr => format!("-m iprange --dst-range {}-{}", format_ip(iv.low), format_ip(iv.high)),
    }
}

fn action_jump_text(action: &Action) -> &str {
    match action {
        Action::Accept => "ACCEPT",
        Action::Drop => "DROP",
        Action::Reject => "REJECT",
        Action::Jump(target) => target,
        Action::None => "ACCEPT",
    }
}

fn policy_jump_text(policy: Policy) -> Option<&'static str> {
    match policy {
        Policy::Accept => Some("ACCEPT"),
        Policy::Drop => Some("DROP"),
        Policy::Reject => Some("REJECT"),
        Policy::None => None,
    }
}

/// Accumulates emitted rule lines and the set of generated chains that
/// actually received at least one rule, in first-use order.
#[derive(Debug, Default)]
pub struct EmitOutput {
    pub lines: Vec<String>,
    declared: Vec<String>,
}

impl EmitOutput {
    fn emit_under(&mut self, chain: &str, line: String) {
        self.lines.push(line);
        if !self.declared.iter().any(|c| c == chain) {
            self.declared.push(chain.to_string());
        }
    }

    pub fn declared_chains(&self) -> &[String] {
        &self.declared
    }
}

/// The protocol guard for a whole tree: derived from the root's first
/// rule, mirroring the source compiler's `TreeNode::prot()` — a
/// representative heuristic, not a strict invariant over every rule in
/// the domain.
fn tree_protocol(root: &TreeNode, domain_rules: &[Rule]) -> Protocol {
    match root.rule_indices().first() {
        Some(&idx) if domain_rules[idx].protocol == Protocol::Tcp => Protocol::Tcp,
        _ => Protocol::Udp,
    }
}

fn emit_passthrough(chain: &str, rule: &Rule, out: &mut EmitOutput) {
    let patched = rule.patched_source(chain);
    out.emit_under(chain, patched);
}

fn emit_leaf(
    chain: &str,
    tree: usize,
    node: &TreeNode,
    domain_rules: &[Rule],
    leaf_jump: bool,
    next_chain: &str,
    out: &mut EmitOutput,
) {
    let node_chain = build_tree_chain_name(chain, tree, node.id());
    for &rule_idx in node.rule_indices() {
        let patched = domain_rules[rule_idx].patched_source(&node_chain);
        out.emit_under(&node_chain, patched);
    }
    if leaf_jump {
        out.emit_under(&node_chain, format!("-A {node_chain} -j {next_chain}"));
    }
}

fn emit_linear_dispatch(
    chain: &str,
    tree: usize,
    node: &TreeNode,
    proto: Protocol,
    out: &mut EmitOutput,
) {
    let dim = node.cut_dim().expect("internal node always has a cut dimension");
    let node_chain = build_tree_chain_name(chain, tree, node.id());
    for child in node.children() {
        let target = build_tree_chain_name(chain, tree, child.id());
        let pred = predicate(dim, proto, child.rect().get(dim.index()));
        out.emit_under(&node_chain, format!("-A {node_chain} {pred} -j {target}"));
    }
}

fn bounding_interval(children: &[TreeNode], s: usize, e: usize, dim: CutDim) -> Interval {
    let mut low = u32::MAX;
    let mut high = 0u32;
    for child in &children[s..=e] {
        let iv = child.rect().get(dim.index());
        low = low.min(iv.low);
        high = high.max(iv.high);
    }
    Interval::new(low, high)
}

/// Binary dispatch: an abstract binary search tree over the HiCuts
/// node's children, BFS-traversed with an explicit queue of
/// `(range_start, range_end, chain_name)` triples.
fn emit_binary_dispatch(
    chain: &str,
    tree: usize,
    node: &TreeNode,
    proto: Protocol,
    out: &mut EmitOutput,
) {
    let dim = node.cut_dim().expect("internal node always has a cut dimension");
    let cc = node.id();
    let node_chain = build_tree_chain_name(chain, tree, node.id());
    let children = node.children();

    let mut queue: VecDeque<(usize, usize, String)> = VecDeque::new();
    queue.push_back((0, children.len() - 1, node_chain));

    while let Some((s, e, name)) = queue.pop_front() {
        if s == e {
            let target = build_tree_chain_name(chain, tree, children[s].id());
            out.emit_under(&name, format!("-A {name} -j {target}"));
            continue;
        }

        let lookup = s + (e - s) / 2;
        let exact_target = build_tree_chain_name(chain, tree, children[lookup].id());
        let exact_pred = predicate(dim, proto, children[lookup].rect().get(dim.index()));
        out.emit_under(&name, format!("-A {name} {exact_pred} -j {exact_target}"));

        if lookup > s {
            let (ls, le) = (s, lookup - 1);
            let left_lookup = ls + (le - ls) / 2;
            let left_name = build_bin_search_name(chain, tree, cc, left_lookup);
            let bbox = bounding_interval(children, ls, le, dim);
            let left_pred = predicate(dim, proto, bbox);
            out.emit_under(&name, format!("-A {name} {left_pred} -j {left_name}"));
            queue.push_back((ls, le, left_name));
        }

        let (rs, re) = (lookup + 1, e);
        let right_lookup = rs + (re - rs) / 2;
        let right_name = build_bin_search_name(chain, tree, cc, right_lookup);
        out.emit_under(&name, format!("-A {name} -j {right_name}"));
        queue.push_back((rs, re, right_name));
    }
}

/// Emit one domain's tree: the guarded jump into the root, the default
/// fall-through to `next_chain`, then a BFS walk emitting dispatch at
/// every internal node and rules at every leaf.
fn emit_tree(
    chain: &str,
    tree_idx: usize,
    root: &mut TreeNode,
    domain_rules: &[Rule],
    sub_chain: &str,
    next_chain: &str,
    leaf_jump: bool,
    search: Search,
    out: &mut EmitOutput,
) {
    root.compute_numbering();
    let proto = tree_protocol(root, domain_rules);
    let root_chain = build_tree_chain_name(chain, tree_idx, root.id());

    out.emit_under(
        sub_chain,
        format!("-A {sub_chain} -p {} -j {root_chain}", proto_flag(proto)),
    );
    out.emit_under(sub_chain, format!("-A {sub_chain} -j {next_chain}"));

    let mut queue: VecDeque<Vec<usize>> = VecDeque::new();
    queue.push_back(Vec::new());
    while let Some(path) = queue.pop_front() {
        let node = node_at(root, &path);
        if node.is_leaf() {
            emit_leaf(chain, tree_idx, node, domain_rules, leaf_jump, next_chain, out);
        } else {
            match search {
                Search::Linear => emit_linear_dispatch(chain, tree_idx, node, proto, out),
                Search::Binary => emit_binary_dispatch(chain, tree_idx, node, proto, out),
            }
            for i in 0..node.children().len() {
                let mut child_path = path.clone();
                child_path.push(i);
                queue.push_back(child_path);
            }
        }
    }
}

fn node_at<'a>(root: &'a TreeNode, path: &[usize]) -> &'a TreeNode {
    let mut node = root;
    for &i in path {
        node = &node.children()[i];
    }
    node
}

/// Emit one chain's compiled rules: jump into the first sub-chain,
/// domains and passthrough rules interleaved in order, and (for
/// built-in chains) a trailing custom policy rule.
pub fn emit_chain(
    chain: &str,
    chain_rules: &[&Rule],
    domains: &[Domain],
    mut trees: Vec<TreeNode>,
    policies: &DefaultPolicies,
    search: Search,
) -> EmitOutput {
    let mut out = EmitOutput::default();
    let num_rules = chain_rules.len();

    let mut counter = 0usize;
    let mut sub_chain = build_chain_name(chain, counter);
    out.lines.push(format!("-A {chain} -j {sub_chain}"));

    let mut i = 0usize;
    for (t, (domain, tree)) in domains.iter().zip(trees.iter_mut()).enumerate() {
        for idx in i..domain.start {
            emit_passthrough(&sub_chain, chain_rules[idx], &mut out);
        }
        counter += 1;
        let next_sub_chain = build_chain_name(chain, counter);
        i = domain.end;
        let leaf_jump = is_builtin_chain(chain) || i < num_rules;

        let domain_rules: Vec<Rule> = chain_rules[domain.start..domain.end].iter().map(|r| (*r).clone()).collect();
        emit_tree(chain, t, tree, &domain_rules, &sub_chain, &next_sub_chain, leaf_jump, search, &mut out);

        sub_chain = next_sub_chain;
    }

    for idx in i..num_rules {
        emit_passthrough(&sub_chain, chain_rules[idx], &mut out);
    }

    if is_builtin_chain(chain) {
        if let Some(action_text) = policy_jump_text(policies.chain_policy(chain)) {
            out.emit_under(&sub_chain, format!("-A {sub_chain} -j {action_text}"));
        }
    }

    out
}

/// Output framing: `*filter`, timing comment lines, policy declarations
/// for built-in chains with a declared (non-`NONE`) policy, then every
/// generated chain's declaration, the rule body, and `COMMIT`.
pub fn frame_output(
    policies: &DefaultPolicies,
    declared_chains: &[String],
    body: &[String],
    header_comments: &[String],
) -> String {
    let mut out = String::new();
    out.push_str("*filter\n");
    for comment in header_comments {
        out.push_str(&format!("# {comment}\n"));
    }
    for &chain in &rule::BUILTIN_CHAINS {
        if let Some(policy_text) = policy_jump_text(policies.chain_policy(chain)) {
            out.push_str(&format!(":{chain} {policy_text} [0:0]\n"));
        }
    }
    for name in declared_chains {
        out.push_str(&format!(":{name} - [0:0]\n"));
    }
    for line in body {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("COMMIT\n");
    out
}
