//! Chain grouping and sub-ruleset (domain) extraction.
//!
//! A ruleset mixes rules across `INPUT`/`FORWARD`/`OUTPUT`/custom chains
//! in whatever order the user wrote them in. Each chain is classified
//! independently, and within a chain only a maximal contiguous run of
//! classifiable rules is worth building a tree for — a lone applicable
//! rule surrounded by unclassifiable ones gains nothing from a tree.

use crate::rule::Rule;

/// A maximal contiguous run of applicable rules within one chain's rule
/// list, identified by its half-open index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    pub start: usize,
    pub end: usize,
}

impl Domain {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One chain's rules, in their original relative order, alongside the
/// chain's name.
#[derive(Debug, Clone)]
pub struct ChainRules<'a> {
    pub chain: &'a str,
    pub rules: Vec<&'a Rule>,
}

/// Split `rules` into per-chain groups, preserving both the chains'
/// first-seen order and each chain's internal rule order.
pub fn group_rules_by_chain(rules: &[Rule]) -> Vec<ChainRules<'_>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<ChainRules<'_>> = Vec::new();

    for rule in rules {
        let pos = order.iter().position(|c| c == &rule.chain);
        match pos {
            Some(idx) => groups[idx].rules.push(rule),
            None => {
                order.push(rule.chain.clone());
                groups.push(ChainRules { chain: &rule.chain, rules: vec![rule] });
            }
        }
    }
    groups
}

/// Extract every maximal contiguous run of `applicable` rules within
/// `chain_rules` whose length is at least `min_rules`. Runs shorter than
/// `min_rules` are left for the linear emission path.
pub fn extract_domains(chain_rules: &[&Rule], min_rules: usize) -> Vec<Domain> {
    let mut domains = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, rule) in chain_rules.iter().enumerate() {
        if rule.applicable {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            push_if_long_enough(&mut domains, start, i, min_rules);
        }
    }
    if let Some(start) = run_start {
        push_if_long_enough(&mut domains, start, chain_rules.len(), min_rules);
    }
    domains
}

fn push_if_long_enough(domains: &mut Vec<Domain>, start: usize, end: usize, min_rules: usize) {
    if end - start >= min_rules {
        domains.push(Domain { start, end });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Interval, Rect};
    use crate::rule::{Action, Protocol};

    fn rule(chain: &str, applicable: bool) -> Rule {
        Rule {
            rect: Rect::new([Interval::full(); 4]),
            protocol: Protocol::Wildcard,
            action: Action::Accept,
            chain: chain.to_string(),
            source_text: format!("-A {} -j ACCEPT", chain),
            applicable,
        }
    }

    #[test]
    fn groups_preserve_first_seen_chain_order_and_internal_order() {
        let rules = vec![
            rule("INPUT", true),
            rule("OUTPUT", true),
            rule("INPUT", true),
            rule("FORWARD", true),
        ];
        let groups = group_rules_by_chain(&rules);
        let names: Vec<&str> = groups.iter().map(|g| g.chain).collect();
        assert_eq!(names, vec!["INPUT", "OUTPUT", "FORWARD"]);
        assert_eq!(groups[0].rules.len(), 2);
    }

    #[test]
    fn extracts_maximal_runs_from_worked_example() {
        // N,N,A,A,N,N,A,A,N,A,N,A,A,A with min_rules=2
        let flags = [
            false, false, true, true, false, false, true, true, false, true, false, true, true,
            true,
        ];
        let rules: Vec<Rule> = flags.iter().map(|&a| rule("INPUT", a)).collect();
        let refs: Vec<&Rule> = rules.iter().collect();
        let domains = extract_domains(&refs, 2);
        assert_eq!(
            domains,
            vec![
                Domain { start: 2, end: 4 },
                Domain { start: 6, end: 8 },
                Domain { start: 11, end: 14 },
            ]
        );
    }

    #[test]
    fn trailing_run_at_end_of_chain_is_captured() {
        let flags = [true, true, true];
        let rules: Vec<Rule> = flags.iter().map(|&a| rule("INPUT", a)).collect();
        let refs: Vec<&Rule> = rules.iter().collect();
        let domains = extract_domains(&refs, 2);
        assert_eq!(domains, vec![Domain { start: 0, end: 3 }]);
    }

    #[test]
    fn run_shorter_than_min_rules_is_dropped() {
        let flags = [true, false, true, true];
        let rules: Vec<Rule> = flags.iter().map(|&a| rule("INPUT", a)).collect();
        let refs: Vec<&Rule> = rules.iter().collect();
        let domains = extract_domains(&refs, 2);
        assert_eq!(domains, vec![Domain { start: 2, end: 4 }]);
    }
}
