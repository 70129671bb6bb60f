//! The HiCuts decision tree: node cutting, dimension selection, cut
//! count determination, and DFS numbering.

use std::collections::VecDeque;

use crate::geometry::Rect;
use crate::rng::TieBreakRng;
use crate::rule::{self, CutDim, Rule};

/// Dimension-selection heuristic, selected by `--dim-choice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimChoice {
    MaxDistinct,
    LeastMaxRules,
}

/// Cut strategy, selected by... indirectly, via `CutAlgo` below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutAlgo {
    Equidistant,
    Unequal,
}

/// A node in the HiCuts decision tree.
///
/// Owns its region (`rect`), the indices (into the domain's rule slice)
/// of every rule colliding with that region, and its children by value.
/// A node is a leaf iff `children` is empty.
#[derive(Debug, Clone)]
pub struct TreeNode {
    rect: Rect,
    rule_indices: Vec<usize>,
    children: Vec<TreeNode>,
    has_been_cut: bool,
    cut_dim: Option<CutDim>,
    num_cuts: usize,
    id: usize,
}

impl TreeNode {
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn rule_indices(&self) -> &[usize] {
        &self.rule_indices
    }

    pub fn num_rules(&self) -> usize {
        self.rule_indices.len()
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn cut_dim(&self) -> Option<CutDim> {
        self.cut_dim
    }

    pub fn num_cuts(&self) -> usize {
        self.num_cuts
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The root's minimal bounding box over every rule in `domain_rules`.
    pub fn minimal_bounding_box(domain_rules: &[Rule]) -> Rect {
        use crate::geometry::Interval;
        let mut dims = [Interval::full(); crate::geometry::NUM_DIMS];
        for d in 0..crate::geometry::NUM_DIMS {
            let mut low = u32::MAX;
            let mut high = 0u32;
            for r in domain_rules {
                let iv = r.rect.get(d);
                low = low.min(iv.low);
                high = high.max(iv.high);
            }
            dims[d] = Interval::new(low, high);
        }
        Rect::new(dims)
    }

    /// Build a fresh root node covering every rule in `domain_rules`, in
    /// order, unfiltered (shadow elimination only happens once a node is
    /// actually cut — see `add_rule`).
    pub fn new_root(domain_rules: &[Rule]) -> TreeNode {
        TreeNode {
            rect: Self::minimal_bounding_box(domain_rules),
            rule_indices: (0..domain_rules.len()).collect(),
            children: Vec::new(),
            has_been_cut: false,
            cut_dim: None,
            num_cuts: 0,
            id: 0,
        }
    }

    fn leaf(rect: Rect) -> TreeNode {
        TreeNode {
            rect,
            rule_indices: Vec::new(),
            children: Vec::new(),
            has_been_cut: false,
            cut_dim: None,
            num_cuts: 0,
            id: 0,
        }
    }

    /// Add `rule_idx` to this node if it isn't shadowed, within this
    /// node's region, by a rule already present.
    fn add_rule(&mut self, rule_idx: usize, domain_rules: &[Rule]) {
        let candidate = &domain_rules[rule_idx];
        for &existing_idx in &self.rule_indices {
            if rule::is_shadowed(&domain_rules[existing_idx], candidate, &self.rect) {
                return;
            }
        }
        self.rule_indices.push(rule_idx);
    }

    /// Partition this node's region into `num_cuts + 1` equal pieces
    /// along `dim` and populate `children` with the rules that collide
    /// with each piece (after shadow elimination). No-op if the node has
    /// already been cut. Children that end up with zero rules are
    /// dropped.
    pub fn cut(&mut self, dim: CutDim, num_cuts: usize, domain_rules: &[Rule]) {
        if self.has_been_cut {
            return;
        }
        let pieces = self.rect.cut(dim.index(), num_cuts);
        self.populate_children(dim, num_cuts, pieces, domain_rules);
    }

    /// As `cut`, but partitioning at explicit interior cut points rather
    /// than equal-width pieces. No-op if already cut or fewer than two
    /// cut points are given.
    pub fn unequal_cut(&mut self, dim: CutDim, cut_points: &[u32], domain_rules: &[Rule]) -> bool {
        if self.has_been_cut || cut_points.len() < 2 {
            return false;
        }
        let pieces = self.rect.unequal_cut(dim.index(), cut_points);
        if pieces.is_empty() {
            return false;
        }
        let n = pieces.len() - 1;
        self.populate_children(dim, n, pieces, domain_rules);
        true
    }

    fn populate_children(
        &mut self,
        dim: CutDim,
        num_cuts: usize,
        pieces: Vec<Rect>,
        domain_rules: &[Rule],
    ) {
        let mut children: Vec<TreeNode> = pieces.into_iter().map(TreeNode::leaf).collect();
        for &rule_idx in &self.rule_indices {
            let rule_rect = &domain_rules[rule_idx].rect;
            for child in &mut children {
                if rule_rect.collide(&child.rect) {
                    child.add_rule(rule_idx, domain_rules);
                }
            }
        }
        children.retain(|c| !c.rule_indices.is_empty());
        self.children = children;
        self.has_been_cut = true;
        self.cut_dim = Some(dim);
        self.num_cuts = num_cuts;
    }

    /// Undo a cut, making the node cuttable again. Used by the trial
    /// cuts in dimension/cut-count selection.
    fn reset_cut(&mut self) {
        self.children.clear();
        self.has_been_cut = false;
        self.cut_dim = None;
        self.num_cuts = 0;
    }

    /// `space_measure` as defined in the HiCuts paper: the total rule
    /// count across `n + 1` resulting children plus `n + 1` itself.
    fn trial_space_measure(&mut self, dim: CutDim, n: usize, domain_rules: &[Rule]) -> usize {
        self.cut(dim, n, domain_rules);
        let space: usize = self.children.iter().map(TreeNode::num_rules).sum::<usize>() + n + 1;
        self.reset_cut();
        space
    }

    /// Number of cuts to perform along `dim`, bounded by `spfac`: starts
    /// at `max(4, floor(sqrt(rules)))`, doubling while the resulting
    /// space measure stays under `spfac * rules`. Capped at every step
    /// (not just on return) so a node never trial-cuts more pieces than
    /// its dimension has unit values — `Rect::cut` would otherwise be
    /// asked for pieces narrower than one unit.
    pub fn determine_number_of_cuts(&mut self, dim: CutDim, spfac: usize, domain_rules: &[Rule]) -> usize {
        let num_rules = self.rule_indices.len();
        let max_cuts = self.rect.get(dim.index()).width() as usize;
        let mut n = (4.max((num_rules as f64).sqrt() as usize)).min(max_cuts);
        loop {
            let space = self.trial_space_measure(dim, n, domain_rules);
            let threshold = spfac * num_rules;
            if space < threshold && n < max_cuts {
                n = (n * 2).min(max_cuts);
            } else {
                break;
            }
        }
        n
    }

    fn rules_in_dim<'a>(&self, domain_rules: &'a [Rule]) -> [Vec<&'a Rule>; 1] {
        [self.rule_indices.iter().map(|&i| &domain_rules[i]).collect()]
    }

    /// Choose the cut dimension by maximum distinct-rule count, tied
    /// dimensions resolved by widest span, remaining ties resolved
    /// uniformly at random. Also reports whether any dimension yielded a
    /// strictly positive distinct count.
    pub fn dim_max_distinct_rules(
        &self,
        domain_rules: &[Rule],
        rng: &mut TieBreakRng,
    ) -> (CutDim, bool) {
        let [refs] = self.rules_in_dim(domain_rules);
        let counts: Vec<usize> = CutDim::ALL
            .iter()
            .map(|&d| rule::num_distinct_rules_in_dim(d, &refs))
            .collect();
        let max_distinct = *counts.iter().max().unwrap_or(&0);

        let tied_at_max: Vec<CutDim> = CutDim::ALL
            .iter()
            .zip(counts.iter())
            .filter(|(_, &c)| c == max_distinct)
            .map(|(&d, _)| d)
            .collect();

        let max_span = tied_at_max
            .iter()
            .map(|&d| self.rect.get(d.index()).width())
            .max()
            .unwrap_or(0);
        let candidates: Vec<CutDim> = tied_at_max
            .into_iter()
            .filter(|&d| self.rect.get(d.index()).width() == max_span)
            .collect();

        (rng.pick(&candidates), max_distinct > 0)
    }

    /// Choose the cut dimension that minimizes the maximum rule count
    /// across children after a trial cut, ties resolved uniformly at
    /// random.
    pub fn dim_least_max_rules_per_child(
        &mut self,
        spfac: usize,
        domain_rules: &[Rule],
        rng: &mut TieBreakRng,
    ) -> CutDim {
        let mut max_rules_per_dim = Vec::with_capacity(4);
        for &dim in &CutDim::ALL {
            let interval = self.rect.get(dim.index());
            if interval.width() == 0 {
                max_rules_per_dim.push(self.rule_indices.len() + 1);
                continue;
            }
            let num_cuts = self.determine_number_of_cuts(dim, spfac, domain_rules);
            self.cut(dim, num_cuts, domain_rules);
            let max_rules = self.children.iter().map(TreeNode::num_rules).max().unwrap_or(0);
            self.reset_cut();
            max_rules_per_dim.push(max_rules);
        }
        let least_max = *max_rules_per_dim.iter().min().unwrap();
        let candidates: Vec<CutDim> = CutDim::ALL
            .iter()
            .copied()
            .zip(max_rules_per_dim.iter())
            .filter(|(_, &m)| m == least_max)
            .map(|(d, _)| d)
            .collect();
        rng.pick(&candidates)
    }

    /// Iterative pre-order DFS numbering, starting at 0. Parent ids are
    /// always less than every descendant id.
    pub fn compute_numbering(&mut self) {
        let mut stack: Vec<&mut TreeNode> = vec![self];
        let mut next_id = 0usize;
        while let Some(node) = stack.pop() {
            node.id = next_id;
            next_id += 1;
            for child in node.children.iter_mut().rev() {
                stack.push(child);
            }
        }
    }
}

/// Build a HiCuts tree rooted at `root` over `domain_rules`, cutting
/// nodes breadth-first (an explicit path-addressed queue stands in for
/// the FIFO of node references, since Rust's owned-child tree can't hold
/// live mutable references across iterations) until every leaf holds at
/// most `binth` rules.
pub fn build_tree(
    root: &mut TreeNode,
    domain_rules: &[Rule],
    spfac: usize,
    binth: usize,
    dim_choice: DimChoice,
    cut_algo: CutAlgo,
    rng: &mut TieBreakRng,
) {
    let mut queue: VecDeque<Vec<usize>> = VecDeque::new();
    queue.push_back(Vec::new());

    while let Some(path) = queue.pop_front() {
        let node = node_at_mut(root, &path);
        if node.num_rules() <= binth {
            continue;
        }

        match cut_algo {
            CutAlgo::Equidistant => {
                let dim = match dim_choice {
                    DimChoice::LeastMaxRules => node.dim_least_max_rules_per_child(spfac, domain_rules, rng),
                    DimChoice::MaxDistinct => node.dim_max_distinct_rules(domain_rules, rng).0,
                };
                let num_cuts = node.determine_number_of_cuts(dim, spfac, domain_rules);
                node.cut(dim, num_cuts, domain_rules);
            }
            CutAlgo::Unequal => {
                let (dim, _) = node.dim_max_distinct_rules(domain_rules, rng);
                let refs: Vec<&Rule> = node.rule_indices.iter().map(|&i| &domain_rules[i]).collect();
                let frame = node.rect.clone();
                let points = rule::cut_points(dim, &refs, &frame);
                let cut_ok = node.unequal_cut(dim, &points, domain_rules);
                if !cut_ok {
                    // Fall back to the dimension with the most distinct
                    // endpoints, then finally to an equidistant cut.
                    let (fallback_dim, positive) = node.dim_max_distinct_rules(domain_rules, rng);
                    let fallback_ok = if positive {
                        let refs: Vec<&Rule> =
                            node.rule_indices.iter().map(|&i| &domain_rules[i]).collect();
                        let points = rule::cut_points(fallback_dim, &refs, &node.rect.clone());
                        node.unequal_cut(fallback_dim, &points, domain_rules)
                    } else {
                        false
                    };
                    if !fallback_ok {
                        let num_cuts = node.determine_number_of_cuts(fallback_dim, spfac, domain_rules);
                        node.cut(fallback_dim, num_cuts, domain_rules);
                    }
                }
            }
        }

        for (i, child) in node.children.iter().enumerate() {
            if child.num_rules() > binth {
                let mut child_path = path.clone();
                child_path.push(i);
                queue.push_back(child_path);
            }
        }
    }
}

fn node_at_mut<'a>(root: &'a mut TreeNode, path: &[usize]) -> &'a mut TreeNode {
    let mut node = root;
    for &i in path {
        node = &mut node.children[i];
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Interval;
    use crate::rule::{Action, Protocol};

    fn rule_box(sport: (u32, u32), dport: (u32, u32), saddr: (u32, u32), daddr: (u32, u32)) -> Rule {
        Rule {
            rect: Rect::new([
                Interval::new(sport.0, sport.1),
                Interval::new(dport.0, dport.1),
                Interval::new(saddr.0, saddr.1),
                Interval::new(daddr.0, daddr.1),
            ]),
            protocol: Protocol::Tcp,
            action: Action::Accept,
            chain: "INPUT".to_string(),
            source_text: "-A INPUT -j ACCEPT".to_string(),
            applicable: true,
        }
    }

    #[test]
    fn cut_never_drops_or_invents_rules() {
        let rules = vec![
            rule_box((0, 100), (0, 65535), (0, u32::MAX), (0, u32::MAX)),
            rule_box((101, 200), (0, 65535), (0, u32::MAX), (0, u32::MAX)),
            rule_box((201, 300), (0, 65535), (0, u32::MAX), (0, u32::MAX)),
        ];
        let mut root = TreeNode::new_root(&rules);
        root.cut(CutDim::SrcPort, 2, &rules);
        let total: usize = root.children().iter().map(TreeNode::num_rules).sum();
        assert_eq!(total, 3);
        assert!(root.children().len() <= 3);
    }

    #[test]
    fn leaf_respects_binth_or_has_unit_width_dimension() {
        let rules: Vec<Rule> = (0..20)
            .map(|i| rule_box((i, i), (0, 65535), (0, u32::MAX), (0, u32::MAX)))
            .collect();
        let mut root = TreeNode::new_root(&rules);
        let mut rng = TieBreakRng::new(1);
        build_tree(&mut root, &rules, 4, 4, DimChoice::MaxDistinct, CutAlgo::Equidistant, &mut rng);

        fn check(node: &TreeNode, binth: usize) {
            if node.is_leaf() {
                let has_unit_dim = (0..crate::geometry::NUM_DIMS)
                    .any(|d| node.rect().get(d).width() == 0);
                assert!(node.num_rules() <= binth || has_unit_dim);
            } else {
                for c in node.children() {
                    check(c, binth);
                }
            }
        }
        check(&root, 4);
    }

    #[test]
    fn least_max_rules_handles_a_narrow_dimension_without_panicking() {
        let rules: Vec<Rule> = (0..20)
            .map(|i| rule_box((0, 65535), (80, 82), (i, i), (0, u32::MAX)))
            .collect();
        let mut root = TreeNode::new_root(&rules);
        let mut rng = TieBreakRng::new(3);
        build_tree(&mut root, &rules, 4, 4, DimChoice::LeastMaxRules, CutAlgo::Equidistant, &mut rng);

        fn check(node: &TreeNode, binth: usize) {
            if node.is_leaf() {
                let has_unit_dim =
                    (0..crate::geometry::NUM_DIMS).any(|d| node.rect().get(d).width() == 0);
                assert!(node.num_rules() <= binth || has_unit_dim);
            } else {
                for c in node.children() {
                    check(c, binth);
                }
            }
        }
        check(&root, 4);
    }

    #[test]
    fn dfs_numbering_is_dense_and_parent_before_child() {
        let rules: Vec<Rule> = (0..30)
            .map(|i| rule_box((i, i), (0, 65535), (0, u32::MAX), (0, u32::MAX)))
            .collect();
        let mut root = TreeNode::new_root(&rules);
        let mut rng = TieBreakRng::new(7);
        build_tree(&mut root, &rules, 4, 4, DimChoice::MaxDistinct, CutAlgo::Equidistant, &mut rng);
        root.compute_numbering();

        fn collect_ids(node: &TreeNode, ids: &mut Vec<usize>) {
            ids.push(node.id());
            for c in node.children() {
                assert!(node.id() < c.id());
                collect_ids(c, ids);
            }
        }
        let mut ids = Vec::new();
        collect_ids(&root, &mut ids);
        ids.sort_unstable();
        let expected: Vec<usize> = (0..ids.len()).collect();
        assert_eq!(ids, expected);
        assert_eq!(root.id(), 0);
    }
}
