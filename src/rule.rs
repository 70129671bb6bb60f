//! Rule model and rule algebra: the classification fields a rule carries
//! and the per-dimension statistics the tree builder needs (distinct
//! rule counts, cut-point projection, shadowing).

use crate::geometry::{DimT, Interval, Rect};

/// The four cuttable classification dimensions, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutDim {
    SrcPort,
    DstPort,
    SrcAddr,
    DstAddr,
}

impl CutDim {
    pub const ALL: [CutDim; 4] = [CutDim::SrcPort, CutDim::DstPort, CutDim::SrcAddr, CutDim::DstAddr];

    pub fn index(self) -> usize {
        match self {
            CutDim::SrcPort => 0,
            CutDim::DstPort => 1,
            CutDim::SrcAddr => 2,
            CutDim::DstAddr => 3,
        }
    }
}

/// Transport protocol. Distinct from the four range dimensions: a scalar
/// predicate carried alongside the box, not a cut axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Wildcard,
}

impl Protocol {
    pub fn as_flag(self) -> Option<&'static str> {
        match self {
            Protocol::Tcp => Some("tcp"),
            Protocol::Udp => Some("udp"),
            Protocol::Wildcard => None,
        }
    }
}

/// The decision a rule makes when a packet matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Accept,
    Drop,
    Reject,
    Jump(String),
    None,
}

/// A default chain policy, as declared by a `:CHAIN POLICY [x:y]` line.
/// `None` means the chain carries no built-in policy and its terminal
/// behavior is left to a user-supplied custom rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Accept,
    Drop,
    Reject,
    None,
}

/// The three built-in chain names this compiler recognizes.
pub const BUILTIN_CHAINS: [&str; 3] = ["INPUT", "OUTPUT", "FORWARD"];

pub fn is_builtin_chain(chain: &str) -> bool {
    BUILTIN_CHAINS.contains(&chain)
}

/// Default policies for the three built-in chains, as parsed from the
/// ruleset's `:CHAIN POLICY [x:y]` preamble lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicies {
    input: Option<Policy>,
    forward: Option<Policy>,
    output: Option<Policy>,
}

impl DefaultPolicies {
    pub fn set_input(&mut self, policy: Policy) {
        self.input = Some(policy);
    }

    pub fn set_forward(&mut self, policy: Policy) {
        self.forward = Some(policy);
    }

    pub fn set_output(&mut self, policy: Policy) {
        self.output = Some(policy);
    }

    /// The policy declared for `chain`, or `Policy::None` if the chain is
    /// not built-in or was never declared.
    pub fn chain_policy(&self, chain: &str) -> Policy {
        match chain {
            "INPUT" => self.input.unwrap_or(Policy::None),
            "FORWARD" => self.forward.unwrap_or(Policy::None),
            "OUTPUT" => self.output.unwrap_or(Policy::None),
            _ => Policy::None,
        }
    }
}

/// A single rule from the input ruleset.
#[derive(Debug, Clone)]
pub struct Rule {
    pub rect: Rect,
    pub protocol: Protocol,
    pub action: Action,
    pub chain: String,
    /// The original textual representation, used verbatim for
    /// passthrough and (with a patched chain name) for leaf emission.
    pub source_text: String,
    /// True iff every match on this rule is understood and cuttable.
    /// Non-classifiable rules participate in chain ordering but never
    /// enter a tree.
    pub applicable: bool,
}

impl Rule {
    pub fn get(&self, dim: CutDim) -> Interval {
        self.rect.get(dim.index())
    }

    /// Replace the chain name immediately following `"-A "` in this
    /// rule's source text, leaving every other token and whitespace
    /// offset untouched.
    pub fn patched_source(&self, chain: &str) -> String {
        patch_chain(&self.source_text, &self.chain, chain)
    }
}

/// Locate the substring immediately following `"-A "` — the original
/// chain name — and replace it, preserving the rest of the line
/// verbatim.
pub fn patch_chain(source: &str, old_chain: &str, new_chain: &str) -> String {
    const MARKER: &str = "-A ";
    if let Some(marker_pos) = source.find(MARKER) {
        let chain_start = marker_pos + MARKER.len();
        if source[chain_start..].starts_with(old_chain) {
            let chain_end = chain_start + old_chain.len();
            let mut out = String::with_capacity(source.len());
            out.push_str(&source[..chain_start]);
            out.push_str(new_chain);
            out.push_str(&source[chain_end..]);
            return out;
        }
    }
    source.to_string()
}

/// Count how many rules are *distinct* in dimension `d`: a rule is
/// distinct iff no other rule's interval in `d` overlaps it.
///
/// Sorts a copy of `rules` ascending by `(low, high)` in `d`, then
/// sweeps: the first rule is distinct iff its end is strictly less than
/// the next rule's start; an interior rule is distinct iff its start
/// exceeds every earlier rule's end *and* its end is below the next
/// rule's start; the last rule is distinct iff its start exceeds every
/// earlier rule's end.
pub fn num_distinct_rules_in_dim(dim: CutDim, rules: &[&Rule]) -> usize {
    let n = rules.len();
    if n <= 1 {
        return n;
    }
    let mut sorted: Vec<&Rule> = rules.to_vec();
    sorted.sort_by_key(|r| {
        let iv = r.get(dim);
        (iv.low, iv.high)
    });

    let mut num_distinct = 0;
    let loop_end = n - 1;

    let first_end = sorted[0].get(dim).high;
    let second_start = sorted[1].get(dim).low;
    if first_end < second_start {
        num_distinct += 1;
    }

    let mut highest_end = first_end;
    for i in 1..loop_end {
        let iv = sorted[i].get(dim);
        let next_start = sorted[i + 1].get(dim).low;
        if iv.low > highest_end && iv.high < next_start {
            num_distinct += 1;
        }
        highest_end = highest_end.max(iv.high);
    }

    let last_start = sorted[loop_end].get(dim).low;
    if last_start > highest_end {
        num_distinct += 1;
    }
    num_distinct
}

/// The distinct interval endpoints of `rules` projected to dimension
/// `d`, restricted to the interior of `frame` and deduplicated/sorted
/// ascending — the candidate cut points `unequal_cut` partitions on.
pub fn cut_points(dim: CutDim, rules: &[&Rule], frame: &Rect) -> Vec<DimT> {
    let frame_iv = frame.get(dim.index());
    let mut pts: Vec<DimT> = Vec::new();
    for r in rules {
        let iv = r.get(dim);
        if iv.low > frame_iv.low && iv.low <= frame_iv.high {
            pts.push(iv.low - 1);
        }
        if iv.high >= frame_iv.low && iv.high < frame_iv.high {
            pts.push(iv.high);
        }
    }
    pts.sort_unstable();
    pts.dedup();
    pts
}

/// True iff, within `frame`, `earlier`'s effective box (its box
/// intersected with `frame`) contains `later`'s effective box in every
/// dimension. This is the anti-redundancy test used while adding rules
/// to a tree node: a later rule fully shadowed by an earlier one within
/// the node's region can never be reached and is dropped.
pub fn is_shadowed(earlier: &Rule, later: &Rule, frame: &Rect) -> bool {
    for d in 0..crate::geometry::NUM_DIMS {
        let frame_iv = frame.get(d);
        let earlier_iv = match earlier.rect.get(d).intersect(&frame_iv) {
            Some(iv) => iv,
            None => return false,
        };
        let later_iv = match later.rect.get(d).intersect(&frame_iv) {
            Some(iv) => iv,
            None => return false,
        };
        if !earlier_iv.contains(&later_iv) {
            return false;
        }
    }
    true
}
