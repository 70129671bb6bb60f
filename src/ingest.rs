//! Line-oriented ruleset parsing. Deliberately the least interesting
//! module in the crate: one function per token kind, no geometry logic,
//! no cutting. Mirrors the "external producer" role spec.md assigns to
//! parsing — this crate just happens to be the one supplying it.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::geometry::{Interval, Rect, NUM_DIMS};
use crate::rule::{Action, CutDim, DefaultPolicies, Policy, Protocol, Rule};

/// Parse a (possibly partial) dotted-quad into its 32-bit value. Missing
/// trailing octets are treated as zero, so `"128"` parses the same as
/// `"128.0.0.0"` and `"1"` the same as `"1.0.0.0"`.
pub fn parse_ip(s: &str) -> Result<u32> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(Error::parse(format!("Invalid IPv4 address: '{s}'")));
    }
    let mut value: u32 = 0;
    for i in 0..4 {
        let octet: u32 = match parts.get(i) {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| Error::parse(format!("Invalid IPv4 address: '{s}'")))?
                .into(),
            None => 0,
        };
        value = (value << 8) | octet;
    }
    Ok(value)
}

/// Parse `ip/bits` into an inclusive `(low, high)` range covering the
/// subnet.
pub fn parse_subnet(s: &str) -> Result<(u32, u32)> {
    let (ip_part, bits_part) = s
        .split_once('/')
        .ok_or_else(|| Error::parse(format!("Invalid subnet: '{s}'")))?;
    let bits: u32 = bits_part
        .parse()
        .map_err(|_| Error::parse(format!("Invalid subnet prefix: '{s}'")))?;
    if bits > 32 {
        return Err(Error::parse(format!("Invalid subnet prefix: '{s}'")));
    }
    let ip = parse_ip(ip_part)?;
    let mask: u32 = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    let low = ip & mask;
    let high = low | !mask;
    Ok((low, high))
}

/// Parse `IPv4-IPv4` into an inclusive `(low, high)` range.
pub fn parse_ip_range(s: &str) -> Result<(u32, u32)> {
    let (lo_part, hi_part) = s
        .split_once('-')
        .ok_or_else(|| Error::parse(format!("Invalid IP range: '{s}'")))?;
    let low = parse_ip(lo_part)?;
    let high = parse_ip(hi_part)?;
    if low > high {
        return Err(Error::parse(format!("Invalid IP range: '{s}'")));
    }
    Ok((low, high))
}

/// Parse a single decimal port number.
pub fn parse_port(s: &str) -> Result<u16> {
    s.parse::<u16>()
        .map_err(|_| Error::parse(format!("Invalid port: '{s}'")))
}

/// Parse `port` or `port:port` into an inclusive `(low, high)` range.
pub fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    match s.split_once(':') {
        Some((lo, hi)) => {
            let low = parse_port(lo)?;
            let high = parse_port(hi)?;
            if low > high {
                return Err(Error::parse(format!("Invalid port range: '{s}'")));
            }
            Ok((low, high))
        }
        None => {
            let p = parse_port(s)?;
            Ok((p, p))
        }
    }
}

/// `tcp`/`udp`, case-sensitive per the token table. Any other value
/// returns `None` rather than an error — the caller demotes the owning
/// rule to non-applicable instead of aborting the run.
pub fn parse_protocol(s: &str) -> Option<Protocol> {
    match s {
        "tcp" => Some(Protocol::Tcp),
        "udp" => Some(Protocol::Udp),
        _ => None,
    }
}

/// `ACCEPT`/`DROP`/`REJECT`, or `JUMP <target>` consuming one more token
/// from `rest`. Returns `None` on anything else.
pub fn parse_action(value: &str, rest: &mut std::str::SplitWhitespace) -> Option<Action> {
    match value {
        "ACCEPT" => Some(Action::Accept),
        "DROP" => Some(Action::Drop),
        "REJECT" => Some(Action::Reject),
        "JUMP" => rest.next().map(|target| Action::Jump(target.to_string())),
        _ => None,
    }
}

fn parse_addr_token(value: &str) -> std::result::Result<Interval, ()> {
    if let Some((_, _)) = value.split_once('/') {
        let (low, high) = parse_subnet(value).map_err(|_| ())?;
        Ok(Interval::new(low, high))
    } else {
        let ip = parse_ip(value).map_err(|_| ())?;
        Ok(Interval::exact(ip))
    }
}

fn parse_port_token(value: &str) -> std::result::Result<Interval, ()> {
    let (low, high) = parse_port_range(value).map_err(|_| ())?;
    Ok(Interval::new(low as u32, high as u32))
}

fn parse_range_token(value: &str) -> std::result::Result<Interval, ()> {
    let (low, high) = parse_ip_range(value).map_err(|_| ())?;
    Ok(Interval::new(low, high))
}

/// Parse one input line into a `Rule`. Never fails: any token the core
/// does not understand demotes the rule to `applicable = false` while
/// keeping its `source_text` verbatim, per spec.md §7.
pub fn parse_rule(line: &str) -> Rule {
    let mut dims = [Interval::full(); NUM_DIMS];
    let mut protocol = Protocol::Wildcard;
    let mut action = Action::None;
    let mut chain = String::new();
    let mut applicable = true;

    let mut tokens = line.split_whitespace();
    while let Some(tok) = tokens.next() {
        match tok {
            "-A" => match tokens.next() {
                Some(v) => chain = v.to_string(),
                None => applicable = false,
            },
            "-p" => match tokens.next() {
                Some(v) => match parse_protocol(v) {
                    Some(p) => protocol = p,
                    None => applicable = false,
                },
                None => applicable = false,
            },
            "-m" => match tokens.next() {
                Some("iprange") => {}
                Some("tcp") => protocol = Protocol::Tcp,
                Some("udp") => protocol = Protocol::Udp,
                _ => applicable = false,
            },
            "--src" => match tokens.next().and_then(|v| parse_addr_token(v).ok()) {
                Some(iv) => dims[CutDim::SrcAddr.index()] = iv,
                None => applicable = false,
            },
            "--dst" => match tokens.next().and_then(|v| parse_addr_token(v).ok()) {
                Some(iv) => dims[CutDim::DstAddr.index()] = iv,
                None => applicable = false,
            },
            "--src-range" => match tokens.next().and_then(|v| parse_range_token(v).ok()) {
                Some(iv) => dims[CutDim::SrcAddr.index()] = iv,
                None => applicable = false,
            },
            "--dst-range" => match tokens.next().and_then(|v| parse_range_token(v).ok()) {
                Some(iv) => dims[CutDim::DstAddr.index()] = iv,
                None => applicable = false,
            },
            "--sport" => match tokens.next().and_then(|v| parse_port_token(v).ok()) {
                Some(iv) => dims[CutDim::SrcPort.index()] = iv,
                None => applicable = false,
            },
            "--dport" => match tokens.next().and_then(|v| parse_port_token(v).ok()) {
                Some(iv) => dims[CutDim::DstPort.index()] = iv,
                None => applicable = false,
            },
            "-j" => match tokens.next() {
                Some(v) => match parse_action(v, &mut tokens) {
                    Some(a) => action = a,
                    None => applicable = false,
                },
                None => applicable = false,
            },
            other if other.starts_with('-') => {
                applicable = false;
            }
            _ => {}
        }
    }

    Rule {
        rect: Rect::new(dims),
        protocol,
        action,
        chain,
        source_text: line.to_string(),
        applicable,
    }
}

/// Parse a `:CHAIN POLICY [x:y]` preamble line into `policies`, if
/// `chain` is one of the three built-ins. `-` means "no declared
/// policy" and is left unset.
fn parse_policy_line(line: &str, policies: &mut DefaultPolicies) {
    let mut tokens = line.split_whitespace();
    let chain = match tokens.next() {
        Some(c) => c.trim_start_matches(':'),
        None => return,
    };
    let policy = match tokens.next() {
        Some("ACCEPT") => Policy::Accept,
        Some("DROP") => Policy::Drop,
        Some("REJECT") => Policy::Reject,
        _ => return,
    };
    match chain {
        "INPUT" => policies.set_input(policy),
        "FORWARD" => policies.set_forward(policy),
        "OUTPUT" => policies.set_output(policy),
        _ => {}
    }
}

/// Parse a whole ruleset: control lines (`#`, `*`, `COMMIT`) are
/// consumed silently, `:CHAIN POLICY` lines populate `DefaultPolicies`,
/// and every other line becomes a `Rule` via `parse_rule`.
pub fn parse_ruleset(lines: &[String]) -> (Vec<Rule>, DefaultPolicies) {
    let mut rules = Vec::new();
    let mut policies = DefaultPolicies::default();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('*') || trimmed == "COMMIT" {
            continue;
        }
        if trimmed.starts_with(':') {
            parse_policy_line(trimmed, &mut policies);
            continue;
        }
        rules.push(parse_rule(trimmed));
    }
    (rules, policies)
}

/// Read `path`, trimming each line and dropping empty ones.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
