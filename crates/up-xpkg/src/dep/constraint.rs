//! Version constraints in the syntax used by package `dependsOn` entries.
//!
//! Accepted forms: `=`, `!=`, `>`, `>=`, `<`, `<=`, `~`, `~>`, `^` operators,
//! `*`/`x` wildcards, optional `v` prefixes, `a - b` ranges, terms joined by
//! spaces or commas (all must hold) and `||` alternatives (any may hold). A
//! bare version is an exact match; missing components act as wildcards.

use std::fmt;

use semver::{Comparator, Version, VersionReq};

const OPERATORS: &[&str] = &["!=", ">=", "=>", "<=", "=<", "~>", ">", "<", "=", "~", "^"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alternative {
    req: VersionReq,
    excluded: Vec<Version>,
}

impl Alternative {
    fn matches(&self, version: &Version) -> bool {
        self.req.matches(version) && !self.excluded.contains(version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    source: String,
    alternatives: Vec<Alternative>,
}

impl Constraint {
    /// Parses `input`; an empty constraint accepts any release version.
    pub fn parse(input: &str) -> Result<Self, String> {
        let source = input.trim().to_string();

        let alternatives = if source.is_empty() {
            vec![Alternative {
                req: VersionReq::STAR,
                excluded: Vec::new(),
            }]
        } else {
            source
                .split("||")
                .map(parse_alternative)
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            source,
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alt| alt.matches(version))
    }

    pub fn is_any(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_alternative(input: &str) -> Result<Alternative, String> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err("empty constraint between '||'".to_string());
    }

    let mut alternative = Alternative {
        req: VersionReq::STAR,
        excluded: Vec::new(),
    };
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];

        if tokens.get(i + 1) == Some(&"-") {
            let upper = tokens
                .get(i + 2)
                .ok_or_else(|| format!("range '{token} -' has no upper bound"))?;
            add_term(&mut alternative, ">=", token)?;
            add_term(&mut alternative, "<=", upper)?;
            i += 3;
            continue;
        }

        let (op, version) = split_operator(token);
        if version.is_empty() {
            let next = tokens
                .get(i + 1)
                .ok_or_else(|| format!("operator '{op}' has no version"))?;
            add_term(&mut alternative, op, next)?;
            i += 2;
        } else {
            add_term(&mut alternative, op, version)?;
            i += 1;
        }
    }

    Ok(alternative)
}

fn split_operator(token: &str) -> (&str, &str) {
    OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token))
}

/// Drops a `v` prefix and every component from the first wildcard on.
fn normalize_version(version: &str) -> Result<String, String> {
    let version = version
        .strip_prefix(['v', 'V'])
        .unwrap_or(version);
    if version.is_empty() {
        return Err("missing version".to_string());
    }

    let mut kept = Vec::new();
    for part in version.split('.') {
        if matches!(part, "*" | "x" | "X") {
            break;
        }
        kept.push(part);
    }
    Ok(kept.join("."))
}

fn add_term(alternative: &mut Alternative, op: &str, version: &str) -> Result<(), String> {
    let version = normalize_version(version)?;

    if op == "!=" {
        let excluded = parse_tag(&version).ok_or_else(|| format!("invalid version '{version}'"))?;
        alternative.excluded.push(excluded);
        return Ok(());
    }

    if version.is_empty() {
        // Pure wildcard: no restriction.
        return Ok(());
    }

    let op = match op {
        "" => "=",
        "=>" => ">=",
        "=<" => "<=",
        "~>" => "~",
        other => other,
    };

    let comparator =
        Comparator::parse(&format!("{op}{version}")).map_err(|err| format!("{op}{version}: {err}"))?;
    alternative.req.comparators.push(comparator);
    Ok(())
}

/// Parses a registry tag as a version, accepting a `v` prefix and missing
/// minor or patch components (`v1.2` is `1.2.0`).
pub fn parse_tag(tag: &str) -> Option<Version> {
    let trimmed = tag.strip_prefix(['v', 'V']).unwrap_or(tag);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    let numeric = |p: &&str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    if parts.len() > 3 || !parts.iter().all(numeric) {
        return None;
    }

    let mut full = parts.join(".");
    for _ in parts.len()..3 {
        full.push_str(".0");
    }
    full.push_str(suffix);
    Version::parse(&full).ok()
}
