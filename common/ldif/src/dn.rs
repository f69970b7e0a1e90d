use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DnParseError {
    #[error("DN is empty")]
    Empty,
    #[error("RDN component {0} has no attribute type")]
    MissingType(usize),
    #[error("RDN component {0} has no '=' separator")]
    MissingSeparator(usize),
}

/// Normalizes an attribute value for comparison: lowercased, leading/trailing
/// whitespace stripped, internal whitespace runs collapsed to a single space.
pub fn normalize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lc in c.to_lowercase() {
            out.push(lc);
        }
    }
    out
}

/// Schema-aware value normalization seam. Hashing and DN comparison go through
/// this so a real schema (per-attribute matching rules) can be plugged in.
pub trait ValueNormalizer: Send + Sync {
    fn normalize(&self, attribute: &str, value: &str) -> String;
}

/// Default normalizer: caseIgnoreMatch semantics for every attribute.
pub struct CaseIgnoreNormalizer;

impl ValueNormalizer for CaseIgnoreNormalizer {
    fn normalize(&self, _attribute: &str, value: &str) -> String {
        normalize_value(value)
    }
}

/// A parsed distinguished name. Immutable; equality and hashing are over the
/// normalized form, display keeps the raw form as read.
#[derive(Debug, Clone)]
pub struct Dn {
    raw: String,
    // Normalized RDN strings, leaf first.
    rdns: Vec<String>,
    norm: String,
}

impl Dn {
    pub fn parse(raw: &str) -> Result<Self, DnParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DnParseError::Empty);
        }

        let mut rdns = Vec::new();
        for (idx, component) in split_unescaped(trimmed, ',').into_iter().enumerate() {
            let component = component.trim();
            let Some(eq) = find_unescaped(component, '=') else {
                return Err(DnParseError::MissingSeparator(idx));
            };
            let name = component[..eq].trim();
            if name.is_empty() {
                return Err(DnParseError::MissingType(idx));
            }
            let value = component[eq + 1..].trim();
            rdns.push(format!(
                "{}={}",
                name.to_lowercase(),
                normalize_value(value)
            ));
        }

        let norm = rdns.join(",");
        Ok(Self {
            raw: trimmed.to_string(),
            rdns,
            norm,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.norm
    }

    /// The leaf (leftmost) RDN, normalized.
    pub fn rdn(&self) -> &str {
        &self.rdns[0]
    }

    pub fn component_count(&self) -> usize {
        self.rdns.len()
    }

    /// The DN with the leaf RDN removed, or None for a single-RDN DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.len() < 2 {
            return None;
        }
        let rdns: Vec<String> = self.rdns[1..].to_vec();
        let norm = rdns.join(",");
        Some(Dn {
            raw: norm.clone(),
            rdns,
            norm,
        })
    }

    /// How many levels this DN sits below `base`: Some(0) when equal, Some(1)
    /// for a direct child, and None when this DN is not at or below `base`.
    pub fn depth_below(&self, base: &Dn) -> Option<usize> {
        if self.rdns.len() < base.rdns.len() {
            return None;
        }
        let offset = self.rdns.len() - base.rdns.len();
        if self.rdns[offset..] == base.rdns[..] {
            Some(offset)
        } else {
            None
        }
    }

    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        matches!(self.depth_below(base), Some(d) if d > 0)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// Splits on `delim`, honoring backslash escapes ("cn=a\,b" is one component).
fn split_unescaped(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == delim {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == needle {
            return Some(i);
        }
    }
    None
}
