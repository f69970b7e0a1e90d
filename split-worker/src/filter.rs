use common_ldif::{normalize_value, Entry};
use thiserror::Error;

/// Raised when a filter cannot be evaluated against an entry. The filter
/// strategy treats this as "fall back to RDN hashing", never as a run error.
#[derive(Debug, Error)]
#[error("filter cannot be evaluated: {0}")]
pub struct FilterError(pub String);

/// Search-filter evaluation seam. The engine only needs a yes/no per entry; a
/// full filter evaluator can be plugged in from outside.
pub trait EntryFilter: Send + Sync {
    fn matches(&self, entry: &Entry) -> Result<bool, FilterError>;
}

/// Minimal in-tree evaluator covering presence (`(attr=*)`) and equality
/// (`(attr=value)`) filters. Anything richer is reported as unsupported at
/// parse time, which the strategy converts into per-entry fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleFilter {
    Presence { attribute: String },
    Equality { attribute: String, value: String },
}

impl SimpleFilter {
    pub fn parse(raw: &str) -> Result<Self, FilterError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| FilterError(format!("not parenthesized: {raw}")))?;

        if inner.starts_with(['&', '|', '!']) || inner.contains('(') {
            return Err(FilterError(format!("compound filters unsupported: {raw}")));
        }
        let Some((attribute, value)) = inner.split_once('=') else {
            return Err(FilterError(format!("no '=' in filter: {raw}")));
        };
        let attribute = attribute.trim();
        if attribute.is_empty() || attribute.ends_with(['<', '>', '~']) {
            return Err(FilterError(format!("unsupported match type: {raw}")));
        }

        if value == "*" {
            Ok(SimpleFilter::Presence {
                attribute: attribute.to_string(),
            })
        } else if value.contains('*') {
            Err(FilterError(format!("substring filters unsupported: {raw}")))
        } else {
            Ok(SimpleFilter::Equality {
                attribute: attribute.to_string(),
                value: normalize_value(value),
            })
        }
    }
}

impl EntryFilter for SimpleFilter {
    fn matches(&self, entry: &Entry) -> Result<bool, FilterError> {
        match self {
            SimpleFilter::Presence { attribute } => Ok(entry.has_attribute(attribute)),
            SimpleFilter::Equality { attribute, value } => Ok(entry
                .values(attribute)
                .iter()
                .any(|v| normalize_value(v) == *value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_ldif::{Attribute, Dn};

    fn entry(attrs: &[(&str, &str)]) -> Entry {
        Entry::new(
            Dn::parse("uid=jdoe,ou=People,dc=example,dc=com").unwrap(),
            attrs
                .iter()
                .map(|(n, v)| Attribute {
                    name: n.to_string(),
                    values: vec![v.to_string()],
                })
                .collect(),
        )
    }

    #[test]
    fn test_equality_filter_is_case_insensitive() {
        let filter = SimpleFilter::parse("(st=CA)").unwrap();
        assert!(filter.matches(&entry(&[("st", "ca")])).unwrap());
        assert!(!filter.matches(&entry(&[("st", "NY")])).unwrap());
        assert!(!filter.matches(&entry(&[("l", "CA")])).unwrap());
    }

    #[test]
    fn test_presence_filter() {
        let filter = SimpleFilter::parse("(mail=*)").unwrap();
        assert!(filter.matches(&entry(&[("mail", "jdoe@example.com")])).unwrap());
        assert!(!filter.matches(&entry(&[("cn", "Jane")])).unwrap());
    }

    #[test]
    fn test_unsupported_syntax_is_an_evaluation_error() {
        assert!(SimpleFilter::parse("(&(st=CA)(l=SF))").is_err());
        assert!(SimpleFilter::parse("(cn=Ja*ne)").is_err());
        assert!(SimpleFilter::parse("st=CA").is_err());
        assert!(SimpleFilter::parse("(cn>=5)").is_err());
    }
}
