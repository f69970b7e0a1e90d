use crate::dn::Dn;

/// One attribute description and its values, in the order they appeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

/// A parsed directory entry. Entries are read-only once built; the engine
/// routes them but never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: Dn, attributes: Vec<Attribute>) -> Self {
        Self { dn, attributes }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// All values for `name`, case-insensitively, merged across repeated
    /// attribute blocks in order of appearance.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.name.eq_ignore_ascii_case(name))
            .flat_map(|a| a.values.iter().map(String::as_str))
            .collect()
    }

    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry() -> Entry {
        Entry::new(
            Dn::parse("uid=jdoe,ou=People,dc=example,dc=com").unwrap(),
            vec![
                Attribute {
                    name: "objectClass".to_string(),
                    values: vec!["top".to_string(), "person".to_string()],
                },
                Attribute {
                    name: "cn".to_string(),
                    values: vec!["Jane Doe".to_string()],
                },
            ],
        )
    }

    #[test]
    fn test_values_are_case_insensitive_on_name() {
        let entry = test_entry();
        assert_eq!(entry.values("OBJECTCLASS"), vec!["top", "person"]);
        assert_eq!(entry.first_value("CN"), Some("Jane Doe"));
        assert!(entry.has_attribute("cn"));
        assert!(!entry.has_attribute("mail"));
        assert!(entry.values("mail").is_empty());
    }
}
