use common_ldif::Dn;

/// Where an entry sits relative to the split base. Malformed records never
/// reach classification; they are handled as parse errors upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Not at or below the split base.
    Outside,
    /// Exactly the split base.
    Base,
    /// Direct child of the split base; the unit of partition assignment.
    Branch,
    /// Two or more levels below the split base.
    Descendant,
}

/// Pure and stateless; safe to run concurrently across entries.
pub fn classify(dn: &Dn, split_base: &Dn) -> Placement {
    match dn.depth_below(split_base) {
        None => Placement::Outside,
        Some(0) => Placement::Base,
        Some(1) => Placement::Branch,
        Some(_) => Placement::Descendant,
    }
}
