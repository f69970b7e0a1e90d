use std::collections::HashMap;

use common_ldif::{Dn, Entry};

use crate::config::OutsideMode;
use crate::sink::SinkId;

/// Enforces the hierarchy invariants: branch assignments are remembered so
/// descendants land in their ancestor's set, the split-base entry is
/// replicated to every set, and outside entries follow the configured mode.
///
/// Owned by the serial commit stage; this is the only shared mutable state in
/// a run besides the fewest-entries counters.
pub struct Router {
    set_count: usize,
    outside: OutsideMode,
    flat_dit: bool,
    // DN -> set index for every entry at or below the branch level that has
    // been routed so far. Empty for flat-DIT runs.
    ancestry: HashMap<Dn, usize>,
    // Whether any split-scope entry has been routed to a set sink yet. The
    // split-base entry must precede all of its subordinates in every set, so
    // once this flips a base entry can no longer be accepted. Outside
    // entries replicated to the sets do not count: superiors of the base
    // precede it in a well-ordered export.
    sets_started: bool,
}

impl Router {
    pub fn new(set_count: usize, outside: OutsideMode, flat_dit: bool) -> Self {
        Self {
            set_count,
            outside,
            flat_dit,
            ancestry: HashMap::new(),
            sets_started: false,
        }
    }

    /// Records a branch entry's assignment and names its sink.
    pub fn route_branch(&mut self, entry: &Entry, index: usize) -> SinkId {
        debug_assert!(index < self.set_count);
        if !self.flat_dit {
            self.ancestry.insert(entry.dn().clone(), index);
        }
        self.sets_started = true;
        SinkId::Set(index)
    }

    /// Resolves a descendant through its immediate parent. None means the
    /// entry is an orphan: its parent was never routed, or the run assumes a
    /// flat DIT and refuses to track ancestry at all.
    pub fn route_descendant(&mut self, entry: &Entry) -> Option<SinkId> {
        if self.flat_dit {
            return None;
        }
        let parent = entry.dn().parent()?;
        let index = *self.ancestry.get(&parent)?;
        // Chain so this entry's own children can resolve through it.
        self.ancestry.insert(entry.dn().clone(), index);
        Some(SinkId::Set(index))
    }

    /// The split-base entry goes to every set, regardless of outside mode.
    /// None means a branch or descendant was already routed, so replicating
    /// the base now could not put it ahead of its subordinates.
    pub fn route_base(&mut self) -> Option<Vec<SinkId>> {
        if self.sets_started {
            return None;
        }
        self.sets_started = true;
        Some((0..self.set_count).map(SinkId::Set).collect())
    }

    pub fn route_outside(&mut self) -> Vec<SinkId> {
        let mut sinks = Vec::new();
        if self.outside.to_dedicated() {
            sinks.push(SinkId::Outside);
        }
        if self.outside.to_all() {
            sinks.extend((0..self.set_count).map(SinkId::Set));
        }
        sinks
    }

    /// Branch-level assignments tracked so far.
    pub fn tracked(&self) -> usize {
        self.ancestry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_ldif::Attribute;

    fn entry(dn: &str) -> Entry {
        Entry::new(
            Dn::parse(dn).unwrap(),
            vec![Attribute {
                name: "objectClass".to_string(),
                values: vec!["top".to_string()],
            }],
        )
    }

    #[test]
    fn test_descendants_inherit_their_branch_assignment() {
        let mut router = Router::new(4, OutsideMode::None, false);
        let branch = entry("uid=jdoe,ou=People,dc=example,dc=com");
        let child = entry("cn=cert,uid=jdoe,ou=People,dc=example,dc=com");
        let grandchild = entry("cn=old,cn=cert,uid=jdoe,ou=People,dc=example,dc=com");

        assert_eq!(router.route_branch(&branch, 2), SinkId::Set(2));
        assert_eq!(router.route_descendant(&child), Some(SinkId::Set(2)));
        assert_eq!(router.route_descendant(&grandchild), Some(SinkId::Set(2)));
        assert_eq!(router.tracked(), 3);
    }

    #[test]
    fn test_missing_parent_is_an_orphan() {
        let mut router = Router::new(4, OutsideMode::None, false);
        let child = entry("cn=cert,uid=ghost,ou=People,dc=example,dc=com");
        assert_eq!(router.route_descendant(&child), None);
    }

    #[test]
    fn test_skipped_intermediate_orphans_the_grandchild() {
        let mut router = Router::new(4, OutsideMode::None, false);
        let branch = entry("uid=jdoe,ou=People,dc=example,dc=com");
        let grandchild = entry("cn=old,cn=cert,uid=jdoe,ou=People,dc=example,dc=com");

        router.route_branch(&branch, 1);
        // The cn=cert level never appeared, so the grandchild cannot resolve.
        assert_eq!(router.route_descendant(&grandchild), None);
    }

    #[test]
    fn test_flat_dit_never_tracks_and_always_orphans() {
        let mut router = Router::new(4, OutsideMode::None, true);
        let branch = entry("uid=jdoe,ou=People,dc=example,dc=com");
        let child = entry("cn=cert,uid=jdoe,ou=People,dc=example,dc=com");

        router.route_branch(&branch, 0);
        assert_eq!(router.tracked(), 0);
        assert_eq!(router.route_descendant(&child), None);
    }

    #[test]
    fn test_base_goes_to_every_set() {
        let mut router = Router::new(3, OutsideMode::Dedicated, false);
        assert_eq!(
            router.route_base(),
            Some(vec![SinkId::Set(0), SinkId::Set(1), SinkId::Set(2)])
        );
    }

    #[test]
    fn test_base_after_set_output_is_rejected() {
        let mut router = Router::new(3, OutsideMode::None, false);
        router.route_branch(&entry("uid=jdoe,ou=People,dc=example,dc=com"), 1);
        assert_eq!(router.route_base(), None);
    }

    #[test]
    fn test_duplicate_base_is_rejected() {
        let mut router = Router::new(3, OutsideMode::None, false);
        assert!(router.route_base().is_some());
        assert_eq!(router.route_base(), None);
    }

    #[test]
    fn test_outside_entries_do_not_block_a_following_base() {
        // Superiors of the base replicated to all sets precede it in a
        // well-ordered export and must not make it look late.
        let mut router = Router::new(2, OutsideMode::All, false);
        router.route_outside();
        assert!(router.route_base().is_some());
    }

    #[test]
    fn test_outside_sinks_follow_mode() {
        assert!(Router::new(2, OutsideMode::None, false).route_outside().is_empty());
        assert_eq!(
            Router::new(2, OutsideMode::Dedicated, false).route_outside(),
            vec![SinkId::Outside]
        );
        assert_eq!(
            Router::new(2, OutsideMode::All, false).route_outside(),
            vec![SinkId::Set(0), SinkId::Set(1)]
        );
        assert_eq!(
            Router::new(2, OutsideMode::DedicatedAndAll, false).route_outside(),
            vec![SinkId::Outside, SinkId::Set(0), SinkId::Set(1)]
        );
    }
}
