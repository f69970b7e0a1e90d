use std::hash::Hasher;
use std::sync::Arc;

use common_ldif::{Entry, ValueNormalizer};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use tracing::debug;

use crate::filter::{EntryFilter, SimpleFilter};

/// Strategy selection and parameters, as handed over by the external argument
/// parser (typically as JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Hash of the entry's normalized leaf RDN. The universal fallback.
    RdnHash,
    /// Hash of a configured attribute's value(s); falls back to the RDN hash
    /// per entry when the attribute is absent.
    AttributeHash {
        attribute: String,
        #[serde(default)]
        all_values: bool,
    },
    /// Assign each branch entry to the currently least-loaded set.
    FewestEntries,
    /// First matching filter wins; filter i maps to set i.
    Filter { filters: Vec<String> },
}

/// What the parallel stage decided for one branch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Assigned to this set index.
    Index(usize),
    /// Needs the shared counters; resolved by the serial commit stage.
    Deferred,
}

struct FilterSlot {
    raw: String,
    compiled: Option<SimpleFilter>,
}

enum AssignerKind {
    RdnHash,
    AttributeHash { attribute: String, all_values: bool },
    FewestEntries,
    Filter { slots: Vec<FilterSlot> },
}

/// The closed set of assignment strategies. `decide` is pure for every variant
/// (FewestEntries defers, so its shared counters stay out of the parallel
/// stage) and deterministic for a fixed configuration on the hash paths.
pub struct Assigner {
    set_count: usize,
    normalizer: Arc<dyn ValueNormalizer>,
    kind: AssignerKind,
}

impl Assigner {
    pub fn new(
        config: &StrategyConfig,
        set_count: usize,
        normalizer: Arc<dyn ValueNormalizer>,
    ) -> Self {
        let kind = match config {
            StrategyConfig::RdnHash => AssignerKind::RdnHash,
            StrategyConfig::AttributeHash {
                attribute,
                all_values,
            } => AssignerKind::AttributeHash {
                attribute: attribute.clone(),
                all_values: *all_values,
            },
            StrategyConfig::FewestEntries => AssignerKind::FewestEntries,
            StrategyConfig::Filter { filters } => AssignerKind::Filter {
                slots: filters
                    .iter()
                    .map(|raw| {
                        let compiled = match SimpleFilter::parse(raw) {
                            Ok(f) => Some(f),
                            Err(e) => {
                                debug!("filter '{raw}' not evaluable, entries it would cover fall back to RDN hashing: {e}");
                                None
                            }
                        };
                        FilterSlot {
                            raw: raw.clone(),
                            compiled,
                        }
                    })
                    .collect(),
            },
        };
        Self {
            set_count,
            normalizer,
            kind,
        }
    }

    pub fn decide(&self, entry: &Entry) -> Decision {
        match &self.kind {
            AssignerKind::RdnHash => Decision::Index(self.rdn_index(entry)),
            AssignerKind::AttributeHash {
                attribute,
                all_values,
            } => Decision::Index(self.attribute_index(entry, attribute, *all_values)),
            AssignerKind::FewestEntries => Decision::Deferred,
            AssignerKind::Filter { slots } => Decision::Index(self.filter_index(entry, slots)),
        }
    }

    /// Hash of the normalized leaf RDN, mod the set count.
    pub fn rdn_index(&self, entry: &Entry) -> usize {
        self.index_of(entry.dn().rdn().as_bytes())
    }

    fn attribute_index(&self, entry: &Entry, attribute: &str, all_values: bool) -> usize {
        let values = entry.values(attribute);
        if values.is_empty() {
            return self.rdn_index(entry);
        }

        let mut hasher = SipHasher13::new();
        if all_values {
            for value in values {
                hasher.write(self.normalizer.normalize(attribute, value).as_bytes());
            }
        } else {
            hasher.write(self.normalizer.normalize(attribute, values[0]).as_bytes());
        }
        (hasher.finish() % self.set_count as u64) as usize
    }

    // First matching filter wins its set. Entries no filter matches fall
    // back to the RDN hash rather than pooling in the last set, so a filter
    // list that never matches degenerates to plain RDN hashing.
    fn filter_index(&self, entry: &Entry, slots: &[FilterSlot]) -> usize {
        for (i, slot) in slots.iter().enumerate() {
            let Some(filter) = &slot.compiled else {
                // Cannot know whether this entry would have matched; resolve
                // the entry by hashing instead of guessing.
                return self.rdn_index(entry);
            };
            match filter.matches(entry) {
                Ok(true) => return i,
                Ok(false) => continue,
                Err(e) => {
                    debug!("filter '{}' failed for {}: {e}", slot.raw, entry.dn());
                    return self.rdn_index(entry);
                }
            }
        }
        // No filter matched; hash-distribute rather than erroring out.
        self.rdn_index(entry)
    }

    fn index_of(&self, bytes: &[u8]) -> usize {
        let mut hasher = SipHasher13::new();
        hasher.write(bytes);
        (hasher.finish() % self.set_count as u64) as usize
    }
}

/// Running per-set counts for the fewest-entries strategy. Owned by the serial
/// commit stage; sized to the set count, not the entry count.
#[derive(Debug)]
pub struct FewestEntriesCounters {
    counts: Vec<u64>,
}

impl FewestEntriesCounters {
    pub fn new(set_count: usize) -> Self {
        Self {
            counts: vec![0; set_count],
        }
    }

    /// Assign to the least-loaded set at decision time, ties to the lowest
    /// index, and account for the new entry.
    pub fn assign(&mut self) -> usize {
        let index = self
            .counts
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| **c)
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.counts[index] += 1;
        index
    }
}
