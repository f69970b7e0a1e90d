use std::path::Path;
use std::sync::Arc;

use common_ldif::{CaseIgnoreNormalizer, Dn, Entry, RecordParseError};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::classify::{classify, Placement};
use crate::config::SplitConfig;
use crate::error::SplitError;
use crate::route::Router;
use crate::sink::{SinkId, SinkSet};
use crate::source::{EntrySource, ReadRecord};
use crate::strategy::{Assigner, Decision, FewestEntriesCounters};
use crate::summary::SplitSummary;

const BATCH_SIZE: usize = 1024;

/// Output of the parallel stage for one record. Everything that touches shared
/// state (counters, ancestry, sinks) is left to the serial commit stage.
enum Prepared {
    Malformed(RecordParseError),
    Entry {
        entry: Entry,
        placement: Placement,
        decision: Option<Decision>,
    },
}

fn prepare(read: &ReadRecord, split_base: &Dn, assigner: &Assigner) -> Prepared {
    match read.record.parse() {
        Err(e) => Prepared::Malformed(e),
        Ok(entry) => {
            let placement = classify(entry.dn(), split_base);
            let decision = (placement == Placement::Branch).then(|| assigner.decide(&entry));
            Prepared::Entry {
                entry,
                placement,
                decision,
            }
        }
    }
}

fn commit(
    read: &ReadRecord,
    prepared: Prepared,
    router: &mut Router,
    counters: &mut FewestEntriesCounters,
    sinks: &mut SinkSet,
    summary: &mut SplitSummary,
) -> Result<(), SplitError> {
    match prepared {
        Prepared::Malformed(e) => {
            warn!("malformed record (source {}): {e}", read.source_index);
            sinks.write_raw(SinkId::Errors, &read.record)?;
            summary.parse_errors += 1;
        }
        Prepared::Entry {
            entry,
            placement,
            decision,
        } => match placement {
            Placement::Base => match router.route_base() {
                Some(ids) => {
                    for id in ids {
                        sinks.write_entry(id, &entry)?;
                    }
                }
                None => {
                    warn!(
                        "split-base entry {} arrived after entries below it",
                        entry.dn()
                    );
                    sinks.write_raw(SinkId::Errors, &read.record)?;
                    summary.late_base_errors += 1;
                }
            },
            Placement::Branch => {
                let index = match decision {
                    Some(Decision::Index(i)) => i,
                    _ => counters.assign(),
                };
                let id = router.route_branch(&entry, index);
                sinks.write_entry(id, &entry)?;
            }
            Placement::Descendant => match router.route_descendant(&entry) {
                Some(id) => sinks.write_entry(id, &entry)?,
                None => {
                    warn!("orphaned entry {}", entry.dn());
                    sinks.write_raw(SinkId::Errors, &read.record)?;
                    summary.orphan_errors += 1;
                }
            },
            Placement::Outside => {
                for id in router.route_outside() {
                    sinks.write_entry(id, &entry)?;
                }
            }
        },
    }
    Ok(())
}

// Capped to available parallelism, which respects container CPU limits.
fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool, SplitError> {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = if num_threads > available {
        warn!("requested {num_threads} threads but only {available} available, capping");
        available
    } else {
        num_threads
    };
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()?)
}

/// Runs one split end to end: read batches in input order, classify and
/// hash-assign in parallel, then commit serially so per-sink append order
/// stays a subsequence of input order. Returns the summary even when records
/// were rejected; only configuration and I/O problems are `Err`.
pub fn run_split(config: &SplitConfig) -> Result<SplitSummary, SplitError> {
    config.validate()?;
    let base_path = config.target_base()?.to_path_buf();

    let assigner = Assigner::new(
        &config.strategy,
        config.set_count,
        Arc::new(CaseIgnoreNormalizer),
    );
    let pool = build_pool(config.num_threads)?;
    let mut source = EntrySource::new(config.sources.clone());
    let mut sinks = SinkSet::new(&base_path, config.target.gzip, config.target.transform.clone());
    let mut router = Router::new(config.set_count, config.outside, config.assume_flat_dit);
    let mut counters = FewestEntriesCounters::new(config.set_count);
    let mut summary = SplitSummary::default();

    info!(
        "splitting below {} into {} sets",
        config.split_base, config.set_count
    );

    loop {
        let batch = source.next_batch(BATCH_SIZE)?;
        if batch.is_empty() {
            break;
        }
        summary.records_read += batch.len() as u64;

        let split_base = &config.split_base;
        let assigner = &assigner;
        let prepared: Vec<Prepared> = pool.install(|| {
            batch
                .par_iter()
                .map(|read| prepare(read, split_base, assigner))
                .collect()
        });

        for (read, prep) in batch.iter().zip(prepared) {
            commit(read, prep, &mut router, &mut counters, &mut sinks, &mut summary)?;
        }
    }

    summary.errors_path = sinks.path_of(SinkId::Errors).map(Path::to_path_buf);
    summary.entries_written = sinks.finish()?;

    info!(
        "split finished: {} records read, {} written, {} malformed, {} orphaned",
        summary.records_read,
        summary.total_written(),
        summary.parse_errors,
        summary.orphan_errors
    );
    Ok(summary)
}
