use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::sink::SinkId;

/// Final status of a run, numbered like LDAP result codes so the binary can
/// surface them directly as exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success = 0,
    LocalError = 82,
    DecodingError = 84,
    ParamError = 89,
}

impl ResultCode {
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Per-run accounting. A run that completes is summarized here even when some
/// of its records were malformed or orphaned; those make the final status
/// `LocalError` without having stopped processing.
#[derive(Debug, Default)]
pub struct SplitSummary {
    pub records_read: u64,
    pub parse_errors: u64,
    pub orphan_errors: u64,
    pub late_base_errors: u64,
    pub entries_written: BTreeMap<SinkId, u64>,
    pub errors_path: Option<PathBuf>,
}

impl SplitSummary {
    pub fn result_code(&self) -> ResultCode {
        if self.parse_errors > 0 || self.orphan_errors > 0 || self.late_base_errors > 0 {
            ResultCode::LocalError
        } else {
            ResultCode::Success
        }
    }

    pub fn written_to(&self, id: SinkId) -> u64 {
        self.entries_written.get(&id).copied().unwrap_or(0)
    }

    pub fn total_written(&self) -> u64 {
        self.entries_written.values().sum()
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Records read: {}", self.records_read);
        for (id, count) in &self.entries_written {
            let _ = writeln!(out, "Entries written to {id}: {count}");
        }
        let _ = writeln!(out, "Malformed records: {}", self.parse_errors);
        let _ = writeln!(out, "Orphaned entries: {}", self.orphan_errors);
        if self.late_base_errors > 0 {
            let _ = writeln!(out, "Out-of-order base entries: {}", self.late_base_errors);
        }
        if let Some(path) = &self.errors_path {
            let _ = writeln!(out, "Rejected records were written to {}", path.display());
        }
        let _ = write!(out, "Result: {:?}", self.result_code());
        out
    }
}
