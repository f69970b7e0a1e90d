use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common_ldif::{normalize_value, Dn};

use crate::error::ConfigError;
use crate::strategy::StrategyConfig;
use crate::transform::StreamTransform;

/// What happens to entries that are neither the split base nor below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutsideMode {
    /// Dropped.
    None,
    /// Written once to the dedicated outside-split sink.
    Dedicated,
    /// Written to every partition sink.
    All,
    /// Both of the above.
    DedicatedAndAll,
}

impl OutsideMode {
    pub fn from_flags(to_dedicated: bool, to_all: bool) -> Self {
        match (to_dedicated, to_all) {
            (false, false) => OutsideMode::None,
            (true, false) => OutsideMode::Dedicated,
            (false, true) => OutsideMode::All,
            (true, true) => OutsideMode::DedicatedAndAll,
        }
    }

    pub fn to_dedicated(self) -> bool {
        matches!(self, OutsideMode::Dedicated | OutsideMode::DedicatedAndAll)
    }

    pub fn to_all(self) -> bool {
        matches!(self, OutsideMode::All | OutsideMode::DedicatedAndAll)
    }
}

/// One input stream: a file, optionally gzip-compressed, optionally wrapped in
/// an opaque decryption transform (applied before gunzip).
#[derive(Clone)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub gzipped: bool,
    pub transform: Option<Arc<dyn StreamTransform>>,
}

impl SourceSpec {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gzipped: false,
            transform: None,
        }
    }
}

/// Where and how output sinks are written. `base_path: None` is only valid for
/// single-source runs, which default to the source path.
#[derive(Clone)]
pub struct TargetSpec {
    pub base_path: Option<PathBuf>,
    pub gzip: bool,
    pub transform: Option<Arc<dyn StreamTransform>>,
}

impl TargetSpec {
    pub fn plain(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: Some(base_path.into()),
            gzip: false,
            transform: None,
        }
    }
}

/// Full configuration for one split run, produced by an external argument
/// parser and consumed here as-is.
#[derive(Clone)]
pub struct SplitConfig {
    pub split_base: Dn,
    pub set_count: usize,
    pub strategy: StrategyConfig,
    pub outside: OutsideMode,
    pub assume_flat_dit: bool,
    pub num_threads: usize,
    pub sources: Vec<SourceSpec>,
    pub target: TargetSpec,
}

impl SplitConfig {
    /// The base path output artifact names derive from. Multiple sources with
    /// no explicit target base are rejected rather than guessed at.
    pub fn target_base(&self) -> Result<&Path, ConfigError> {
        if let Some(base) = &self.target.base_path {
            return Ok(base);
        }
        match self.sources.as_slice() {
            [only] => Ok(&only.path),
            _ => Err(ConfigError::MissingTargetBase),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.set_count < 2 {
            return Err(ConfigError::SetCount(self.set_count));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.num_threads < 1 {
            return Err(ConfigError::NoThreads);
        }
        self.target_base()?;

        if let StrategyConfig::Filter { filters } = &self.strategy {
            let expected = self.set_count - 1;
            if filters.len() != expected {
                return Err(ConfigError::FilterArity {
                    expected,
                    actual: filters.len(),
                });
            }
            let mut seen = HashSet::new();
            for filter in filters {
                if !seen.insert(normalize_value(filter)) {
                    return Err(ConfigError::DuplicateFilter(filter.clone()));
                }
            }
        }

        Ok(())
    }
}
