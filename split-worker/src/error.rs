use std::path::PathBuf;

use thiserror::Error;

use crate::summary::ResultCode;

/// Rejected configuration. Always fatal before any record is processed; no
/// output artifacts exist when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("set count must be at least 2, got {0}")]
    SetCount(usize),
    #[error("at least one source is required")]
    NoSources,
    #[error("thread count must be at least 1")]
    NoThreads,
    #[error("filter strategy requires exactly {expected} filters (set count - 1), got {actual}")]
    FilterArity { expected: usize, actual: usize },
    #[error("duplicate filter: {0}")]
    DuplicateFilter(String),
    #[error("multiple sources require an explicit target base path")]
    MissingTargetBase,
}

/// A fatal run error. Per-record problems (malformed records, orphans) are not
/// errors at this level; they are routed to the errors sink and reflected in
/// the summary's result code instead.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reading {path}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("writing {path}: {source}")]
    SinkIo {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("building worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl SplitError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            SplitError::Config(_) => ResultCode::ParamError,
            SplitError::SourceIo { .. } => ResultCode::DecodingError,
            SplitError::SinkIo { .. } | SplitError::Pool(_) => ResultCode::LocalError,
        }
    }
}
