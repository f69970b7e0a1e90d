use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use common_ldif::{RawRecord, RecordReader};
use flate2::read::GzDecoder;
use tracing::debug;

use crate::config::SourceSpec;
use crate::error::SplitError;

/// One record as read, before parsing. The source ordinal is carried for
/// diagnostics only; records flow downstream in strict input order.
pub struct ReadRecord {
    pub source_index: usize,
    pub record: RawRecord,
}

struct OpenSource {
    path: PathBuf,
    reader: RecordReader<BufReader<Box<dyn Read + Send>>>,
}

/// Reads an ordered list of sources as one logically concatenated record
/// stream. Sources open lazily, one at a time. Record-content problems are not
/// errors here; only I/O and irrecoverable decode failures are fatal.
pub struct EntrySource {
    specs: Vec<SourceSpec>,
    next_spec: usize,
    current: Option<OpenSource>,
}

impl EntrySource {
    pub fn new(specs: Vec<SourceSpec>) -> Self {
        Self {
            specs,
            next_spec: 0,
            current: None,
        }
    }

    fn open_next(&mut self) -> Result<bool, SplitError> {
        let Some(spec) = self.specs.get(self.next_spec) else {
            return Ok(false);
        };
        debug!("opening source {}", spec.path.display());
        let source_io = |e: anyhow::Error| SplitError::SourceIo {
            path: spec.path.clone(),
            source: e,
        };

        let file = File::open(&spec.path).map_err(|e| source_io(e.into()))?;
        let mut inner: Box<dyn Read + Send> = Box::new(file);
        if let Some(transform) = &spec.transform {
            inner = transform.wrap_read(inner).map_err(source_io)?;
        }
        if spec.gzipped {
            inner = Box::new(GzDecoder::new(inner));
        }
        self.current = Some(OpenSource {
            path: spec.path.clone(),
            reader: RecordReader::new(BufReader::new(inner)),
        });
        self.next_spec += 1;
        Ok(true)
    }

    /// The next record in input order, across source boundaries.
    pub fn next_record(&mut self) -> Result<Option<ReadRecord>, SplitError> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(None);
            }
            let open = self.current.as_mut().unwrap();
            match open.reader.next_record() {
                Ok(Some(record)) => {
                    return Ok(Some(ReadRecord {
                        source_index: self.next_spec - 1,
                        record,
                    }))
                }
                Ok(None) => {
                    self.current = None;
                    continue;
                }
                Err(e) => {
                    return Err(SplitError::SourceIo {
                        path: open.path.clone(),
                        source: e.into(),
                    })
                }
            }
        }
    }

    /// Up to `max` records; an empty batch means end of input.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<ReadRecord>, SplitError> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.next_record()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        Ok(batch)
    }
}
