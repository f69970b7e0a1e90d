use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common_ldif::{write_entry, write_raw, Entry, RawRecord};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::SplitError;
use crate::transform::StreamTransform;

/// One output destination: a numbered partition, the dedicated sink for
/// entries outside the split base, or the sink for rejected records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SinkId {
    Set(usize),
    Outside,
    Errors,
}

impl SinkId {
    fn suffix(&self) -> String {
        match self {
            SinkId::Set(i) => format!("set{}", i + 1),
            SinkId::Outside => "outside-split".to_string(),
            SinkId::Errors => "errors".to_string(),
        }
    }

    /// `<base>.set<i>`, `<base>.outside-split`, `<base>.errors`.
    pub fn path(&self, base: &Path) -> PathBuf {
        let mut s: OsString = base.as_os_str().to_owned();
        s.push(format!(".{}", self.suffix()));
        PathBuf::from(s)
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.suffix())
    }
}

enum SinkStream {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gzip(GzEncoder<BufWriter<Box<dyn Write + Send>>>),
}

impl Write for SinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SinkStream::Plain(w) => w.write(buf),
            SinkStream::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SinkStream::Plain(w) => w.flush(),
            SinkStream::Gzip(w) => w.flush(),
        }
    }
}

impl SinkStream {
    fn finish(self) -> io::Result<()> {
        match self {
            SinkStream::Plain(mut w) => w.flush(),
            SinkStream::Gzip(gz) => gz.finish()?.flush(),
        }
    }
}

struct OpenSink {
    path: PathBuf,
    stream: SinkStream,
    count: u64,
}

/// Append-only writer set. Sinks open lazily on first record so a run never
/// leaves empty output artifacts behind; compression and the optional
/// encryption transform apply uniformly to every sink.
pub struct SinkSet {
    base: PathBuf,
    gzip: bool,
    transform: Option<Arc<dyn StreamTransform>>,
    sinks: BTreeMap<SinkId, OpenSink>,
}

impl SinkSet {
    pub fn new(
        base: impl Into<PathBuf>,
        gzip: bool,
        transform: Option<Arc<dyn StreamTransform>>,
    ) -> Self {
        Self {
            base: base.into(),
            gzip,
            transform,
            sinks: BTreeMap::new(),
        }
    }

    fn sink_io(path: &Path, e: impl Into<anyhow::Error>) -> SplitError {
        SplitError::SinkIo {
            path: path.to_path_buf(),
            source: e.into(),
        }
    }

    fn open(&mut self, id: SinkId) -> Result<&mut OpenSink, SplitError> {
        if !self.sinks.contains_key(&id) {
            let path = id.path(&self.base);
            debug!("opening sink {id} at {}", path.display());
            let file = File::create(&path).map_err(|e| Self::sink_io(&path, e))?;
            let mut inner: Box<dyn Write + Send> = Box::new(file);
            if let Some(transform) = &self.transform {
                inner = transform
                    .wrap_write(inner)
                    .map_err(|e| Self::sink_io(&path, e))?;
            }
            let buffered = BufWriter::new(inner);
            let stream = if self.gzip {
                SinkStream::Gzip(GzEncoder::new(buffered, Compression::default()))
            } else {
                SinkStream::Plain(buffered)
            };
            self.sinks.insert(
                id,
                OpenSink {
                    path,
                    stream,
                    count: 0,
                },
            );
        }
        Ok(self.sinks.get_mut(&id).unwrap())
    }

    pub fn write_entry(&mut self, id: SinkId, entry: &Entry) -> Result<(), SplitError> {
        let sink = self.open(id)?;
        write_entry(&mut sink.stream, entry).map_err(|e| Self::sink_io(&sink.path, e))?;
        sink.count += 1;
        Ok(())
    }

    pub fn write_raw(&mut self, id: SinkId, record: &RawRecord) -> Result<(), SplitError> {
        let sink = self.open(id)?;
        write_raw(&mut sink.stream, record).map_err(|e| Self::sink_io(&sink.path, e))?;
        sink.count += 1;
        Ok(())
    }

    /// The path of a sink, if it has received at least one record.
    pub fn path_of(&self, id: SinkId) -> Option<&Path> {
        self.sinks.get(&id).map(|s| s.path.as_path())
    }

    /// Flushes and finalizes every open sink, returning per-sink counts.
    pub fn finish(self) -> Result<BTreeMap<SinkId, u64>, SplitError> {
        let mut counts = BTreeMap::new();
        for (id, sink) in self.sinks {
            sink.stream
                .finish()
                .map_err(|e| Self::sink_io(&sink.path, e))?;
            counts.insert(id, sink.count);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_ldif::{Dn, Entry, RecordReader};
    use flate2::read::GzDecoder;
    use std::io::{BufReader, Read};
    use tempfile::TempDir;

    fn entry(dn: &str) -> Entry {
        Entry::new(Dn::parse(dn).unwrap(), vec![])
    }

    #[test]
    fn test_sinks_open_lazily() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out");
        let mut sinks = SinkSet::new(&base, false, None);

        sinks.write_entry(SinkId::Set(0), &entry("dc=example,dc=com")).unwrap();
        assert!(sinks.path_of(SinkId::Set(0)).is_some());
        assert!(sinks.path_of(SinkId::Set(1)).is_none());
        assert!(sinks.path_of(SinkId::Errors).is_none());

        let counts = sinks.finish().unwrap();
        assert_eq!(counts.get(&SinkId::Set(0)), Some(&1));
        assert!(dir.path().join("out.set1").exists());
        assert!(!dir.path().join("out.set2").exists());
        assert!(!dir.path().join("out.errors").exists());
    }

    #[test]
    fn test_sink_paths() {
        let base = Path::new("/tmp/export.ldif");
        assert_eq!(
            SinkId::Set(0).path(base),
            PathBuf::from("/tmp/export.ldif.set1")
        );
        assert_eq!(
            SinkId::Outside.path(base),
            PathBuf::from("/tmp/export.ldif.outside-split")
        );
        assert_eq!(
            SinkId::Errors.path(base),
            PathBuf::from("/tmp/export.ldif.errors")
        );
    }

    #[test]
    fn test_gzip_sink_round_trips() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out");
        let mut sinks = SinkSet::new(&base, true, None);
        sinks
            .write_entry(SinkId::Set(1), &entry("uid=a,dc=example,dc=com"))
            .unwrap();
        sinks.finish().unwrap();

        let file = File::open(dir.path().join("out.set2")).unwrap();
        let mut reader = RecordReader::new(BufReader::new(GzDecoder::new(file)));
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.lines[0], "dn: uid=a,dc=example,dc=com");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_transform_applies_below_compression() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("out");
        let transform: Arc<dyn StreamTransform> =
            Arc::new(crate::transform::testing::XorTransform(0x5a));
        let mut sinks = SinkSet::new(&base, false, Some(transform.clone()));
        sinks
            .write_entry(SinkId::Outside, &entry("dc=other,dc=net"))
            .unwrap();
        sinks.finish().unwrap();

        let raw = std::fs::read(dir.path().join("out.outside-split")).unwrap();
        assert!(!raw.starts_with(b"dn:"));

        let file = File::open(dir.path().join("out.outside-split")).unwrap();
        let unwrapped = transform.wrap_read(Box::new(file)).unwrap();
        let mut text = String::new();
        let mut reader = BufReader::new(unwrapped);
        reader.read_to_string(&mut text).unwrap();
        assert!(text.starts_with("dn: dc=other,dc=net"));
    }
}
