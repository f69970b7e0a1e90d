use std::io::{Read, Write};

use anyhow::Error;

/// An opaque byte-stream transform, applied below compression on both sides of
/// the engine. Passphrase encryption plugs in here; the engine never looks at
/// the transformed bytes.
pub trait StreamTransform: Send + Sync {
    fn wrap_read(&self, inner: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>, Error>;
    fn wrap_write(&self, inner: Box<dyn Write + Send>) -> Result<Box<dyn Write + Send>, Error>;
}
