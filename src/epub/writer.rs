use std::io::{self, Seek, Write};

use tracing::trace;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{CONTENT_TYPE_EPUB, ENCRYPTION_FILE, Encryption, MIMETYPE_FILE, Resource};
use crate::error::{Error, Result};

/// Sequential writer for an EPUB container.
///
/// Entries appear in the output in call order. [`Writer::write_header`] must
/// be called once before anything else so that `mimetype` is the first entry,
/// and [`Writer::close`] must be called to produce a readable archive.
///
/// # Example
///
/// ```
/// use std::io::{Cursor, Write};
/// use lcp_pack::epub::{CompressionMethod, Writer};
///
/// let mut w = Writer::new(Cursor::new(Vec::new()));
/// w.write_header()?;
/// w.add_resource("OEBPS/chap1.xhtml", CompressionMethod::Deflated)?
///     .write_all(b"<html/>")?;
/// let bytes = w.close()?.into_inner();
/// assert!(!bytes.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Writer<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(dst: W) -> Self {
        Self {
            zip: ZipWriter::new(dst),
        }
    }

    /// Write the `mimetype` entry, uncompressed.
    pub fn write_header(&mut self) -> Result<()> {
        self.add_resource(MIMETYPE_FILE, CompressionMethod::Stored)?
            .write_all(CONTENT_TYPE_EPUB.as_bytes())
            .map_err(|source| Error::ContainerWrite {
                path: MIMETYPE_FILE.to_string(),
                source,
            })
    }

    /// Open a new entry. The entry is finalized when the next entry is opened
    /// or the container is closed.
    pub fn add_resource(
        &mut self,
        path: &str,
        method: CompressionMethod,
    ) -> Result<EntryWriter<'_, W>> {
        let options = SimpleFileOptions::default().compression_method(method);
        self.zip
            .start_file(path, options)
            .map_err(|e| Error::ContainerWrite {
                path: path.to_string(),
                source: io::Error::from(e),
            })?;
        trace!(path, ?method, "opened container entry");
        Ok(EntryWriter { zip: &mut self.zip })
    }

    /// Copy a resource unchanged at its own storage method.
    ///
    /// `mimetype` is skipped: [`Writer::write_header`] already wrote it.
    pub fn copy(&mut self, resource: Resource) -> Result<()> {
        if resource.path == MIMETYPE_FILE {
            trace!("mimetype already written by header");
            return Ok(());
        }

        let Resource {
            path,
            storage_method,
            mut contents,
            ..
        } = resource;

        let mut entry = self.add_resource(&path, storage_method)?;
        io::copy(&mut contents, &mut entry)
            .map_err(|source| Error::ContainerWrite { path, source })?;
        Ok(())
    }

    /// Write the encryption manifest as `META-INF/encryption.xml`.
    pub fn write_encryption(&mut self, encryption: &Encryption) -> Result<()> {
        let xml = encryption.to_xml()?;
        self.add_resource(ENCRYPTION_FILE, CompressionMethod::Deflated)?
            .write_all(&xml)
            .map_err(|source| Error::ContainerWrite {
                path: ENCRYPTION_FILE.to_string(),
                source,
            })
    }

    /// Finalize the central directory and hand back the destination.
    pub fn close(self) -> Result<W> {
        let close_error = |source| Error::ContainerWrite {
            path: "<central directory>".to_string(),
            source,
        };
        let mut dst = self
            .zip
            .finish()
            .map_err(|e| close_error(io::Error::from(e)))?;
        dst.flush().map_err(close_error)?;
        Ok(dst)
    }
}

/// Write sink for the entry opened by [`Writer::add_resource`].
pub struct EntryWriter<'a, W: Write + Seek> {
    zip: &'a mut ZipWriter<W>,
}

impl<W: Write + Seek> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.zip.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}
