//! The packaging pipeline.
//!
//! Takes a plaintext [`Epub`] and writes a protected copy: every resource not
//! already recorded in the manifest and not under the cleartext policy is
//! (optionally) deflated, encrypted with a single content key and stored
//! uncompressed, and a record for it is added to `META-INF/encryption.xml`.

use std::io::{self, Cursor, Read, Seek, Write};

use flate2::write::DeflateEncoder;
use tracing::{debug, info, warn};
use zip::CompressionMethod;

use crate::crypto::{ContentKey, Encrypter};
use crate::epub::{
    CleartextPolicy, Compression, ENCRYPTION_FILE, EncryptedData, Encryption, Epub, MIMETYPE_FILE,
    Resource, Writer,
};
use crate::error::{Error, Result};

/// Configuration for packaging.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Deflate level (0-9) for pre-encryption compression. Default 9.
    pub compression_level: u32,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
        }
    }
}

/// What happened to one resource during packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct PackedEntry {
    pub path: String,
    pub encrypted: bool,
    /// ZIP method code of the entry in the output container.
    pub storage_method: u16,
    pub original_size: u64,
    /// Length after pre-encryption deflate, when it was applied.
    pub compressed_size: Option<u64>,
}

/// Result of a successful packaging run.
#[derive(Debug)]
pub struct Packaged {
    /// The completed manifest, as written to the container.
    pub encryption: Encryption,
    /// Key that encrypted every protected resource.
    pub key: ContentKey,
    /// One entry per source resource, in container order.
    pub entries: Vec<PackedEntry>,
}

impl Packaged {
    pub fn encrypted(&self) -> impl Iterator<Item = &PackedEntry> {
        self.entries.iter().filter(|e| e.encrypted)
    }
}

/// Packages EPUBs with a given [`Encrypter`].
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use lcp_pack::{Aes256CbcEncrypter, Packager, read_epub};
///
/// let epub = read_epub("book.epub")?;
/// let packaged = Packager::new(Aes256CbcEncrypter::new())
///     .pack(epub, File::create("book.lcp.epub")?)?;
/// println!("{} resources encrypted", packaged.encryption.len());
/// # Ok::<(), lcp_pack::Error>(())
/// ```
pub struct Packager<E: Encrypter> {
    encrypter: E,
    config: PackConfig,
}

impl<E: Encrypter> Packager<E> {
    pub fn new(encrypter: E) -> Self {
        Self {
            encrypter,
            config: PackConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PackConfig) -> Self {
        self.config = config;
        self
    }

    /// Write a protected copy of `epub` to `dst`.
    ///
    /// Any failure aborts the run; whatever was written to `dst` by then is
    /// truncated and must be discarded.
    pub fn pack<W: Write + Seek>(&self, epub: Epub, dst: W) -> Result<Packaged> {
        let key = self.encrypter.generate_key()?;

        let mut w = Writer::new(dst);
        w.write_header()?;

        let Epub {
            resources,
            encryption,
            cleartext,
            ..
        } = epub;
        let policy = cleartext.finish();
        let mut encryption = encryption.unwrap_or_default();
        let mut entries = Vec::with_capacity(resources.len());

        for resource in resources {
            if resource.path == ENCRYPTION_FILE {
                warn!("ignoring stale {ENCRYPTION_FILE} resource; the manifest is rewritten");
                continue;
            }

            if skip(&resource, &encryption, &policy) {
                debug!(path = %resource.path, "copying unchanged");
                entries.push(PackedEntry {
                    path: resource.path.clone(),
                    encrypted: false,
                    storage_method: method_code(resource.storage_method),
                    original_size: resource.original_size,
                    compressed_size: None,
                });
                w.copy(resource)?;
                continue;
            }

            let compress = must_compress_before_encryption(resource.content_type.as_deref());
            let entry = self.encrypt_resource(&key, &mut encryption, resource, compress, &mut w)?;
            entries.push(entry);
        }

        w.write_encryption(&encryption)?;
        w.close()?;

        info!(
            resources = entries.len(),
            encrypted = encryption.len(),
            algorithm = self.encrypter.signature_uri(),
            "packaged container"
        );

        Ok(Packaged {
            encryption,
            key,
            entries,
        })
    }

    fn encrypt_resource<W: Write + Seek>(
        &self,
        key: &ContentKey,
        encryption: &mut Encryption,
        mut resource: Resource,
        compress: bool,
        w: &mut Writer<W>,
    ) -> Result<PackedEntry> {
        // Ciphertext does not compress; the entry itself is always stored.
        resource.storage_method = CompressionMethod::Stored;

        if compress {
            compress_contents(&mut resource, self.config.compression_level)?;
        }

        let Resource {
            path,
            original_size,
            compressed_size,
            storage_method,
            mut contents,
            ..
        } = resource;

        debug!(path = %path, compress, ?compressed_size, "encrypting");

        let mut entry = w.add_resource(&path, storage_method)?;
        self.encrypter
            .encrypt(key, &mut contents, &mut entry)
            .map_err(|source| Error::Encryption {
                path: path.clone(),
                source,
            })?;

        encryption.append(EncryptedData::with_content_key(
            self.encrypter.signature_uri(),
            path.as_str(),
            Compression {
                method: if compress {
                    Compression::DEFLATE
                } else {
                    Compression::STORED
                },
                original_length: original_size,
            },
        ))?;

        Ok(PackedEntry {
            path,
            encrypted: true,
            storage_method: method_code(storage_method),
            original_size,
            compressed_size,
        })
    }
}

/// Package `epub` into `dst` with the default configuration.
pub fn pack<E: Encrypter, W: Write + Seek>(encrypter: E, epub: Epub, dst: W) -> Result<Packaged> {
    Packager::new(encrypter).pack(epub, dst)
}

/// Whether a resource should be deflated before encryption.
///
/// Images, video and audio are already compressed; anything else, including
/// a resource with no content type, is compressed.
pub fn must_compress_before_encryption(content_type: Option<&str>) -> bool {
    match content_type {
        None | Some("") => true,
        Some(mime) => !["image", "video", "audio"]
            .iter()
            .any(|prefix| mime.starts_with(prefix)),
    }
}

/// `mimetype` belongs to the container header and is never encrypted.
fn skip(resource: &Resource, encryption: &Encryption, policy: &CleartextPolicy) -> bool {
    resource.path == MIMETYPE_FILE
        || encryption.data_for_file(&resource.path).is_some()
        || !policy.can_encrypt(&resource.path)
}

/// Replace the resource's stream with its deflated bytes and record their length.
fn compress_contents(resource: &mut Resource, level: u32) -> Result<()> {
    let contents = std::mem::replace(&mut resource.contents, Box::new(io::empty()));
    let deflated = deflate(contents, level).map_err(|source| Error::Compression {
        path: resource.path.clone(),
        source,
    })?;
    resource.compressed_size = Some(deflated.len() as u64);
    resource.contents = Box::new(Cursor::new(deflated));
    Ok(())
}

fn deflate(mut contents: impl Read, level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    io::copy(&mut contents, &mut encoder)?;
    encoder.finish()
}

fn method_code(method: CompressionMethod) -> u16 {
    match method {
        CompressionMethod::Stored => Compression::STORED,
        CompressionMethod::Deflated => Compression::DEFLATE,
        _ => 255, // Unknown
    }
}
