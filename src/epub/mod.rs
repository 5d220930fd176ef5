//! In-memory model of an EPUB container.
//!
//! An [`Epub`] owns its [`Resource`]s in container order. Each resource
//! carries a single-use content stream: the stream moves out of the resource
//! when it is copied or encrypted, so it cannot be read twice.

mod cleartext;
mod cover;
mod encryption;
mod package;
mod reader;
mod writer;

use std::fmt;
use std::io::{Read, Seek, Write};

pub use zip::CompressionMethod;

pub use cleartext::{CleartextPolicy, CleartextResources};
pub use cover::find_cover;
pub use encryption::{
    CONTENT_KEY_RETRIEVAL_URI, Compression, ENCRYPTED_CONTENT_KEY_TYPE, EncryptedData, Encryption,
    KeyInfo, RetrievalMethod,
};
pub use package::{
    CONTENT_TYPE_NCX, ManifestItem, Meta, Package, parse_container_xml, parse_opf, resolve_path,
};
pub use reader::{read_epub, read_epub_from_reader};
pub use writer::{EntryWriter, Writer};

use crate::error::Result;

/// Path of the mandatory first entry.
pub const MIMETYPE_FILE: &str = "mimetype";
/// Content of the `mimetype` entry.
pub const CONTENT_TYPE_EPUB: &str = "application/epub+zip";
pub const CONTAINER_FILE: &str = "META-INF/container.xml";
pub const ENCRYPTION_FILE: &str = "META-INF/encryption.xml";
pub const META_INF_DIR: &str = "META-INF/";

/// A single-use byte stream.
pub type Contents = Box<dyn Read + Send>;

/// A named container entry.
pub struct Resource {
    /// Path inside the container; unique within an [`Epub`].
    pub path: String,
    /// Uncompressed length of the content.
    pub original_size: u64,
    /// Length after pre-encryption compression, when compression happened.
    pub compressed_size: Option<u64>,
    /// Compression method for this entry in the output container.
    pub storage_method: CompressionMethod,
    pub content_type: Option<String>,
    pub(crate) contents: Contents,
}

impl Resource {
    pub fn new(path: impl Into<String>, contents: impl Read + Send + 'static, size: u64) -> Self {
        Self {
            path: path.into(),
            original_size: size,
            compressed_size: None,
            storage_method: CompressionMethod::Deflated,
            content_type: None,
            contents: Box::new(contents),
        }
    }

    /// In-memory resource; the size is taken from `data`.
    pub fn from_bytes(path: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self::new(path, std::io::Cursor::new(data), size)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_storage_method(mut self, method: CompressionMethod) -> Self {
        self.storage_method = method;
        self
    }

    /// Consume the resource and take its content stream.
    pub fn into_contents(self) -> Contents {
        self.contents
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("original_size", &self.original_size)
            .field("compressed_size", &self.compressed_size)
            .field("storage_method", &self.storage_method)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// An EPUB container: resources, package metadata, encryption manifest and
/// the set of resources that must stay in cleartext.
#[derive(Debug, Default)]
pub struct Epub {
    pub resources: Vec<Resource>,
    pub packages: Vec<Package>,
    /// `None` until packaging starts or an existing manifest is loaded.
    pub encryption: Option<Encryption>,
    pub cleartext: CleartextResources,
}

impl Epub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource stored with deflate.
    pub fn add(&mut self, name: impl Into<String>, body: impl Read + Send + 'static, size: u64) {
        self.resources.push(Resource::new(name, body, size));
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn find_resource(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }

    pub fn mark_cleartext(&mut self, path: impl Into<String>) {
        self.cleartext.mark(path);
    }

    pub fn mark_cleartext_all<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleartext.mark_all(paths);
    }

    /// Snapshot of the cleartext set, sorted for lookups.
    pub fn cleartext_policy(&self) -> CleartextPolicy {
        self.cleartext.clone().finish()
    }

    /// The cover image resource, if the package metadata names one.
    pub fn cover(&self) -> Option<&Resource> {
        find_cover(&self.packages, &self.resources)
    }

    /// Serialize the whole container: `mimetype` first, then every other
    /// resource at its storage method, then the encryption manifest if any.
    pub fn write<W: Write + Seek>(self, dst: W) -> Result<W> {
        let mut w = Writer::new(dst);
        w.write_header()?;

        for resource in self.resources {
            if resource.path == ENCRYPTION_FILE && self.encryption.is_some() {
                continue;
            }
            w.copy(resource)?;
        }

        if let Some(encryption) = &self.encryption {
            w.write_encryption(encryption)?;
        }

        w.close()
    }
}
