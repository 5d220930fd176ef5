//! Error types for packaging operations.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading, packaging or writing a container.
///
/// Packaging is all-or-nothing: any of these aborts the whole operation and
/// the partially written destination must be discarded by the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("content key generation failed: {0}")]
    KeyGeneration(String),

    #[error("compression failed for {path}: {source}")]
    Compression {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("encryption failed for {path}: {source}")]
    Encryption {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write container entry {path}: {source}")]
    ContainerWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize encryption manifest: {0}")]
    ManifestSerialization(String),

    #[error("encryption manifest already holds a record for {0}")]
    DuplicateRecord(String),

    #[error("Invalid encryption manifest: {0}")]
    InvalidManifest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
