//! # lcp-pack
//!
//! Packaging core for protected EPUB publications.
//!
//! Given a plaintext EPUB and a content cipher, produces a new EPUB in which
//! protected resources are replaced by ciphertext and described by a
//! `META-INF/encryption.xml` manifest. Each manifest record points at the
//! content key through `license.lcpl#/encryption/content_key`; the license
//! that carries that key is issued elsewhere.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::fs::File;
//! use lcp_pack::{Aes256CbcEncrypter, pack, read_epub};
//!
//! let epub = read_epub("book.epub")?;
//! let packaged = pack(Aes256CbcEncrypter::new(), epub, File::create("book.lcp.epub")?)?;
//!
//! // Hand these to the license authority.
//! let _key = &packaged.key;
//! let _manifest = &packaged.encryption;
//! # Ok::<(), lcp_pack::Error>(())
//! ```
//!
//! ## Building a container by hand
//!
//! ```
//! use std::io::Cursor;
//! use lcp_pack::epub::{Epub, Resource};
//! use lcp_pack::{Aes256CbcEncrypter, pack};
//!
//! let mut epub = Epub::new();
//! epub.add_resource(Resource::from_bytes("mimetype", b"application/epub+zip".to_vec()));
//! epub.add_resource(
//!     Resource::from_bytes("OEBPS/chap1.xhtml", b"<html/>".to_vec())
//!         .with_content_type("application/xhtml+xml"),
//! );
//! epub.mark_cleartext("mimetype");
//!
//! let packaged = pack(Aes256CbcEncrypter::new(), epub, Cursor::new(Vec::new()))?;
//! assert_eq!(packaged.encryption.len(), 1);
//! # Ok::<(), lcp_pack::Error>(())
//! ```

pub mod crypto;
pub mod epub;
pub mod error;
pub mod pack;

pub use crypto::{Aes256CbcEncrypter, ContentKey, Encrypter};
pub use epub::{Epub, Resource, read_epub, read_epub_from_reader};
pub use error::{Error, Result};
pub use pack::{PackConfig, PackedEntry, Packaged, Packager, pack};
