//! The cryptographic capability used by the packaging pipeline.
//!
//! The pipeline only needs three things from a cipher: a fresh content key,
//! the URI identifying the algorithm, and a streaming encryption routine.
//! [`Aes256CbcEncrypter`] is the implementation used for LCP content.

mod aes_cbc;

use std::fmt;
use std::io::{self, Read, Write};

pub use aes_cbc::{AES256_CBC_URI, Aes256CbcEncrypter};

use crate::error::Result;

/// Symmetric key protecting every resource of one packaged container.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentKey(Vec<u8>);

impl ContentKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({} bytes)", self.0.len())
    }
}

/// A content cipher.
pub trait Encrypter {
    /// Produce a fresh content key.
    fn generate_key(&self) -> Result<ContentKey>;

    /// URI identifying the encryption algorithm in the manifest.
    fn signature_uri(&self) -> &str;

    /// Encrypt everything read from `input` into `output`.
    fn encrypt(&self, key: &ContentKey, input: &mut dyn Read, output: &mut dyn Write)
    -> io::Result<()>;
}

impl<T: Encrypter + ?Sized> Encrypter for &T {
    fn generate_key(&self) -> Result<ContentKey> {
        (**self).generate_key()
    }

    fn signature_uri(&self) -> &str {
        (**self).signature_uri()
    }

    fn encrypt(
        &self,
        key: &ContentKey,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        (**self).encrypt(key, input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_debug_hides_bytes() {
        let key = ContentKey::new(vec![0xAB; 32]);
        assert_eq!(format!("{key:?}"), "ContentKey(32 bytes)");
        assert_eq!(key.len(), 32);
    }
}
