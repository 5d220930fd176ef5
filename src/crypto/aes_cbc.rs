use std::io::{self, Read, Write};

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;

use super::{ContentKey, Encrypter};
use crate::error::{Error, Result};

/// XML Encryption identifier for AES-256 in CBC mode.
pub const AES256_CBC_URI: &str = "http://www.w3.org/2001/04/xmlenc#aes256-cbc";

const KEY_LEN: usize = 32;
const BLOCK: usize = 16;
const CHUNK: usize = 64 * 1024;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// AES-256-CBC with PKCS#7 padding.
///
/// Output is a random 16-byte IV followed by the ciphertext, which is the
/// layout LCP reading systems expect for protected resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256CbcEncrypter;

impl Aes256CbcEncrypter {
    pub fn new() -> Self {
        Self
    }
}

impl Encrypter for Aes256CbcEncrypter {
    fn generate_key(&self) -> Result<ContentKey> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        Ok(ContentKey::new(key))
    }

    fn signature_uri(&self) -> &str {
        AES256_CBC_URI
    }

    fn encrypt(
        &self,
        key: &ContentKey,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let mut iv = [0u8; BLOCK];
        OsRng.try_fill_bytes(&mut iv).map_err(io::Error::other)?;

        let mut cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("AES-256 needs a {KEY_LEN}-byte key, got {}", key.len()),
            )
        })?;

        output.write_all(&iv)?;

        // Whole blocks are encrypted as they arrive; fewer than BLOCK bytes
        // stay pending at the front of the buffer between reads.
        let mut buf = vec![0u8; CHUNK];
        let mut pending = 0;
        loop {
            let n = match input.read(&mut buf[pending..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            pending += n;

            let full = pending - pending % BLOCK;
            for block in buf[..full].chunks_exact_mut(BLOCK) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            output.write_all(&buf[..full])?;

            buf.copy_within(full..pending, 0);
            pending -= full;
        }

        // PKCS#7: always add padding, a full block when input is aligned.
        let pad = (BLOCK - pending) as u8;
        buf[pending..BLOCK].fill(pad);
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(&mut buf[..BLOCK]));
        output.write_all(&buf[..BLOCK])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::BlockDecryptMut;

    fn decrypt(key: &ContentKey, data: &[u8]) -> Vec<u8> {
        let (iv, body) = data.split_at(BLOCK);
        let mut cipher = cbc::Decryptor::<Aes256>::new_from_slices(key.as_bytes(), iv).unwrap();
        let mut plain = body.to_vec();
        for block in plain.chunks_exact_mut(BLOCK) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        let pad = *plain.last().unwrap() as usize;
        plain.truncate(plain.len() - pad);
        plain
    }

    #[test]
    fn test_generate_key() {
        let enc = Aes256CbcEncrypter::new();
        let a = enc.generate_key().unwrap();
        let b = enc.generate_key().unwrap();
        assert_eq!(a.len(), KEY_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_encrypt_layout_and_padding() {
        let enc = Aes256CbcEncrypter::new();
        let key = enc.generate_key().unwrap();

        for len in [0usize, 1, 15, 16, 17, 100_000] {
            let plain: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut out: Vec<u8> = Vec::new();
            enc.encrypt(&key, &mut plain.as_slice(), &mut out).unwrap();

            // IV + ciphertext padded up to the next whole block.
            assert_eq!(out.len(), BLOCK + (len / BLOCK + 1) * BLOCK);
            assert_eq!(decrypt(&key, &out), plain);
        }
    }

    #[test]
    fn test_encrypt_rejects_short_key() {
        let enc = Aes256CbcEncrypter::new();
        let key = ContentKey::new(vec![1u8; 16]);
        let err = enc
            .encrypt(&key, &mut &b"data"[..], &mut Vec::<u8>::new())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
