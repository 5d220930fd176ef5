//! Shared fixtures: in-memory EPUBs and test ciphers.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use flate2::read::DeflateDecoder;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use lcp_pack::{ContentKey, Encrypter, Error, Result};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test Book</dc:title>
    <dc:identifier id="BookId">urn:uuid:test</dc:identifier>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover-image" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="chap1" href="Text/chap%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx"><itemref idref="chap1"/></spine>
</package>"#;

/// Text that deflates well.
pub fn chapter(len: usize) -> Vec<u8> {
    let para = b"<p>It was a bright cold day in April, and the clocks struck thirteen.</p>\n";
    para.iter().copied().cycle().take(len).collect()
}

/// Bytes that look like already-compressed media.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545F4914F6CDD1Du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// Build a zip container from `(path, bytes, method)` entries, in order.
pub fn build_zip(entries: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data, method) in entries {
        zip.start_file(*path, SimpleFileOptions::default().compression_method(*method))
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A small but complete EPUB 3.
pub fn sample_epub() -> Vec<u8> {
    let chap = chapter(8000);
    let cover = noise(5000);
    build_zip(&[
        ("mimetype", &b"application/epub+zip"[..], CompressionMethod::Stored),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes(), CompressionMethod::Deflated),
        ("OEBPS/content.opf", CONTENT_OPF.as_bytes(), CompressionMethod::Deflated),
        ("OEBPS/nav.xhtml", &b"<html><nav/></html>"[..], CompressionMethod::Deflated),
        ("OEBPS/toc.ncx", &b"<ncx/>"[..], CompressionMethod::Deflated),
        ("OEBPS/images/cover.jpg", &cover[..], CompressionMethod::Stored),
        ("OEBPS/Text/chap 1.xhtml", &chap[..], CompressionMethod::Deflated),
        ("OEBPS/style.css", &b"p { margin: 0 }"[..], CompressionMethod::Deflated),
    ])
}

pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    data
}

pub fn entry_method(bytes: &[u8], name: &str) -> CompressionMethod {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let method = archive.by_name(name).unwrap().compression();
    method
}

/// Undo [`lcp_pack::Aes256CbcEncrypter`]: split the IV, decrypt, strip PKCS#7.
pub fn aes_decrypt(key: &ContentKey, data: &[u8]) -> Vec<u8> {
    let (iv, body) = data.split_at(16);
    let mut cipher = cbc::Decryptor::<Aes256>::new_from_slices(key.as_bytes(), iv).unwrap();
    let mut plain = body.to_vec();
    for block in plain.chunks_exact_mut(16) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    let pad = *plain.last().unwrap() as usize;
    plain.truncate(plain.len() - pad);
    plain
}

pub fn inflate(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    DeflateDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Cipher that XORs with the key and remembers what it encrypted.
pub struct RecordingEncrypter {
    pub signature: String,
    pub calls: RefCell<Vec<usize>>,
}

impl RecordingEncrypter {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Number of bytes handed to each `encrypt` call, in order.
    pub fn input_lengths(&self) -> Vec<usize> {
        self.calls.borrow().clone()
    }
}

impl Encrypter for RecordingEncrypter {
    fn generate_key(&self) -> Result<ContentKey> {
        Ok(ContentKey::new(vec![0x5A; 32]))
    }

    fn signature_uri(&self) -> &str {
        &self.signature
    }

    fn encrypt(
        &self,
        key: &ContentKey,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<()> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        self.calls.borrow_mut().push(data.len());
        let k = key.as_bytes();
        let out: Vec<u8> = data
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ k[i % k.len()])
            .collect();
        output.write_all(&out)
    }
}

/// Undo [`RecordingEncrypter`].
pub fn xor_decrypt(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ 0x5A).collect()
}

/// Cipher whose key generation always fails.
pub struct NoKeyEncrypter;

impl Encrypter for NoKeyEncrypter {
    fn generate_key(&self) -> Result<ContentKey> {
        Err(Error::KeyGeneration("entropy source unavailable".into()))
    }

    fn signature_uri(&self) -> &str {
        "http://test/none"
    }

    fn encrypt(&self, _: &ContentKey, _: &mut dyn Read, _: &mut dyn Write) -> io::Result<()> {
        unreachable!("no key, no encryption")
    }
}

/// Cipher that fails on the first resource it sees.
pub struct BrokenEncrypter;

impl Encrypter for BrokenEncrypter {
    fn generate_key(&self) -> Result<ContentKey> {
        Ok(ContentKey::new(vec![1; 32]))
    }

    fn signature_uri(&self) -> &str {
        "http://test/broken"
    }

    fn encrypt(&self, _: &ContentKey, _: &mut dyn Read, _: &mut dyn Write) -> io::Result<()> {
        Err(io::Error::other("cipher exploded"))
    }
}

/// Destination that rejects writes past `limit` bytes or fails to flush.
pub struct FailingSink {
    inner: Cursor<Vec<u8>>,
    written: usize,
    limit: usize,
    fail_flush: bool,
}

impl FailingSink {
    pub fn failing_after(limit: usize) -> Self {
        Self {
            inner: Cursor::new(Vec::new()),
            written: 0,
            limit,
            fail_flush: false,
        }
    }

    pub fn failing_flush() -> Self {
        Self {
            fail_flush: true,
            ..Self::failing_after(usize::MAX)
        }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written.saturating_add(buf.len()) > self.limit {
            return Err(io::Error::other("no space left on device"));
        }
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_flush {
            return Err(io::Error::other("flush failed"));
        }
        self.inner.flush()
    }
}

impl Seek for FailingSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Source that counts the bytes read through it.
pub struct CountingReader {
    inner: Cursor<Vec<u8>>,
    pub count: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(bytes),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn bytes_read(count: &AtomicUsize) -> usize {
        count.load(Ordering::SeqCst)
    }
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
