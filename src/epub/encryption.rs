//! The encryption manifest (`META-INF/encryption.xml`).

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use crate::error::{Error, Result};

/// Key-retrieval pointer into the license document.
pub const CONTENT_KEY_RETRIEVAL_URI: &str = "license.lcpl#/encryption/content_key";
/// Type of the key referenced by [`CONTENT_KEY_RETRIEVAL_URI`].
pub const ENCRYPTED_CONTENT_KEY_TYPE: &str = "http://readium.org/2014/01/lcp#EncryptedContentKey";

const NS_CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
const NS_XMLENC: &str = "http://www.w3.org/2001/04/xmlenc#";
const NS_XMLDSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
const NS_COMPRESSION: &str = "http://www.idpf.org/2016/encryption#compression";

/// Compression applied to a resource before it was encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Compression {
    /// ZIP method code: [`Compression::STORED`] or [`Compression::DEFLATE`].
    pub method: u16,
    /// Length of the plaintext before compression.
    pub original_length: u64,
}

impl Compression {
    pub const STORED: u16 = 0;
    pub const DEFLATE: u16 = 8;

    pub fn is_deflated(&self) -> bool {
        self.method == Self::DEFLATE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct RetrievalMethod {
    pub uri: String,
    #[cfg_attr(feature = "cli", serde(rename = "type"))]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct KeyInfo {
    pub retrieval_method: RetrievalMethod,
}

impl KeyInfo {
    /// Key info pointing at the content key held by the license.
    pub fn content_key() -> Self {
        Self {
            retrieval_method: RetrievalMethod {
                uri: CONTENT_KEY_RETRIEVAL_URI.to_string(),
                kind: ENCRYPTED_CONTENT_KEY_TYPE.to_string(),
            },
        }
    }
}

/// One `EncryptedData` record: how a single resource was protected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct EncryptedData {
    /// Encryption algorithm URI.
    pub algorithm: String,
    pub key_info: Option<KeyInfo>,
    /// Path of the protected resource inside the container.
    pub cipher_reference: String,
    pub compression: Option<Compression>,
}

impl EncryptedData {
    /// Record for a resource encrypted with the license's content key.
    pub fn with_content_key(
        algorithm: impl Into<String>,
        path: impl Into<String>,
        compression: Compression,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            key_info: Some(KeyInfo::content_key()),
            cipher_reference: path.into(),
            compression: Some(compression),
        }
    }
}

/// Ordered set of [`EncryptedData`] records, at most one per resource path.
#[derive(Debug, Clone, Default)]
pub struct Encryption {
    data: Vec<EncryptedData>,
    by_path: HashMap<String, usize>,
}

impl Encryption {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record protecting `path`, if any.
    pub fn data_for_file(&self, path: &str) -> Option<&EncryptedData> {
        self.by_path.get(path).map(|&i| &self.data[i])
    }

    /// Append a record. Fails if `data.cipher_reference` is already recorded.
    pub fn append(&mut self, data: EncryptedData) -> Result<()> {
        if self.by_path.contains_key(&data.cipher_reference) {
            return Err(Error::DuplicateRecord(data.cipher_reference));
        }
        self.by_path
            .insert(data.cipher_reference.clone(), self.data.len());
        self.data.push(data);
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EncryptedData> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Render the manifest as an `encryption.xml` document.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);

        emit(
            &mut w,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        emit(
            &mut w,
            Event::Start(BytesStart::new("encryption").with_attributes([
                ("xmlns", NS_CONTAINER),
                ("xmlns:enc", NS_XMLENC),
                ("xmlns:ds", NS_XMLDSIG),
            ])),
        )?;

        for data in &self.data {
            write_encrypted_data(&mut w, data)?;
        }

        emit(&mut w, Event::End(BytesEnd::new("encryption")))?;

        let mut xml = w.into_inner();
        xml.push(b'\n');
        Ok(xml)
    }

    /// Parse an existing `encryption.xml` document.
    pub fn from_xml(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut manifest = Encryption::new();
        let mut current: Option<PartialData> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => {
                    let name = e.name();
                    let local = local_name(name.as_ref());

                    if local == b"EncryptedData" {
                        current = Some(PartialData::default());
                        continue;
                    }
                    let Some(data) = current.as_mut() else {
                        continue;
                    };

                    for attr in e.attributes().flatten() {
                        let value = String::from_utf8(attr.value.to_vec())?;
                        match (local, attr.key.as_ref()) {
                            (b"EncryptionMethod", b"Algorithm") => data.algorithm = Some(value),
                            (b"RetrievalMethod", b"URI") => data.retrieval_uri = Some(value),
                            (b"RetrievalMethod", b"Type") => data.retrieval_type = Some(value),
                            (b"CipherReference", b"URI") => {
                                data.cipher_reference = Some(decode_uri(&value))
                            }
                            (b"Compression", b"Method") => {
                                data.compression_method = Some(parse_number(&value)?)
                            }
                            (b"Compression", b"OriginalLength") => {
                                data.original_length = Some(parse_number(&value)?)
                            }
                            _ => {}
                        }
                    }
                }
                Event::End(e) => {
                    let name = e.name();
                    if local_name(name.as_ref()) == b"EncryptedData"
                        && let Some(partial) = current.take()
                    {
                        manifest.append(partial.build()?)?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(manifest)
    }
}

impl<'a> IntoIterator for &'a Encryption {
    type Item = &'a EncryptedData;
    type IntoIter = std::slice::Iter<'a, EncryptedData>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

fn write_encrypted_data(w: &mut Writer<Vec<u8>>, data: &EncryptedData) -> Result<()> {
    emit(w, Event::Start(BytesStart::new("enc:EncryptedData")))?;

    emit(
        w,
        Event::Empty(
            BytesStart::new("enc:EncryptionMethod")
                .with_attributes([("Algorithm", data.algorithm.as_str())]),
        ),
    )?;

    if let Some(key_info) = &data.key_info {
        emit(w, Event::Start(BytesStart::new("ds:KeyInfo")))?;
        emit(
            w,
            Event::Empty(BytesStart::new("ds:RetrievalMethod").with_attributes([
                ("URI", key_info.retrieval_method.uri.as_str()),
                ("Type", key_info.retrieval_method.kind.as_str()),
            ])),
        )?;
        emit(w, Event::End(BytesEnd::new("ds:KeyInfo")))?;
    }

    emit(w, Event::Start(BytesStart::new("enc:CipherData")))?;
    emit(
        w,
        Event::Empty(
            BytesStart::new("enc:CipherReference")
                .with_attributes([("URI", data.cipher_reference.as_str())]),
        ),
    )?;
    emit(w, Event::End(BytesEnd::new("enc:CipherData")))?;

    if let Some(compression) = &data.compression {
        let method = compression.method.to_string();
        let length = compression.original_length.to_string();

        emit(w, Event::Start(BytesStart::new("enc:EncryptionProperties")))?;
        emit(
            w,
            Event::Start(
                BytesStart::new("enc:EncryptionProperty")
                    .with_attributes([("xmlns:ns", NS_COMPRESSION)]),
            ),
        )?;
        emit(
            w,
            Event::Empty(BytesStart::new("ns:Compression").with_attributes([
                ("Method", method.as_str()),
                ("OriginalLength", length.as_str()),
            ])),
        )?;
        emit(w, Event::End(BytesEnd::new("enc:EncryptionProperty")))?;
        emit(w, Event::End(BytesEnd::new("enc:EncryptionProperties")))?;
    }

    emit(w, Event::End(BytesEnd::new("enc:EncryptedData")))
}

fn emit(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    w.write_event(event)
        .map_err(|e| Error::ManifestSerialization(e.to_string()))
}

#[derive(Default)]
struct PartialData {
    algorithm: Option<String>,
    retrieval_uri: Option<String>,
    retrieval_type: Option<String>,
    cipher_reference: Option<String>,
    compression_method: Option<u16>,
    original_length: Option<u64>,
}

impl PartialData {
    fn build(self) -> Result<EncryptedData> {
        let cipher_reference = self.cipher_reference.ok_or_else(|| {
            Error::InvalidManifest("EncryptedData without CipherReference".into())
        })?;
        let algorithm = self.algorithm.ok_or_else(|| {
            Error::InvalidManifest(format!("no EncryptionMethod for {cipher_reference}"))
        })?;

        let key_info = self.retrieval_uri.map(|uri| KeyInfo {
            retrieval_method: RetrievalMethod {
                uri,
                kind: self.retrieval_type.unwrap_or_default(),
            },
        });

        let compression = self.compression_method.map(|method| Compression {
            method,
            original_length: self.original_length.unwrap_or(0),
        });

        Ok(EncryptedData {
            algorithm,
            key_info,
            cipher_reference,
            compression,
        })
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidManifest(format!("expected a number, got {value:?}")))
}

/// Cipher references are URIs; container paths are not percent-encoded.
fn decode_uri(uri: &str) -> String {
    percent_encoding::percent_decode_str(uri)
        .decode_utf8_lossy()
        .into_owned()
}

/// Extract local name from namespaced XML name (e.g., "enc:CipherData" -> "CipherData").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}
