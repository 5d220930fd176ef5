//! Package document (OPF) metadata, kept for the read path only.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};

/// Media type of EPUB 2 NCX navigation documents.
pub const CONTENT_TYPE_NCX: &str = "application/x-dtbncx+xml";

/// A manifest `<item>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    /// Space-separated EPUB 3 properties (`cover-image`, `nav`, ...).
    pub properties: String,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .split_ascii_whitespace()
            .any(|p| p == property)
    }
}

/// A `<meta name=".." content=".."/>` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub name: String,
    pub content: String,
}

/// One package document of a container.
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// Directory of the package document inside the container; manifest
    /// hrefs are relative to it.
    pub base_path: String,
    pub manifest: Vec<ManifestItem>,
    pub metas: Vec<Meta>,
}

impl Package {
    /// Container path of a manifest item.
    pub fn resolve(&self, item: &ManifestItem) -> String {
        resolve_path(&self.base_path, &item.href)
    }
}

/// Parse META-INF/container.xml into the list of package document paths.
pub fn parse_container_xml(bytes: &[u8]) -> Result<Vec<String>> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    let mut rootfiles = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        rootfiles.push(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if rootfiles.is_empty() {
        return Err(Error::MissingElement(
            "rootfile in META-INF/container.xml".into(),
        ));
    }
    Ok(rootfiles)
}

/// Parse a package document located at `opf_path`.
pub fn parse_opf(bytes: &[u8], opf_path: &str) -> Result<Package> {
    let content = String::from_utf8(strip_bom(bytes).to_vec())?;

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    let mut package = Package {
        base_path: parent_dir(opf_path).to_string(),
        ..Package::default()
    };

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"item" => {
                        let mut item = ManifestItem::default();
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8(attr.value.to_vec())?;
                            match attr.key.as_ref() {
                                b"id" => item.id = value,
                                b"href" => item.href = value,
                                b"media-type" => item.media_type = value,
                                b"properties" => item.properties = value,
                                _ => {}
                            }
                        }
                        if !item.href.is_empty() {
                            package.manifest.push(item);
                        }
                    }
                    b"meta" => {
                        let mut meta = Meta::default();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => meta.name = String::from_utf8(attr.value.to_vec())?,
                                b"content" => {
                                    meta.content = String::from_utf8(attr.value.to_vec())?
                                }
                                _ => {}
                            }
                        }
                        // EPUB 3 property metas carry text, not name/content pairs.
                        if !meta.name.is_empty() {
                            package.metas.push(meta);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(package)
}

/// Join a manifest href to its package directory, decoding percent escapes
/// and collapsing `.` and `..` segments.
pub fn resolve_path(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = percent_encoding::percent_decode_str(href).decode_utf8_lossy();

    let joined = if base.is_empty() {
        decoded.into_owned()
    } else {
        format!("{}/{}", base, decoded)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    // UTF-8 BOM: EF BB BF
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Extract local name from namespaced XML name (e.g., "opf:item" -> "item").
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}
