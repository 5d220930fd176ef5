use std::io::{self, Cursor, Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};
use zip::ZipArchive;

use super::{
    CONTAINER_FILE, CONTENT_TYPE_NCX, ENCRYPTION_FILE, Encryption, Epub, META_INF_DIR,
    MIMETYPE_FILE, Resource, package,
};
use crate::error::{Error, Result};

/// Read an EPUB file from disk into an [`Epub`].
///
/// # Example
///
/// ```no_run
/// use lcp_pack::read_epub;
///
/// let epub = read_epub("path/to/book.epub")?;
/// println!("{} resources", epub.resources.len());
/// # Ok::<(), lcp_pack::Error>(())
/// ```
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Epub> {
    let file = std::fs::File::open(path)?;
    read_epub_from_reader(file)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
///
/// Every entry becomes a [`Resource`] in archive order, keeping its original
/// compression method. Resource streams are lazy: an entry is inflated when
/// its resource is first read and released with the resource, so copying or
/// packaging holds one inflated entry at a time.
///
/// `mimetype`, everything under `META-INF/`, the package documents and their
/// navigation documents are marked cleartext. An existing
/// `META-INF/encryption.xml` is loaded as the manifest instead of being kept
/// as a resource.
pub fn read_epub_from_reader<R: Read + Seek + Send + 'static>(reader: R) -> Result<Epub> {
    let mut archive = ZipArchive::new(reader)?;
    let mut epub = Epub::new();
    let mut entries = Vec::new();
    let mut container_xml = None;

    // 1. Index the entries; only the small control files are read now
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        if name == ENCRYPTION_FILE {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            let xml = String::from_utf8(package::strip_bom(&data).to_vec())?;
            epub.encryption = Some(Encryption::from_xml(&xml)?);
            continue;
        }
        if name == CONTAINER_FILE {
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            container_xml = Some(data);
        }

        entries.push((i, name, file.compression(), file.size()));
    }

    if !entries.iter().any(|(_, name, ..)| name == MIMETYPE_FILE) {
        return Err(Error::InvalidEpub("missing mimetype entry".into()));
    }
    let container_xml =
        container_xml.ok_or_else(|| Error::MissingElement(CONTAINER_FILE.into()))?;

    // 2. Parse the package documents
    for opf_path in package::parse_container_xml(&container_xml)? {
        let opf_bytes = match read_archive_file_bytes(&mut archive, &opf_path) {
            Err(Error::Zip(zip::result::ZipError::FileNotFound)) => {
                return Err(Error::InvalidEpub(format!(
                    "package document {opf_path} not found"
                )));
            }
            other => other?,
        };

        let package = package::parse_opf(&opf_bytes, &opf_path)?;
        epub.mark_cleartext(opf_path);
        epub.packages.push(package);
    }

    // 3. Lazy resources over the shared archive
    let archive = Arc::new(Mutex::new(archive));
    for (index, name, method, size) in entries {
        if name == MIMETYPE_FILE || name.starts_with(META_INF_DIR) {
            epub.mark_cleartext(name.as_str());
        }
        let contents = ArchiveEntry {
            archive: Arc::clone(&archive),
            index,
            data: None,
        };
        epub.add_resource(Resource::new(name, contents, size).with_storage_method(method));
    }

    // 4. Content types and navigation documents from the manifests
    let mut navigation = Vec::new();
    for package in &epub.packages {
        for item in &package.manifest {
            let path = package.resolve(item);
            if item.media_type.eq_ignore_ascii_case(CONTENT_TYPE_NCX) || item.has_property("nav") {
                navigation.push(path.clone());
            }
            if let Some(resource) = epub.resources.iter_mut().find(|r| r.path == path) {
                resource.content_type = Some(item.media_type.clone());
            }
        }
    }
    epub.mark_cleartext_all(navigation);

    debug!(
        resources = epub.resources.len(),
        packages = epub.packages.len(),
        encrypted = epub.encryption.as_ref().map_or(0, Encryption::len),
        "read container"
    );

    Ok(epub)
}

/// Stream of one archive entry, inflated on first read.
struct ArchiveEntry<R> {
    archive: Arc<Mutex<ZipArchive<R>>>,
    index: usize,
    data: Option<Cursor<Vec<u8>>>,
}

impl<R: Read + Seek> ArchiveEntry<R> {
    fn load(&self) -> io::Result<Cursor<Vec<u8>>> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| io::Error::other("archive lock poisoned"))?;
        let mut file = archive.by_index(self.index).map_err(io::Error::from)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Cursor::new(data))
    }
}

impl<R: Read + Seek> Read for ArchiveEntry<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_none() {
            trace!(index = self.index, "inflating archive entry");
            self.data = Some(self.load()?);
        }
        match self.data.as_mut() {
            Some(data) => data.read(buf),
            None => Ok(0),
        }
    }
}

fn read_archive_file_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<u8>> {
    let mut file = archive.by_name(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}
