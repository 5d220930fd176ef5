use super::{Package, Resource};

/// Manifest id assumed for the cover when no `<meta name="cover">` is given.
const DEFAULT_COVER_ID: &str = "cover-image";

/// Locate the cover image among `resources`.
///
/// For each package, a manifest item is a cover candidate when its properties
/// include `cover-image` or when its id equals the cover id. The cover id
/// defaults to `cover-image` and is replaced by the content of the last
/// `<meta name="cover">` entry. Candidates are tried in manifest order and
/// the first whose resolved href names an existing resource wins.
pub fn find_cover<'a>(packages: &[Package], resources: &'a [Resource]) -> Option<&'a Resource> {
    for package in packages {
        let cover_id = package
            .metas
            .iter()
            .rev()
            .find(|meta| meta.name == "cover")
            .map_or(DEFAULT_COVER_ID, |meta| meta.content.as_str());

        let candidates = package
            .manifest
            .iter()
            .filter(|item| item.has_property("cover-image") || item.id == cover_id);

        for item in candidates {
            let path = package.resolve(item);
            if let Some(resource) = resources.iter().find(|r| r.path == path) {
                return Some(resource);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::{ManifestItem, Meta};

    fn item(id: &str, href: &str, properties: &str) -> ManifestItem {
        ManifestItem {
            id: id.into(),
            href: href.into(),
            media_type: "image/jpeg".into(),
            properties: properties.into(),
        }
    }

    fn resources(paths: &[&str]) -> Vec<Resource> {
        paths
            .iter()
            .map(|p| Resource::from_bytes(*p, b"img".to_vec()))
            .collect()
    }

    #[test]
    fn test_default_cover_id() {
        let package = Package {
            base_path: String::new(),
            manifest: vec![item("cover-image", "images/cover.jpg", "")],
            metas: vec![],
        };
        let resources = resources(&["images/cover.jpg"]);

        let cover = find_cover(&[package], &resources).unwrap();
        assert_eq!(cover.path, "images/cover.jpg");
    }

    #[test]
    fn test_cover_meta_names_item() {
        let package = Package {
            base_path: "OEBPS".into(),
            manifest: vec![
                item("cover-image", "images/missing.jpg", ""),
                item("front", "images/front.jpg", ""),
            ],
            metas: vec![Meta {
                name: "cover".into(),
                content: "front".into(),
            }],
        };
        let resources = resources(&["OEBPS/images/front.jpg"]);

        let cover = find_cover(&[package], &resources).unwrap();
        assert_eq!(cover.path, "OEBPS/images/front.jpg");
    }

    #[test]
    fn test_cover_image_property() {
        let package = Package {
            base_path: "OPS".into(),
            manifest: vec![
                item("ch1", "ch1.xhtml", ""),
                item("img1", "img/c.png", "cover-image svg"),
            ],
            metas: vec![],
        };
        let resources = resources(&["OPS/ch1.xhtml", "OPS/img/c.png"]);

        let cover = find_cover(&[package], &resources).unwrap();
        assert_eq!(cover.path, "OPS/img/c.png");
    }

    #[test]
    fn test_manifest_order_decides_between_candidates() {
        // Both items qualify; the first one in the manifest wins.
        let package = Package {
            base_path: String::new(),
            manifest: vec![
                item("prop", "a.jpg", "cover-image"),
                item("meta-cover", "b.jpg", ""),
            ],
            metas: vec![Meta {
                name: "cover".into(),
                content: "meta-cover".into(),
            }],
        };
        let resources = resources(&["a.jpg", "b.jpg"]);

        assert_eq!(find_cover(&[package], &resources).unwrap().path, "a.jpg");
    }

    #[test]
    fn test_no_cover() {
        let package = Package {
            base_path: String::new(),
            manifest: vec![item("ch1", "ch1.xhtml", "")],
            metas: vec![],
        };
        assert!(find_cover(&[package], &resources(&["ch1.xhtml"])).is_none());
        assert!(find_cover(&[], &resources(&["cover.jpg"])).is_none());
    }
}
