//! Resources that must stay in cleartext.
//!
//! Paths are collected with [`CleartextResources`] in any order, then frozen
//! into a [`CleartextPolicy`]. Only the frozen policy answers membership
//! queries, so every lookup runs against a sorted, duplicate-free set.

/// Append-only collector of cleartext resource paths.
#[derive(Debug, Clone, Default)]
pub struct CleartextResources {
    paths: Vec<String>,
}

impl CleartextResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a single path as cleartext.
    pub fn mark(&mut self, path: impl Into<String>) {
        self.paths.push(path.into());
    }

    /// Mark every path yielded by `paths` as cleartext.
    pub fn mark_all<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
    }

    /// Number of marked paths, duplicates included.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Sort, deduplicate and freeze the collected paths.
    pub fn finish(mut self) -> CleartextPolicy {
        self.paths.sort_unstable();
        self.paths.dedup();
        CleartextPolicy {
            paths: self.paths.into_boxed_slice(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for CleartextResources {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut resources = Self::new();
        resources.mark_all(iter);
        resources
    }
}

/// Immutable, sorted set of paths that must never be encrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleartextPolicy {
    paths: Box<[String]>,
}

impl CleartextPolicy {
    /// Returns `true` unless `path` is in the cleartext set.
    pub fn can_encrypt(&self, path: &str) -> bool {
        !self.contains(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths
            .binary_search_by(|probe| probe.as_str().cmp(path))
            .is_ok()
    }

    /// The cleartext paths in ascending order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
