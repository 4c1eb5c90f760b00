// src/index/registry.rs

//! Indexes shared across lookups in one run

use super::{IndexClient, PackageIndex};
use crate::cache::CacheTier;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type IndexKey = (String, Vec<String>);

/// [`PackageIndex`] instances keyed by index URL and find-links
///
/// Pages read by one index are never fetched again for the registry's
/// lifetime, however many installers share it.
pub struct IndexRegistry {
    allow_hosts: Vec<String>,
    python_version: Option<String>,
    client: Arc<IndexClient>,
    cache: Arc<dyn CacheTier>,
    indexes: HashMap<IndexKey, PackageIndex>,
}

impl IndexRegistry {
    pub fn new(allow_hosts: Vec<String>, python_version: Option<String>, cache: Arc<dyn CacheTier>) -> Result<Self> {
        Ok(Self {
            allow_hosts,
            python_version,
            client: Arc::new(IndexClient::new()?),
            cache,
            indexes: HashMap::new(),
        })
    }

    /// The index for `index_url` and `links`, created on first use
    pub fn get(&mut self, index_url: &str, links: &[String]) -> &mut PackageIndex {
        let key = (index_url.to_string(), links.to_vec());
        self.indexes.entry(key).or_insert_with(|| {
            debug!("Creating index for {} with {} find-links", index_url, links.len());
            let mut index = PackageIndex::new(
                index_url,
                &self.allow_hosts,
                self.python_version.clone(),
                Arc::clone(&self.client),
                Arc::clone(&self.cache),
            );
            index.add_find_links(links);
            index
        })
    }

    /// HTTP client shared by every index
    pub fn client(&self) -> Arc<IndexClient> {
        Arc::clone(&self.client)
    }

    /// Switch cache tier; indexes built against the old tier are dropped
    pub fn set_cache(&mut self, cache: Arc<dyn CacheTier>) {
        self.cache = cache;
        self.indexes.clear();
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Forget every index and the pages it has read
    pub fn clear(&mut self) {
        self.indexes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use std::fs;

    #[test]
    fn test_indexes_reused_per_key() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo-1.0.zip"), "x").unwrap();
        let links = vec![dir.path().to_string_lossy().into_owned()];

        let mut registry = IndexRegistry::new(vec!["*".into()], None, Arc::new(NoCache)).unwrap();
        assert_eq!(registry.get("file:///none", &links).candidates("foo").len(), 1);

        fs::write(dir.path().join("foo-2.0.zip"), "x").unwrap();
        assert_eq!(registry.get("file:///none", &links).candidates("foo").len(), 1);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.get("file:///none", &[]).candidates("foo").len(), 0);
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert_eq!(registry.get("file:///none", &links).candidates("foo").len(), 2);
    }
}
