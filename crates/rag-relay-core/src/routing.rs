//! Folder-prefix routing from storage objects to collections.
//!
//! Routes are checked in declaration order and the first prefix the object
//! path starts with wins, so a more specific prefix must be declared before
//! a broader one that contains it.

use crate::models::Collection;

/// One `prefix → collection` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRoute {
    pub prefix: String,
    pub collection: String,
}

impl CollectionRoute {
    pub fn new(prefix: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            collection: collection.into(),
        }
    }
}

/// Immutable, ordered prefix router.
#[derive(Debug, Clone, Default)]
pub struct CollectionRouter {
    routes: Vec<CollectionRoute>,
}

impl CollectionRouter {
    pub fn new(routes: Vec<CollectionRoute>) -> Self {
        Self { routes }
    }

    /// Builds routes from configured collections, in order.
    ///
    /// Collections without a corpus identifier are left out: an object in an
    /// unprovisioned folder has nowhere to go and is treated as unrouted.
    pub fn from_collections(collections: &[Collection]) -> Self {
        let routes = collections
            .iter()
            .filter(|c| c.is_provisioned())
            .map(|c| CollectionRoute::new(c.prefix.clone(), c.corpus.clone()))
            .collect();
        Self { routes }
    }

    /// Collection identifier for the first prefix `object_path` starts with.
    pub fn route(&self, object_path: &str) -> Option<&str> {
        self.matching(object_path).map(|r| r.collection.as_str())
    }

    /// Matched prefix without its trailing `/`, for display.
    pub fn folder_of(&self, object_path: &str) -> Option<&str> {
        self.matching(object_path)
            .map(|r| r.prefix.trim_end_matches('/'))
    }

    pub fn routes(&self) -> &[CollectionRoute] {
        &self.routes
    }

    fn matching(&self, object_path: &str) -> Option<&CollectionRoute> {
        self.routes
            .iter()
            .find(|r| object_path.starts_with(r.prefix.as_str()))
    }
}
