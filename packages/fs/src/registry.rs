//! Named store registries.
//!
//! Two independent maps: user stores, reachable from dispatch, and root
//! stores, which are trusted handles for host code only. Names are
//! case-insensitive.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::{FileSystem, FsError, Result};

type Stores = RwLock<HashMap<String, Arc<dyn FileSystem>>>;

lazy_static! {
    static ref USER: Stores = RwLock::new(HashMap::new());
    static ref ROOT: Stores = RwLock::new(HashMap::new());
}

/// Register a user store, returning the one it replaced.
pub fn register(name: &str, store: Arc<dyn FileSystem>) -> Option<Arc<dyn FileSystem>> {
    tracing::info!(store = name, root = store.root(), "register store");
    USER.write().insert(name.to_lowercase(), store)
}

/// Register a root store, returning the one it replaced.
pub fn root_register(name: &str, store: Arc<dyn FileSystem>) -> Option<Arc<dyn FileSystem>> {
    tracing::info!(store = name, root = store.root(), "register root store");
    ROOT.write().insert(name.to_lowercase(), store)
}

/// Look up a user store. A name that only exists among root stores is
/// refused with [`FsError::RootOnly`].
pub fn get(name: &str) -> Result<Arc<dyn FileSystem>> {
    let key = name.to_lowercase();
    if let Some(store) = USER.read().get(&key) {
        return Ok(Arc::clone(store));
    }
    if ROOT.read().contains_key(&key) {
        tracing::warn!(store = name, "root store requested from user registry");
        return Err(FsError::RootOnly(name.to_string()));
    }
    Err(FsError::StoreNotFound(name.to_string()))
}

pub fn root_get(name: &str) -> Result<Arc<dyn FileSystem>> {
    ROOT.read()
        .get(&name.to_lowercase())
        .cloned()
        .ok_or_else(|| FsError::StoreNotFound(name.to_string()))
}

/// Like [`get`], but a miss is fatal.
///
/// # Panics
///
/// When the store is missing or root-only.
pub fn must_get(name: &str) -> Arc<dyn FileSystem> {
    match get(name) {
        Ok(store) => store,
        Err(e) => panic!("{}", e),
    }
}

/// Like [`root_get`], but a miss is fatal.
///
/// # Panics
///
/// When the store is missing.
pub fn must_root_get(name: &str) -> Arc<dyn FileSystem> {
    match root_get(name) {
        Ok(store) => store,
        Err(e) => panic!("{}", e),
    }
}

/// Sorted user store names.
pub fn names() -> Vec<String> {
    let mut names: Vec<String> = USER.read().keys().cloned().collect();
    names.sort();
    names
}

/// Sorted root store names.
pub fn root_names() -> Vec<String> {
    let mut names: Vec<String> = ROOT.read().keys().cloned().collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalFs;

    #[test]
    fn user_and_root_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn FileSystem> = Arc::new(LocalFs::new(dir.path()).unwrap());

        register("RegTest.User", Arc::clone(&store));
        root_register("regtest.trusted", Arc::clone(&store));

        assert!(get("regtest.user").is_ok());
        assert!(names().contains(&"regtest.user".to_string()));
        assert!(root_names().contains(&"regtest.trusted".to_string()));

        let err = get("regtest.trusted").err().unwrap();
        assert_eq!(err.status(), 403);
        assert!(root_get("regtest.trusted").is_ok());

        let err = get("regtest.missing").err().unwrap();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn must_get_refuses_root_only_stores() {
        let dir = tempfile::tempdir().unwrap();
        root_register("regtest.hidden", Arc::new(LocalFs::new(dir.path()).unwrap()));

        let result = std::panic::catch_unwind(|| must_get("regtest.hidden"));
        assert!(result.is_err());
        let _ = must_root_get("regtest.hidden");
    }
}
