//! Store configuration.
//!
//! Configurations are JSON objects like:
//! ```json
//! {"type": "local", "root": "/srv/app/data"}
//! {"type": "local", "root": "/srv/app", "allow": ["/public/**"], "deny": ["/**/*.env"]}
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{registry, FileSystem, FsError, LocalFs, Result};

/// Configuration for a named store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Directory-backed store. Without a root, paths are host paths,
    /// which only root stores may use.
    Local {
        #[serde(default)]
        root: Option<String>,
        #[serde(default)]
        allow: Vec<String>,
        #[serde(default)]
        deny: Vec<String>,
    },
}

/// Which registry a mounted store lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    User,
    Root,
}

/// Builds stores from configurations.
pub trait StoreFactory: Send + Sync {
    fn create(&self, config: &StoreConfig) -> Result<Arc<dyn FileSystem>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFactory;

impl StoreFactory for DefaultFactory {
    fn create(&self, config: &StoreConfig) -> Result<Arc<dyn FileSystem>> {
        match config {
            StoreConfig::Local { root, allow, deny } => {
                let store = match root.as_deref() {
                    Some(root) if !root.is_empty() => LocalFs::new(root)?,
                    _ => LocalFs::unrooted(),
                };
                Ok(Arc::new(store.with_allow(allow)?.with_deny(deny)?))
            }
        }
    }
}

/// Build a store with [`DefaultFactory`] and register it under `name`.
pub fn mount(
    name: &str,
    config: &StoreConfig,
    visibility: Visibility,
) -> Result<Arc<dyn FileSystem>> {
    mount_with(&DefaultFactory, name, config, visibility)
}

pub fn mount_with(
    factory: &dyn StoreFactory,
    name: &str,
    config: &StoreConfig,
    visibility: Visibility,
) -> Result<Arc<dyn FileSystem>> {
    if visibility == Visibility::User {
        let StoreConfig::Local { root, .. } = config;
        if root.as_deref().map_or(true, str::is_empty) {
            return Err(FsError::Config(format!("user store {} needs a root", name)));
        }
    }
    let store = factory.create(config)?;
    match visibility {
        Visibility::User => registry::register(name, Arc::clone(&store)),
        Visibility::Root => registry::root_register(name, Arc::clone(&store)),
    };
    Ok(store)
}
