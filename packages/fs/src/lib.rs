//! Sandboxed filesystem stores.
//!
//! A store is a named [`FileSystem`]. The local backend resolves every
//! path against its root and an allow/deny policy before touching disk:
//!
//! ```rust
//! use yao_fs::{FileSystem, LocalFs};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = LocalFs::new(dir.path())
//!     .unwrap()
//!     .with_deny(["/secrets/**"])
//!     .unwrap();
//!
//! store.write_file("/notes/a.txt", b"hello", 0o644).unwrap();
//! assert_eq!(store.read_file("/notes/a.txt").unwrap(), b"hello");
//! assert!(store.read_file("/secrets/key").is_err());
//! assert!(store.read_file("/../etc/passwd").is_err());
//! ```
//!
//! Stores are published by name through [`register`] (reachable from
//! dispatch) or [`root_register`] (host code only).

pub mod config;
mod error;
mod filesystem;
mod local;
pub mod mime;
pub mod registry;

pub use config::{mount, mount_with, DefaultFactory, StoreConfig, StoreFactory, Visibility};
pub use error::{FsError, Result};
pub use filesystem::{Cancel, FileSystem, ListFilter, ListPage, WalkFlow, WalkHandler};
pub use local::LocalFs;
pub use registry::{
    get, must_get, must_root_get, names, register, root_get, root_names, root_register,
};
