//! The store contract.
//!
//! Paths crossing this boundary are store-relative strings (`/a/b.txt`).
//! Implementations resolve them against their own root and return
//! store-relative paths again.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::Result;

/// Polled between entries by walks, listings and extraction.
pub trait Cancel {
    fn is_cancelled(&self) -> bool;
}

impl Cancel for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// What a [`FileSystem::walk`] handler wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkFlow {
    Continue,
    /// Do not descend into the directory just visited.
    SkipDir,
    /// Abandon the walk; `walk` still returns `Ok`.
    Stop,
}

/// One page of a [`FileSystem::list`] result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub paths: Vec<String>,
    pub total: usize,
    pub pages: usize,
}

/// Handler invoked for every entry of a walk: `(path, is_dir)`.
pub type WalkHandler<'a> = dyn FnMut(&str, bool) -> Result<WalkFlow> + 'a;

/// Predicate applied to candidate paths by [`FileSystem::list`].
pub type ListFilter<'a> = dyn Fn(&str) -> bool + 'a;

pub trait FileSystem: Send + Sync {
    /// The configured root prefix; empty for unrooted stores.
    fn root(&self) -> &str;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    fn read_closer(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Create or truncate `path` (creating parent directories) and set its
    /// permission bits to `perm`. Returns the number of bytes written.
    fn write_file(&self, path: &str, data: &[u8], perm: u32) -> Result<usize>;
    fn write(&self, path: &str, reader: &mut dyn Read, perm: u32) -> Result<usize>;
    fn write_closer(&self, path: &str, perm: u32) -> Result<Box<dyn Write + Send>>;

    fn append_file(&self, path: &str, data: &[u8], perm: u32) -> Result<usize>;
    fn append(&self, path: &str, reader: &mut dyn Read, perm: u32) -> Result<usize>;

    /// Splice `data` into `path` at byte `offset`. An offset past the end
    /// appends.
    fn insert_file(&self, path: &str, offset: u64, data: &[u8], perm: u32) -> Result<usize>;
    fn insert(&self, path: &str, offset: u64, reader: &mut dyn Read, perm: u32)
        -> Result<usize>;

    /// Entries under `path`. Recursive listings are depth-first pre-order
    /// and never include `path` itself.
    fn read_dir(&self, path: &str, recursive: bool) -> Result<Vec<String>>;
    fn mkdir(&self, path: &str, perm: u32) -> Result<()>;
    fn mkdir_all(&self, path: &str, perm: u32) -> Result<()>;

    /// Create a fresh directory under `dir` (the OS temp dir when empty).
    ///
    /// A `*` in `pattern` is replaced by a random string; otherwise the
    /// random string is appended.
    fn mkdir_temp(&self, dir: &str, pattern: &str) -> Result<String>;
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Removing a missing path succeeds.
    fn remove(&self, path: &str) -> Result<()>;
    /// Removing a missing path succeeds.
    fn remove_all(&self, path: &str) -> Result<()>;
    fn exists(&self, path: &str) -> Result<bool>;

    /// After return `src` is gone and `dst` holds its content, whether or
    /// not both live on the same device.
    fn move_path(&self, src: &str, dst: &str) -> Result<()>;
    /// Append the bytes of `src` onto `dst`, then remove `src`.
    fn move_append(&self, src: &str, dst: &str) -> Result<()>;
    /// Splice the bytes of `src` into `dst` at `offset`, then remove `src`.
    fn move_insert(&self, src: &str, dst: &str, offset: u64) -> Result<()>;
    fn copy(&self, src: &str, dst: &str) -> Result<()>;
    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    fn size(&self, path: &str) -> Result<u64>;
    /// Permission bits (`mode & 0o777`).
    fn mode(&self, path: &str) -> Result<u32>;
    fn mod_time(&self, path: &str) -> Result<SystemTime>;
    fn is_dir(&self, path: &str) -> bool;
    fn is_file(&self, path: &str) -> bool;
    fn is_link(&self, path: &str) -> bool;
    /// Content-sniffed mime type.
    fn mime_type(&self, path: &str) -> Result<String>;
    /// The absolute host path behind `path`.
    fn abs(&self, path: &str) -> Result<String>;

    /// Visit every entry below `root`. Files are only reported when their
    /// base name matches one of `patterns` (all files when empty).
    fn walk(
        &self,
        root: &str,
        handler: &mut WalkHandler<'_>,
        patterns: &[String],
        cancel: Option<&dyn Cancel>,
    ) -> Result<()>;

    /// Paginated listing of files under `path` with one of `exts`, newest
    /// first. `page` is 1-based.
    fn list(
        &self,
        path: &str,
        exts: &[String],
        page: usize,
        page_size: usize,
        filter: &ListFilter<'_>,
        cancel: Option<&dyn Cancel>,
    ) -> Result<ListPage>;
    fn clean_cache(&self);

    fn resize(&self, input: &str, output: &str, width: u32, height: u32) -> Result<()>;
    fn zip(&self, path: &str, target: &str) -> Result<()>;
    /// Extract `path` into `target`, returning the extracted file paths.
    fn unzip(&self, path: &str, target: &str, cancel: Option<&dyn Cancel>)
        -> Result<Vec<String>>;
}
