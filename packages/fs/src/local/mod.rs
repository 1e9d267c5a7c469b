//! Store backed by a host directory tree.
//!
//! Every public operation starts with the same pipeline:
//!
//! 1. Prefix the root, unless the path already lies in the OS temp dir.
//! 2. Reject any `..` component.
//! 3. Normalise to an absolute path.
//! 4. Apply the policy: an allow match accepts, otherwise a deny match
//!    rejects with `PermissionDenied`.
//!
//! Paths handed back to callers have the root stripped again.

mod archive;
mod cache;
mod resize;
mod temp;
mod tree;

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use parking_lot::Mutex;

use crate::filesystem::{Cancel, FileSystem, ListFilter, ListPage, WalkHandler};
use crate::{mime, FsError, Result};

use self::cache::ListCache;

/// `EXDEV`: rename across mount points.
const CROSS_DEVICE_LINK: i32 = 18;

type RenameFn = fn(&Path, &Path) -> io::Result<()>;

pub struct LocalFs {
    root: PathBuf,
    root_str: String,
    allow: Option<GlobSet>,
    deny: Option<GlobSet>,
    temp_dirs: Vec<PathBuf>,
    cache: Mutex<Option<ListCache>>,
    rename: RenameFn,
}

impl std::fmt::Debug for LocalFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFs")
            .field("root", &self.root)
            .field("allow", &self.allow.as_ref().map(GlobSet::len))
            .field("deny", &self.deny.as_ref().map(GlobSet::len))
            .finish()
    }
}

impl LocalFs {
    /// A store rooted at `root`. The directory is created when missing.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let display = root.display().to_string();
        fs::create_dir_all(root).map_err(|e| FsError::io(&display, e))?;
        let root = root.canonicalize().map_err(|e| FsError::io(&display, e))?;
        if !root.is_dir() {
            return Err(FsError::InvalidPath {
                path: display,
                reason: "root must be a directory".to_string(),
            });
        }
        Ok(Self::build(root))
    }

    /// A store without a root prefix: paths are host paths.
    pub fn unrooted() -> Self {
        Self::build(PathBuf::new())
    }

    fn build(root: PathBuf) -> Self {
        let tmp = std::env::temp_dir();
        let mut temp_dirs = vec![tmp.clone()];
        if let Ok(canonical) = tmp.canonicalize() {
            if canonical != tmp {
                temp_dirs.push(canonical);
            }
        }
        let root_str = root.to_string_lossy().into_owned();
        Self {
            root,
            root_str,
            allow: None,
            deny: None,
            temp_dirs,
            cache: Mutex::new(None),
            rename: |from, to| fs::rename(from, to),
        }
    }

    /// Patterns that always grant access, even when a deny pattern matches.
    pub fn with_allow<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allow = build_glob_set(patterns)?;
        Ok(self)
    }

    /// Patterns that reject access unless an allow pattern matches.
    pub fn with_deny<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deny = build_glob_set(patterns)?;
        Ok(self)
    }

    fn in_temp_dir(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.temp_dirs.iter().any(|t| path.starts_with(t))
    }

    /// Root prefixing and normalisation, without the policy check.
    fn prefixed(&self, path: &str) -> Result<PathBuf> {
        if path.split(['/', '\\']).any(|c| c == "..") {
            return Err(FsError::InvalidPath {
                path: path.to_string(),
                reason: "must not contain ..".to_string(),
            });
        }
        let joined = if !self.root_str.is_empty() && !self.in_temp_dir(path) {
            self.root.join(path.trim_start_matches(['/', '\\']))
        } else {
            PathBuf::from(path)
        };
        absolute(&joined).map_err(|e| FsError::io(path, e))
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let abs = self.prefixed(path)?;
        if self.permitted(&abs) {
            Ok(abs)
        } else {
            tracing::debug!(path, "denied by store policy");
            Err(FsError::PermissionDenied {
                path: path.to_string(),
                reason: "denied by store policy".to_string(),
            })
        }
    }

    fn permitted(&self, abs: &Path) -> bool {
        let relative = self.relative(abs);
        let absolute = slashed(abs);
        let matches = |set: &GlobSet| set.is_match(&relative) || set.is_match(&absolute);
        if self.allow.as_ref().is_some_and(matches) {
            return true;
        }
        !self.deny.as_ref().is_some_and(matches)
    }

    /// The store-relative view of a host path.
    fn relative(&self, abs: &Path) -> String {
        if self.root_str.is_empty() {
            return slashed(abs);
        }
        match abs.strip_prefix(&self.root) {
            Ok(rest) => format!("/{}", slashed(rest)),
            Err(_) => slashed(abs),
        }
    }

    fn metadata(&self, path: &str) -> Result<(PathBuf, Metadata)> {
        let file = self.resolve(path)?;
        let meta = fs::metadata(&file).map_err(|e| FsError::io(path, e))?;
        Ok((file, meta))
    }

    fn open_for_write(&self, path: &str, append: bool, perm: u32) -> Result<File> {
        let file = self.resolve(path)?;
        ensure_parent(&file, path)?;
        let handle = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&file)
            .map_err(|e| FsError::io(path, e))?;
        set_mode(&file, perm).map_err(|e| FsError::io(path, e))?;
        Ok(handle)
    }

    fn remove_path(&self, path: &str, recursive: bool) -> Result<()> {
        let file = self.resolve(path)?;
        let meta = match fs::symlink_metadata(&file) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::io(path, e)),
        };
        let result = match (meta.is_dir(), recursive) {
            (true, true) => fs::remove_dir_all(&file),
            (true, false) => fs::remove_dir(&file),
            (false, _) => fs::remove_file(&file),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(FsError::io(path, e)),
            _ => Ok(()),
        }
    }
}

impl FileSystem for LocalFs {
    fn root(&self) -> &str {
        &self.root_str
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.resolve(path)?;
        fs::read(file).map_err(|e| FsError::io(path, e))
    }

    fn read_closer(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let file = self.resolve(path)?;
        let handle = File::open(file).map_err(|e| FsError::io(path, e))?;
        Ok(Box::new(handle))
    }

    fn write_file(&self, path: &str, data: &[u8], perm: u32) -> Result<usize> {
        let mut handle = self.open_for_write(path, false, perm)?;
        handle.write_all(data).map_err(|e| FsError::io(path, e))?;
        Ok(data.len())
    }

    fn write(&self, path: &str, reader: &mut dyn Read, perm: u32) -> Result<usize> {
        let mut handle = self.open_for_write(path, false, perm)?;
        let n = io::copy(reader, &mut handle).map_err(|e| FsError::io(path, e))?;
        Ok(n as usize)
    }

    fn write_closer(&self, path: &str, perm: u32) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.open_for_write(path, false, perm)?))
    }

    fn append_file(&self, path: &str, data: &[u8], perm: u32) -> Result<usize> {
        let mut handle = self.open_for_write(path, true, perm)?;
        handle.write_all(data).map_err(|e| FsError::io(path, e))?;
        Ok(data.len())
    }

    fn append(&self, path: &str, reader: &mut dyn Read, perm: u32) -> Result<usize> {
        let mut handle = self.open_for_write(path, true, perm)?;
        let n = io::copy(reader, &mut handle).map_err(|e| FsError::io(path, e))?;
        Ok(n as usize)
    }

    fn insert_file(&self, path: &str, offset: u64, data: &[u8], perm: u32) -> Result<usize> {
        let file = self.resolve(path)?;
        let mut content = match fs::read(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(FsError::io(path, e)),
        };
        let at = usize::try_from(offset).map_or(content.len(), |o| o.min(content.len()));
        content.splice(at..at, data.iter().copied());
        self.write_file(path, &content, perm)?;
        Ok(data.len())
    }

    fn insert(
        &self,
        path: &str,
        offset: u64,
        reader: &mut dyn Read,
        perm: u32,
    ) -> Result<usize> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| FsError::io(path, e))?;
        self.insert_file(path, offset, &data, perm)
    }

    fn read_dir(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        let dir = self.resolve(path)?;
        let found = if recursive {
            tree::descendants(&dir).map_err(|e| FsError::io(path, e))?
        } else {
            tree::children(&dir).map_err(|e| FsError::io(path, e))?
        };
        Ok(found.iter().map(|p| self.relative(p)).collect())
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        let dir = self.resolve(path)?;
        fs::create_dir(&dir).map_err(|e| FsError::io(path, e))?;
        set_mode(&dir, perm).map_err(|e| FsError::io(path, e))
    }

    fn mkdir_all(&self, path: &str, perm: u32) -> Result<()> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir).map_err(|e| FsError::io(path, e))?;
        set_mode(&dir, perm).map_err(|e| FsError::io(path, e))
    }

    fn mkdir_temp(&self, dir: &str, pattern: &str) -> Result<String> {
        if !temp::valid_pattern(pattern) {
            return Err(FsError::InvalidPath {
                path: pattern.to_string(),
                reason: "pattern must not contain a path separator or ..".to_string(),
            });
        }
        let parent = if dir.is_empty() {
            std::env::temp_dir()
        } else {
            self.resolve(dir)?
        };
        let created = temp::create(&parent, pattern).map_err(|e| FsError::io(dir, e))?;
        let relative = self.relative(&created);
        if !self.permitted(&created) {
            if let Err(e) = fs::remove_dir(&created) {
                tracing::warn!(path = %relative, error = %e, "failed to remove denied temp dir");
            }
            return Err(FsError::PermissionDenied {
                path: relative,
                reason: "denied by store policy".to_string(),
            });
        }
        Ok(relative)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let abs = self.prefixed(pattern)?;
        let walker = glob::glob(&abs.to_string_lossy()).map_err(|e| FsError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let mut found = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| FsError::io(pattern, e.into_error()))?;
            if self.permitted(&entry) {
                found.push(self.relative(&entry));
            }
        }
        Ok(found)
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.remove_path(path, false)
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        self.remove_path(path, true)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let file = self.resolve(path)?;
        match fs::symlink_metadata(file) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::io(path, e)),
        }
    }

    fn move_path(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        ensure_parent(&to, dst)?;
        match (self.rename)(&from, &to) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
                tracing::debug!(src, dst, "cross-device move, copying");
                tree::copy(&from, &to).map_err(|e| FsError::io(dst, e))?;
                self.remove_all(src)
            }
            Err(e) => Err(FsError::io(src, e)),
        }
    }

    fn move_append(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let mut source = File::open(&from).map_err(|e| FsError::io(src, e))?;
        self.append(dst, &mut source, 0o644)?;
        drop(source);
        self.remove(src)
    }

    fn move_insert(&self, src: &str, dst: &str, offset: u64) -> Result<()> {
        let data = self.read_file(src)?;
        let perm = self.mode(dst).unwrap_or(0o644);
        self.insert_file(dst, offset, &data, perm)?;
        self.remove(src)
    }

    fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        tree::copy(&from, &to).map_err(|e| FsError::io(src, e))
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let file = self.resolve(path)?;
        set_mode(&file, mode).map_err(|e| FsError::io(path, e))
    }

    fn size(&self, path: &str) -> Result<u64> {
        Ok(self.metadata(path)?.1.len())
    }

    fn mode(&self, path: &str) -> Result<u32> {
        Ok(mode_bits(&self.metadata(path)?.1))
    }

    fn mod_time(&self, path: &str) -> Result<SystemTime> {
        self.metadata(path)?
            .1
            .modified()
            .map_err(|e| FsError::io(path, e))
    }

    fn is_dir(&self, path: &str) -> bool {
        self.metadata(path).is_ok_and(|(_, m)| m.is_dir())
    }

    fn is_file(&self, path: &str) -> bool {
        self.metadata(path).is_ok_and(|(_, m)| m.is_file())
    }

    fn is_link(&self, path: &str) -> bool {
        self.resolve(path)
            .ok()
            .and_then(|file| fs::symlink_metadata(file).ok())
            .is_some_and(|m| m.file_type().is_symlink())
    }

    fn mime_type(&self, path: &str) -> Result<String> {
        let file = self.resolve(path)?;
        mime::detect_file(&file).map_err(|e| FsError::io(path, e))
    }

    fn abs(&self, path: &str) -> Result<String> {
        Ok(slashed(&self.resolve(path)?))
    }

    fn walk(
        &self,
        root: &str,
        handler: &mut WalkHandler<'_>,
        patterns: &[String],
        cancel: Option<&dyn Cancel>,
    ) -> Result<()> {
        let dir = self.resolve(root)?;
        let patterns = build_glob_set(patterns)?;
        tree::walk(&dir, patterns.as_ref(), cancel, &mut |abs: &Path, is_dir: bool| {
            handler(&self.relative(abs), is_dir)
        })
        .map_err(|e| match e {
            tree::WalkError::Io(e) => FsError::io(root, e),
            tree::WalkError::Handler(e) => e,
            tree::WalkError::Cancelled => FsError::Cancelled {
                partial: Vec::new(),
            },
        })
    }

    fn list(
        &self,
        path: &str,
        exts: &[String],
        page: usize,
        page_size: usize,
        filter: &ListFilter<'_>,
        cancel: Option<&dyn Cancel>,
    ) -> Result<ListPage> {
        let entries = cache::entries(self, path, exts, filter, cancel)?;
        Ok(cache::paginate(&entries, page, page_size))
    }

    fn clean_cache(&self) {
        *self.cache.lock() = None;
    }

    fn resize(&self, input: &str, output: &str, width: u32, height: u32) -> Result<()> {
        let from = self.resolve(input)?;
        let to = self.resolve(output)?;
        ensure_parent(&to, output)?;
        resize::resize(&from, &to, width, height)
    }

    fn zip(&self, path: &str, target: &str) -> Result<()> {
        let from = self.resolve(path)?;
        let to = self.resolve(target)?;
        ensure_parent(&to, target)?;
        archive::zip(&from, &to)
    }

    fn unzip(
        &self,
        path: &str,
        target: &str,
        cancel: Option<&dyn Cancel>,
    ) -> Result<Vec<String>> {
        let from = self.resolve(path)?;
        let to = self.resolve(target)?;
        let relative = |p: &Path| self.relative(p);
        archive::unzip(&from, &to, cancel, &relative)
    }
}

fn build_glob_set<I, S>(patterns: I) -> Result<Option<GlobSet>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = GlobSetBuilder::new();
    let mut empty = true;
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| FsError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
        empty = false;
    }
    if empty {
        return Ok(None);
    }
    builder.build().map(Some).map_err(|e| FsError::Pattern {
        pattern: String::new(),
        reason: e.to_string(),
    })
}

/// Lexical absolute form: relative paths are joined to the working
/// directory and `.` components dropped.
fn absolute(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

fn slashed(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn ensure_parent(file: &Path, path: &str) -> Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| FsError::io(path, e))
        }
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, perm: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, perm: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(perm & 0o222 == 0);
    fs::set_permissions(path, permissions)
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}
