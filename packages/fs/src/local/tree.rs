//! Directory traversal and recursive copy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use walkdir::WalkDir;

use crate::filesystem::{Cancel, WalkFlow};
use crate::FsError;

pub(super) enum WalkError {
    Io(io::Error),
    Handler(FsError),
    Cancelled,
}

/// Direct children of `dir`, sorted by name.
pub(super) fn children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    found.sort();
    Ok(found)
}

/// Every entry below `dir`, depth-first pre-order, `dir` excluded.
pub(super) fn descendants(dir: &Path) -> io::Result<Vec<PathBuf>> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()).map_err(io::Error::from))
        .collect()
}

pub(super) fn walk(
    dir: &Path,
    patterns: Option<&GlobSet>,
    cancel: Option<&dyn Cancel>,
    handler: &mut dyn FnMut(&Path, bool) -> crate::Result<WalkFlow>,
) -> Result<(), WalkError> {
    let mut entries = WalkDir::new(dir).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = entries.next() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(WalkError::Cancelled);
        }
        let entry = entry.map_err(|e| WalkError::Io(e.into()))?;
        let is_dir = entry.file_type().is_dir();
        if !is_dir {
            let name = entry.file_name().to_string_lossy();
            if patterns.is_some_and(|set| !set.is_match(name.as_ref())) {
                continue;
            }
        }
        match handler(entry.path(), is_dir).map_err(WalkError::Handler)? {
            WalkFlow::Continue => {}
            WalkFlow::SkipDir => {
                if is_dir {
                    entries.skip_current_dir();
                }
            }
            WalkFlow::Stop => break,
        }
    }
    Ok(())
}

/// Copy `from` to `to`. Directories are descended, symlinks are re-created
/// with the same target, file bytes are copied.
pub(super) fn copy(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    if meta.file_type().is_symlink() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        return symlink(&fs::read_link(from)?, to);
    }
    if meta.is_dir() {
        fs::create_dir_all(to)?;
        for child in children(from)? {
            if let Some(name) = child.file_name() {
                copy(&child, &to.join(name))?;
            }
        }
        return fs::set_permissions(to, meta.permissions());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map(|_| ())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn descendants_are_preorder() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), "c").unwrap();
        fs::write(dir.path().join("a/z.txt"), "z").unwrap();
        fs::write(dir.path().join("top.txt"), "t").unwrap();

        let found: Vec<_> = descendants(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        let expected: Vec<PathBuf> = ["a", "a/b", "a/b/c.txt", "a/z.txt", "top.txt"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn walk_skips_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/hidden.txt"), "").unwrap();
        fs::write(dir.path().join("x.txt"), "").unwrap();
        fs::write(dir.path().join("y.md"), "").unwrap();

        let mut seen = Vec::new();
        let result = walk(dir.path(), None, None, &mut |p: &Path, is_dir: bool| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            seen.push(name.clone());
            Ok(if is_dir && name == "skip" {
                WalkFlow::SkipDir
            } else if name == "x.txt" {
                WalkFlow::Stop
            } else {
                WalkFlow::Continue
            })
        });
        assert!(result.is_ok());
        assert_eq!(seen, vec!["skip", "x.txt"]);
    }

    #[test]
    fn walk_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "").unwrap();
        let cancel = AtomicBool::new(true);
        let result = walk(dir.path(), None, Some(&cancel), &mut |_: &Path, _: bool| {
            Ok(WalkFlow::Continue)
        });
        assert!(matches!(result, Err(WalkError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn copy_preserves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/file.txt"), "data").unwrap();
        symlink(Path::new("sub/file.txt"), &src.join("link")).unwrap();

        let dst = dir.path().join("dst");
        copy(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("sub/file.txt")).unwrap(), "data");
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap(),
            PathBuf::from("sub/file.txt")
        );
    }
}
