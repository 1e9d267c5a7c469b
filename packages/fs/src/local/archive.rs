use std::fs::{self, File};
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::filesystem::Cancel;
use crate::{FsError, Result};

/// Archive `source` (a file or a directory tree) into `target`. Entry
/// names are relative to `source`'s parent for files and to `source`
/// itself for directories.
pub(super) fn zip(source: &Path, target: &Path) -> Result<()> {
    let display = target.display().to_string();
    let file = File::create(target).map_err(|e| FsError::io(&display, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        let mut input = File::open(source).map_err(|e| FsError::io(&display, e))?;
        io::copy(&mut input, &mut writer).map_err(|e| FsError::io(&display, e))?;
    } else {
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| FsError::io(&display, e.into()))?;
            let Ok(rel) = entry.path().strip_prefix(source) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type().is_dir() {
                writer.add_directory(name, options)?;
            } else {
                writer.start_file(name, options)?;
                let mut input =
                    File::open(entry.path()).map_err(|e| FsError::io(&display, e))?;
                io::copy(&mut input, &mut writer).map_err(|e| FsError::io(&display, e))?;
            }
        }
    }
    writer.finish()?;
    Ok(())
}

/// Extract `source` into `target`. Entries escaping `target` are skipped.
pub(super) fn unzip(
    source: &Path,
    target: &Path,
    cancel: Option<&dyn Cancel>,
    relative: &dyn Fn(&Path) -> String,
) -> Result<Vec<String>> {
    let display = source.display().to_string();
    let file = File::open(source).map_err(|e| FsError::io(&display, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(FsError::Cancelled { partial: extracted });
        }
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping unsafe zip entry");
            continue;
        };
        let out = target.join(name);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| FsError::io(&display, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| FsError::io(&display, e))?;
        }
        let mut file = File::create(&out).map_err(|e| FsError::io(&display, e))?;
        io::copy(&mut entry, &mut file).map_err(|e| FsError::io(&display, e))?;
        apply_mode(&out, entry.unix_mode()).map_err(|e| FsError::io(&display, e))?;
        extracted.push(relative(&out));
    }
    Ok(extracted)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
