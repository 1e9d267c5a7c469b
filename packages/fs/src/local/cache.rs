//! Paginated listing with a single best-effort cache per store.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use super::tree::{self, WalkError};
use super::LocalFs;
use crate::filesystem::{Cancel, ListFilter, ListPage, WalkFlow};
use crate::{FsError, Result};

const TTL: Duration = Duration::from_secs(10 * 60);

pub(super) struct ListCache {
    path: String,
    exts: Vec<String>,
    built: Instant,
    entries: Vec<String>,
}

impl ListCache {
    fn serves(&self, path: &str, exts: &[String], filter: &ListFilter<'_>) -> bool {
        self.path == path
            && self.exts == exts
            && self.built.elapsed() < TTL
            && self.entries.iter().all(|e| filter(e.as_str()))
    }
}

/// Matching files under `path`, newest first.
pub(super) fn entries(
    store: &LocalFs,
    path: &str,
    exts: &[String],
    filter: &ListFilter<'_>,
    cancel: Option<&dyn Cancel>,
) -> Result<Vec<String>> {
    let exts = normalize(exts);
    if let Some(cache) = store.cache.lock().as_ref() {
        if cache.serves(path, &exts, filter) {
            tracing::trace!(path, "list cache hit");
            return Ok(cache.entries.clone());
        }
    }

    let dir = store.resolve(path)?;
    let mut found: Vec<(String, SystemTime)> = Vec::new();
    let walked = tree::walk(&dir, None, cancel, &mut |abs: &Path, is_dir: bool| {
        if is_dir || !has_ext(abs, &exts) || !store.permitted(abs) {
            return Ok(WalkFlow::Continue);
        }
        let relative = store.relative(abs);
        if filter(relative.as_str()) {
            let modified = fs::metadata(abs)
                .and_then(|m| m.modified())
                .map_err(|e| FsError::io(&relative, e))?;
            found.push((relative, modified));
        }
        Ok(WalkFlow::Continue)
    });
    match walked {
        Ok(()) => {}
        Err(WalkError::Cancelled) => {
            return Err(FsError::Cancelled {
                partial: found.into_iter().map(|(p, _)| p).collect(),
            });
        }
        Err(WalkError::Io(e)) => return Err(FsError::io(path, e)),
        Err(WalkError::Handler(e)) => return Err(e),
    }

    found.sort_by(|a, b| b.1.cmp(&a.1));
    let entries: Vec<String> = found.into_iter().map(|(p, _)| p).collect();
    tracing::debug!(path, total = entries.len(), "list cache rebuilt");
    *store.cache.lock() = Some(ListCache {
        path: path.to_string(),
        exts,
        built: Instant::now(),
        entries: entries.clone(),
    });
    Ok(entries)
}

/// Slice out 1-based `page`. Pages past the end are empty.
pub(super) fn paginate(entries: &[String], page: usize, page_size: usize) -> ListPage {
    let total = entries.len();
    if page_size == 0 {
        return ListPage {
            paths: Vec::new(),
            total,
            pages: 0,
        };
    }
    let start = (page.max(1) - 1).saturating_mul(page_size);
    ListPage {
        paths: entries.iter().skip(start).take(page_size).cloned().collect(),
        total,
        pages: total.div_ceil(page_size),
    }
}

/// Lowercased, dot-prefixed extensions.
fn normalize(exts: &[String]) -> Vec<String> {
    let mut out: Vec<String> = exts
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .collect();
    out.sort();
    out.dedup();
    out
}

fn has_ext(path: &Path, exts: &[String]) -> bool {
    if exts.is_empty() {
        return true;
    }
    match path.extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
            exts.contains(&ext)
        }
        None => false,
    }
}
