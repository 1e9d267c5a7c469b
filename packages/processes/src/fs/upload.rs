//! `fs.<store>.upload`: whole-file and chunked uploads.
//!
//! Files land at `/<YYYYMMDD>/<hash><ext>`. Chunked uploads either grow
//! the target in place (sync) or are staged as `<from>-<to>.chunk` files
//! under `/upload/tmp/<hash>/` and folded together once every byte has
//! arrived (async). Chunk order is always rederived from the file names.
//!
//! Every rejected upload removes what it received before failing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use yao_fs::{mime, FileSystem};
use yao_process::{Exception, Process, Value};

use super::{fs_exception, store};

/// Default `maxFilesize`: 1 MiB.
pub const DEFAULT_MAX_FILESIZE: u64 = 1024 * 1024;

const STAGING_ROOT: &str = "/upload/tmp";
const CHUNK_SUFFIX: &str = ".chunk";

/// Byte range of one chunk; `end` is inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

/// A received upload, as handed over by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadFile {
    /// Where the transport stored the received bytes.
    pub temp_file: String,
    /// The client's file name.
    pub name: String,
    /// Client-chosen id shared by every chunk of one file.
    pub uid: String,
    /// Grow the target in place instead of staging chunks.
    pub sync: bool,
    pub range: Option<ChunkRange>,
}

impl UploadFile {
    /// Accepts a `Foreign` upload descriptor or its map form.
    pub fn from_value(value: &Value) -> Option<UploadFile> {
        if let Some(file) = value.downcast_ref::<UploadFile>() {
            return Some(file.clone());
        }
        if value.is_map() {
            return serde_json::from_value(value.to_json()).ok();
        }
        None
    }

    pub fn is_chunk(&self) -> bool {
        self.range.is_some()
    }

    pub fn total_size(&self) -> u64 {
        self.range.map(|r| r.total).unwrap_or_default()
    }

    /// Hex md5 of the uid, falling back to the temp file path.
    pub fn hash(&self) -> String {
        let key = if self.uid.is_empty() {
            &self.temp_file
        } else {
            &self.uid
        };
        hex::encode(Md5::digest(key.as_bytes()))
    }

    /// `<start>-<end>.chunk`; the final chunk also carries the total as
    /// `<start>-<end>_<total>.chunk`.
    pub fn chunk_file_name(&self) -> String {
        let r = self.range.unwrap_or_default();
        if r.total > 0 && r.end + 1 >= r.total {
            format!("{}-{}_{}{}", r.start, r.end, r.total, CHUNK_SUFFIX)
        } else {
            format!("{}-{}{}", r.start, r.end, CHUNK_SUFFIX)
        }
    }

    /// The extension of [`UploadFile::name`], dot included.
    fn ext(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }

    fn target(&self, day: &str) -> String {
        format!("/{}/{}{}", day, self.hash(), self.ext())
    }
}

/// Validation properties for an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// `.ext`, `type/subtype` or `type/*` entries; empty accepts anything.
    pub accept: Vec<String>,
    pub max_filesize: u64,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            accept: Vec::new(),
            max_filesize: DEFAULT_MAX_FILESIZE,
        }
    }
}

lazy_static! {
    static ref SIZE: Regex = Regex::new(r"(?i)^\s*(\d+)\s*([KM])?B?\s*$").unwrap();
}

/// `1024`, `100K` or `5M` as bytes.
pub fn parse_size(s: &str) -> Option<u64> {
    let caps = SIZE.captures(s)?;
    let n: u64 = caps[1].parse().ok()?;
    let unit = match caps.get(2).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(u) if u == "K" => 1024,
        Some(u) if u == "M" => 1024 * 1024,
        _ => 1,
    };
    n.checked_mul(unit)
}

impl UploadOptions {
    pub fn from_map(map: &BTreeMap<String, Value>) -> Result<Self, Exception> {
        let mut options = UploadOptions::default();
        if let Some(accept) = map.get("accept").and_then(Value::as_str) {
            options.accept = accept
                .split(',')
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect();
        }
        match map.get("maxFilesize") {
            None | Some(Value::Null) => {}
            Some(Value::Integer(n)) if *n >= 0 => options.max_filesize = *n as u64,
            Some(Value::String(s)) => {
                options.max_filesize = parse_size(s).ok_or_else(|| {
                    Exception::bad_request(format!("invalid maxFilesize {:?}", s))
                })?;
            }
            Some(other) => {
                return Err(Exception::bad_request(format!(
                    "invalid maxFilesize of type {}",
                    other.kind()
                )))
            }
        }
        Ok(options)
    }

    /// Whether a file called `name` with content type `mime` passes
    /// `accept`.
    pub fn accepts(&self, name: &str, mime: &str) -> bool {
        if self.accept.is_empty() {
            return true;
        }
        let ext = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let mime = mime::essence(mime).to_lowercase();
        self.accept.iter().any(|entry| {
            if entry.starts_with('.') {
                *entry == ext
            } else if let Some(prefix) = entry.strip_suffix("/*") {
                mime.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
            } else {
                *entry == mime
            }
        })
    }
}

/// The handler: `(file, options?)`.
pub(crate) fn handle(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let file = p
        .arg(0)
        .and_then(UploadFile::from_value)
        .ok_or_else(|| Exception::bad_request(format!("{}: invalid upload file", p.name)))?;
    let options = UploadOptions::from_map(&p.args_map(1))?;
    let day = chrono::Local::now().format("%Y%m%d").to_string();
    receive(store(p).as_ref(), &file, &options, &day)
}

/// Place `file` into `store`, dated `day` (`YYYYMMDD`).
///
/// Returns the target path once the file is complete, or a progress record
/// `{path, uid, progress: {total, uploaded, completed}}` while chunks are
/// still missing.
pub fn receive(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    day: &str,
) -> Result<Value, Exception> {
    match (file.is_chunk(), file.sync) {
        (false, _) => receive_whole(store, file, options, day),
        (true, true) => receive_sync_chunk(store, file, options, day),
        (true, false) => receive_staged_chunk(store, file, options, day),
    }
}

/// Remove whatever was received at `path`.
fn discard(store: &dyn FileSystem, path: &str) {
    if let Err(e) = store.remove_all(path) {
        tracing::warn!(path, error = %e, "cannot remove rejected upload");
    }
}

/// Remove `path`, then fail with `err`.
fn reject(store: &dyn FileSystem, path: &str, err: Exception) -> Result<Value, Exception> {
    tracing::info!(path, code = err.code, reason = %err.message, "upload rejected");
    discard(store, path);
    Err(err)
}

fn check_accept(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    content: &str,
) -> Result<(), Exception> {
    if options.accept.is_empty() {
        return Ok(());
    }
    let mime = store.mime_type(content).map_err(fs_exception)?;
    if options.accepts(&file.name, &mime) {
        Ok(())
    } else {
        Err(Exception::unsupported_media_type(format!(
            "{} ({}) is not one of {}",
            file.name,
            mime,
            options.accept.join(",")
        )))
    }
}

fn too_large(name: &str, size: u64, max: u64) -> Exception {
    Exception::payload_too_large(format!("{} is {} bytes, limit is {}", name, size, max))
}

fn receive_whole(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    day: &str,
) -> Result<Value, Exception> {
    let temp = &file.temp_file;
    if let Err(e) = check_accept(store, file, options, temp) {
        return reject(store, temp, e);
    }
    let size = store.size(temp).map_err(fs_exception)?;
    if size > options.max_filesize {
        return reject(store, temp, too_large(&file.name, size, options.max_filesize));
    }

    let target = file.target(day);
    store.move_path(temp, &target).map_err(fs_exception)?;
    tracing::debug!(target = %target, size, "upload stored");
    Ok(Value::from(target))
}

fn progress(target: &str, file: &UploadFile, total: u64, uploaded: u64) -> Value {
    let mut progress = Value::map();
    progress.insert("total", total);
    progress.insert("uploaded", uploaded);
    progress.insert("completed", false);

    let mut record = Value::map();
    record.insert("path", target);
    record.insert("uid", file.uid.as_str());
    record.insert("progress", progress);
    record
}

fn receive_sync_chunk(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    day: &str,
) -> Result<Value, Exception> {
    let target = file.target(day);
    store
        .move_append(&file.temp_file, &target)
        .map_err(fs_exception)?;

    let uploaded = store.size(&target).map_err(fs_exception)?;
    if uploaded > options.max_filesize {
        return reject(store, &target, too_large(&file.name, uploaded, options.max_filesize));
    }
    let total = file.total_size();
    if uploaded < total {
        return Ok(progress(&target, file, total, uploaded));
    }
    if let Err(e) = check_accept(store, file, options, &target) {
        return reject(store, &target, e);
    }
    tracing::debug!(target = %target, size = uploaded, "chunked upload complete");
    Ok(Value::from(target))
}

/// A staged chunk, parsed from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Chunk {
    path: String,
    from: u64,
    total: Option<u64>,
}

/// `<from>-<to>[_<total>].chunk`
fn parse_chunk_name(path: &str) -> Option<Chunk> {
    let name = Path::new(path).file_name()?.to_str()?;
    let stem = name.strip_suffix(CHUNK_SUFFIX)?;
    let mut tokens = stem.split('_');
    let range = tokens.next()?;
    let total = match tokens.last() {
        Some(t) => Some(t.parse().ok()?),
        None => None,
    };
    let (from, _) = range.split_once('-')?;
    Some(Chunk {
        path: path.to_string(),
        from: from.parse().ok()?,
        total,
    })
}

/// Staged chunks in `from` order, the announced total, and the bytes
/// received so far.
fn scan_staging(
    store: &dyn FileSystem,
    staging: &str,
) -> Result<(Vec<Chunk>, Option<u64>, u64), Exception> {
    let mut chunks: Vec<Chunk> = store
        .read_dir(staging, false)
        .map_err(fs_exception)?
        .iter()
        .filter_map(|p| parse_chunk_name(p))
        .collect();
    chunks.sort_by_key(|c| c.from);

    let total = chunks.iter().find_map(|c| c.total);
    let mut uploaded = 0;
    for chunk in &chunks {
        uploaded += store.size(&chunk.path).map_err(fs_exception)?;
    }
    Ok((chunks, total, uploaded))
}

lazy_static! {
    static ref STAGING_LOCKS: Mutex<HashMap<String, Arc<Mutex<()>>>> =
        Mutex::new(HashMap::new());
}

/// Run `f` while holding the staging lock for `hash`. Chunks of one upload
/// are placed, counted and folded one at a time, so exactly one call sees
/// the staging directory complete.
fn with_staging_lock<T>(hash: &str, f: impl FnOnce() -> T) -> T {
    let lock = Arc::clone(STAGING_LOCKS.lock().entry(hash.to_string()).or_default());
    let result = {
        let _guard = lock.lock();
        f()
    };
    let mut locks = STAGING_LOCKS.lock();
    // Only the table and this call hold it: nobody is waiting.
    if Arc::strong_count(&lock) == 2 {
        locks.remove(hash);
    }
    result
}

fn receive_staged_chunk(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    day: &str,
) -> Result<Value, Exception> {
    let hash = file.hash();
    with_staging_lock(&hash, || stage_chunk(store, file, options, day, &hash))
}

fn stage_chunk(
    store: &dyn FileSystem,
    file: &UploadFile,
    options: &UploadOptions,
    day: &str,
    hash: &str,
) -> Result<Value, Exception> {
    let staging = format!("{}/{}", STAGING_ROOT, hash);
    if file.total_size() > options.max_filesize {
        discard(store, &staging);
        let err = too_large(&file.name, file.total_size(), options.max_filesize);
        return reject(store, &file.temp_file, err);
    }

    let chunk = format!("{}/{}", staging, file.chunk_file_name());
    store
        .move_path(&file.temp_file, &chunk)
        .map_err(fs_exception)?;

    let (chunks, announced, uploaded) = scan_staging(store, &staging)?;
    let total = announced.unwrap_or_else(|| file.total_size());
    let target = file.target(day);
    if total == 0 || uploaded < total {
        return Ok(progress(&target, file, total, uploaded));
    }
    if uploaded > options.max_filesize {
        return reject(store, &staging, too_large(&file.name, uploaded, options.max_filesize));
    }

    if let Some(first) = chunks.first() {
        if let Err(e) = check_accept(store, file, options, &first.path) {
            return reject(store, &staging, e);
        }
    }
    store.remove_all(&target).map_err(fs_exception)?;
    for chunk in &chunks {
        store
            .move_append(&chunk.path, &target)
            .map_err(fs_exception)?;
    }
    store.remove_all(&staging).map_err(fs_exception)?;
    tracing::debug!(target = %target, chunks = chunks.len(), size = uploaded, "chunks assembled");
    Ok(Value::from(target))
}
