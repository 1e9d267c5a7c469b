//! `fs.<store>.<op>` handlers.
//!
//! The store is the invocation's id, looked up in the user store registry.
//! A missing store is fatal for the invocation.

pub mod upload;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use yao_fs::{Cancel, FileSystem, FsError};
use yao_process::{handler, Context, Exception, Handler, Process, Value};

pub use upload::{ChunkRange, UploadFile, UploadOptions};

const DEFAULT_PERM: u32 = 0o777;

/// Lift a store error into the dispatch error taxonomy. A cancelled walk
/// lists the entries it had collected after the message.
pub fn fs_exception(err: FsError) -> Exception {
    let status = err.status();
    match &err {
        FsError::Cancelled { partial } if !partial.is_empty() => {
            Exception::new(status, format!("{}: {}", err, partial.join(", ")))
        }
        _ => Exception::new(status, err.to_string()),
    }
}

/// Cancellation of the invocation's context, deadline included.
struct ContextCancel<'a>(&'a Context);

impl Cancel for ContextCancel<'_> {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// The store named by the invocation id.
fn store(p: &Process) -> Arc<dyn FileSystem> {
    match yao_fs::get(&p.id) {
        Ok(store) => store,
        Err(e) => fs_exception(e).throw(),
    }
}

/// A readable stream returned by `fs.<store>.download`.
pub struct Download {
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    pub mime: String,
}

impl Download {
    pub fn new(reader: Box<dyn Read + Send>, mime: impl Into<String>) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            mime: mime.into(),
        }
    }

    /// Take the stream. Only the first call gets it.
    pub fn take(&self) -> Option<Box<dyn Read + Send>> {
        self.reader.lock().take()
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download").field("mime", &self.mime).finish()
    }
}

pub(crate) fn handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("readfile", handler(read_file)),
        ("readfilebuffer", handler(read_file_buffer)),
        ("writefile", handler(write_file)),
        ("writefilebuffer", handler(write_file_buffer)),
        ("appendfile", handler(append_file)),
        ("appendfilebuffer", handler(append_file_buffer)),
        ("insertfile", handler(insert_file)),
        ("insertfilebuffer", handler(insert_file_buffer)),
        ("readdir", handler(read_dir)),
        ("glob", handler(glob)),
        ("mkdir", handler(mkdir)),
        ("mkdirall", handler(mkdir_all)),
        ("mkdirtemp", handler(mkdir_temp)),
        ("remove", handler(remove)),
        ("removeall", handler(remove_all)),
        ("exists", handler(exists)),
        ("isdir", handler(is_dir)),
        ("isfile", handler(is_file)),
        ("islink", handler(is_link)),
        ("chmod", handler(chmod)),
        ("size", handler(size)),
        ("mode", handler(mode)),
        ("modtime", handler(mod_time)),
        ("basename", handler(base_name)),
        ("dirname", handler(dir_name)),
        ("extname", handler(ext_name)),
        ("mimetype", handler(mime_type)),
        ("move", handler(move_path)),
        ("moveappend", handler(move_append)),
        ("moveinsert", handler(move_insert)),
        ("copy", handler(copy)),
        ("upload", handler(upload::handle)),
        ("download", handler(download)),
        ("zip", handler(zip)),
        ("unzip", handler(unzip)),
        ("abs", handler(abs)),
    ]
}

pub(crate) fn register() {
    yao_process::register_group("fs", handlers());
}

fn read_file(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let data = store(p).read_file(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(String::from_utf8_lossy(&data).into_owned()))
}

fn read_file_buffer(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let data = store(p).read_file(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::Bytes(data))
}

/// The byte content at `i`, which must be a byte sequence.
fn bytes_arg(p: &Process, i: usize) -> Result<Vec<u8>, Exception> {
    match p.arg(i) {
        Some(Value::Bytes(data)) => Ok(data.clone()),
        Some(other) => Err(Exception::bad_request(format!(
            "{}: content must be bytes, got {}",
            p.name,
            other.kind()
        ))),
        None => Err(Exception::bad_request(format!("{}: content is required", p.name))),
    }
}

fn write_file(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let content = p.args_string(1);
    let n = store(p)
        .write_file(&p.args_string(0), content.as_bytes(), p.args_uint32_or(2, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn write_file_buffer(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let content = bytes_arg(p, 1)?;
    let n = store(p)
        .write_file(&p.args_string(0), &content, p.args_uint32_or(2, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn append_file(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let content = p.args_string(1);
    let n = store(p)
        .append_file(&p.args_string(0), content.as_bytes(), p.args_uint32_or(2, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn append_file_buffer(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let content = bytes_arg(p, 1)?;
    let n = store(p)
        .append_file(&p.args_string(0), &content, p.args_uint32_or(2, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn offset_arg(p: &Process, i: usize) -> Result<u64, Exception> {
    u64::try_from(p.args_int(i))
        .map_err(|_| Exception::bad_request(format!("{}: offset must not be negative", p.name)))
}

fn insert_file(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(3)?;
    let offset = offset_arg(p, 1)?;
    let content = p.args_string(2);
    let n = store(p)
        .insert_file(
            &p.args_string(0),
            offset,
            content.as_bytes(),
            p.args_uint32_or(3, DEFAULT_PERM),
        )
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn insert_file_buffer(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(3)?;
    let offset = offset_arg(p, 1)?;
    let content = bytes_arg(p, 2)?;
    let n = store(p)
        .insert_file(&p.args_string(0), offset, &content, p.args_uint32_or(3, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn read_dir(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let entries = store(p)
        .read_dir(&p.args_string(0), p.args_bool_or(1, false))
        .map_err(fs_exception)?;
    Ok(Value::from(entries))
}

fn glob(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let found = store(p).glob(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(found))
}

fn mkdir(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    store(p)
        .mkdir(&p.args_string(0), p.args_uint32_or(1, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn mkdir_all(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    store(p)
        .mkdir_all(&p.args_string(0), p.args_uint32_or(1, DEFAULT_PERM))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn mkdir_temp(p: &mut Process) -> Result<Value, Exception> {
    let dir = store(p)
        .mkdir_temp(&p.args_string(0), &p.args_string(1))
        .map_err(fs_exception)?;
    Ok(Value::from(dir))
}

fn remove(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    store(p).remove(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::Null)
}

fn remove_all(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    store(p).remove_all(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::Null)
}

fn exists(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let found = store(p).exists(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(found))
}

fn is_dir(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    Ok(Value::from(store(p).is_dir(&p.args_string(0))))
}

fn is_file(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    Ok(Value::from(store(p).is_file(&p.args_string(0))))
}

fn is_link(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    Ok(Value::from(store(p).is_link(&p.args_string(0))))
}

fn chmod(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    store(p)
        .chmod(&p.args_string(0), p.args_uint32(1))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn size(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let n = store(p).size(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(n))
}

fn mode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let m = store(p).mode(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(m))
}

/// Unix seconds.
fn mod_time(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let t = store(p).mod_time(&p.args_string(0)).map_err(fs_exception)?;
    let secs = t
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Ok(Value::from(secs))
}

fn base_name(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let path = p.args_string(0);
    let name = Path::new(&path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Value::from(name))
}

fn dir_name(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let path = p.args_string(0);
    let dir = match Path::new(&path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        Some(_) => ".".to_string(),
        None => path.clone(),
    };
    Ok(Value::from(dir))
}

/// Extension without the leading dot.
fn ext_name(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let path = p.args_string(0);
    let ext = Path::new(&path)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Value::from(ext))
}

fn mime_type(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let mime = store(p).mime_type(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(mime))
}

fn move_path(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    store(p)
        .move_path(&p.args_string(0), &p.args_string(1))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn move_append(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    store(p)
        .move_append(&p.args_string(0), &p.args_string(1))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn move_insert(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(3)?;
    let offset = offset_arg(p, 2)?;
    store(p)
        .move_insert(&p.args_string(0), &p.args_string(1), offset)
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn copy(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    store(p)
        .copy(&p.args_string(0), &p.args_string(1))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

/// `{type, content}` where `content` wraps a [`Download`].
fn download(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let fs = store(p);
    let path = p.args_string(0);
    let mime = fs.mime_type(&path).map_err(fs_exception)?;
    let reader = fs.read_closer(&path).map_err(fs_exception)?;

    let mut result = Value::map();
    result.insert("type", mime.clone());
    result.insert("content", Value::foreign(Download::new(reader, mime)));
    Ok(result)
}

fn zip(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    store(p)
        .zip(&p.args_string(0), &p.args_string(1))
        .map_err(fs_exception)?;
    Ok(Value::Null)
}

fn unzip(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(2)?;
    let cancel = p.context.as_ref().map(ContextCancel);
    let files = store(p)
        .unzip(
            &p.args_string(0),
            &p.args_string(1),
            cancel.as_ref().map(|c| c as &dyn Cancel),
        )
        .map_err(fs_exception)?;
    Ok(Value::from(files))
}

fn abs(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let path = store(p).abs(&p.args_string(0)).map_err(fs_exception)?;
    Ok(Value::from(path))
}
