//! `office.parse` / `office.parsebytes`: adapters over an installed
//! [`DocumentParser`].
//!
//! Parsing itself belongs to the host: it installs a parser with
//! [`install`]. Without one, both handlers fail with `Unavailable (501)`.
//!
//! Parsers deliver media either in memory or as files. When the caller
//! passes `output_dir`, every media item ends up there as `<id>.<format>`
//! (or under its original filename) and the result lists paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use yao_process::{handler, Exception, Handler, Process, Value};

/// Caller-side limit on one parse.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("unsupported document: {0}")]
    Unsupported(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse failed: {0}")]
    Failed(String),
}

impl ParseError {
    pub fn status(&self) -> u16 {
        match self {
            ParseError::Unsupported(_) => 415,
            ParseError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => 404,
            _ => 500,
        }
    }
}

impl From<ParseError> for Exception {
    fn from(err: ParseError) -> Self {
        Exception::new(err.status(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub output_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ParseOptions {
    /// `{output_dir?, timeout?}` with the timeout in seconds.
    pub fn from_map(map: &BTreeMap<String, Value>) -> Self {
        let mut options = ParseOptions::default();
        if let Some(dir) = map.get("output_dir").and_then(Value::as_str) {
            if !dir.is_empty() {
                options.output_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(secs) = map.get("timeout").and_then(Value::as_i64) {
            if secs > 0 {
                options.timeout = Duration::from_secs(secs as u64);
            }
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaContent {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// An image or embedded object extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: String,
    /// File extension without the dot, e.g. `png`.
    pub format: String,
    pub filename: Option<String>,
    pub content: MediaContent,
}

impl Media {
    /// `<filename>` when the document named it, else `<id>.<format>`.
    pub fn output_name(&self) -> String {
        match self.filename.as_deref().and_then(|f| Path::new(f).file_name()) {
            Some(name) => name.to_string_lossy().into_owned(),
            None => format!("{}.{}", self.id, self.format),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub markdown: String,
    pub metadata: BTreeMap<String, Value>,
    pub media: Vec<Media>,
}

/// A document parser supplied by the host.
pub trait DocumentParser: Send + Sync {
    fn parse_path(&self, path: &Path, options: &ParseOptions) -> Result<ParsedDocument, ParseError>;

    fn parse_bytes(&self, data: &[u8], options: &ParseOptions)
        -> Result<ParsedDocument, ParseError>;
}

lazy_static! {
    static ref PARSER: RwLock<Option<Arc<dyn DocumentParser>>> = RwLock::new(None);
}

pub fn install(parser: Arc<dyn DocumentParser>) {
    tracing::info!("document parser installed");
    *PARSER.write() = Some(parser);
}

pub fn uninstall() {
    *PARSER.write() = None;
}

fn parser() -> Result<Arc<dyn DocumentParser>, Exception> {
    PARSER
        .read()
        .clone()
        .ok_or_else(|| Exception::unavailable("no document parser installed"))
}

pub(crate) fn handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("parse", handler(parse)),
        ("parsebytes", handler(parse_bytes)),
    ]
}

pub(crate) fn register() {
    yao_process::register_group("office", handlers());
}

pub enum Input {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// `office.parse(path, options?)`
fn parse(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let input = Input::Path(PathBuf::from(p.args_string(0)));
    let options = ParseOptions::from_map(&p.args_map(1));
    let document = run_parser(parser()?, input, &options)?;
    document_value(document, &options)
}

/// `office.parsebytes(bytes, options?)`
fn parse_bytes(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let data = match p.arg(0) {
        Some(Value::Bytes(data)) => data.clone(),
        _ => {
            return Err(Exception::bad_request(format!(
                "{}: document must be bytes",
                p.name
            )))
        }
    };
    let options = ParseOptions::from_map(&p.args_map(1));
    let document = run_parser(parser()?, Input::Bytes(data), &options)?;
    document_value(document, &options)
}

/// Run `parser` on a worker thread, giving up after `options.timeout`.
pub fn run_parser(
    parser: Arc<dyn DocumentParser>,
    input: Input,
    options: &ParseOptions,
) -> Result<ParsedDocument, Exception> {
    let (tx, rx) = mpsc::channel();
    let worker_options = options.clone();
    std::thread::spawn(move || {
        let result = match input {
            Input::Path(path) => parser.parse_path(&path, &worker_options),
            Input::Bytes(data) => parser.parse_bytes(&data, &worker_options),
        };
        // The caller may have timed out and dropped the receiver.
        let _ = tx.send(result);
    });

    match rx.recv_timeout(options.timeout) {
        Ok(result) => Ok(result?),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(timeout = ?options.timeout, "document parse timed out");
            Err(Exception::internal(format!(
                "document parse timed out after {:?}",
                options.timeout
            )))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Exception::internal("document parser stopped without a result"))
        }
    }
}

/// Place every media item into `dir`. Returns the paths written.
pub fn materialize(media: &[Media], dir: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ParseError::Io { path, source }
    };
    std::fs::create_dir_all(dir).map_err(io(dir))?;

    let mut written = Vec::with_capacity(media.len());
    for item in media {
        let target = dir.join(item.output_name());
        match &item.content {
            MediaContent::Bytes(data) => std::fs::write(&target, data).map_err(io(&target))?,
            MediaContent::Path(source) if *source == target => {}
            MediaContent::Path(source) => {
                std::fs::copy(source, &target).map_err(io(source))?;
            }
        }
        written.push(target);
    }
    Ok(written)
}

fn document_value(document: ParsedDocument, options: &ParseOptions) -> Result<Value, Exception> {
    let paths = match &options.output_dir {
        Some(dir) => Some(materialize(&document.media, dir)?),
        None => None,
    };

    let mut media = Vec::with_capacity(document.media.len());
    for (i, item) in document.media.into_iter().enumerate() {
        let mut entry = Value::map();
        entry.insert("id", item.id.as_str());
        entry.insert("format", item.format.as_str());
        entry.insert("filename", item.filename.clone());
        match (&paths, item.content) {
            (Some(paths), _) => entry.insert("path", paths[i].to_string_lossy().into_owned()),
            (None, MediaContent::Bytes(data)) => entry.insert("content", Value::Bytes(data)),
            (None, MediaContent::Path(path)) => {
                entry.insert("path", path.to_string_lossy().into_owned())
            }
        }
        media.push(entry);
    }

    let mut result = Value::map();
    result.insert("markdown", document.markdown);
    result.insert("metadata", document.metadata);
    result.insert("media", media);
    Ok(result)
}
