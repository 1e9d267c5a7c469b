//! Content-sniffed mime types.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes inspected when sniffing.
const SNIFF_LEN: u64 = 8192;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Mime type of `data` from its magic bytes. Unrecognised content is
/// `text/plain` when it is valid UTF-8 and `application/octet-stream`
/// otherwise.
pub fn detect(data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    match std::str::from_utf8(data) {
        Ok(_) => TEXT_PLAIN.to_string(),
        // A sniff window may cut a multi-byte sequence short.
        Err(e) if e.error_len().is_none() => TEXT_PLAIN.to_string(),
        Err(_) => OCTET_STREAM.to_string(),
    }
}

pub fn detect_file(path: &Path) -> io::Result<String> {
    let mut head = Vec::new();
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
    Ok(detect(&head))
}

/// The type portion of a mime string, without parameters.
pub fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}
