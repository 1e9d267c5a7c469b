//! The exception type crossing the dispatch boundary.

use std::fmt;
use std::str::FromStr;

/// Failure kinds and their numeric status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    PermissionDenied,
    NotFound,
    PayloadTooLarge,
    UnsupportedMediaType,
    Internal,
    Unavailable,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::UnsupportedMediaType => 415,
            ErrorKind::Internal => 500,
            ErrorKind::Unavailable => 501,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            400 => ErrorKind::BadRequest,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::NotFound,
            413 => ErrorKind::PayloadTooLarge,
            415 => ErrorKind::UnsupportedMediaType,
            500 => ErrorKind::Internal,
            501 => ErrorKind::Unavailable,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::BadRequest => "bad request",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::NotFound => "not found",
            ErrorKind::PayloadTooLarge => "payload too large",
            ErrorKind::UnsupportedMediaType => "unsupported media type",
            ErrorKind::Internal => "internal error",
            ErrorKind::Unavailable => "unavailable",
        };
        write!(f, "{}", name)
    }
}

/// A failure raised by a handler or by dispatch itself.
///
/// The string form is exactly `Exception|<code>: <message>`; call sites
/// parse it back with [`str::parse`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Exception|{code}: {message}")]
pub struct Exception {
    pub code: u16,
    pub message: String,
}

impl Exception {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn of(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.code(), message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::NotFound, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::PayloadTooLarge, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::UnsupportedMediaType, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::of(ErrorKind::Unavailable, message)
    }

    /// The taxonomy entry for this code, if it is one of the known kinds.
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }

    /// Raise this exception as a panic carrying the `Exception` payload.
    ///
    /// `Process::exec` recovers the payload; `Process::run` lets it unwind.
    pub fn throw(self) -> ! {
        std::panic::panic_any(self)
    }
}

/// Error returned when a string is not in `Exception|<code>: <message>` form.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("not an exception string: {input}")]
pub struct ParseExceptionError {
    pub input: String,
}

impl FromStr for Exception {
    type Err = ParseExceptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseExceptionError {
            input: s.to_string(),
        };
        let rest = s.strip_prefix("Exception|").ok_or_else(malformed)?;
        let (code, message) = rest.split_once(':').ok_or_else(malformed)?;
        let code: u16 = code.trim().parse().map_err(|_| malformed())?;
        let message = message.strip_prefix(' ').unwrap_or(message);
        Ok(Exception::new(code, message))
    }
}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::BadRequest
            }
            _ => ErrorKind::Internal,
        };
        Exception::of(kind, e.to_string())
    }
}

impl From<serde_json::Error> for Exception {
    fn from(e: serde_json::Error) -> Self {
        Exception::bad_request(e.to_string())
    }
}
