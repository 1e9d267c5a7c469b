use std::io;

/// Errors produced by filesystem stores and the store registries.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("{path}: no such file or directory")]
    NotFound { path: String },

    #[error("{path}: permission denied ({reason})")]
    PermissionDenied { path: String, reason: String },

    #[error("{path}: invalid path ({reason})")]
    InvalidPath { path: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A walk observed cancellation. `partial` holds what was collected
    /// before the cursor was abandoned.
    #[error("operation cancelled after {} entries", partial.len())]
    Cancelled { partial: Vec<String> },

    #[error("invalid pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("store {0} does not exist")]
    StoreNotFound(String),

    #[error("store {0} is root-only")]
    RootOnly(String),

    #[error("invalid store config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Attach `path` to an I/O error, lifting the kinds callers branch on.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => FsError::NotFound { path },
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied {
                path,
                reason: source.to_string(),
            },
            _ => FsError::Io { path, source },
        }
    }

    /// Numeric status in the dispatch error taxonomy.
    pub fn status(&self) -> u16 {
        match self {
            FsError::NotFound { .. } | FsError::StoreNotFound(_) => 404,
            FsError::PermissionDenied { .. } | FsError::RootOnly(_) => 403,
            FsError::InvalidPath { .. }
            | FsError::Unsupported(_)
            | FsError::Pattern { .. }
            | FsError::Config(_) => 400,
            FsError::Io { source, .. } => match source.kind() {
                io::ErrorKind::AlreadyExists | io::ErrorKind::InvalidInput => 400,
                _ => 500,
            },
            FsError::Cancelled { .. } | FsError::Image(_) | FsError::Zip(_) => 500,
        }
    }
}
