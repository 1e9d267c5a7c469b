//! Temporary directory naming, after the mkstemp family.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;

const ATTEMPTS: usize = 10_000;

/// The directory name for `pattern` with `random` substituted: the last
/// `*` is replaced, otherwise `random` is appended.
pub(super) fn name(pattern: &str, random: &str) -> String {
    match pattern.rfind('*') {
        Some(i) => format!("{}{}{}", &pattern[..i], random, &pattern[i + 1..]),
        None => format!("{}{}", pattern, random),
    }
}

/// A pattern names one entry of the parent: no separators, no `..`.
pub(super) fn valid_pattern(pattern: &str) -> bool {
    !pattern.contains(['/', '\\']) && !pattern.contains("..")
}

/// Create a fresh directory under `parent`, creating `parent` itself when
/// missing. A `parent` that is a regular file is an error.
pub(super) fn create(parent: &Path, pattern: &str) -> io::Result<PathBuf> {
    match fs::metadata(parent) {
        Ok(meta) if !meta.is_dir() => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", parent.display()),
            ));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(parent)?,
        Err(e) => return Err(e),
    }

    let mut rng = rand::thread_rng();
    for _ in 0..ATTEMPTS {
        let random = rng.gen::<u32>().to_string();
        let candidate = parent.join(name(pattern, &random));
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no unused name for {} in {}", pattern, parent.display()),
    ))
}
