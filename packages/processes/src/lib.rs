//! Built-in process handler groups.
//!
//! [`load`] registers every static group into the process-wide registry:
//!
//! | Group | Names |
//! |---|---|
//! | [`fs`] | `fs.<store>.<op>` |
//! | [`encoding`] | `encoding.{base64,hex,json,yaml,xml}.{Encode,Decode}`, `encoding.json.{Parse,Repair}` |
//! | [`diff`] | `diff.{Patch,PatchApply,Apply,Replace}` |
//! | [`office`] | `office.{parse,parsebytes}` |
//! | [`pdf`] | `pdf.{info,split,convert}` |
//! | [`plugins`] | `plugins.<id>.<method>` |
//!
//! Widgets register themselves when loaded, see [`widgets::load`].
//!
//! ```rust
//! use yao_process::{args, Process, Value};
//!
//! yao_processes::load();
//! let patch = Process::of("diff.Patch", args!["Hello", "Hello World", false])
//!     .unwrap()
//!     .run();
//! assert!(patch.as_str().unwrap().contains("World"));
//! ```

use std::sync::Once;

pub mod diff;
pub mod encoding;
pub mod fs;
pub mod office;
pub mod pdf;
pub mod plugins;
pub mod widgets;

pub use fs::{fs_exception, ChunkRange, Download, UploadFile, UploadOptions};

static LOAD: Once = Once::new();

/// Register all static handler groups. Later calls do nothing.
pub fn load() {
    LOAD.call_once(|| {
        fs::register();
        encoding::register();
        diff::register();
        office::register();
        pdf::register();
        plugins::register();
        tracing::info!(
            handlers = yao_process::Registry::global().len(),
            "process handlers loaded"
        );
    });
}
