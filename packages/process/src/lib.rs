//! Process Registry: name-addressed dispatch.
//!
//! Every capability of the framework is reachable through one call
//! surface: a dotted process name plus a positional argument vector.
//!
//! - `Value`: the heterogeneous argument/result sum
//! - `Process`: one invocation (parsed name, args, session, context)
//! - `Registry`: canonical name → handler table
//! - `Exception`: numeric status + message, `Exception|<code>: <msg>`
//!
//! # Example
//!
//! ```rust
//! use yao_process::{args, register, Process, Value};
//!
//! register("demo.hello", |p| Ok(Value::from(format!("Hello {}", p.args_string(0)))));
//!
//! let value = Process::of("demo.Hello", args!["World"]).unwrap().run();
//! assert_eq!(value, Value::from("Hello World"));
//! ```

mod args;
mod auth;
pub mod bridge;
mod context;
mod error;
mod name;
mod process;
pub mod registry;
mod value;

pub use args::{to_bool, to_i64, to_string, QueryParams};
pub use auth::{AuthorizedInfo, DataConstraints};
pub use context::Context;
pub use error::{ErrorKind, Exception, ParseExceptionError};
pub use name::ProcessName;
pub use process::{exception_from_panic, Callback, Process};
pub use registry::{
    alias, exists, handler, register, register_dynamic, register_dynamic_group, register_group,
    unregister, unregister_group, Handler, Registry,
};
pub use value::{Foreign, Value};
