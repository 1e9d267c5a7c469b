//! The process invocation record.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::auth::AuthorizedInfo;
use crate::bridge::Runtime;
use crate::context::Context;
use crate::name::ProcessName;
use crate::registry::{Handler, Registry};
use crate::{Exception, Value};

/// Callback a handler may invoke with intermediate results.
pub type Callback = Arc<dyn Fn(&Value) -> Result<(), Exception> + Send + Sync>;

/// A single process invocation.
///
/// Created by [`Process::of`], consumed by [`Process::exec`] or
/// [`Process::run`]. Handlers receive `&mut Process` and must not keep
/// it past their return.
pub struct Process {
    /// The name as given by the caller.
    pub name: String,
    /// First segment, lowercased.
    pub group: String,
    /// Dot-joined middle segments.
    pub id: String,
    /// Last segment.
    pub method: String,
    /// Canonical registry key.
    pub handler: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Session id.
    pub sid: String,
    /// Shared key → value data; handlers may mutate it.
    pub global: BTreeMap<String, Value>,
    /// Cancellation context.
    pub context: Option<Context>,
    /// Identity set by guard layers.
    pub authorized: Option<AuthorizedInfo>,
    pub runtime: Option<Arc<dyn Runtime>>,
    pub callback: Option<Callback>,
    resolved: Handler,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("id", &self.id)
            .field("method", &self.method)
            .field("args", &self.args)
            .field("sid", &self.sid)
            .finish_non_exhaustive()
    }
}

impl Process {
    /// Build an invocation against the process-wide registry.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is malformed or no handler is registered.
    pub fn of(name: &str, args: Vec<Value>) -> Result<Process, Exception> {
        Self::resolve(Registry::global(), name, args)
    }

    /// Like [`Process::of`], but a missing handler is a fatal programmer
    /// error: the `NotFound` exception is raised as a panic.
    pub fn new(name: &str, args: Vec<Value>) -> Process {
        match Self::of(name, args) {
            Ok(p) => p,
            Err(e) => e.throw(),
        }
    }

    pub(crate) fn resolve(
        registry: &Registry,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Process, Exception> {
        let parsed = ProcessName::parse(name)?;
        let resolved = registry.get(&parsed.handler).ok_or_else(|| {
            Exception::not_found(format!("{} Handler -> {} not found", name, parsed.handler))
        })?;

        Ok(Process {
            name: parsed.name,
            group: parsed.group,
            id: parsed.id,
            method: parsed.method,
            handler: parsed.handler,
            args,
            sid: String::new(),
            global: BTreeMap::new(),
            context: None,
            authorized: None,
            runtime: None,
            callback: None,
            resolved,
        })
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = sid.into();
        self
    }

    pub fn with_global(mut self, global: BTreeMap<String, Value>) -> Self {
        self.global = global;
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_authorized(mut self, authorized: AuthorizedInfo) -> Self {
        self.authorized = Some(authorized);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Call the handler, returning its failure (including a raised
    /// exception) as `Err`.
    pub fn exec(mut self) -> Result<Value, Exception> {
        let h = Arc::clone(&self.resolved);
        match panic::catch_unwind(AssertUnwindSafe(|| h(&mut self))) {
            Ok(result) => result,
            Err(payload) => Err(exception_from_panic(payload)),
        }
    }

    /// Call the handler and return its value. A failure is raised as a
    /// panic carrying the [`Exception`].
    pub fn run(mut self) -> Value {
        let h = Arc::clone(&self.resolved);
        match h(&mut self) {
            Ok(value) => value,
            Err(e) => e.throw(),
        }
    }

    /// True when the invocation's context was cancelled or timed out.
    pub fn is_cancelled(&self) -> bool {
        self.context.as_ref().is_some_and(Context::is_cancelled)
    }

    /// Invoke the callback, if one is attached.
    pub fn call_back(&self, value: &Value) -> Result<(), Exception> {
        match &self.callback {
            Some(cb) => cb(value),
            None => Ok(()),
        }
    }
}

/// Recover an [`Exception`] from a panic payload.
pub fn exception_from_panic(payload: Box<dyn Any + Send>) -> Exception {
    match payload.downcast::<Exception>() {
        Ok(e) => *e,
        Err(payload) => {
            if let Some(s) = payload.downcast_ref::<String>() {
                Exception::internal(s.clone())
            } else if let Some(s) = payload.downcast_ref::<&str>() {
                Exception::internal(*s)
            } else {
                Exception::internal("handler panicked")
            }
        }
    }
}
