//! Host bridge for scripting runtimes.
//!
//! A runtime (a JS or WASM engine embedded in the host) exposes a single
//! host function to guest code. That function calls [`call`], which builds
//! a fresh invocation, runs it and drops it before returning, so guest code
//! never holds on to a `Process`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{AuthorizedInfo, Context, Exception, Process, Value};

/// A scripting runtime consuming the registry.
pub trait Runtime: Send + Sync {
    /// Engine name, for logging.
    fn name(&self) -> &str;
}

/// Per-call state a runtime forwards from its own caller.
#[derive(Default, Clone)]
pub struct HostCall {
    pub sid: String,
    pub global: BTreeMap<String, Value>,
    pub context: Option<Context>,
    pub authorized: Option<AuthorizedInfo>,
}

/// Run `name` synchronously on behalf of `runtime`.
pub fn call(
    runtime: &Arc<dyn Runtime>,
    host: &HostCall,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, Exception> {
    tracing::trace!(runtime = runtime.name(), process = name, "host call");
    let mut process = Process::of(name, args)?
        .with_sid(host.sid.clone())
        .with_global(host.global.clone())
        .with_runtime(Arc::clone(runtime));
    if let Some(ctx) = &host.context {
        process = process.with_context(ctx.clone());
    }
    if let Some(auth) = &host.authorized {
        process = process.with_authorized(auth.clone());
    }
    process.exec()
}
