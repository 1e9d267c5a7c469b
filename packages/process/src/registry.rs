//! The handler registry: canonical process name → handler.
//!
//! One process-wide instance lives behind [`Registry::global`]; the free
//! functions in this module operate on it. Standalone registries can be
//! built for isolated callers and tests.
//!
//! # Concurrency
//!
//! The table sits behind a `parking_lot::RwLock`:
//! - lookups during dispatch take the read lock
//! - register / unregister / alias take the write lock
//!
//! Later registrations of the same canonical name replace earlier ones.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::{Exception, Process, Value};

/// A registered handler. Entries must be `Send + Sync`; handlers referring
/// to thread-local state cannot be registered.
pub type Handler = Arc<dyn Fn(&mut Process) -> Result<Value, Exception> + Send + Sync>;

/// Wrap a closure or function as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Process) -> Result<Value, Exception> + Send + Sync + 'static,
{
    Arc::new(f)
}

lazy_static! {
    static ref GLOBAL: Registry = Registry::new();
}

/// A name-addressed table of handlers.
#[derive(Default)]
pub struct Registry {
    handlers: RwLock<HashMap<String, Handler>>,
}

fn canonical(name: &str) -> String {
    name.to_lowercase()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`Process::of`].
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Install a handler at startup.
    pub fn register<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut Process) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        let key = canonical(name);
        tracing::trace!(handler = %key, "register");
        self.handlers.write().insert(key, Arc::new(f));
    }

    /// Install every `method → handler` pair under `<prefix>.<method>`.
    pub fn register_group<I, S>(&self, prefix: &str, group: I)
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: AsRef<str>,
    {
        let mut handlers = self.handlers.write();
        for (method, h) in group {
            let key = canonical(&format!("{}.{}", prefix, method.as_ref()));
            tracing::trace!(handler = %key, "register");
            handlers.insert(key, h);
        }
    }

    /// Install a handler while dispatch may be running.
    ///
    /// Returns `true` if an existing handler was replaced.
    pub fn register_dynamic(&self, name: &str, h: Handler) -> bool {
        let key = canonical(name);
        let replaced = self.handlers.write().insert(key.clone(), h).is_some();
        tracing::debug!(handler = %key, replaced, "dynamic register");
        replaced
    }

    /// Install a group while dispatch may be running, under a single lock.
    pub fn register_dynamic_group<I, S>(&self, prefix: &str, group: I) -> usize
    where
        I: IntoIterator<Item = (S, Handler)>,
        S: AsRef<str>,
    {
        let mut handlers = self.handlers.write();
        let mut count = 0;
        for (method, h) in group {
            let key = canonical(&format!("{}.{}", prefix, method.as_ref()));
            handlers.insert(key, h);
            count += 1;
        }
        tracing::debug!(prefix, count, "dynamic register group");
        count
    }

    /// Remove a handler. Returns `true` if it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let key = canonical(name);
        let removed = self.handlers.write().remove(&key).is_some();
        tracing::debug!(handler = %key, removed, "unregister");
        removed
    }

    /// Remove every handler under `<prefix>.`. Returns the number removed.
    pub fn unregister_group(&self, prefix: &str) -> usize {
        let prefix = format!("{}.", canonical(prefix));
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|key, _| !key.starts_with(&prefix));
        let count = before - handlers.len();
        tracing::debug!(prefix = %prefix, count, "unregister group");
        count
    }

    /// Point `new` at the handler currently registered as `existing`.
    ///
    /// # Errors
    ///
    /// `NotFound` if `existing` has no handler.
    pub fn alias(&self, existing: &str, new: &str) -> Result<(), Exception> {
        let mut handlers = self.handlers.write();
        let h = handlers
            .get(&canonical(existing))
            .cloned()
            .ok_or_else(|| Exception::not_found(format!("{} not found", existing)))?;
        tracing::debug!(existing, new, "alias");
        handlers.insert(canonical(new), h);
        Ok(())
    }

    /// Look up a handler by canonical key.
    pub fn get(&self, handler: &str) -> Option<Handler> {
        self.handlers.read().get(&canonical(handler)).cloned()
    }

    pub fn exists(&self, handler: &str) -> bool {
        self.handlers.read().contains_key(&canonical(handler))
    }

    /// All registered canonical names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build an invocation resolved against this registry.
    pub fn process(&self, name: &str, args: Vec<Value>) -> Result<Process, Exception> {
        Process::resolve(self, name, args)
    }
}

/// Register on the process-wide registry.
pub fn register<F>(name: &str, f: F)
where
    F: Fn(&mut Process) -> Result<Value, Exception> + Send + Sync + 'static,
{
    Registry::global().register(name, f)
}

pub fn register_group<I, S>(prefix: &str, group: I)
where
    I: IntoIterator<Item = (S, Handler)>,
    S: AsRef<str>,
{
    Registry::global().register_group(prefix, group)
}

pub fn register_dynamic(name: &str, h: Handler) -> bool {
    Registry::global().register_dynamic(name, h)
}

pub fn register_dynamic_group<I, S>(prefix: &str, group: I) -> usize
where
    I: IntoIterator<Item = (S, Handler)>,
    S: AsRef<str>,
{
    Registry::global().register_dynamic_group(prefix, group)
}

pub fn unregister(name: &str) -> bool {
    Registry::global().unregister(name)
}

pub fn unregister_group(prefix: &str) -> usize {
    Registry::global().unregister_group(prefix)
}

pub fn alias(existing: &str, new: &str) -> Result<(), Exception> {
    Registry::global().alias(existing, new)
}

pub fn exists(name: &str) -> bool {
    Registry::global().exists(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(p: &mut Process) -> Result<Value, Exception> {
        Ok(p.args.first().cloned().unwrap_or_default())
    }

    #[test]
    fn register_and_lookup_is_case_insensitive() {
        let registry = Registry::new();
        registry.register("Unit.Echo", echo);
        assert!(registry.exists("unit.echo"));
        assert!(registry.get("UNIT.ECHO").is_some());
        assert_eq!(registry.names(), vec!["unit.echo".to_string()]);
    }

    #[test]
    fn later_registration_wins() {
        let registry = Registry::new();
        registry.register("unit.value", |_| Ok(Value::from(1)));
        registry.register("unit.value", |_| Ok(Value::from(2)));
        let value = registry.process("unit.value", vec![]).unwrap().exec().unwrap();
        assert_eq!(value, Value::from(2));
    }

    #[test]
    fn group_registration_and_removal() {
        let registry = Registry::new();
        registry.register_group(
            "unit.group",
            vec![("One", handler(echo)), ("Two", handler(echo))],
        );
        registry.register("unit.other", echo);
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.unregister_group("unit.group"), 2);
        assert_eq!(registry.unregister_group("unit.group"), 0);
        assert!(registry.exists("unit.other"));
    }

    #[test]
    fn unregister_missing_is_false() {
        let registry = Registry::new();
        assert!(!registry.unregister("unit.none"));
    }

    #[test]
    fn dynamic_register_reports_replacement() {
        let registry = Registry::new();
        assert!(!registry.register_dynamic("unit.dyn", handler(echo)));
        assert!(registry.register_dynamic("unit.dyn", handler(echo)));
        assert_eq!(
            registry.register_dynamic_group("unit.dg", vec![("a", handler(echo))]),
            1
        );
        assert!(registry.exists("unit.dg.a"));
    }

    #[test]
    fn alias_shares_handler() {
        let registry = Registry::new();
        registry.register("unit.original", |_| Ok(Value::from("same")));
        registry.alias("unit.original", "unit.copy").unwrap();

        let a = registry.process("unit.original", vec![]).unwrap().run();
        let b = registry.process("unit.copy", vec![]).unwrap().run();
        assert_eq!(a, b);

        assert_eq!(
            registry.alias("unit.missing", "unit.x").unwrap_err().code,
            404
        );
    }
}
