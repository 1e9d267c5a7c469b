//! `widgets.<widget>.<method>`: widget definitions and their instances.
//!
//! A [`Widget`] owns its method handlers and a table of named instances.
//! [`load`] registers the methods while dispatch may be running;
//! [`unload`] removes them again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use yao_process::{handler, Exception, Process, Value};

pub type WidgetMethod =
    Arc<dyn Fn(&Widget, &mut Process) -> Result<Value, Exception> + Send + Sync>;

pub struct Widget {
    pub id: String,
    methods: BTreeMap<String, WidgetMethod>,
    instances: RwLock<HashMap<String, Value>>,
}

impl std::fmt::Debug for Widget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.id)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Widget {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            methods: BTreeMap::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Add a method, callable as `widgets.<id>.<name>`.
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Widget, &mut Process) -> Result<Value, Exception> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_lowercase(), Arc::new(f));
        self
    }

    pub fn methods(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    pub fn save_instance(&self, name: &str, instance: Value) {
        self.instances.write().insert(name.to_string(), instance);
    }

    pub fn instance(&self, name: &str) -> Option<Value> {
        self.instances.read().get(name).cloned()
    }

    /// Instance names, sorted.
    pub fn instances(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if the instance existed.
    pub fn remove_instance(&self, name: &str) -> bool {
        self.instances.write().remove(name).is_some()
    }
}

lazy_static! {
    static ref WIDGETS: RwLock<HashMap<String, Arc<Widget>>> = RwLock::new(HashMap::new());
}

fn prefix(id: &str) -> String {
    format!("widgets.{}", id)
}

/// Register `widget`'s methods and publish it. Reloading an id replaces
/// the previous definition and its instances.
pub fn load(widget: Widget) -> Arc<Widget> {
    let widget = Arc::new(widget);
    let id = widget.id.to_lowercase();
    unload(&id);

    let group: Vec<(String, yao_process::Handler)> = widget
        .methods
        .iter()
        .map(|(name, method)| {
            let owner = Arc::clone(&widget);
            let method = Arc::clone(method);
            (name.clone(), handler(move |p: &mut Process| method(owner.as_ref(), p)))
        })
        .collect();
    let count = yao_process::register_dynamic_group(&prefix(&id), group);
    WIDGETS.write().insert(id.clone(), Arc::clone(&widget));
    tracing::info!(widget = %id, methods = count, "widget loaded");
    widget
}

/// Remove a widget and its handlers. Returns `false` if it was not loaded.
pub fn unload(id: &str) -> bool {
    let id = id.to_lowercase();
    let removed = WIDGETS.write().remove(&id).is_some();
    if removed {
        let count = yao_process::unregister_group(&prefix(&id));
        tracing::info!(widget = %id, methods = count, "widget unloaded");
    }
    removed
}

pub fn get(id: &str) -> Option<Arc<Widget>> {
    WIDGETS.read().get(&id.to_lowercase()).cloned()
}

/// Loaded widget ids, sorted.
pub fn ids() -> Vec<String> {
    let mut ids: Vec<String> = WIDGETS.read().keys().cloned().collect();
    ids.sort();
    ids
}
