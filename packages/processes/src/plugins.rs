//! `plugins.<id>.<method>`: RPC into out-of-process plugins.
//!
//! The host installs a [`PluginManager`] built around its
//! [`PluginLauncher`]. The manager keeps one client per plugin id and
//! relaunches a plugin whose process died before forwarding the next call.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use yao_process::{Exception, Process, Value};

/// A connected plugin client.
pub trait Plugin: Send + Sync {
    /// `Exec(method, args...) -> value`
    fn exec(&self, method: &str, args: &[Value]) -> Result<Value, Exception>;

    fn is_alive(&self) -> bool;

    fn kill(&self);
}

/// Starts plugin processes.
pub trait PluginLauncher: Send + Sync {
    fn launch(&self, id: &str) -> Result<Arc<dyn Plugin>, Exception>;
}

pub struct PluginManager {
    launcher: Box<dyn PluginLauncher>,
    clients: Mutex<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginManager {
    pub fn new(launcher: impl PluginLauncher + 'static) -> Self {
        Self {
            launcher: Box::new(launcher),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The live client for `id`, launching or relaunching as needed.
    /// Launching happens outside the client table lock.
    pub fn client(&self, id: &str) -> Result<Arc<dyn Plugin>, Exception> {
        if let Some(client) = self.live(id) {
            return Ok(client);
        }
        let launched = self.launcher.launch(id)?;

        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(id) {
            if client.is_alive() {
                // Lost the race to a concurrent launch.
                launched.kill();
                return Ok(Arc::clone(client));
            }
        }
        if let Some(stale) = clients.insert(id.to_string(), Arc::clone(&launched)) {
            stale.kill();
        }
        tracing::debug!(plugin = id, "plugin launched");
        Ok(launched)
    }

    /// The cached client for `id` if it is still alive. A dead one is
    /// dropped from the table.
    fn live(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        let mut clients = self.clients.lock();
        let client = clients.get(id)?;
        if client.is_alive() {
            return Some(Arc::clone(client));
        }
        tracing::info!(plugin = id, "plugin exited, relaunching");
        if let Some(dead) = clients.remove(id) {
            dead.kill();
        }
        None
    }

    pub fn exec(&self, id: &str, method: &str, args: &[Value]) -> Result<Value, Exception> {
        self.client(id)?.exec(method, args)
    }

    /// Stop and forget the client for `id`. Returns `false` if none was
    /// running.
    pub fn kill(&self, id: &str) -> bool {
        match self.clients.lock().remove(id) {
            Some(client) => {
                client.kill();
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) {
        for (id, client) in self.clients.lock().drain() {
            tracing::debug!(plugin = %id, "plugin stopped");
            client.kill();
        }
    }

    /// Ids with a cached client, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

lazy_static! {
    static ref MANAGER: RwLock<Option<Arc<PluginManager>>> = RwLock::new(None);
}

/// Install the process-wide manager, stopping the plugins of a previous one.
pub fn install(manager: PluginManager) -> Arc<PluginManager> {
    let manager = Arc::new(manager);
    if let Some(previous) = MANAGER.write().replace(Arc::clone(&manager)) {
        previous.kill_all();
    }
    manager
}

pub fn uninstall() {
    if let Some(previous) = MANAGER.write().take() {
        previous.kill_all();
    }
}

pub fn manager() -> Option<Arc<PluginManager>> {
    MANAGER.read().clone()
}

pub(crate) fn register() {
    yao_process::register("plugins", handle);
}

/// Forwards `(method, args)` to plugin `p.id`.
pub(crate) fn handle(p: &mut Process) -> Result<Value, Exception> {
    let manager = manager().ok_or_else(|| Exception::unavailable("no plugin manager installed"))?;
    manager.exec(&p.id, &p.method, &p.args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    struct Echo {
        alive: AtomicBool,
        generation: usize,
    }

    impl Plugin for Echo {
        fn exec(&self, method: &str, args: &[Value]) -> Result<Value, Exception> {
            let mut result = Value::map();
            result.insert("method", method);
            result.insert("args", args.to_vec());
            result.insert("generation", self.generation);
            Ok(result)
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Launcher {
        launches: Arc<AtomicUsize>,
    }

    impl PluginLauncher for Launcher {
        fn launch(&self, id: &str) -> Result<Arc<dyn Plugin>, Exception> {
            if id == "broken" {
                return Err(Exception::internal("cannot start broken"));
            }
            let generation = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(Echo {
                alive: AtomicBool::new(true),
                generation,
            }))
        }
    }

    #[test]
    fn clients_are_cached_and_relaunched() {
        let launches = Arc::new(AtomicUsize::new(0));
        let manager = PluginManager::new(Launcher {
            launches: Arc::clone(&launches),
        });

        let first = manager.client("user").unwrap();
        let again = manager.client("user").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(launches.load(Ordering::SeqCst), 1);

        first.kill();
        let value = manager.exec("user", "Search", &[Value::from("q")]).unwrap();
        assert_eq!(value.get("generation"), Some(&Value::Integer(2)));
        assert_eq!(value.get("args.0"), Some(&Value::from("q")));
        assert_eq!(manager.ids(), vec!["user".to_string()]);
    }

    #[test]
    fn launch_failures_propagate() {
        let manager = PluginManager::new(Launcher::default());
        let err = manager.exec("broken", "Any", &[]).unwrap_err();
        assert_eq!(err.code, 500);
        assert!(manager.ids().is_empty());
    }

    /// Blocks launching `slow` until released.
    struct Gated {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        inner: Launcher,
    }

    impl PluginLauncher for Gated {
        fn launch(&self, id: &str) -> Result<Arc<dyn Plugin>, Exception> {
            if id == "slow" {
                self.started.lock().send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            self.inner.launch(id)
        }
    }

    #[test]
    fn slow_launch_does_not_block_other_plugins() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let manager = Arc::new(PluginManager::new(Gated {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
            inner: Launcher::default(),
        }));

        let slow = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.client("slow").map(|_| ()))
        };
        started_rx.recv().unwrap();

        let fast = manager.exec("fast", "Ping", &[]).unwrap();
        assert_eq!(fast.get("method"), Some(&Value::from("Ping")));

        release_tx.send(()).unwrap();
        slow.join().unwrap().unwrap();
        assert_eq!(manager.ids(), vec!["fast".to_string(), "slow".to_string()]);
    }

    #[test]
    fn kill_forgets_client() {
        let manager = PluginManager::new(Launcher::default());
        let client = manager.client("a").unwrap();
        assert!(manager.kill("a"));
        assert!(!client.is_alive());
        assert!(!manager.kill("a"));
    }
}
