// Registry-driven peer picker
//
// Owns the consistent-hash ring plus one RPC client per member, and keeps
// both in step with the service registry: a one-shot bootstrap list at
// startup and a long-lived watch for churn.

use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::peers::{Connector, PeerPicker, SharedClient};
use crate::registry::{SharedRegistry, WatchEvent};
use crate::ring::{DEFAULT_REPLICAS, HashRing};
use crate::util::valid_peer_addr;

/// Default service name nodes register under
pub const DEFAULT_SERVICE_NAME: &str = "WaCache";

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(3);
const WATCH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Configuration options for [`ClientPicker`]
#[derive(Debug, Clone)]
pub struct PickerOptions {
    /// Service name to discover peers under
    pub service_name: String,

    /// Virtual points per address on the ring
    pub replicas: usize,
}

impl Default for PickerOptions {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            replicas: DEFAULT_REPLICAS,
        }
    }
}

impl PickerOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service name (chainable)
    pub fn with_service_name<S: Into<String>>(mut self, name: S) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the replica count (chainable)
    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }
}

struct PickerState {
    ring: HashRing,
    clients: HashMap<String, SharedClient>,
}

/// Peer picker backed by a service registry
///
/// Membership mutations are serialized by one write lock over the ring and
/// the client map, so [`PeerPicker::pick_peer`] always sees a consistent
/// snapshot. Bootstrap and watch run on background threads; both go through
/// the same presence-checked insert, so replaying an event already applied
/// by the other is harmless.
pub struct ClientPicker {
    self_addr: String,
    service_name: String,
    state: RwLock<PickerState>,
    registry: SharedRegistry,
    connector: Arc<dyn Connector>,
    shutdown: Mutex<Option<Sender<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClientPicker {
    /// Create a picker and start its discovery tasks
    ///
    /// The constructor waits for the bootstrap listing before returning. A
    /// registry failure there is fatal: the error is logged and the process
    /// exits, since a node that cannot take the full member listing would
    /// serve with a partial view of the cluster.
    pub fn new(
        self_addr: impl Into<String>,
        registry: SharedRegistry,
        connector: Arc<dyn Connector>,
        options: PickerOptions,
    ) -> Result<Arc<Self>> {
        let self_addr = self_addr.into();
        if !valid_peer_addr(&self_addr) {
            return Err(Error::InvalidAddress(self_addr));
        }

        let (shutdown_tx, shutdown_rx) = unbounded();
        let picker = Arc::new(Self {
            self_addr,
            service_name: options.service_name,
            state: RwLock::new(PickerState {
                ring: HashRing::new(options.replicas, None),
                clients: HashMap::new(),
            }),
            registry,
            connector,
            shutdown: Mutex::new(Some(shutdown_tx)),
            tasks: Mutex::new(Vec::new()),
        });

        // Self is a member from the start; its client is only bookkeeping
        {
            let mut state = picker.state.write();
            let addr = picker.self_addr.clone();
            picker.set(&mut state, &addr);
        }

        let (boot_tx, boot_rx) = bounded(1);
        let bootstrap = {
            let picker = Arc::clone(&picker);
            thread::spawn(move || {
                let _ = boot_tx.send(picker.bootstrap());
            })
        };
        let watch = {
            let picker = Arc::clone(&picker);
            thread::spawn(move || picker.watch_loop(shutdown_rx))
        };
        picker.tasks.lock().extend([bootstrap, watch]);

        // Bootstrap failure is fatal for the whole process, not just its
        // task; a closed channel means the task died before reporting.
        match boot_rx.recv() {
            Ok(Ok(())) => {}
            outcome => {
                let err = match outcome {
                    Ok(Err(err)) => err,
                    _ => Error::Registry("bootstrap task died".to_string()),
                };
                error!(self_addr = %picker.self_addr, %err, "registry bootstrap failed, terminating");
                process::exit(1);
            }
        }

        Ok(picker)
    }

    /// Addresses currently on the ring, sorted
    pub fn peers(&self) -> Vec<String> {
        let state = self.state.read();
        let mut addrs: Vec<String> = state.clients.keys().cloned().collect();
        addrs.sort();
        addrs
    }

    /// The address this picker registers as its own
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Stop the discovery tasks and wait for them to exit
    ///
    /// Idempotent; the picker keeps answering `pick_peer` from its last
    /// known membership afterwards.
    pub fn shutdown(&self) {
        drop(self.shutdown.lock().take());
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.join();
        }
    }

    /// Insert an address; a no-op when it is already a member
    fn set(&self, state: &mut PickerState, addr: &str) {
        if state.clients.contains_key(addr) {
            return;
        }
        state.ring.add(addr);
        state.clients.insert(
            addr.to_string(),
            self.connector.connect(addr, &self.service_name),
        );
    }

    /// Drop an address; a no-op when it is not a member
    fn remove(&self, state: &mut PickerState, addr: &str) {
        if state.clients.remove(addr).is_some() {
            state.ring.remove(addr);
        }
    }

    /// One-shot full listing of the service prefix
    ///
    /// The registry query runs before the write lock is taken, so a slow
    /// registry cannot stall `pick_peer`. The outcome is reported to the
    /// constructor, which treats failure as fatal.
    fn bootstrap(&self) -> Result<()> {
        let prefix = format!("{}/", self.service_name);
        let keys = self.registry.list(&prefix, BOOTSTRAP_TIMEOUT)?;

        let mut state = self.state.write();
        for key in &keys {
            if let Some(addr) = trailing_addr(key, &self.service_name)
                && addr != self.self_addr
            {
                self.set(&mut state, addr);
            }
        }
        debug!(self_addr = %self.self_addr, members = state.clients.len(), "bootstrap complete");
        Ok(())
    }

    /// Long-lived watch on the service prefix, restarted on disconnect
    fn watch_loop(&self, shutdown: Receiver<()>) {
        let prefix = format!("{}/", self.service_name);
        loop {
            let events = match self.registry.watch(&prefix) {
                Ok(events) => events,
                Err(err) => {
                    warn!(self_addr = %self.self_addr, %err, "registry watch failed, retrying");
                    match shutdown.recv_timeout(WATCH_RETRY_DELAY) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => return,
                    }
                }
            };

            loop {
                crossbeam::select! {
                    recv(events) -> event => match event {
                        Ok(event) => self.apply(event),
                        Err(_) => {
                            warn!(self_addr = %self.self_addr, "registry watch disconnected");
                            break;
                        }
                    },
                    recv(shutdown) -> _ => return,
                }
            }

            match shutdown.recv_timeout(WATCH_RETRY_DELAY) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => return,
            }
        }
    }

    /// Apply one membership event under the write lock
    fn apply(&self, event: WatchEvent) {
        let Some(addr) = trailing_addr(event.key(), &self.service_name) else {
            return;
        };
        if addr == self.self_addr {
            return;
        }

        let mut state = self.state.write();
        match &event {
            WatchEvent::Put(_) => {
                debug!(self_addr = %self.self_addr, peer = addr, "peer joined");
                self.set(&mut state, addr);
            }
            WatchEvent::Delete(_) => {
                debug!(self_addr = %self.self_addr, peer = addr, "peer left");
                self.remove(&mut state, addr);
            }
        }
    }
}

impl PeerPicker for ClientPicker {
    fn pick_peer(&self, key: &str) -> Option<(SharedClient, bool)> {
        let state = self.state.read();
        let addr = state.ring.get(key)?;
        let client = state.clients.get(addr)?;
        debug!(self_addr = %self.self_addr, peer = addr, "picked peer");
        Some((Arc::clone(client), addr == self.self_addr))
    }
}

/// Extract the address from a registry key like `WaCache/10.0.0.2:8009`
fn trailing_addr<'a>(key: &'a str, service: &str) -> Option<&'a str> {
    let start = key.find(service)? + service.len() + 1;
    key.get(start..).filter(|addr| !addr.is_empty())
}
