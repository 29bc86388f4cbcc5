// Service-registry abstraction
//
// Nodes announce themselves under `<service_name>/<addr>` and discover each
// other through prefix queries and watches. The backend is pluggable; the
// cache core only depends on this contract and treats the registry as
// eventually consistent.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::error::Result;

/// Membership change observed on a watched prefix
///
/// Events carry the full registry key (`<service_name>/<addr>`); consumers
/// parse the trailing address out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A key was created
    Put(String),
    /// A key was removed (lease expired or deregistered)
    Delete(String),
}

impl WatchEvent {
    /// The registry key the event refers to
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put(key) | WatchEvent::Delete(key) => key,
        }
    }
}

/// Registry backend trait
///
/// This trait abstracts the service registry (etcd, Consul, an in-process
/// table), allowing the picker and server to stay backend-agnostic.
pub trait ServiceRegistry: Send + Sync {
    /// Register `<service>/<addr>` with a keep-alive lease
    ///
    /// Blocks until `stop` is signalled or closed, then deregisters the
    /// key. Run it on a dedicated thread.
    fn register(&self, service: &str, addr: &str, stop: Receiver<()>) -> Result<()>;

    /// One-shot prefix query, bounded by `timeout`
    ///
    /// Returns the full registry keys currently present under `prefix`.
    fn list(&self, prefix: &str, timeout: Duration) -> Result<Vec<String>>;

    /// Long-lived prefix watch
    ///
    /// The returned channel yields one event per membership change until
    /// the backend disconnects.
    fn watch(&self, prefix: &str) -> Result<Receiver<WatchEvent>>;
}

/// Type alias for a thread-safe registry handle
pub type SharedRegistry = Arc<dyn ServiceRegistry>;
