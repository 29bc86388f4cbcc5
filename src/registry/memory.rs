// In-process service registry
//
// Backs tests and single-process clusters. Registration inserts the key and
// parks on the stop channel, mirroring a lease that outlives its holder's
// interest; watchers receive every change under their prefix.

use std::collections::BTreeSet;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::Result;
use crate::registry::{ServiceRegistry, WatchEvent};

struct Watcher {
    prefix: String,
    tx: Sender<WatchEvent>,
}

struct State {
    entries: BTreeSet<String>,
    watchers: Vec<Watcher>,
}

/// Shared in-memory registry
///
/// Every node handed a clone of the same `Arc<MemoryRegistry>` sees one
/// membership table, so a multi-node cluster can run inside one process.
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: BTreeSet::new(),
                watchers: Vec::new(),
            }),
        }
    }

    fn broadcast(state: &mut State, event: WatchEvent) {
        // Disconnected watchers are dropped as a side effect
        state.watchers.retain(|watcher| {
            if !event.key().starts_with(&watcher.prefix) {
                return true;
            }
            watcher.tx.send(event.clone()).is_ok()
        });
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry for MemoryRegistry {
    fn register(&self, service: &str, addr: &str, stop: Receiver<()>) -> Result<()> {
        let key = format!("{service}/{addr}");
        {
            let mut state = self.state.lock();
            if state.entries.insert(key.clone()) {
                Self::broadcast(&mut state, WatchEvent::Put(key.clone()));
            }
        }

        // Hold the lease until the caller signals or drops the stop channel
        let _ = stop.recv();

        let mut state = self.state.lock();
        if state.entries.remove(&key) {
            Self::broadcast(&mut state, WatchEvent::Delete(key));
        }
        Ok(())
    }

    fn list(&self, prefix: &str, _timeout: Duration) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn watch(&self, prefix: &str) -> Result<Receiver<WatchEvent>> {
        let (tx, rx) = unbounded();
        self.state.lock().watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(rx)
    }
}
