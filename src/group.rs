// Group controller
//
// A Group is a named cache namespace. It answers reads from the local
// cache, collapses concurrent misses through the single-flight gate, and
// routes loads and deletes to the owning peer when a picker is registered.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::MainCache;
use crate::error::{Error, Result};
use crate::peers::{PeerClient, PeerPicker};
use crate::singleflight::Flight;
use crate::types::ByteView;

/// Backing data source called on a cache miss
///
/// Invoked at most once per concurrent miss per key on each node. A miss in
/// the source itself is an error ([`Error::NotFound`] by convention); the
/// cache does not negative-cache.
pub trait Getter: Send + Sync {
    /// Load the authoritative bytes for `key`
    fn get(&self, key: &str) -> Result<Vec<u8>>;
}

impl<F> Getter for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self(key)
    }
}

// Process-wide group table. Groups are registered at construction and
// looked up by the RPC dispatch path.
static GROUPS: RwLock<BTreeMap<String, Arc<Group>>> = RwLock::new(BTreeMap::new());

/// Look up a registered group by name
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    GROUPS.read().get(name).cloned()
}

/// Remove a group from the process-wide table
///
/// Returns whether the name was registered. Outstanding `Arc` handles keep
/// the group itself usable.
pub fn destroy_group(name: &str) -> bool {
    GROUPS.write().remove(name).is_some()
}

/// Named cache namespace bound to one backing source
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wacache::{Group, Result};
///
/// let group = Group::new("scores", 2 << 10, Arc::new(|key: &str| -> Result<Vec<u8>> {
///     Ok(format!("value-for-{key}").into_bytes())
/// }));
///
/// let view = group.get("Tom")?;
/// assert_eq!(view.to_vec(), b"value-for-Tom");
/// # wacache::destroy_group("scores");
/// # Ok::<(), wacache::Error>(())
/// ```
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    main_cache: MainCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    loader: Flight<ByteView>,
}

impl Group {
    /// Create a group and register it process-wide
    ///
    /// `cache_bytes` bounds the local cache (0 disables the cap). A group
    /// that reuses a registered name replaces the old registration.
    pub fn new(name: impl Into<String>, cache_bytes: usize, getter: Arc<dyn Getter>) -> Arc<Group> {
        let name = name.into();
        let group = Arc::new(Group {
            name: name.clone(),
            getter,
            main_cache: MainCache::new(cache_bytes),
            peers: OnceLock::new(),
            loader: Flight::new(),
        });

        let mut groups = GROUPS.write();
        if groups.insert(name.clone(), Arc::clone(&group)).is_some() {
            warn!(group = %name, "replacing existing group registration");
        }
        group
    }

    /// Name of this group
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the peer picker used to route keys to their owners
    ///
    /// May be called at most once per group; a second call is a programmer
    /// error and panics.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        assert!(
            self.peers.set(peers).is_ok(),
            "register_peers called more than once"
        );
    }

    /// Fetch the value for `key`
    ///
    /// Local cache first; on a miss the load is routed to the owning peer
    /// or the backing source, with concurrent misses collapsed to a single
    /// load per key.
    pub fn get(&self, key: &str) -> Result<ByteView> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if let Some(view) = self.main_cache.get(key) {
            debug!(group = %self.name, key, "cache hit");
            return Ok(view);
        }
        self.load(key)
    }

    /// Delete `key` from its owning node
    ///
    /// Without a picker the delete is purely local. `Ok(false)` means no
    /// owner could be determined under the current membership.
    pub fn delete(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let Some(peers) = self.peers.get() else {
            return Ok(self.main_cache.delete(key));
        };
        match peers.pick_peer(key) {
            None => Ok(false),
            Some((_, true)) => Ok(self.main_cache.delete(key)),
            Some((peer, false)) => peer.delete(&self.name, key),
        }
    }

    // Each key is fetched once per overlapping window, locally or remotely,
    // regardless of the number of concurrent callers.
    fn load(&self, key: &str) -> Result<ByteView> {
        self.loader.flight(key, || {
            if let Some(peers) = self.peers.get()
                && let Some((peer, is_self)) = peers.pick_peer(key)
                && !is_self
            {
                match self.get_from_peer(peer.as_ref(), key) {
                    Ok(view) => return Ok(view),
                    Err(err) => {
                        warn!(group = %self.name, key, %err, "failed to get from peer");
                    }
                }
            }
            self.get_locally(key)
        })
    }

    fn get_from_peer(&self, peer: &dyn PeerClient, key: &str) -> Result<ByteView> {
        let bytes = peer.get(&self.name, key)?;
        Ok(ByteView::from(bytes))
    }

    fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = self.getter.get(key)?;
        // Taking ownership of the buffer is the defensive copy: the getter
        // keeps no handle that could mutate cached bytes.
        let view = ByteView::from(bytes);
        self.populate_cache(key, view.clone());
        Ok(view)
    }

    fn populate_cache(&self, key: &str, view: ByteView) {
        self.main_cache.add(key, view);
    }
}
