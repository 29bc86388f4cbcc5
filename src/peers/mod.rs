// Peer selection and the peer RPC contract
//
// The cache core routes misses and deletes to the node that owns the key.
// What a "peer" is on the wire stays behind the `PeerClient` contract; the
// picker only maps keys to addresses and addresses to clients.

pub mod picker;

use std::sync::Arc;

use crate::error::Result;

/// RPC client for one remote peer
///
/// Implementations carry the transport; the core assumes idempotent
/// semantics so a higher layer may retry.
pub trait PeerClient: Send + Sync {
    /// Fetch a value from the peer's group
    fn get(&self, group: &str, key: &str) -> Result<Vec<u8>>;

    /// Delete a key from the peer's group
    fn delete(&self, group: &str, key: &str) -> Result<bool>;
}

/// Type alias for a shared peer client
pub type SharedClient = Arc<dyn PeerClient>;

/// Locates the peer that owns a specific key
pub trait PeerPicker: Send + Sync {
    /// Owner's client and whether the owner is this node
    ///
    /// Returns `None` while the membership is empty.
    fn pick_peer(&self, key: &str) -> Option<(SharedClient, bool)>;
}

/// Builds a client for a discovered peer address
///
/// Called with the picker's membership lock held, so implementations must
/// not block on the network; dial lazily on first use instead.
pub trait Connector: Send + Sync {
    /// Create a client for `addr` within `service`
    fn connect(&self, addr: &str, service: &str) -> SharedClient;
}

impl<F> Connector for F
where
    F: Fn(&str, &str) -> SharedClient + Send + Sync,
{
    fn connect(&self, addr: &str, service: &str) -> SharedClient {
        self(addr, service)
    }
}
