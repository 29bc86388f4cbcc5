// wacache
//
// A distributed in-memory key/value cache organized as a peer-to-peer
// cluster of identical nodes.
//
// Each node owns a shard of the key space determined by consistent hashing:
// - **Groups**: named cache namespaces bound to one backing source
// - **Byte-bounded LRU**: per-group local cache with strict LRU eviction
// - **Single-flight**: concurrent identical misses collapse to one load
// - **Consistent hashing**: keys map to owning peers via virtual ring points
// - **Service discovery**: registry-driven membership with bootstrap + watch
//
// Quick Start
//
// ```rust
// use std::sync::Arc;
// use wacache::{Group, Result};
//
// # fn main() -> Result<()> {
// // A group loads from its backing source on a cache miss
// let scores = Group::new("scores", 2 << 10, Arc::new(|key: &str| -> Result<Vec<u8>> {
//     match key {
//         "Tom" => Ok(b"630".to_vec()),
//         _ => Err(wacache::Error::NotFound(key.to_string())),
//     }
// }));
//
// let value = scores.get("Tom")?;
// assert_eq!(value.to_vec(), b"630");
// # wacache::destroy_group("scores");
// # Ok(())
// # }
// ```
//
// Clustering is opt-in: register a `ClientPicker` on the group and start a
// `Server`, and misses for remotely-owned keys are fetched from their owner
// instead of the local backing source.

// Re-export main types
pub use error::{Error, Result};
pub use group::{Getter, Group, destroy_group, get_group};
pub use peers::picker::{ClientPicker, DEFAULT_SERVICE_NAME, PickerOptions};
pub use peers::{Connector, PeerClient, PeerPicker, SharedClient};
pub use registry::memory::MemoryRegistry;
pub use registry::{ServiceRegistry, SharedRegistry, WatchEvent};
pub use ring::HashRing;
pub use server::{
    DEFAULT_ADDR, DeleteResponse, Dispatcher, GetResponse, RpcRequest, Server, ServerOptions,
    Transport,
};
pub use singleflight::Flight;
pub use types::ByteView;

// Core modules
pub mod error;
pub mod group;
pub mod peers;
pub mod registry;
pub mod ring;
pub mod server;
pub mod singleflight;
pub mod types;

// Internal modules
pub(crate) mod cache;
pub(crate) mod util;
