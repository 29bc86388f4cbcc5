// Consistent-hash ring
//
// Maps keys to peer addresses through virtual points on a hash circle, so
// membership changes move only the keys owned by the affected address.

use std::collections::BTreeMap;

/// Hash function mapping a label or key to a point on the circle
pub type HashFn = Box<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// Virtual points per address unless overridden
pub const DEFAULT_REPLICAS: usize = 50;

/// Consistent-hash ring over peer addresses
///
/// Each address contributes `replicas` points labelled `"{i}{addr}"`. The
/// default hash is CRC32 widened to `u64`, so every process with the same
/// membership and replica count places keys identically. Points are kept in
/// a `BTreeMap`, which keeps the circle sorted and resolves hash ties in
/// favor of the first writer.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    points: BTreeMap<u64, String>,
}

impl HashRing {
    /// Create a ring; `None` selects the CRC32 default hash
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            replicas,
            hash: hash.unwrap_or_else(|| Box::new(|bytes| u64::from(crc32fast::hash(bytes)))),
            points: BTreeMap::new(),
        }
    }

    /// Add an address to the ring
    pub fn add(&mut self, addr: &str) {
        for i in 0..self.replicas {
            let point = (self.hash)(format!("{i}{addr}").as_bytes());
            self.points.entry(point).or_insert_with(|| addr.to_string());
        }
    }

    /// Remove an address and the points it owns
    pub fn remove(&mut self, addr: &str) {
        for i in 0..self.replicas {
            let point = (self.hash)(format!("{i}{addr}").as_bytes());
            // A tied point may belong to another address; leave it alone
            if self.points.get(&point).is_some_and(|owner| owner == addr) {
                self.points.remove(&point);
            }
        }
    }

    /// Address owning `key`: the first point clockwise from its hash
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }
        let point = (self.hash)(key.as_bytes());
        self.points
            .range(point..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, addr)| addr.as_str())
    }

    /// True when no address is a member
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points on the circle
    pub fn len(&self) -> usize {
        self.points.len()
    }
}
