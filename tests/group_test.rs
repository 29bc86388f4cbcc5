// Integration tests for the group controller

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use wacache::{
    ByteView, Error, Getter, Group, PeerClient, PeerPicker, Result, SharedClient, destroy_group,
};

/// Backing source that counts invocations and answers like a slow database
fn slow_db_getter(calls: Arc<AtomicUsize>) -> Arc<dyn Getter> {
    Arc::new(move |key: &str| -> Result<Vec<u8>> {
        calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        match key {
            "Tom" => Ok(b"630".to_vec()),
            "Tom1" => Ok(b"631".to_vec()),
            "Tom2" => Ok(b"632".to_vec()),
            _ => Err(Error::NotFound(key.to_string())),
        }
    })
}

/// Peer client with scripted responses and invocation counters
struct MockPeer {
    gets: AtomicUsize,
    deletes: AtomicUsize,
    get_response: Result<Vec<u8>>,
    delete_response: Result<bool>,
}

impl MockPeer {
    fn new(get_response: Result<Vec<u8>>, delete_response: Result<bool>) -> Arc<Self> {
        Arc::new(Self {
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            get_response,
            delete_response,
        })
    }
}

impl PeerClient for MockPeer {
    fn get(&self, _group: &str, _key: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.get_response.clone()
    }

    fn delete(&self, _group: &str, _key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.delete_response.clone()
    }
}

/// Picker that routes every key to one scripted peer
struct StaticPicker {
    peer: Arc<MockPeer>,
    is_self: bool,
}

impl PeerPicker for StaticPicker {
    fn pick_peer(&self, _key: &str) -> Option<(SharedClient, bool)> {
        Some((Arc::clone(&self.peer) as SharedClient, self.is_self))
    }
}

/// Picker whose membership is empty
struct NoOwnerPicker;

impl PeerPicker for NoOwnerPicker {
    fn pick_peer(&self, _key: &str) -> Option<(SharedClient, bool)> {
        None
    }
}

#[test]
fn test_concurrent_gets_collapse_to_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-collapse", 2 << 10, slow_db_getter(Arc::clone(&calls)));
    let barrier = Arc::new(Barrier::new(100));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let group = Arc::clone(&group);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                group.get("Tom")
            })
        })
        .collect();

    for handle in handles {
        let view = handle.join().unwrap().unwrap();
        assert_eq!(view.to_vec(), b"630");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    destroy_group("it-collapse");
}

#[test]
fn test_peer_error_falls_back_to_local_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-fallback", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    let peer = MockPeer::new(Err(Error::Peer("connection refused".to_string())), Ok(true));
    group.register_peers(Arc::new(StaticPicker {
        peer: Arc::clone(&peer),
        is_self: false,
    }));

    // Remote owner fails; the local getter still satisfies the read
    let view = group.get("Tom").unwrap();
    assert_eq!(view.to_vec(), b"630");
    assert_eq!(peer.gets.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The fallback populated the local cache
    let view = group.get("Tom").unwrap();
    assert_eq!(view.to_vec(), b"630");
    assert_eq!(peer.gets.load(Ordering::SeqCst), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    destroy_group("it-fallback");
}

#[test]
fn test_remote_owner_serves_the_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-remote-get", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    let peer = MockPeer::new(Ok(b"from-peer".to_vec()), Ok(true));
    group.register_peers(Arc::new(StaticPicker {
        peer: Arc::clone(&peer),
        is_self: false,
    }));

    let view = group.get("Tom").unwrap();
    assert_eq!(view, ByteView::from("from-peer"));
    assert_eq!(peer.gets.load(Ordering::SeqCst), 1);
    // The backing source is never consulted
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    destroy_group("it-remote-get");
}

#[test]
fn test_self_owner_never_issues_peer_rpc() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-self-owner", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    let peer = MockPeer::new(Ok(b"wrong".to_vec()), Ok(true));
    group.register_peers(Arc::new(StaticPicker {
        peer: Arc::clone(&peer),
        is_self: true,
    }));

    let view = group.get("Tom").unwrap();
    assert_eq!(view.to_vec(), b"630");
    assert_eq!(peer.gets.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    destroy_group("it-self-owner");
}

#[test]
fn test_delete_forwards_to_remote_owner() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-remote-delete", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    let peer = MockPeer::new(Err(Error::Peer("unreachable".to_string())), Ok(true));
    group.register_peers(Arc::new(StaticPicker {
        peer: Arc::clone(&peer),
        is_self: false,
    }));

    // Seed the local cache through the fallback path
    group.get("Tom").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(group.delete("Tom"), Ok(true));
    assert_eq!(peer.deletes.load(Ordering::SeqCst), 1);

    // The local cache was not touched: the next read is still a hit
    group.get("Tom").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    destroy_group("it-remote-delete");
}

#[test]
fn test_delete_error_propagates_from_peer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-delete-error", 2 << 10, slow_db_getter(calls));

    let peer = MockPeer::new(
        Ok(b"630".to_vec()),
        Err(Error::Peer("unreachable".to_string())),
    );
    group.register_peers(Arc::new(StaticPicker {
        peer,
        is_self: false,
    }));

    assert_eq!(
        group.delete("Tom"),
        Err(Error::Peer("unreachable".to_string()))
    );

    destroy_group("it-delete-error");
}

#[test]
fn test_delete_with_no_owner() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-no-owner", 2 << 10, slow_db_getter(calls));
    group.register_peers(Arc::new(NoOwnerPicker));

    assert_eq!(group.delete("Tom"), Ok(false));

    destroy_group("it-no-owner");
}

#[test]
fn test_delete_with_self_owner_is_local() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-self-delete", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    let peer = MockPeer::new(Ok(b"wrong".to_vec()), Ok(false));
    group.register_peers(Arc::new(StaticPicker {
        peer: Arc::clone(&peer),
        is_self: true,
    }));

    group.get("Tom").unwrap();
    assert_eq!(group.delete("Tom"), Ok(true));
    assert_eq!(peer.deletes.load(Ordering::SeqCst), 0);

    // Deleted locally: the next read reloads from the source
    group.get("Tom").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    destroy_group("it-self-delete");
}

#[test]
fn test_source_miss_is_not_negative_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let group = Group::new("it-negative", 2 << 10, slow_db_getter(Arc::clone(&calls)));

    assert_eq!(
        group.get("Unknown"),
        Err(Error::NotFound("Unknown".to_string()))
    );
    assert_eq!(
        group.get("Unknown"),
        Err(Error::NotFound("Unknown".to_string()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    destroy_group("it-negative");
}
