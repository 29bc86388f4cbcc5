// RPC server shim
//
// Dispatches remote Get/Delete requests to the registered groups and keeps
// this node announced in the service registry while it serves. The actual
// wire protocol lives behind the `Transport` contract.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::group::get_group;
use crate::peers::PeerClient;
use crate::peers::picker::DEFAULT_SERVICE_NAME;
use crate::registry::SharedRegistry;
use crate::util::valid_peer_addr;

/// Address a server binds when none is configured
pub const DEFAULT_ADDR: &str = "127.0.0.1:7654";

/// RPC request naming a group and a key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub group: String,
    pub key: String,
}

/// Response to a get request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: Vec<u8>,
}

/// Response to a delete request
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub value: bool,
}

/// Wire protocol contract
///
/// Implementations own connection handling and message framing for the
/// request/response types above; the core hands them a bound listener and a
/// dispatcher and expects `serve` to block until `shutdown` is signalled or
/// closed.
pub trait Transport: Send + Sync {
    /// Serve RPC requests on `listener`, dispatching through `dispatcher`
    fn serve(
        &self,
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        shutdown: Receiver<()>,
    ) -> Result<()>;
}

/// Routes incoming RPC requests to their group
///
/// Also a valid [`PeerClient`]: dispatching to the local process is exactly
/// what a loopback peer connection would do, so a picker may use one as its
/// self client.
pub struct Dispatcher;

impl PeerClient for Dispatcher {
    fn get(&self, group: &str, key: &str) -> Result<Vec<u8>> {
        debug!(group, key, "rpc get");
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let group = get_group(group).ok_or_else(|| Error::GroupNotFound(group.to_string()))?;
        Ok(group.get(key)?.to_vec())
    }

    fn delete(&self, group: &str, key: &str) -> Result<bool> {
        debug!(group, key, "rpc delete");
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let group = get_group(group).ok_or_else(|| Error::GroupNotFound(group.to_string()))?;
        group.delete(key)
    }
}

/// Configuration options for [`Server`]
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Service name to register under
    pub service_name: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl ServerOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service name (chainable)
    pub fn with_service_name<S: Into<String>>(mut self, name: S) -> Self {
        self.service_name = name.into();
        self
    }
}

struct ServerState {
    running: bool,
    stop: Option<Sender<()>>,
}

/// RPC server for one cache node
///
/// `start` blocks the calling thread while serving; `stop` may be called
/// from any other thread. Stopping closes the shutdown channel, which ends
/// both the registry lease and the transport's serve loop.
pub struct Server {
    self_addr: String,
    service_name: String,
    registry: SharedRegistry,
    transport: Arc<dyn Transport>,
    state: Mutex<ServerState>,
}

impl Server {
    /// Create a server for `self_addr` (empty selects [`DEFAULT_ADDR`])
    pub fn new(
        self_addr: impl Into<String>,
        registry: SharedRegistry,
        transport: Arc<dyn Transport>,
        options: ServerOptions,
    ) -> Result<Server> {
        let mut self_addr = self_addr.into();
        if self_addr.is_empty() {
            self_addr = DEFAULT_ADDR.to_string();
        } else if !valid_peer_addr(&self_addr) {
            return Err(Error::InvalidAddress(self_addr));
        }

        Ok(Server {
            self_addr,
            service_name: options.service_name,
            registry,
            transport,
            state: Mutex::new(ServerState {
                running: false,
                stop: None,
            }),
        })
    }

    /// The address this server answers on
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Bind, register, and serve until stopped
    ///
    /// Returns [`Error::AlreadyRunning`] when called while serving.
    pub fn start(&self) -> Result<()> {
        let port = self
            .self_addr
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse::<u16>().ok())
            .ok_or_else(|| Error::InvalidAddress(self.self_addr.clone()))?;

        let shutdown = {
            let mut state = self.state.lock();
            if state.running {
                return Err(Error::AlreadyRunning);
            }
            state.running = true;
            let (tx, rx) = unbounded();
            state.stop = Some(tx);
            rx
        };

        let listener = match TcpListener::bind(("0.0.0.0", port)) {
            Ok(listener) => listener,
            Err(err) => {
                self.clear_running();
                return Err(err.into());
            }
        };

        // Keep-alive registration holds the lease until the shutdown
        // channel closes.
        let registration = {
            let registry = Arc::clone(&self.registry);
            let service = self.service_name.clone();
            let addr = self.self_addr.clone();
            let stop = shutdown.clone();
            thread::spawn(move || {
                if let Err(err) = registry.register(&service, &addr, stop) {
                    error!(%addr, %err, "service registration failed");
                }
            })
        };

        info!(addr = %self.self_addr, service = %self.service_name, "server listening");
        let result = self.transport.serve(listener, Arc::new(Dispatcher), shutdown);

        let _ = registration.join();
        info!(addr = %self.self_addr, "server stopped");
        self.clear_running();
        result
    }

    /// Signal the serve loop and the registry lease to end
    ///
    /// Idempotent; a no-op when the server is not running.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.running = false;
        // Dropping the sender closes the channel for every listener
        state.stop = None;
    }

    fn clear_running(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.stop = None;
    }
}
