//! Card Table Coordinator
//!
//! Authoritative host for a shared table of card piles:
//! 1. Viewers stream operations to the request port
//! 2. Each operation is applied under one table-wide lock
//! 3. Every change is pushed as a full snapshot to all registered viewers
//!
//! Architecture:
//! - `dispatch` owns the table and turns operations into outcomes
//! - `registry` tracks viewers and fans snapshots out through writer tasks
//! - `server` accepts request channels and reads each one in send order;
//!   `connect` dials the viewer back before the next operation is read
//! - `api` is an optional read-only HTTP status surface

pub mod api;
pub mod config;
pub mod dispatch;
pub mod registry;
pub mod server;

use card_table::{GameState, Operation};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

pub use config::CoordinatorConfig;
pub use dispatch::{Dispatcher, Outcome};
pub use registry::ViewerRegistry;
pub use server::Coordinator;

/// Upper bound on dialing a viewer's snapshot listener.
pub const SNAPSHOT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything guarded by the table-wide lock.
pub struct TableSession {
    pub dispatcher: Dispatcher,
    pub viewers: ViewerRegistry,
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<TableSession>>,
    pub config: CoordinatorConfig,
}

impl AppState {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_dispatcher(config, Dispatcher::new())
    }

    pub fn with_dispatcher(config: CoordinatorConfig, dispatcher: Dispatcher) -> Self {
        let viewers = ViewerRegistry::new(config.viewer_queue);
        Self {
            session: Arc::new(Mutex::new(TableSession {
                dispatcher,
                viewers,
            })),
            config,
        }
    }

    /// Current table as a deep copy.
    pub async fn snapshot(&self) -> GameState {
        self.session.lock().await.dispatcher.snapshot()
    }

    /// Applies one operation and broadcasts if the table changed. Returns
    /// the dispatcher's outcome. A `connect` returns only once the snapshot
    /// channel is registered or the dial has failed.
    pub async fn perform_operation(&self, op: &Operation) -> Outcome {
        let mut session = self.session.lock().await;
        let outcome = session.dispatcher.apply(op);
        match &outcome {
            Outcome::Applied => {
                let snapshot = Arc::new(session.dispatcher.snapshot());
                let reached = session.viewers.broadcast(snapshot);
                tracing::debug!("applied {}, broadcast to {} viewers", op, reached);
            }
            Outcome::Rejected(reason) => {
                tracing::debug!("ignored {}: {}", op, reason);
            }
            Outcome::Connect(addr) => {
                drop(session);
                self.connect_viewer(addr).await;
            }
            Outcome::Disconnect(addr) => {
                let removed = session.viewers.remove_addr(addr);
                tracing::info!("viewer {} disconnected ({} channels closed)", addr, removed);
            }
        }
        outcome
    }

    /// Dials the viewer's snapshot listener without holding the lock, then
    /// registers the channel.
    async fn connect_viewer(&self, addr: &str) {
        let target = self.config.snapshot_target(addr);
        let dial = tokio::time::timeout(SNAPSHOT_DIAL_TIMEOUT, TcpStream::connect(&target));
        let stream = match dial.await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!("could not open snapshot channel to {}: {}", target, e);
                return;
            }
            Err(_) => {
                tracing::warn!("timed out opening snapshot channel to {}", target);
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay on {} failed: {}", target, e);
        }
        self.register_viewer(addr.to_string(), stream).await;
    }

    async fn register_viewer(&self, addr: String, stream: TcpStream) {
        let mut session = self.session.lock().await;
        if !session.dispatcher.state().host_still_present {
            tracing::debug!("host is shutting down, not registering {}", addr);
            return;
        }
        let initial = Arc::new(session.dispatcher.snapshot());
        session.viewers.register(addr, stream, initial);
    }
}
