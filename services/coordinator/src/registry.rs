//! Registered viewers and snapshot fan-out.
//!
//! Every viewer gets a writer task that exclusively owns its snapshot socket
//! and drains a bounded outbox. Broadcasting only pushes into outboxes, so it
//! never waits on a slow or dead viewer.

use card_table::{wire, GameState};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type Snapshot = Arc<GameState>;

pub struct ViewerHandle {
    pub id: Uuid,
    /// Address the viewer registered with; `disconnect` matches on it.
    pub addr: String,
    outbox: mpsc::Sender<Snapshot>,
    writer: JoinHandle<()>,
}

pub struct ViewerRegistry {
    viewers: Vec<ViewerHandle>,
    queue_capacity: usize,
}

impl ViewerRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        ViewerRegistry {
            viewers: Vec::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn viewers(&self) -> impl Iterator<Item = &ViewerHandle> {
        self.viewers.iter()
    }

    /// Hands `stream` to a new writer task and queues `initial` as the
    /// viewer's first snapshot.
    pub fn register(&mut self, addr: String, stream: TcpStream, initial: Snapshot) -> Uuid {
        let id = Uuid::new_v4();
        let (outbox, inbox) = mpsc::channel(self.queue_capacity);
        let queued = outbox.try_send(initial);
        debug_assert!(queued.is_ok(), "fresh outbox has room for one snapshot");
        let writer = tokio::spawn(run_writer(id, addr.clone(), stream, inbox));

        tracing::info!("viewer {} registered at {}", id, addr);
        self.viewers.push(ViewerHandle {
            id,
            addr,
            outbox,
            writer,
        });
        id
    }

    /// Queues `snapshot` for every viewer. Viewers whose writer has died or
    /// whose outbox is full are dropped; the rest are unaffected. Returns the
    /// number of viewers the snapshot was queued for.
    pub fn broadcast(&mut self, snapshot: Snapshot) -> usize {
        self.viewers
            .retain(|viewer| match viewer.outbox.try_send(Arc::clone(&snapshot)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "viewer {} at {} fell behind, dropping it",
                        viewer.id,
                        viewer.addr
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(
                        "viewer {} at {} lost its snapshot channel, dropping it",
                        viewer.id,
                        viewer.addr
                    );
                    false
                }
            });
        self.viewers.len()
    }

    /// Drops every viewer registered under `addr`. Their writers flush what
    /// is queued and close. Returns how many were removed.
    pub fn remove_addr(&mut self, addr: &str) -> usize {
        let before = self.viewers.len();
        self.viewers.retain(|viewer| viewer.addr != addr);
        before - self.viewers.len()
    }

    /// Empties the registry and returns the writer tasks so the caller can
    /// wait for the final snapshots to go out.
    pub fn drain(&mut self) -> Vec<JoinHandle<()>> {
        self.viewers
            .drain(..)
            .map(|viewer| {
                let ViewerHandle { writer, .. } = viewer;
                writer
            })
            .collect()
    }
}

async fn run_writer(
    id: Uuid,
    addr: String,
    mut stream: TcpStream,
    mut inbox: mpsc::Receiver<Snapshot>,
) {
    while let Some(snapshot) = inbox.recv().await {
        if let Err(e) = wire::write_frame(&mut stream, snapshot.as_ref()).await {
            tracing::warn!("snapshot write to viewer {} at {} failed: {}", id, addr, e);
            return;
        }
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!("closing snapshot channel to {} failed: {}", addr, e);
    }
    tracing::debug!("writer for viewer {} at {} finished", id, addr);
}
