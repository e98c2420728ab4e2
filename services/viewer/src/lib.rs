//! Viewer side of a card table session.
//!
//! A viewer keeps two channels to the host:
//! - an outbound request stream carrying operations
//! - an inbound snapshot stream the host opens after a `connect` operation
//!
//! Snapshots are published on a bounded queue that presentation code drains
//! with [`ViewerSession::next_snapshot`].

use card_table::{wire, GameState, Operation};
use std::fmt::Write as _;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_HOST_ADDR: &str = "127.0.0.1:4242";
pub const DEFAULT_SNAPSHOT_BIND: &str = "0.0.0.0:4243";

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    /// Host request port.
    pub host_addr: String,
    /// Where to listen for the host's snapshot channel.
    pub snapshot_bind: String,
    /// Address announced in `connect`. Derived from the request socket and
    /// the snapshot listener when unset.
    pub advertise_addr: Option<String>,
    pub snapshot_queue: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            host_addr: DEFAULT_HOST_ADDR.to_string(),
            snapshot_bind: DEFAULT_SNAPSHOT_BIND.to_string(),
            advertise_addr: None,
            snapshot_queue: 16,
        }
    }
}

impl ViewerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host_addr: std::env::var("HOST_ADDR").unwrap_or(defaults.host_addr),
            snapshot_bind: std::env::var("SNAPSHOT_BIND").unwrap_or(defaults.snapshot_bind),
            advertise_addr: std::env::var("ADVERTISE_ADDR")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            snapshot_queue: std::env::var("SNAPSHOT_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.snapshot_queue),
        }
    }

    /// Viewer on loopback with an ephemeral snapshot port.
    pub fn local(host_addr: impl Into<String>) -> Self {
        Self {
            host_addr: host_addr.into(),
            snapshot_bind: "127.0.0.1:0".to_string(),
            ..Self::default()
        }
    }
}

pub struct ViewerSession {
    requests: TcpStream,
    advertised: String,
    snapshots: mpsc::Receiver<GameState>,
    reader: JoinHandle<()>,
}

impl ViewerSession {
    /// Opens the snapshot listener, connects the request channel, and asks
    /// the host to dial back.
    pub async fn connect(config: &ViewerConfig) -> Result<Self, String> {
        let listener = TcpListener::bind(&config.snapshot_bind)
            .await
            .map_err(|e| format!("failed to bind snapshot listener {}: {}", config.snapshot_bind, e))?;
        let snapshot_port = listener
            .local_addr()
            .map_err(|e| format!("failed to read snapshot listener address: {}", e))?
            .port();

        let requests = TcpStream::connect(&config.host_addr)
            .await
            .map_err(|e| format!("failed to reach host {}: {}", config.host_addr, e))?;
        if let Err(e) = requests.set_nodelay(true) {
            tracing::debug!("set_nodelay on request channel failed: {}", e);
        }

        let advertised = match &config.advertise_addr {
            Some(addr) => addr.clone(),
            None => {
                let local_ip = requests
                    .local_addr()
                    .map_err(|e| format!("failed to read request socket address: {}", e))?
                    .ip();
                SocketAddr::new(local_ip, snapshot_port).to_string()
            }
        };

        let (tx, snapshots) = mpsc::channel(config.snapshot_queue.max(1));
        let reader = tokio::spawn(receive_snapshots(listener, tx));

        let mut session = Self {
            requests,
            advertised,
            snapshots,
            reader,
        };
        let connect = Operation::connect(session.advertised.clone());
        session.send(&connect).await?;
        tracing::info!(
            "Joined table at {}, snapshots expected on {}",
            config.host_addr,
            session.advertised
        );
        Ok(session)
    }

    /// Address the host uses to reach this viewer.
    pub fn advertised_addr(&self) -> &str {
        &self.advertised
    }

    /// Fire-and-forget: the next snapshot is the only acknowledgement.
    pub async fn send(&mut self, op: &Operation) -> Result<(), String> {
        wire::write_frame(&mut self.requests, op)
            .await
            .map_err(|e| format!("failed to send {}: {}", op, e))
    }

    /// Next snapshot from the host. `None` once the snapshot channel is gone
    /// or after the host announced it is leaving.
    pub async fn next_snapshot(&mut self) -> Option<GameState> {
        self.snapshots.recv().await
    }

    pub fn try_next_snapshot(&mut self) -> Option<GameState> {
        self.snapshots.try_recv().ok()
    }

    /// Asks the host to drop this viewer and closes both channels.
    pub async fn disconnect(mut self) -> Result<(), String> {
        let op = Operation::disconnect(self.advertised.clone());
        self.send(&op).await?;
        self.requests
            .shutdown()
            .await
            .map_err(|e| format!("failed to close request channel: {}", e))?;
        self.reader.abort();
        tracing::info!("Left table as {}", self.advertised);
        Ok(())
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn receive_snapshots(listener: TcpListener, tx: mpsc::Sender<GameState>) {
    let (mut stream, host) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::warn!("snapshot listener failed: {}", e);
            return;
        }
    };
    // One host per session.
    drop(listener);
    tracing::debug!("snapshot channel opened by {}", host);

    loop {
        match wire::read_frame::<_, GameState>(&mut stream).await {
            Ok(Some(state)) => {
                let host_left = !state.host_still_present;
                if tx.send(state).await.is_err() {
                    break;
                }
                if host_left {
                    tracing::info!("Host {} left the table", host);
                    break;
                }
            }
            Ok(None) => {
                tracing::info!("snapshot channel closed by {}", host);
                break;
            }
            Err(e) => {
                tracing::warn!("dropping snapshot channel from {}: {}", host, e);
                break;
            }
        }
    }
}

/// One line per occupied slot, for logs and terminals.
pub fn describe(state: &GameState) -> String {
    let mut out = String::new();
    for (slot, pile) in state.table.piles() {
        let face_up = pile.iter().filter(|c| c.is_face_up()).count();
        let _ = write!(
            out,
            "[{:2}] {} ({} cards, {} face up",
            slot,
            pile.name(),
            pile.len(),
            face_up
        );
        if pile.is_protected() {
            let _ = write!(out, ", owner {}", pile.owner());
        }
        out.push_str(")\n");
    }
    if !state.host_still_present {
        out.push_str("host has left\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_table::{Pile, MID_OF_TABLE};
    use std::time::Duration;

    #[test]
    fn test_describe_boot_table() {
        let text = describe(&GameState::new());
        assert_eq!(text, "[11] deck (52 cards, 0 face up)\n");
    }

    #[test]
    fn test_describe_owner_and_farewell() {
        let mut state = GameState::new();
        let mut pile = Pile::new("hand");
        pile.set_owner("alice");
        state.table.place(0, pile).unwrap();
        state.pile_names.insert("hand".to_string());
        state.host_still_present = false;

        let text = describe(&state);
        assert!(text.starts_with("[ 0] hand (0 cards, 0 face up, owner alice)\n"));
        assert!(text.ends_with("host has left\n"));
    }

    #[tokio::test]
    async fn test_connect_announces_snapshot_address() {
        let host = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ViewerConfig::local(host.local_addr().unwrap().to_string());

        let (session, accepted) = tokio::join!(ViewerSession::connect(&config), host.accept());
        let session = session.unwrap();
        let (mut request_stream, _) = accepted.unwrap();

        let op: Operation = wire::read_frame(&mut request_stream).await.unwrap().unwrap();
        assert_eq!(op, Operation::connect(session.advertised_addr()));
        assert!(session.advertised_addr().starts_with("127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_snapshots_flow_until_host_leaves() {
        let host = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ViewerConfig::local(host.local_addr().unwrap().to_string());
        let (session, accepted) = tokio::join!(ViewerSession::connect(&config), host.accept());
        let mut session = session.unwrap();
        let (mut request_stream, _) = accepted.unwrap();
        let connect: Operation = wire::read_frame(&mut request_stream).await.unwrap().unwrap();

        let mut snapshot_stream = TcpStream::connect(&connect.ip_addr).await.unwrap();
        let mut state = GameState::new();
        wire::write_frame(&mut snapshot_stream, &state).await.unwrap();
        state.table.get_mut(MID_OF_TABLE).unwrap().cards[0].flip();
        wire::write_frame(&mut snapshot_stream, &state).await.unwrap();
        state.host_still_present = false;
        wire::write_frame(&mut snapshot_stream, &state).await.unwrap();

        let wait = Duration::from_secs(5);
        let first = tokio::time::timeout(wait, session.next_snapshot()).await.unwrap().unwrap();
        assert!(!first.pile(MID_OF_TABLE).unwrap().cards[0].is_face_up());
        let second = tokio::time::timeout(wait, session.next_snapshot()).await.unwrap().unwrap();
        assert!(second.pile(MID_OF_TABLE).unwrap().cards[0].is_face_up());
        let last = tokio::time::timeout(wait, session.next_snapshot()).await.unwrap().unwrap();
        assert!(!last.host_still_present);
        assert!(tokio::time::timeout(wait, session.next_snapshot()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_sends_disconnect_and_closes() {
        let host = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ViewerConfig::local(host.local_addr().unwrap().to_string());
        let (session, accepted) = tokio::join!(ViewerSession::connect(&config), host.accept());
        let session = session.unwrap();
        let advertised = session.advertised_addr().to_string();
        let (mut request_stream, _) = accepted.unwrap();

        session.disconnect().await.unwrap();

        let connect: Operation = wire::read_frame(&mut request_stream).await.unwrap().unwrap();
        assert_eq!(connect, Operation::connect(advertised.clone()));
        let disconnect: Operation = wire::read_frame(&mut request_stream).await.unwrap().unwrap();
        assert_eq!(disconnect, Operation::disconnect(advertised));
        let eof: Option<Operation> = wire::read_frame(&mut request_stream).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_connect_fails_without_host() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = unused.local_addr().unwrap().to_string();
        drop(unused);
        let err = ViewerSession::connect(&ViewerConfig::local(addr)).await.err().unwrap();
        assert!(err.contains("failed to reach host"), "{}", err);
    }
}
