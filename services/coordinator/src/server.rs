//! Request listener and coordinator lifecycle.

use card_table::{wire, OpKind, Operation};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{AppState, CoordinatorConfig, Dispatcher};

/// A running coordinator: the request acceptor plus the shared table.
pub struct Coordinator {
    state: AppState,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    acceptor: Option<JoinHandle<Result<(), String>>>,
}

impl Coordinator {
    /// Binds the request port and starts accepting viewers.
    pub async fn start(config: CoordinatorConfig) -> Result<Self, String> {
        Self::start_with(config, Dispatcher::new()).await
    }

    pub async fn start_with(
        config: CoordinatorConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, String> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| format!("failed to bind request port {}: {}", config.bind_addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("failed to read bound address: {}", e))?;
        tracing::info!("Coordinator accepting viewer requests on {}", local_addr);

        let state = AppState::with_dispatcher(config, dispatcher);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(listener, state.clone(), shutdown_rx));

        Ok(Self {
            state,
            local_addr,
            shutdown,
            acceptor: Some(acceptor),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves until `signal` resolves or the acceptor fails, then shuts
    /// down. An acceptor failure is returned as the error.
    pub async fn serve_until<F>(mut self, signal: F) -> Result<(), String>
    where
        F: Future<Output = ()>,
    {
        let outcome = match self.acceptor.take() {
            Some(mut acceptor) => {
                tokio::select! {
                    _ = signal => {
                        self.acceptor = Some(acceptor);
                        Ok(())
                    }
                    joined = &mut acceptor => match joined {
                        Ok(result) => result,
                        Err(e) => Err(format!("acceptor task failed: {}", e)),
                    },
                }
            }
            None => Ok(()),
        };
        self.shutdown().await;
        outcome
    }

    /// Stops accepting, tells every viewer the host is leaving, and waits
    /// for the final snapshots to be written.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(acceptor) = self.acceptor.take() {
            if let Ok(Err(e)) = acceptor.await {
                tracing::error!("request acceptor stopped: {}", e);
            }
        }

        let writers = {
            let mut session = self.state.session.lock().await;
            session.dispatcher.set_host_present(false);
            let farewell = Arc::new(session.dispatcher.snapshot());
            let reached = session.viewers.broadcast(farewell);
            tracing::info!("host leaving, notified {} viewers", reached);
            session.viewers.drain()
        };
        for result in futures::future::join_all(writers).await {
            if let Err(e) = result {
                tracing::warn!("snapshot writer ended abnormally: {}", e);
            }
        }
        tracing::info!("Coordinator stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), String> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| {
                    tracing::error!("accepting request channel failed: {}", e);
                    format!("accept failed: {}", e)
                })?;
                tracing::info!("request channel opened by {}", peer);
                tokio::spawn(read_operations(stream, peer, state.clone(), shutdown.clone()));
            }
        }
    }
}

/// Feeds one viewer's operations to the dispatcher in arrival order. Each
/// operation, `connect` included, completes before the next frame is read.
async fn read_operations(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) {
    // Snapshot channels opened through this request channel.
    let mut registered: Vec<String> = Vec::new();
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return,
            frame = wire::read_frame::<_, Operation>(&mut stream) => frame,
        };
        match frame {
            Ok(Some(op)) => {
                tracing::debug!("[{}] {}", peer, op);
                match op.op {
                    OpKind::Connect => registered.push(op.ip_addr.clone()),
                    OpKind::Disconnect => registered.retain(|addr| *addr != op.ip_addr),
                    _ => {}
                }
                state.perform_operation(&op).await;
            }
            Ok(None) => {
                tracing::info!("request channel from {} closed", peer);
                break;
            }
            Err(e) => {
                tracing::warn!("dropping request channel from {}: {}", peer, e);
                break;
            }
        }
    }

    // Registry only, the table is untouched.
    let mut session = state.session.lock().await;
    for addr in &registered {
        let removed = session.viewers.remove_addr(addr);
        if removed > 0 {
            tracing::info!(
                "viewer {} left with its request channel ({} channels closed)",
                addr,
                removed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use card_table::{Card, GameState, Rank, Suit, MAIN_DECK_NAME, MID_OF_TABLE, NO_OWNER};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use viewer::{ViewerConfig, ViewerSession};

    const DECK: i32 = MID_OF_TABLE as i32;
    const WAIT: Duration = Duration::from_secs(5);

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    }

    async fn start() -> Coordinator {
        init_logging();
        Coordinator::start(CoordinatorConfig::local()).await.unwrap()
    }

    async fn join(coordinator: &Coordinator) -> (ViewerSession, GameState) {
        let config = ViewerConfig::local(coordinator.local_addr().to_string());
        let mut session = ViewerSession::connect(&config).await.unwrap();
        let first = next(&mut session).await;
        (session, first)
    }

    async fn next(session: &mut ViewerSession) -> GameState {
        tokio::time::timeout(WAIT, session.next_snapshot())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("snapshot channel closed")
    }

    async fn assert_quiet(session: &mut ViewerSession) {
        let extra = tokio::time::timeout(Duration::from_millis(200), session.next_snapshot()).await;
        assert!(extra.is_err(), "unexpected snapshot: {:?}", extra);
    }

    async fn wait_for_viewers(coordinator: &Coordinator, expected: usize) {
        for _ in 0..100 {
            if coordinator.state().session.lock().await.viewers.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry never reached {} viewers", expected);
    }

    #[tokio::test]
    async fn test_boot_snapshot() {
        let coordinator = start().await;
        let (_viewer, first) = join(&coordinator).await;

        let deck = first.pile(MID_OF_TABLE).unwrap();
        assert_eq!(deck.name(), MAIN_DECK_NAME);
        assert_eq!(deck.len(), 52);
        assert!(deck.iter().all(|c| !c.is_face_up()));
        assert_eq!(first.table.pile_count(), 1);
        assert_eq!(first.default_pile_counter, 1);
        assert!(first.host_still_present);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_then_duplicate_is_silent() {
        let coordinator = start().await;
        let (mut viewer, _) = join(&coordinator).await;

        viewer.send(&Operation::create(0, "Pile 1")).await.unwrap();
        let state = next(&mut viewer).await;
        assert_eq!(state.pile(0).unwrap().name(), "Pile 1");
        assert_eq!(state.default_pile_counter, 2);

        viewer.send(&Operation::create(0, "Pile 1")).await.unwrap();
        assert_quiet(&mut viewer).await;

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_operations_apply_in_send_order() {
        let coordinator = start().await;
        let (mut viewer, _) = join(&coordinator).await;
        let ace = Card::new(Suit::Clubs, Rank::Ace);

        viewer.send(&Operation::create(0, "X")).await.unwrap();
        viewer.send(&Operation::move_card(DECK, 0, ace)).await.unwrap();
        viewer.send(&Operation::protect(0, "alice")).await.unwrap();
        viewer.send(&Operation::unprotect(0, "bob")).await.unwrap();

        let _created = next(&mut viewer).await;
        let moved = next(&mut viewer).await;
        assert_eq!(moved.pile(0).unwrap().cards, vec![ace]);
        assert_eq!(moved.pile(MID_OF_TABLE).unwrap().len(), 51);
        let protected = next(&mut viewer).await;
        assert_eq!(protected.pile(0).unwrap().owner(), "alice");
        assert_quiet(&mut viewer).await;

        viewer.send(&Operation::unprotect(0, "alice")).await.unwrap();
        assert_eq!(next(&mut viewer).await.pile(0).unwrap().owner(), NO_OWNER);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_shuffle_fans_out_once_to_every_viewer() {
        let coordinator = start().await;
        let (mut a, boot) = join(&coordinator).await;
        let (mut b, _) = join(&coordinator).await;

        a.send(&Operation::shuffle(DECK)).await.unwrap();
        let seen_a = next(&mut a).await;
        let seen_b = next(&mut b).await;
        assert_eq!(seen_a, seen_b);
        assert_ne!(
            seen_a.pile(MID_OF_TABLE).unwrap().cards,
            boot.pile(MID_OF_TABLE).unwrap().cards
        );
        assert_quiet(&mut a).await;
        assert_quiet(&mut b).await;

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_stops_broadcasts_to_that_viewer() {
        let coordinator = start().await;
        let (a, _) = join(&coordinator).await;
        let (mut b, _) = join(&coordinator).await;
        wait_for_viewers(&coordinator, 2).await;

        a.disconnect().await.unwrap();
        wait_for_viewers(&coordinator, 1).await;

        b.send(&Operation::face_up(DECK)).await.unwrap();
        let state = next(&mut b).await;
        assert!(state.pile(MID_OF_TABLE).unwrap().iter().all(|c| c.is_face_up()));

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_only_that_viewer() {
        let coordinator = start().await;
        let (_a, _) = join(&coordinator).await;
        let (mut b, _) = join(&coordinator).await;
        wait_for_viewers(&coordinator, 2).await;

        let mut rogue = TcpStream::connect(coordinator.local_addr()).await.unwrap();
        rogue.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        drop(rogue);

        b.send(&Operation::create(5, "still here")).await.unwrap();
        assert!(next(&mut b).await.pile(5).is_some());
        assert_eq!(coordinator.state().session.lock().await.viewers.len(), 2);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_to_dead_address_is_harmless() {
        let coordinator = start().await;
        let (mut viewer, _) = join(&coordinator).await;

        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = unused.local_addr().unwrap().to_string();
        drop(unused);
        viewer.send(&Operation::connect(dead_addr)).await.unwrap();

        viewer.send(&Operation::face_up(DECK)).await.unwrap();
        assert!(next(&mut viewer).await.pile(MID_OF_TABLE).unwrap().cards[0].is_face_up());
        wait_for_viewers(&coordinator, 1).await;

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_back_to_back() {
        let coordinator = start().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut requests = TcpStream::connect(coordinator.local_addr()).await.unwrap();
        wire::write_frame(&mut requests, &Operation::connect(addr.clone())).await.unwrap();
        wire::write_frame(&mut requests, &Operation::disconnect(addr)).await.unwrap();
        wire::write_frame(&mut requests, &Operation::face_up(DECK)).await.unwrap();

        let mut applied = false;
        for _ in 0..100 {
            let state = coordinator.state().snapshot().await;
            if state.pile(MID_OF_TABLE).unwrap().cards[0].is_face_up() {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(applied, "faceUp never applied");
        assert_eq!(coordinator.state().session.lock().await.viewers.len(), 0);

        // Only the registration snapshot went out, taken before faceUp.
        let (mut snapshots, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        let initial: Option<GameState> = tokio::time::timeout(WAIT, wire::read_frame(&mut snapshots))
            .await
            .unwrap()
            .unwrap();
        assert!(!initial.unwrap().pile(MID_OF_TABLE).unwrap().cards[0].is_face_up());
        let closed: Option<GameState> = tokio::time::timeout(WAIT, wire::read_frame(&mut snapshots))
            .await
            .unwrap()
            .unwrap();
        assert!(closed.is_none());

        drop(requests);
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_channel_eof_releases_viewer() {
        let coordinator = start().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let mut requests = TcpStream::connect(coordinator.local_addr()).await.unwrap();
        wire::write_frame(&mut requests, &Operation::connect(addr)).await.unwrap();
        let (mut snapshots, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .unwrap()
            .unwrap();
        let initial: GameState = tokio::time::timeout(WAIT, wire::read_frame(&mut snapshots))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        wait_for_viewers(&coordinator, 1).await;

        requests.shutdown().await.unwrap();
        drop(requests);
        wait_for_viewers(&coordinator, 0).await;

        let closed: Option<GameState> = tokio::time::timeout(WAIT, wire::read_frame(&mut snapshots))
            .await
            .unwrap()
            .unwrap();
        assert!(closed.is_none());
        assert_eq!(coordinator.state().snapshot().await, initial);

        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_sends_farewell() {
        let coordinator = start().await;
        let (mut a, _) = join(&coordinator).await;
        let (mut b, _) = join(&coordinator).await;
        let addr = coordinator.local_addr();

        coordinator.shutdown().await;

        for viewer in [&mut a, &mut b] {
            let last = next(viewer).await;
            assert!(!last.host_still_present);
            assert!(viewer.next_snapshot().await.is_none());
        }
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_serve_until_returns_after_signal() {
        let coordinator = start().await;
        let (mut viewer, _) = join(&coordinator).await;

        let served = coordinator.serve_until(async {}).await;
        assert!(served.is_ok());
        assert!(!next(&mut viewer).await.host_still_present);
    }

    #[tokio::test]
    async fn test_concurrent_viewers_keep_invariants() {
        let coordinator = start().await;
        let mut viewers = Vec::new();
        for _ in 0..4 {
            viewers.push(join(&coordinator).await.0);
        }

        let mut tasks = Vec::new();
        for (i, mut viewer) in viewers.into_iter().enumerate() {
            tasks.push(tokio::spawn(async move {
                let slot = i as i32;
                viewer.send(&Operation::create(slot, format!("Pile {}", i + 1))).await.unwrap();
                for suit in Suit::ALL {
                    let card = Card::new(suit, Rank::ALL[i]);
                    viewer.send(&Operation::move_card(DECK, slot, card)).await.unwrap();
                    viewer.send(&Operation::flip(slot, card)).await.unwrap();
                }
                viewer.send(&Operation::shuffle(DECK)).await.unwrap();
                viewer
            }));
        }
        let mut viewers = Vec::new();
        for task in tasks {
            viewers.push(task.await.unwrap());
        }

        // 4 viewers x 10 applied operations each.
        let mut last = None;
        for _ in 0..40 {
            last = Some(next(&mut viewers[0]).await);
        }
        let last = last.unwrap();
        last.check_invariants().unwrap();
        assert_eq!(last.pile(MID_OF_TABLE).unwrap().len(), 52 - 16);
        for i in 0..4 {
            let pile = last.pile(i).unwrap();
            assert_eq!(pile.len(), 4);
            assert!(pile.iter().all(|c| c.is_face_up() && c.rank == Rank::ALL[i]));
        }
        assert_eq!(last, coordinator.state().snapshot().await);

        coordinator.shutdown().await;
    }
}
