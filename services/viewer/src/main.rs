//! Headless viewer: joins a table and logs every snapshot until the host
//! leaves or Ctrl-C.

use viewer::{describe, ViewerConfig, ViewerSession};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ViewerConfig::from_env();
    let mut session = match ViewerSession::connect(&config).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let interrupted = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break true,
            snapshot = session.next_snapshot() => match snapshot {
                Some(state) => {
                    tracing::info!(
                        "snapshot: {} piles, next default name {:?}\n{}",
                        state.table.pile_count(),
                        state.next_default_pile_name(),
                        describe(&state)
                    );
                    if !state.host_still_present {
                        break false;
                    }
                }
                None => {
                    tracing::warn!("snapshot channel closed");
                    break false;
                }
            },
        }
    };

    if interrupted {
        if let Err(e) = session.disconnect().await {
            tracing::warn!("{}", e);
        }
    }
}
