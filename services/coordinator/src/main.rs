//! Card table host process.
//!
//! Binds the request port, optionally serves the status API, and runs until
//! Ctrl-C, at which point viewers get a final "host left" snapshot.

use coordinator::{api, Coordinator, CoordinatorConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = CoordinatorConfig::from_env();
    tracing::info!(
        "Starting coordinator: requests on {}, viewer snapshot port {}",
        config.bind_addr,
        config.snapshot_port
    );

    let coordinator = match Coordinator::start(config.clone()).await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(status_addr) = config.status_addr.clone() {
        let state = coordinator.state().clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&status_addr, state).await {
                tracing::error!("{}", e);
            }
        });
    } else {
        tracing::info!("STATUS_ADDR not set, status API disabled");
    }

    let served = coordinator
        .serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await;

    if let Err(e) = served {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
