//! Server execution logic.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::usecase::SWEEP_INTERVAL;

use super::{router::build_router, signal::shutdown_signal, state::AppState};

/// How often rate-limit buckets whose window has passed are dropped
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// QuickTalk chat server
///
/// # Example
///
/// ```ignore
/// let state = AppState::with_in_memory(config, shops, Arc::new(SystemClock));
/// Server::new(state).run().await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Run the server until Ctrl+C / SIGTERM
    ///
    /// The session sweeper and the rate-limit pruner run for the lifetime of
    /// the server and are stopped after the listener has drained.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address
    /// or if there's an error during server execution.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let config = self.state.config.clone();
        let bind_addr = config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("QuickTalk server listening on {}", listener.local_addr()?);
        tracing::info!("Public URL: {}", config.public_url);
        tracing::info!(
            "Customer sockets: {}/ws/customer/{{shopId}}/{{customerId}}",
            config.public_ws_url()
        );
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        let cancel = CancellationToken::new();
        let sweeper = self
            .state
            .registry
            .spawn_sweeper(SWEEP_INTERVAL, cancel.child_token());
        let pruner = self
            .state
            .rate_limiter
            .spawn_pruner(PRUNE_INTERVAL, cancel.child_token());

        let app = build_router(self.state);
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        cancel.cancel();
        let _ = tokio::join!(sweeper, pruner);
        served?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
