//! Serving and graceful shutdown.
//!
//! The emitter worker starts before the listener accepts traffic. On Ctrl+C or
//! SIGTERM the server stops taking connections first, then the worker is told
//! to stop and given `server.shutdown_timeout` seconds to drain what the last
//! requests queued.

use crate::config::Config;
use crate::emitter::EmitterWorker;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A bound, fully wired appeals service.
pub struct Application {
    listener: TcpListener,
    router: axum::Router,
    worker: EmitterWorker,
    stop_worker: broadcast::Sender<()>,
    config: Arc<Config>,
}

impl Application {
    /// Assemble from the parts produced by the builder.
    #[must_use]
    pub const fn new(
        listener: TcpListener,
        router: axum::Router,
        worker: EmitterWorker,
        stop_worker: broadcast::Sender<()>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            listener,
            router,
            worker,
            stop_worker,
            config,
        }
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until a termination signal, then drain the emitter.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            listener,
            router,
            worker,
            stop_worker,
            config,
        } = self;

        let worker = tokio::spawn(worker.run(stop_worker.subscribe()));

        info!(address = %config.bind_address(), "Appeals service listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let reason = termination().await;
                info!(reason, "Stopping HTTP server");
            })
            .await?;

        drain_worker(worker, &stop_worker, Duration::from_secs(config.server.shutdown_timeout)).await;
        info!("Appeals service stopped");
        Ok(())
    }
}

async fn drain_worker(worker: JoinHandle<()>, stop: &broadcast::Sender<()>, grace: Duration) {
    // No receiver means the worker already returned on its own.
    if stop.send(()).is_err() {
        warn!("Emitter worker was not running at shutdown");
    }

    match tokio::time::timeout(grace, worker).await {
        Ok(Ok(())) => info!("Emitter worker drained"),
        Ok(Err(e)) => warn!(error = %e, "Emitter worker panicked"),
        Err(_) => warn!(grace_secs = grace.as_secs(), "Emitter worker did not drain in time"),
    }
}

/// Resolves with the name of the first termination signal received.
async fn termination() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "ctrl-c",
            Err(e) => {
                error!(error = %e, "Cannot listen for Ctrl+C");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "sigterm"
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&'static str>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = sigterm => reason,
    }
}
