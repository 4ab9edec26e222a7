//! Graceful shutdown for the HTTP server
//!
//! On SIGINT or SIGTERM the listener stops accepting (after an optional
//! delay), then in-flight API requests get up to `drain_timeout` to finish
//! before storage is closed.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Shutdown timing, from `SHUTDOWN_DRAIN_TIMEOUT_SECS` and `SHUTDOWN_DELAY_SECS`
#[derive(Debug, Clone)]
pub struct GracefulShutdownConfig {
    pub drain_timeout: Duration,
    /// Time to keep accepting after the signal, for load balancer health checks
    pub shutdown_delay: Duration,
}

impl Default for GracefulShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            shutdown_delay: Duration::ZERO,
        }
    }
}

/// Counts API requests so shutdown can wait for in-flight ingests.
#[derive(Debug, Default)]
pub struct RequestTracker {
    active: AtomicU64,
    total: AtomicU64,
    idle: Notify,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_start(&self) -> RequestGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        RequestGuard { tracker: self }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight. `false` if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                // A `Notified` created before the check receives any later wakeup.
                let notified = self.idle.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

/// Marks one request in flight until dropped.
pub struct RequestGuard<'a> {
    tracker: &'a RequestTracker,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutdown requested");
}

/// Serve `app` until `shutdown` resolves, then wait for in-flight requests.
pub async fn serve_with_shutdown<F>(
    listener: tokio::net::TcpListener,
    app: axum::Router,
    tracker: Arc<RequestTracker>,
    config: GracefulShutdownConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let delay = config.shutdown_delay;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            if !delay.is_zero() {
                info!(delay_secs = delay.as_secs_f64(), "Delaying listener close");
                tokio::time::sleep(delay).await;
            }
        })
        .await?;

    let in_flight = tracker.active_count();
    if tracker.drain(config.drain_timeout).await {
        info!(in_flight, "In-flight requests drained");
    } else {
        warn!(still_active = tracker.active_count(), "Drain timed out");
    }

    Ok(())
}
