//! Cooperative stop flag shared between the engine and whoever stops it.
//!
//! The engine only looks at the flag between rounds. The first request asks
//! for a graceful drain; any further request is reported as
//! [`StopRequest::Immediate`] so the caller can terminate the process.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// First request: finish the current round, then stop.
    Graceful,
    /// A stop was already pending; the caller should exit right away.
    Immediate,
}

/// Clonable handle to one engine's stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requests: Arc<AtomicU32>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop.
    pub fn request_stop(&self) -> StopRequest {
        match self.requests.fetch_add(1, Ordering::SeqCst) {
            0 => StopRequest::Graceful,
            _ => StopRequest::Immediate,
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.requests.load(Ordering::SeqCst) > 0
    }

    /// Wait for SIGINT/SIGTERM and forward each one as a stop request.
    ///
    /// Returns on the first request that comes back `Immediate`.
    pub async fn forward_signals(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            #[cfg(unix)]
            tokio::select! {
                r = tokio::signal::ctrl_c() => { r?; tracing::info!("received SIGINT"); }
                _ = terminate.recv() => { tracing::info!("received SIGTERM"); }
            }
            #[cfg(not(unix))]
            {
                tokio::signal::ctrl_c().await?;
                tracing::info!("received SIGINT");
            }

            match self.request_stop() {
                StopRequest::Graceful => {
                    tracing::info!("starting graceful shutdown, finishing current round");
                }
                StopRequest::Immediate => return Ok(()),
            }
        }
    }
}
