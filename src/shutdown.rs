//! Cooperative shutdown signal
//!
//! [`ShutdownSignal`] is an injectable flag shared by whoever may request a
//! shutdown (an OS signal listener, a test, an embedding application) and the
//! batch driver, which polls it before dispatching each item. It is set at
//! most once and never reset.
//!
//! [`SignalListener`] ties OS interrupt handling to a scope: the listener task
//! is aborted when the guard is dropped, so no background task outlives the
//! batch that installed it.

use tokio_util::sync::CancellationToken;

/// Process-wide shutdown request flag
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a signal in the "not requested" state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request a shutdown
    ///
    /// Idempotent: later calls are no-ops.
    pub fn request(&self) {
        if self.token.is_cancelled() {
            tracing::debug!("Shutdown already requested");
            return;
        }
        tracing::info!("Graceful shutdown requested");
        self.token.cancel();
    }

    /// Wait until a shutdown is requested
    pub async fn requested(&self) {
        self.token.cancelled().await;
    }

    /// Install an OS signal listener that requests shutdown on SIGINT/SIGTERM
    ///
    /// The listener lives as long as the returned guard.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use profile_extract::ShutdownSignal;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let shutdown = ShutdownSignal::new();
    /// let _listener = shutdown.listen_for_os_signals();
    /// // ... run the batch with `shutdown` ...
    /// # }
    /// ```
    #[must_use = "the listener stops when the guard is dropped"]
    pub fn listen_for_os_signals(&self) -> SignalListener {
        let signal = self.clone();
        let handle = tokio::spawn(async move {
            wait_for_signal().await;
            if signal.is_requested() {
                tracing::warn!("Received signal again, shutdown already in progress");
            } else {
                tracing::warn!("Received termination signal, finishing in-flight items");
            }
            signal.request();
        });
        SignalListener { handle }
    }
}

/// Scoped OS signal listener
///
/// Aborts the listener task when dropped.
#[derive(Debug)]
pub struct SignalListener {
    handle: tokio::task::JoinHandle<()>,
}

impl SignalListener {
    /// Stop listening explicitly
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
