//! Shutdown coordination for the orchestrator.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// In-flight work such as a boot layer watches the token; the run loop
/// waits on [`Shutdown::wait`].
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled when shutdown is triggered.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::info!("Shutdown triggered");
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
