//! Shutdown signal handling.

use tracing::warn;

/// SIGINT/SIGTERM listener, registered on construction so signals arriving
/// before the test loop polls it are not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Installs the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Waits for the next signal and returns its name.
    #[cfg(unix)]
    pub async fn recv(mut self) -> String {
        let name = tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        };
        name.to_owned()
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> String {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler failed; interrupts disabled");
            std::future::pending::<()>().await;
        }
        "SIGINT".to_owned()
    }
}

/// Future that resolves on SIGINT/SIGTERM, or never if handlers cannot be installed.
pub fn interrupt() -> impl std::future::Future<Output = String> + Send + 'static {
    let installed = ShutdownSignal::install();
    async move {
        match installed {
            Ok(signal) => signal.recv().await,
            Err(e) => {
                warn!(error = %e, "failed to install signal handlers; interrupts disabled");
                std::future::pending().await
            }
        }
    }
}
