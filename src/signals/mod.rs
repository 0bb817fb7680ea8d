//! Process termination signals.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM cancel the session token instead of
//! killing the process, so the run is finalized as STOPPED.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Wait for the next termination signal and return its name.
pub async fn wait_for_termination() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "SIGINT")
    }
}

/// Spawn a task that cancels `cancel` on the first termination signal.
///
/// The task ends on its own once `cancel` is cancelled by anything else.
pub fn spawn_termination_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_termination() => match signal {
                Ok(name) => {
                    warn!(signal = name, "termination requested, stopping run");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "failed to install signal handler"),
            },
            _ = cancel.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled() {
        let cancel = CancellationToken::new();
        let handle = spawn_termination_listener(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener should exit")
            .unwrap();
    }
}
