use anyhow::{Context, Result};
use tokio::sync::watch;
use uuid::Uuid;

/// Generates a fresh opaque token identifying a user.
///
/// Every call returns a new random (v4) UUID in its hyphenated form. Nothing is
/// persisted and the token is not checked against previously issued ones, the
/// 122 random bits make a collision negligible.
#[must_use]
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Spawns a task that signals shutdown if the wrapped future fails.
///
/// The returned handle resolves to the future's own result. On error, `true`
/// is sent through `shutdown_sender` before the error is handed back, so every
/// other component listening on the channel can stop gracefully.
///
/// # Arguments
///
/// * `f` - The future to run, which must return a `Result<()>`
/// * `shutdown_sender` - The sender half of the process-wide shutdown channel
///
/// # Example
///
/// ```rust,ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = spawn_with_shutdown(run_server(app_state, listener, shutdown_rx), shutdown_tx);
/// ```
pub fn spawn_with_shutdown<F>(
    f: F,
    shutdown_sender: watch::Sender<bool>,
) -> tokio::task::JoinHandle<Result<()>>
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::task::spawn(async move {
        let res = f.await;
        if let Err(e) = &res {
            tracing::error!(
                target = "palaver-utils",
                event = "task-failed",
                error = %e,
                "Spawned task failed, sending shutdown signal"
            );
            shutdown_sender
                .send(true)
                .context("Failed to send shutdown signal")?;
        }
        res
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generate_token_is_not_empty() {
        let token = generate_token();
        assert!(!token.is_empty());
        assert_eq!(token.len(), 36);
        assert!(Uuid::parse_str(&token).is_ok());
    }

    #[test]
    fn test_generate_token_is_unique() {
        let tokens = (0..1_000).map(|_| generate_token()).collect::<HashSet<_>>();
        assert_eq!(tokens.len(), 1_000);
    }

    #[tokio::test]
    async fn test_spawn_with_shutdown_signals_on_error() {
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let handle = spawn_with_shutdown(
            async { Err(anyhow::anyhow!("boom")) },
            shutdown_sender,
        );
        let result = handle.await.unwrap();
        assert!(result.is_err());
        assert!(*shutdown_receiver.borrow());
    }

    #[tokio::test]
    async fn test_spawn_with_shutdown_is_silent_on_success() {
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let handle = spawn_with_shutdown(async { Ok(()) }, shutdown_sender);
        assert!(handle.await.unwrap().is_ok());
        assert!(!*shutdown_receiver.borrow());
    }
}
