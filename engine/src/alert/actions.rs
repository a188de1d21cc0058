//! Notification action dispatch seam.
//!
//! Actual delivery (SMTP, HTTP) belongs to the surrounding product; the
//! engine defines the dispatch contract and ships a tracing-backed default
//! so every configured action remains observable without external services.

use crate::models::ActionKind;
use async_trait::async_trait;
use thiserror::Error;

/// A failed dispatch attempt.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DispatchError(pub String);

/// Delivers rendered action payloads.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Delivers one payload to one target.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing the delivery failure. Failures
    /// are isolated per action by the caller and never abort sibling actions.
    async fn dispatch(
        &self,
        kind: ActionKind,
        target: &str,
        payload: &str,
    ) -> Result<(), DispatchError>;
}

/// Default dispatcher: emits every payload to the engine log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

#[async_trait]
impl ActionDispatcher for TracingDispatcher {
    async fn dispatch(
        &self,
        kind: ActionKind,
        target: &str,
        payload: &str,
    ) -> Result<(), DispatchError> {
        tracing::info!(%kind, target, payload, "Dispatching action");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_dispatcher_always_succeeds() {
        let dispatcher = TracingDispatcher;
        let result = dispatcher
            .dispatch(ActionKind::Log, "audit", "something fired")
            .await;
        assert!(result.is_ok());
    }
}
