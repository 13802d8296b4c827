//! Contract between the engine and the surface it drives.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use soulflow_core_types::{ElementState, SessionId};

use crate::{errors::ActionError, types::Interaction};

/// Operations the engine needs from a live session.
///
/// Local and remote execution are two implementations of this trait; the
/// engine never knows which one it is talking to. Implementations must map
/// their failures to the typed [`ActionError`] variants.
#[async_trait]
pub trait Host: Send + Sync {
    /// Observe the element a selector points at. A selector that matches
    /// nothing yields [`ElementState::MISSING`], not an error.
    async fn query_state(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> Result<ElementState, ActionError>;

    async fn interact(
        &self,
        session: &SessionId,
        selector: &str,
        interaction: &Interaction,
        payload: &Value,
    ) -> Result<Value, ActionError>;

    async fn navigate(&self, session: &SessionId, url: &str) -> Result<(), ActionError>;

    /// Whether the current document reports itself loaded.
    async fn readiness(&self, session: &SessionId) -> Result<bool, ActionError>;

    /// Capture the current rendering as encoded image bytes.
    async fn capture(&self, session: &SessionId) -> Result<Vec<u8>, ActionError>;
}

#[async_trait]
impl<T: Host + ?Sized> Host for Arc<T> {
    async fn query_state(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> Result<ElementState, ActionError> {
        (**self).query_state(session, selector).await
    }

    async fn interact(
        &self,
        session: &SessionId,
        selector: &str,
        interaction: &Interaction,
        payload: &Value,
    ) -> Result<Value, ActionError> {
        (**self)
            .interact(session, selector, interaction, payload)
            .await
    }

    async fn navigate(&self, session: &SessionId, url: &str) -> Result<(), ActionError> {
        (**self).navigate(session, url).await
    }

    async fn readiness(&self, session: &SessionId) -> Result<bool, ActionError> {
        (**self).readiness(session).await
    }

    async fn capture(&self, session: &SessionId) -> Result<Vec<u8>, ActionError> {
        (**self).capture(session).await
    }
}
