//! Remote job host over HTTP.
//!
//! Each host call is one JSON request against
//! `{base}/sessions/{session}/{query|interact|navigate|capture|ready}`.
//! Status codes carry the error type: 404 is a missing element, 409 an
//! element that cannot take the interaction, transport failures are network
//! errors.

use std::time::Duration;

use action_primitives::{ActionError, Host, Interaction};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use soulflow_core_types::{ElementState, SessionId};
use tracing::{debug, trace};
use url::Url;

use crate::errors::{Result, SoulFlowError};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RemoteHost {
    client: Client,
    base: Url,
}

#[derive(Deserialize)]
struct Readiness {
    ready: bool,
}

impl RemoteHost {
    pub fn new(base: &str, request_timeout: Duration) -> Result<Self> {
        let invalid = |reason: String| SoulFlowError::RemoteUrl {
            url: base.to_string(),
            reason,
        };
        let base = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) base url".to_string()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(SoulFlowError::Client)?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, session: &SessionId, operation: &str) -> std::result::Result<Url, ActionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ActionError::Host(format!("cannot extend base url {}", self.base)))?
            .pop_if_empty()
            .extend(["sessions", session.0.as_str(), operation]);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> std::result::Result<Response, ActionError> {
        let response = request
            .send()
            .await
            .map_err(|err| ActionError::Network(format!("{} request failed: {}", operation, err)))?;
        let status = response.status();
        trace!(operation, %status, "remote host response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(operation, status, body))
    }
}

/// Map a non-success status onto the typed taxonomy.
pub fn status_error(operation: &str, status: StatusCode, body: String) -> ActionError {
    let detail = if body.trim().is_empty() {
        format!("{} returned {}", operation, status)
    } else {
        format!("{}: {}", operation, body.trim())
    };
    match status {
        StatusCode::NOT_FOUND => ActionError::ElementNotFound(detail),
        StatusCode::CONFLICT => ActionError::ElementNotActionable(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ActionError::Timeout(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ActionError::InvalidParameters(detail)
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ActionError::Network(detail),
        _ => ActionError::Host(detail),
    }
}

fn malformed(operation: &str, err: reqwest::Error) -> ActionError {
    ActionError::Host(format!("{} returned a malformed body: {}", operation, err))
}

#[async_trait]
impl Host for RemoteHost {
    async fn query_state(
        &self,
        session: &SessionId,
        selector: &str,
    ) -> std::result::Result<ElementState, ActionError> {
        let url = self.endpoint(session, "query")?;
        let request = self.client.post(url).json(&json!({ "selector": selector }));
        match self.send("query", request).await {
            Ok(response) => response
                .json::<ElementState>()
                .await
                .map_err(|err| malformed("query", err)),
            Err(ActionError::ElementNotFound(_)) => Ok(ElementState::MISSING),
            Err(err) => Err(err),
        }
    }

    async fn interact(
        &self,
        session: &SessionId,
        selector: &str,
        interaction: &Interaction,
        payload: &Value,
    ) -> std::result::Result<Value, ActionError> {
        let url = self.endpoint(session, "interact")?;
        debug!(%session, selector, interaction = interaction.name(), "remote interaction");
        let request = self.client.post(url).json(&json!({
            "selector": selector,
            "interaction": interaction.name(),
            "payload": payload,
        }));
        let response = self.send(interaction.name(), request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| malformed(interaction.name(), err))?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|err| {
            ActionError::Host(format!(
                "{} returned a malformed body: {}",
                interaction.name(),
                err
            ))
        })
    }

    async fn navigate(&self, session: &SessionId, url: &str) -> std::result::Result<(), ActionError> {
        let endpoint = self.endpoint(session, "navigate")?;
        let request = self.client.post(endpoint).json(&json!({ "url": url }));
        match self.send("navigate", request).await {
            Ok(_) => Ok(()),
            // 404 here is the page, not an element
            Err(ActionError::ElementNotFound(detail)) => Err(ActionError::Host(detail)),
            Err(err) => Err(err),
        }
    }

    async fn readiness(&self, session: &SessionId) -> std::result::Result<bool, ActionError> {
        let url = self.endpoint(session, "ready")?;
        let response = self.send("ready", self.client.get(url)).await?;
        response
            .json::<Readiness>()
            .await
            .map(|body| body.ready)
            .map_err(|err| malformed("ready", err))
    }

    async fn capture(&self, session: &SessionId) -> std::result::Result<Vec<u8>, ActionError> {
        let url = self.endpoint(session, "capture")?;
        let response = self.send("capture", self.client.post(url)).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| malformed("capture", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_typed_errors() {
        let map = |code: u16| status_error("click", StatusCode::from_u16(code).unwrap(), String::new());
        assert!(matches!(map(404), ActionError::ElementNotFound(_)));
        assert!(matches!(map(409), ActionError::ElementNotActionable(_)));
        assert!(matches!(map(504), ActionError::Timeout(_)));
        assert!(matches!(map(503), ActionError::Network(_)));
        assert!(matches!(map(422), ActionError::InvalidParameters(_)));
        assert!(matches!(map(500), ActionError::Host(_)));
    }

    #[test]
    fn endpoints_keep_the_base_path() {
        let host = RemoteHost::new("http://jobs.local/api/", DEFAULT_REQUEST_TIMEOUT).unwrap();
        let url = host.endpoint(&SessionId::from("tab 1"), "query").unwrap();
        assert_eq!(url.as_str(), "http://jobs.local/api/sessions/tab%201/query");
    }

    #[test]
    fn rejects_non_http_bases() {
        assert!(RemoteHost::new("mailto:ops@example.com", DEFAULT_REQUEST_TIMEOUT).is_err());
        assert!(RemoteHost::new("not a url", DEFAULT_REQUEST_TIMEOUT).is_err());
    }
}
