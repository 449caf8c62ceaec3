use super::store::SignalingStore;
use super::types::NegotiationMessage;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Request/poll surface a peer uses to reach the signaling store.
///
/// A `poll` reflects every `post` that completed before the poll began.
/// Retry policy belongs to the caller; implementations fail once with
/// [`Error::TransportUnreachable`].
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn post(&self, message: NegotiationMessage) -> Result<()>;

    async fn poll(&self, session_id: &str) -> Result<Vec<NegotiationMessage>>;
}

/// Same-process transport sharing the store directly.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    store: Arc<SignalingStore>,
}

impl LocalTransport {
    pub fn new(store: Arc<SignalingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SignalingTransport for LocalTransport {
    async fn post(&self, message: NegotiationMessage) -> Result<()> {
        self.store.submit(message);
        Ok(())
    }

    async fn poll(&self, session_id: &str) -> Result<Vec<NegotiationMessage>> {
        Ok(self.store.drain(session_id))
    }
}

#[derive(Deserialize)]
struct SignalsResponse {
    signals: Vec<NegotiationMessage>,
}

/// Client for the `/api/webrtc/signal` endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/webrtc/signal", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn unreachable(e: reqwest::Error) -> Error {
    Error::TransportUnreachable(e.to_string())
}

#[async_trait]
impl SignalingTransport for HttpTransport {
    async fn post(&self, message: NegotiationMessage) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?;
        Ok(())
    }

    async fn poll(&self, session_id: &str) -> Result<Vec<NegotiationMessage>> {
        let body: SignalsResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("sessionId", session_id)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?
            .json()
            .await
            .map_err(unreachable)?;
        Ok(body.signals)
    }
}
