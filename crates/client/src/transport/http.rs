use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre;
use reqwest::{Client, header::CONTENT_TYPE};
use url::Url;

use super::{JsonRpcRequest, JsonRpcResponse, Transport};
use crate::error::ClientError;

/// JSON-RPC over HTTP with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: Url, timeout: Duration) -> eyre::Result<Self> {
        let client = Client::builder().pool_idle_timeout(Duration::from_secs(90)).build()?;
        Ok(Self { client, url, timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &JsonRpcRequest) -> eyre::Result<JsonRpcResponse> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let body = response.bytes().await.map_err(|e| ClientError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| {
            ClientError::InvalidResponse { method: request.method.clone(), reason: e.to_string() }
                .into()
        })
    }
}
