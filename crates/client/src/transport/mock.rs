//! A scripted transport for exercising RPC clients without a node.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use color_eyre::eyre::{self, eyre};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{JsonRpcRequest, JsonRpcResponse, Transport};

/// A mock transport that can be programmed with expected responses for testing.
///
/// Responses are queued per method and consumed in order. Every request is
/// recorded so tests can assert on the parameters that went out.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<eyre::Result<Value>>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    /// Creates a new, empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for the next call to `method`.
    pub async fn push_response(&self, method: impl Into<String>, response: eyre::Result<Value>) {
        self.responses.lock().await.entry(method.into()).or_default().push_back(response);
    }

    /// Method names and params of every request received so far.
    pub async fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &JsonRpcRequest) -> eyre::Result<JsonRpcResponse> {
        self.requests.lock().await.push((request.method.clone(), request.params.clone()));
        let response =
            self.responses.lock().await.get_mut(&request.method).and_then(VecDeque::pop_front);

        match response {
            Some(Ok(result)) => Ok(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(result),
                error: None,
            }),
            Some(Err(e)) => Err(e),
            None => Err(eyre!("MockTransport: received unexpected call to method '{}'", request.method)),
        }
    }
}
