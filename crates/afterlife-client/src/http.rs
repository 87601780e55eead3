//! reqwest-backed transport for query endpoints and content gateways.

use crate::retry::AttemptError;
use crate::transport::{GatewayResponse, GatewayTransport, QueryTransport};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("afterlife/", env!("CARGO_PKG_VERSION"));

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// `request_timeout` is a transport-level cap; the retry policy applies
    /// its own per-attempt timeout on top.
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn post_graphql(&self, endpoint: &str, body: &Value) -> Result<Value, AttemptError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AttemptError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn get(&self, gateway: &str, tx_id: &str) -> Result<GatewayResponse, AttemptError> {
        let url = format!("{}/{}", gateway.trim_end_matches('/'), tx_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        Ok(GatewayResponse {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
