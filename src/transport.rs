//! HTTP transport for Discord-compatible channel APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::client::{Transport, TransportResponse};
use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::types::EndpointId;

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

/// Posts messages to `{api_base}/channels/{id}/messages`.
pub struct HttpTransport {
    client: Client,
    api_base: String,
    token: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn message_url(&self, endpoint_id: &EndpointId) -> String {
        format!("{}/channels/{}/messages", self.api_base, endpoint_id.0)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_message(
        &self,
        endpoint_id: &EndpointId,
        content: &str,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.message_url(endpoint_id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.token)
            .json(&MessageBody { content })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(url = %url, status, "channel API responded");

        Ok(TransportResponse { status, body })
    }
}
