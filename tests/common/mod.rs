#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use channel_dispatcher::{
    DispatchEvent, EndpointId, ReportSink, Transport, TransportError, TransportResponse,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Transport that replays canned responses per channel. Channels with
/// no script left answer 200 with an empty body.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<EndpointId, VecDeque<Result<TransportResponse, TransportError>>>>,
    calls: Mutex<Vec<Call>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub endpoint_id: EndpointId,
    pub content: String,
    pub at: Instant,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn respond(&self, id: &str, status: u16, body: &str) {
        self.push(id, Ok(TransportResponse::new(status, body))).await;
    }

    pub async fn fail(&self, id: &str, err: TransportError) {
        self.push(id, Err(err)).await;
    }

    async fn push(&self, id: &str, response: Result<TransportResponse, TransportError>) {
        self.responses
            .lock()
            .await
            .entry(EndpointId::new(id))
            .or_default()
            .push_back(response);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_to(&self, id: &str) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.endpoint_id.as_str() == id)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_message(
        &self,
        endpoint_id: &EndpointId,
        content: &str,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().await.push(Call {
            endpoint_id: endpoint_id.clone(),
            content: content.to_string(),
            at: Instant::now(),
        });
        self.responses
            .lock()
            .await
            .get_mut(endpoint_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "{}")))
    }
}

/// Sink that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: StdMutex<Vec<DispatchEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ReportSink for RecordingSink {
    fn report(&self, event: &DispatchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
