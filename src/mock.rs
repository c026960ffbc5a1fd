#![cfg(feature = "mock")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{
    errors::{Error, Result},
    normalize::{normalize, split_batch, NormalizedItem},
    request::{build_request, build_typed, RequestDescriptor},
    types::{
        CreateSessionRequest, GetResponseRequest, OperationKind, OperationRequest, RequestParams,
        SendMessageRequest,
    },
};

/// In-memory mock configuration for offline tests.
///
/// Each queued entry is the raw backend body for one call; it goes through
/// the same batch split and normalization as a live response.
#[derive(Default)]
pub struct MockConfig {
    pub responses: Vec<Result<Value>>,
}

impl MockConfig {
    pub fn with_response(mut self, body: Value) -> Self {
        self.responses.push(Ok(body));
        self
    }

    pub fn with_error(mut self, err: Error) -> Self {
        self.responses.push(Err(err));
        self
    }
}

#[derive(Clone)]
pub struct MockClient {
    inner: Arc<MockInner>,
}

impl MockClient {
    pub fn new(cfg: MockConfig) -> Self {
        Self {
            inner: Arc::new(MockInner::new(cfg)),
        }
    }

    pub fn chat(&self) -> MockChatClient {
        MockChatClient {
            inner: self.inner.clone(),
        }
    }

    /// Descriptors built so far, in call order.
    pub fn sent(&self) -> Vec<RequestDescriptor> {
        self.inner.sent.lock().expect("lock poisoned").clone()
    }
}

struct MockInner {
    responses: Mutex<VecDeque<Result<Value>>>,
    sent: Mutex<Vec<RequestDescriptor>>,
}

impl MockInner {
    fn new(cfg: MockConfig) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(cfg.responses)),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn respond(&self, descriptor: RequestDescriptor) -> Result<Vec<NormalizedItem>> {
        self.sent.lock().expect("lock poisoned").push(descriptor);
        let body = self
            .responses
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(Error::Validation("no mock response queued".into())))?;
        Ok(normalize(&split_batch(body)))
    }
}

#[derive(Clone)]
pub struct MockChatClient {
    inner: Arc<MockInner>,
}

impl MockChatClient {
    pub async fn send_message(&self, req: SendMessageRequest) -> Result<Vec<NormalizedItem>> {
        self.execute(&req).await
    }

    pub async fn get_response(&self, req: GetResponseRequest) -> Result<Vec<NormalizedItem>> {
        self.execute(&req).await
    }

    pub async fn create_session(&self, req: CreateSessionRequest) -> Result<Vec<NormalizedItem>> {
        self.execute(&req).await
    }

    pub async fn execute<R: OperationRequest>(&self, req: &R) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_typed(req)?;
        self.inner.respond(descriptor)
    }

    pub async fn execute_params(
        &self,
        kind: OperationKind,
        params: &RequestParams,
    ) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_request(kind, params)?;
        self.inner.respond(descriptor)
    }
}

pub mod fixtures {
    use serde_json::{json, Value};

    use crate::errors::{APIError, Error};

    /// Current backend shape for a sent message.
    pub fn message_reply() -> Value {
        json!({
            "response": "Thanks for reaching out! How can I help?",
            "chatId": "chat_mock_123",
            "usage": { "totalTokens": 42 }
        })
    }

    /// Legacy shape returned by chat creation.
    pub fn created_session() -> Value {
        json!({ "id": "chat_mock_456", "createdAt": "2025-01-01T00:00:00Z" })
    }

    pub fn completion_batch() -> Value {
        json!([
            { "content": "first", "chat_id": "chat_a" },
            { "message": "second", "sessionId": "chat_b" }
        ])
    }

    pub fn api_error(status: u16, message: &str) -> Error {
        Error::Api(APIError::new(status, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format_error, HttpMethod};

    #[tokio::test]
    async fn send_message_normalizes_queued_body() {
        let client = MockClient::new(MockConfig::default().with_response(fixtures::message_reply()));
        let items = client
            .chat()
            .send_message(SendMessageRequest::new("int_1", "hello").with_session_id("chat_mock_123"))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text_str(), Some("Thanks for reaching out! How can I help?"));
        assert_eq!(items[0].session_id_str(), Some("chat_mock_123"));

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].path, "/");
        assert_eq!(sent[0].query.get("integration_id").map(String::as_str), Some("int_1"));
    }

    #[tokio::test]
    async fn batch_body_yields_one_item_per_element() {
        let client =
            MockClient::new(MockConfig::default().with_response(fixtures::completion_batch()));
        let items = client
            .chat()
            .get_response(GetResponseRequest::new("summarize"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].session_id_str(), Some("chat_a"));
        assert_eq!(items[1].text_str(), Some("second"));
    }

    #[tokio::test]
    async fn create_session_maps_legacy_id() {
        let client =
            MockClient::new(MockConfig::default().with_response(fixtures::created_session()));
        let items = client
            .chat()
            .create_session(CreateSessionRequest::new().with_metadata("source", "test"))
            .await
            .unwrap();
        assert_eq!(items[0].session_id_str(), Some("chat_mock_456"));
        assert_eq!(items[0].text(), None);
    }

    #[tokio::test]
    async fn validation_failure_consumes_nothing() {
        let client = MockClient::new(MockConfig::default().with_response(fixtures::message_reply()));
        let err = client
            .chat()
            .send_message(SendMessageRequest::new("int_1", "   "))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("message"));
        assert!(client.sent().is_empty());

        let items = client
            .chat()
            .execute_params(
                OperationKind::SendMessage,
                &RequestParams::new()
                    .with("integrationId", "int_1")
                    .with("message", "retry"),
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn queued_error_is_returned_and_formatted() {
        let client = MockClient::new(
            MockConfig::default().with_error(fixtures::api_error(429, "Rate limit exceeded")),
        );
        let err = client
            .chat()
            .get_response(GetResponseRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(format_error(&err), "Rate limit exceeded");
    }

    #[tokio::test]
    async fn empty_queue_is_an_error() {
        let client = MockClient::new(MockConfig::default());
        let err = client
            .chat()
            .get_response(GetResponseRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
