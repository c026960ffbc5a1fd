use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::{
    errors::ValidationError,
    identifiers::{IntegrationId, SessionId},
};

/// Chat operations exposed by the Agencii API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Send a message to an agency routed by integration id.
    SendMessage,
    /// Generate a completion for a prompt.
    GetResponse,
    /// Open a new chat session.
    CreateSession,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::SendMessage,
        OperationKind::GetResponse,
        OperationKind::CreateSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SendMessage => "sendMessage",
            OperationKind::GetResponse => "getResponse",
            OperationKind::CreateSession => "createSession",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "sendMessage" => Ok(OperationKind::SendMessage),
            "getResponse" => Ok(OperationKind::GetResponse),
            // Older hosts call this operation createNewChat.
            "createSession" | "createNewChat" => Ok(OperationKind::CreateSession),
            other => Err(
                ValidationError::new(format!("unknown operation {other:?}")).with_field("operation")
            ),
        }
    }
}

/// One row of a repeatable key/value metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Declared type of an input parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    List,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::List => "list",
        }
    }
}

/// A resolved parameter value supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Boolean(bool),
    Number(Number),
    String(String),
    List(Vec<MetadataEntry>),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Boolean(_) => ParamKind::Boolean,
            ParamValue::Number(_) => ParamKind::Number,
            ParamValue::String(_) => ParamKind::String,
            ParamValue::List(_) => ParamKind::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build a number value. Returns `None` for NaN and infinities.
    pub fn number(value: f64) -> Option<Self> {
        Number::from_f64(value).map(ParamValue::Number)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Boolean(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Number(Number::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(Number::from(value))
    }
}

impl From<Vec<MetadataEntry>> for ParamValue {
    fn from(value: Vec<MetadataEntry>) -> Self {
        ParamValue::List(value)
    }
}

/// Named parameter values collected by the host for one operation.
///
/// A parameter that was never set is absent from the map; that is different
/// from a parameter set to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(BTreeMap<String, ParamValue>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Set `name` only when `value` is `Some`.
    pub fn set_opt<V: Into<ParamValue>>(&mut self, name: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Typed request for one operation; converts into host-style parameters.
pub trait OperationRequest {
    const KIND: OperationKind;

    fn to_params(&self) -> RequestParams;
}

/// Send a message to an agency (`POST /?integration_id=...`).
#[derive(Debug, Clone, PartialEq)]
pub struct SendMessageRequest {
    pub integration_id: IntegrationId,
    pub message: String,
    pub session_id: Option<SessionId>,
}

impl SendMessageRequest {
    pub fn new(integration_id: impl Into<IntegrationId>, message: impl Into<String>) -> Self {
        Self {
            integration_id: integration_id.into(),
            message: message.into(),
            session_id: None,
        }
    }

    /// Continue an existing conversation.
    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl OperationRequest for SendMessageRequest {
    const KIND: OperationKind = OperationKind::SendMessage;

    fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::new()
            .with("message", self.message.as_str())
            .with("integrationId", self.integration_id.as_str());
        params.set_opt("sessionId", self.session_id.as_ref().map(|s| s.as_str()));
        params
    }
}

/// Generate a completion (`POST /chat/completions`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetResponseRequest {
    pub prompt: String,
    pub chat_id: Option<SessionId>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl GetResponseRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<SessionId>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OperationRequest for GetResponseRequest {
    const KIND: OperationKind = OperationKind::GetResponse;

    fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::new().with("prompt", self.prompt.as_str());
        params.set_opt("chatId", self.chat_id.as_ref().map(|s| s.as_str()));
        params.set_opt("model", self.model.as_deref());
        if let Some(temperature) = self.temperature {
            // NaN has no JSON number form; send it as a string so validation rejects it.
            match ParamValue::number(temperature) {
                Some(value) => params.set("temperature", value),
                None => params.set("temperature", temperature.to_string()),
            }
        }
        params.set_opt("maxTokens", self.max_tokens);
        params
    }
}

/// Open a new chat session (`POST /chat/create`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSessionRequest {
    pub system_message: Option<String>,
    pub metadata: Vec<MetadataEntry>,
}

impl CreateSessionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push(MetadataEntry::new(key, value));
        self
    }
}

impl OperationRequest for CreateSessionRequest {
    const KIND: OperationKind = OperationKind::CreateSession;

    fn to_params(&self) -> RequestParams {
        let mut params = RequestParams::new();
        params.set_opt("systemMessage", self.system_message.as_deref());
        if !self.metadata.is_empty() {
            params.set("metadata", self.metadata.clone());
        }
        params
    }
}
