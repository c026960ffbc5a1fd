//! Request construction: maps host parameters onto an outbound HTTP request.
//!
//! Every [`OperationKind`] is bound to a static [`OperationSpec`] describing
//! the HTTP method, the path, and where each parameter is routed (body field,
//! query field or header). [`build_request`] validates the parameters locally
//! and produces a [`RequestDescriptor`]; no I/O happens here.

use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::{
    errors::{Result, ValidationError},
    types::{MetadataEntry, OperationKind, OperationRequest, ParamKind, ParamValue, RequestParams},
};

/// HTTP methods used by the Agencii routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter lands in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Body(&'static str),
    Query(&'static str),
    Header(&'static str),
}

/// Numeric bounds enforced before dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberBounds {
    pub min: f64,
    pub max: Option<f64>,
    pub integer: bool,
}

/// Routing rule for one named parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRoute {
    pub param: &'static str,
    pub kind: ParamKind,
    pub target: RouteTarget,
    pub required: bool,
    pub bounds: Option<NumberBounds>,
}

impl FieldRoute {
    const fn string(param: &'static str, target: RouteTarget) -> Self {
        Self {
            param,
            kind: ParamKind::String,
            target,
            required: false,
            bounds: None,
        }
    }

    const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    const fn number(param: &'static str, target: RouteTarget, bounds: NumberBounds) -> Self {
        Self {
            param,
            kind: ParamKind::Number,
            target,
            required: false,
            bounds: Some(bounds),
        }
    }

    const fn list(param: &'static str, target: RouteTarget) -> Self {
        Self {
            param,
            kind: ParamKind::List,
            target,
            required: false,
            bounds: None,
        }
    }
}

/// Static description of one API operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub method: HttpMethod,
    pub path: &'static str,
    pub fields: &'static [FieldRoute],
    /// Body fields always sent with this operation.
    pub fixed_body: &'static [(&'static str, &'static str)],
}

pub const SEND_MESSAGE: OperationSpec = OperationSpec {
    kind: OperationKind::SendMessage,
    method: HttpMethod::Post,
    path: "/",
    fields: &[
        FieldRoute::string("message", RouteTarget::Body("message")).required(),
        FieldRoute::string("sessionId", RouteTarget::Body("sessionId")),
        FieldRoute::string("integrationId", RouteTarget::Query("integration_id")).required(),
    ],
    fixed_body: &[("operation", "getResponse")],
};

pub const GET_RESPONSE: OperationSpec = OperationSpec {
    kind: OperationKind::GetResponse,
    method: HttpMethod::Post,
    path: "/chat/completions",
    fields: &[
        FieldRoute::string("prompt", RouteTarget::Body("prompt")).required(),
        FieldRoute::string("chatId", RouteTarget::Body("chatId")),
        FieldRoute::string("model", RouteTarget::Body("model")),
        FieldRoute::number(
            "temperature",
            RouteTarget::Body("temperature"),
            NumberBounds {
                min: 0.0,
                max: Some(2.0),
                integer: false,
            },
        ),
        FieldRoute::number(
            "maxTokens",
            RouteTarget::Body("maxTokens"),
            NumberBounds {
                min: 1.0,
                max: None,
                integer: true,
            },
        ),
    ],
    fixed_body: &[],
};

pub const CREATE_SESSION: OperationSpec = OperationSpec {
    kind: OperationKind::CreateSession,
    method: HttpMethod::Post,
    path: "/chat/create",
    fields: &[
        FieldRoute::string("systemMessage", RouteTarget::Body("systemMessage")),
        FieldRoute::list("metadata", RouteTarget::Body("metadata")),
    ],
    fixed_body: &[],
};

impl OperationKind {
    /// Routing table bound to this operation.
    pub fn spec(&self) -> &'static OperationSpec {
        match self {
            OperationKind::SendMessage => &SEND_MESSAGE,
            OperationKind::GetResponse => &GET_RESPONSE,
            OperationKind::CreateSession => &CREATE_SESSION,
        }
    }
}

/// Transport-agnostic description of an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDescriptor {
    pub operation: OperationKind,
    pub method: HttpMethod,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Map<String, Value>,
}

impl RequestDescriptor {
    /// Query pairs in a stable order, ready for `RequestBuilder::query`.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn body_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Build the request for `kind` from host parameters.
///
/// Required parameters are checked before anything else; a failure returns
/// [`crate::Error::Validation`] naming the offending parameter.
pub fn build_request(kind: OperationKind, params: &RequestParams) -> Result<RequestDescriptor> {
    build_with_spec(kind.spec(), params)
}

/// Build the request for a typed operation request.
pub fn build_typed<R: OperationRequest>(req: &R) -> Result<RequestDescriptor> {
    build_request(R::KIND, &req.to_params())
}

/// Build a request against an explicit routing table.
pub fn build_with_spec(spec: &OperationSpec, params: &RequestParams) -> Result<RequestDescriptor> {
    for route in spec.fields.iter().filter(|r| r.required) {
        check_required(route, params.get(route.param))?;
    }

    let mut out = RequestDescriptor {
        operation: spec.kind,
        method: spec.method,
        path: spec.path.to_string(),
        query: BTreeMap::new(),
        headers: BTreeMap::new(),
        body: Map::new(),
    };

    for (name, value) in spec.fixed_body {
        out.body
            .insert((*name).to_string(), Value::String((*value).to_string()));
    }

    for route in spec.fields {
        let Some(value) = params.get(route.param) else {
            continue;
        };
        if value.kind() != route.kind {
            return Err(ValidationError::new(format!(
                "expected {}, got {}",
                route.kind.as_str(),
                value.kind().as_str()
            ))
            .with_field(route.param)
            .into());
        }
        let Some(encoded) = encode_value(route, value)? else {
            continue;
        };
        match route.target {
            RouteTarget::Body(field) => {
                out.body.insert(field.to_string(), encoded);
            }
            RouteTarget::Query(field) => {
                out.query.insert(field.to_string(), scalar_text(route, encoded)?);
            }
            RouteTarget::Header(field) => {
                out.headers
                    .insert(field.to_string(), scalar_text(route, encoded)?);
            }
        }
    }

    Ok(out)
}

/// Flatten key/value rows into a map. Rows with an empty key are dropped and
/// later rows overwrite earlier ones with the same key.
pub fn flatten_metadata(entries: &[MetadataEntry]) -> Map<String, Value> {
    let mut map = Map::new();
    for entry in entries {
        if entry.key.is_empty() {
            continue;
        }
        map.insert(entry.key.clone(), Value::String(entry.value.clone()));
    }
    map
}

fn check_required(route: &FieldRoute, value: Option<&ParamValue>) -> Result<()> {
    let present = match value {
        None => false,
        Some(ParamValue::String(s)) => !s.trim().is_empty(),
        Some(ParamValue::List(items)) => !items.is_empty(),
        Some(_) => true,
    };
    if present {
        Ok(())
    } else {
        Err(ValidationError::new("is required")
            .with_field(route.param)
            .into())
    }
}

fn encode_value(route: &FieldRoute, value: &ParamValue) -> Result<Option<Value>> {
    let encoded = match value {
        ParamValue::String(s) => Value::String(s.clone()),
        ParamValue::Boolean(b) => Value::Bool(*b),
        ParamValue::Number(n) => Value::Number(check_bounds(route, n)?),
        ParamValue::List(entries) => {
            let map = flatten_metadata(entries);
            if map.is_empty() {
                return Ok(None);
            }
            Value::Object(map)
        }
    };
    Ok(Some(encoded))
}

fn check_bounds(route: &FieldRoute, n: &Number) -> Result<Number> {
    let Some(bounds) = route.bounds else {
        return Ok(n.clone());
    };
    let out_of_range = || {
        let message = match bounds.max {
            Some(max) => format!("must be between {} and {}", bounds.min, max),
            None => format!("must be at least {}", bounds.min),
        };
        ValidationError::new(message).with_field(route.param)
    };
    let value = n.as_f64().ok_or_else(out_of_range)?;
    if !value.is_finite() || value < bounds.min || bounds.max.is_some_and(|max| value > max) {
        return Err(out_of_range().into());
    }
    if bounds.integer {
        if value.fract() != 0.0 {
            return Err(ValidationError::new("must be a whole number")
                .with_field(route.param)
                .into());
        }
        if n.is_f64() {
            // 256.0 goes out as 256.
            return Ok(Number::from(value as i64));
        }
    }
    Ok(n.clone())
}

fn scalar_text(route: &FieldRoute, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ValidationError::new("cannot be sent as a query or header value")
            .with_field(route.param)
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        types::{CreateSessionRequest, GetResponseRequest, SendMessageRequest},
        Error,
    };

    fn send_params() -> RequestParams {
        RequestParams::new()
            .with("message", "Summarize the last report")
            .with("integrationId", "int_42")
    }

    #[test]
    fn send_message_routes_body_and_query() {
        let req = build_request(OperationKind::SendMessage, &send_params()).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "/");
        assert_eq!(req.query_pairs(), vec![("integration_id", "int_42")]);
        assert_eq!(
            req.body_value(),
            json!({ "operation": "getResponse", "message": "Summarize the last report" })
        );
        assert!(req.headers.is_empty());
    }

    #[test]
    fn empty_message_fails_before_descriptor() {
        let params = RequestParams::new()
            .with("message", "   ")
            .with("integrationId", "int_42");
        let err = build_request(OperationKind::SendMessage, &params).unwrap_err();
        match err {
            Error::Validation(ve) => assert_eq!(ve.field.as_deref(), Some("message")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_integration_id_fails() {
        let params = RequestParams::new().with("message", "hi");
        let err = build_request(OperationKind::SendMessage, &params).unwrap_err();
        assert_eq!(err.field(), Some("integrationId"));
    }

    #[test]
    fn explicit_empty_session_is_sent_unset_is_omitted() {
        let req = build_request(OperationKind::SendMessage, &send_params()).unwrap();
        assert!(!req.body.contains_key("sessionId"));

        let params = send_params().with("sessionId", "");
        let req = build_request(OperationKind::SendMessage, &params).unwrap();
        assert_eq!(req.body.get("sessionId"), Some(&json!("")));
    }

    #[test]
    fn get_response_with_all_optional_fields() {
        let req = build_typed(
            &GetResponseRequest::new("hello")
                .with_chat_id("chat_1")
                .with_model("gpt-4o-mini")
                .with_temperature(0.5)
                .with_max_tokens(100),
        )
        .unwrap();
        assert_eq!(req.path, "/chat/completions");
        assert_eq!(
            req.body_value(),
            json!({
                "prompt": "hello",
                "chatId": "chat_1",
                "model": "gpt-4o-mini",
                "temperature": 0.5,
                "maxTokens": 100
            })
        );
        assert!(req.query.is_empty());
    }

    #[test]
    fn temperature_out_of_range_is_rejected() {
        let err = build_typed(&GetResponseRequest::new("hi").with_temperature(2.5)).unwrap_err();
        assert_eq!(err.field(), Some("temperature"));

        let err = build_typed(&GetResponseRequest::new("hi").with_temperature(-0.1)).unwrap_err();
        assert_eq!(err.field(), Some("temperature"));

        let err =
            build_typed(&GetResponseRequest::new("hi").with_temperature(f64::NAN)).unwrap_err();
        assert_eq!(err.field(), Some("temperature"));

        assert!(build_typed(&GetResponseRequest::new("hi").with_temperature(2.0)).is_ok());
        assert!(build_typed(&GetResponseRequest::new("hi").with_temperature(0.0)).is_ok());
    }

    #[test]
    fn max_tokens_must_be_positive_whole_number() {
        let err = build_typed(&GetResponseRequest::new("hi").with_max_tokens(0)).unwrap_err();
        assert_eq!(err.field(), Some("maxTokens"));

        let params = RequestParams::new()
            .with("prompt", "hi")
            .with("maxTokens", ParamValue::number(1.5).unwrap());
        let err = build_request(OperationKind::GetResponse, &params).unwrap_err();
        assert_eq!(err.field(), Some("maxTokens"));

        let params = RequestParams::new()
            .with("prompt", "hi")
            .with("maxTokens", ParamValue::number(256.0).unwrap());
        let req = build_request(OperationKind::GetResponse, &params).unwrap();
        assert_eq!(req.body.get("maxTokens").unwrap().to_string(), "256");
    }

    #[test]
    fn wrong_param_type_is_rejected() {
        let params = RequestParams::new()
            .with("prompt", "hi")
            .with("temperature", "warm");
        let err = build_request(OperationKind::GetResponse, &params).unwrap_err();
        assert_eq!(err.field(), Some("temperature"));
        assert!(err.to_string().contains("expected number"));
    }

    #[test]
    fn unknown_params_are_ignored() {
        let params = send_params().with("color", "blue");
        let req = build_request(OperationKind::SendMessage, &params).unwrap();
        assert!(!req.body.contains_key("color"));
    }

    #[test]
    fn create_session_has_no_required_fields() {
        let req = build_typed(&CreateSessionRequest::new()).unwrap();
        assert_eq!(req.path, "/chat/create");
        assert!(req.body.is_empty());
    }

    #[test]
    fn create_session_flattens_metadata() {
        let req = build_typed(
            &CreateSessionRequest::new()
                .with_system_message("You are terse.")
                .with_metadata("team", "ops")
                .with_metadata("", "dropped")
                .with_metadata("team", "support")
                .with_metadata("region", "eu"),
        )
        .unwrap();
        assert_eq!(
            req.body_value(),
            json!({
                "systemMessage": "You are terse.",
                "metadata": { "team": "support", "region": "eu" }
            })
        );
    }

    #[test]
    fn metadata_with_only_empty_keys_is_omitted() {
        let req = build_typed(&CreateSessionRequest::new().with_metadata("", "x")).unwrap();
        assert!(!req.body.contains_key("metadata"));
    }

    #[test]
    fn header_and_query_routes_stringify_scalars() {
        const FIELDS: &[FieldRoute] = &[
            FieldRoute {
                param: "trace",
                kind: ParamKind::Boolean,
                target: RouteTarget::Header("X-Trace"),
                required: false,
                bounds: None,
            },
            FieldRoute {
                param: "page",
                kind: ParamKind::Number,
                target: RouteTarget::Query("page"),
                required: false,
                bounds: None,
            },
        ];
        let spec = OperationSpec {
            kind: OperationKind::GetResponse,
            method: HttpMethod::Get,
            path: "/chat/history",
            fields: FIELDS,
            fixed_body: &[],
        };
        let params = RequestParams::new().with("trace", true).with("page", 3u32);
        let req = build_with_spec(&spec, &params).unwrap();
        assert_eq!(req.headers.get("X-Trace").map(String::as_str), Some("true"));
        assert_eq!(req.query.get("page").map(String::as_str), Some("3"));
    }

    #[test]
    fn every_operation_has_a_route() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.spec().kind, kind);
            assert_eq!(kind.spec().method, HttpMethod::Post);
        }
    }
}
