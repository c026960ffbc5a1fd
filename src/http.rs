use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};

use crate::{
    error_format::message_from_value,
    errors::{APIError, Error, Result, RetryMetadata, TransportError, TransportErrorKind},
    request::HttpMethod,
    DEFAULT_BASE_URL, REQUEST_ID_HEADER,
};

/// Per-call overrides for chat requests.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub request_id: Option<String>,
    pub headers: HeaderList,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
}

impl RequestOptions {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push(HeaderEntry::new(key.into(), value.into()));
        self
    }

    /// Override the overall request timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the retry policy for this call.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Disable retries for this call.
    pub fn disable_retry(mut self) -> Self {
        self.retry = Some(RetryConfig::disabled());
        self
    }
}

/// Retry/backoff configuration (defaults use 3 attempts + jittered exponential backoff).
///
/// Chat calls are POSTs; `retry_post` is off by default so a message is not
/// delivered to an agency twice.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub retry_post: bool,
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether the given status code should trigger a retry for this method.
    pub fn should_retry_status(&self, method: &Method, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
            return self.allow_for_method(method);
        }
        if status.is_server_error() {
            return self.allow_for_method(method);
        }
        false
    }

    /// Whether the given transport error should trigger a retry.
    pub fn should_retry_error(&self, method: &Method, err: &reqwest::Error) -> bool {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return self.allow_for_method(method);
        }
        false
    }

    /// Jittered exponential backoff for the given attempt (1-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = if attempt == 0 {
            0
        } else {
            (attempt - 1).min(10)
        };
        let base = self.base_backoff.saturating_mul(2u32.saturating_pow(exp));
        let capped = std::cmp::min(base, self.max_backoff);
        let jitter = 0.5 + fastrand::f64(); // 0.5x .. 1.5x
        let seconds = (capped.as_secs_f64() * jitter).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }

    fn allow_for_method(&self, method: &Method) -> bool {
        if method == Method::POST {
            return self.retry_post;
        }
        true
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(5),
            retry_post: false,
        }
    }
}

/// Extra headers applied to outgoing requests.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

/// Trim the trailing slash and check the URL parses; paths are appended verbatim.
pub(crate) fn resolve_base_url(base_url: Option<&str>) -> Result<String> {
    let base = base_url
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string();
    reqwest::Url::parse(&base).map_err(|err| Error::Config(format!("invalid base url: {err}")))?;
    Ok(base)
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|err| Error::Config(format!("invalid header name: {err}")))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|err| Error::Config(format!("invalid header value: {err}")))?;
    Ok((name, value))
}

pub(crate) fn to_transport_error(err: reqwest::Error, retries: Option<RetryMetadata>) -> Error {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };

    TransportError {
        kind,
        message: err.to_string(),
        source: Some(err),
        retries,
    }
    .into()
}

#[derive(Default)]
pub(crate) struct RetryState {
    attempts: u32,
    last_status: Option<u16>,
    last_error: Option<String>,
}

impl RetryState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_attempt(&mut self, attempt: u32) {
        self.attempts = attempt;
    }

    pub(crate) fn record_status(&mut self, status: StatusCode) {
        self.last_status = Some(status.as_u16());
    }

    pub(crate) fn record_error(&mut self, err: &reqwest::Error) {
        self.last_error = Some(err.to_string());
    }

    pub(crate) fn metadata(&self) -> Option<RetryMetadata> {
        if self.attempts <= 1 {
            None
        } else {
            Some(RetryMetadata {
                attempts: self.attempts,
                last_status: self.last_status,
                last_error: self.last_error.clone(),
            })
        }
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    [REQUEST_ID_HEADER, "X-Request-Id"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build an [`APIError`] from a non-2xx response.
///
/// The message follows the same priority as [`crate::format_error`]:
/// `error.message`, then `message`, then the raw body, then the status text.
pub(crate) fn parse_api_error_parts(
    status: StatusCode,
    headers: &HeaderMap,
    body: String,
    retries: Option<RetryMetadata>,
) -> Error {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.trim().is_empty() {
        return APIError {
            status: status_code,
            code: None,
            message: status_text,
            request_id,
            details: None,
            retries,
            raw_body: None,
        }
        .into();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        if value.is_object() {
            let err_obj = value.get("error").filter(|v| v.is_object());
            let code = err_obj
                .and_then(|e| e.get("code"))
                .or_else(|| value.get("code"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let details = err_obj.and_then(|e| e.get("details")).cloned();
            let message = message_from_value(&value)
                .map(|s| s.to_string())
                .unwrap_or_else(|| status_text.clone());
            let request_id = value
                .get("request_id")
                .or_else(|| value.get("requestId"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or(request_id);
            return APIError {
                status: status_code,
                code,
                message,
                request_id,
                details,
                retries,
                raw_body: Some(body),
            }
            .into();
        }
    }

    APIError {
        status: status_code,
        code: None,
        message: body.clone(),
        request_id,
        details: None,
        retries,
        raw_body: Some(body),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn api(err: Error) -> APIError {
        match err {
            Error::Api(api) => api,
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn backoff_respects_max_and_jitter() {
        let retry = RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(1),
            retry_post: true,
        };

        let delay = retry.backoff_delay(5);
        assert!(delay <= Duration::from_secs(1));
        assert!(delay >= Duration::from_millis(250));
    }

    #[test]
    fn post_is_not_retried_by_default() {
        let retry = RetryConfig::default();
        assert!(!retry.should_retry_status(&Method::POST, StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retry.should_retry_status(&Method::GET, StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!retry.should_retry_status(&Method::GET, StatusCode::BAD_REQUEST));

        let retry = RetryConfig {
            retry_post: true,
            ..Default::default()
        };
        assert!(retry.should_retry_status(&Method::POST, StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn request_options_disable_retry_sets_single_attempt() {
        let opts = RequestOptions::default().disable_retry();
        assert_eq!(opts.retry.unwrap().max_attempts, 1);
    }

    #[test]
    #[should_panic(expected = "Invalid header")]
    fn header_list_panics_on_whitespace_only() {
        let mut list = HeaderList::new();
        list.push(HeaderEntry::new("   ".to_string(), "value".to_string()));
    }

    #[test]
    fn base_url_is_trimmed_and_validated() {
        assert_eq!(
            resolve_base_url(Some("https://api.agencii.com/v1/")).unwrap(),
            "https://api.agencii.com/v1"
        );
        assert_eq!(resolve_base_url(None).unwrap(), DEFAULT_BASE_URL);
        assert_eq!(resolve_base_url(Some("  ")).unwrap(), DEFAULT_BASE_URL);
        assert!(matches!(
            resolve_base_url(Some("not a url")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn parse_header_rejects_bad_names() {
        assert!(parse_header("X-Team", "ops").is_ok());
        assert!(matches!(
            parse_header("bad header", "x"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn retry_state_reports_only_after_retries() {
        let mut state = RetryState::new();
        state.record_attempt(1);
        assert!(state.metadata().is_none());
        state.record_attempt(2);
        state.record_status(StatusCode::BAD_GATEWAY);
        let meta = state.metadata().unwrap();
        assert_eq!(meta.attempts, 2);
        assert_eq!(meta.last_status, Some(502));
    }

    #[test]
    fn api_error_prefers_nested_message() {
        let body = r#"{"error":{"message":"Integration not found","code":"not_found","details":{"id":"int_1"}},"message":"Bad Request"}"#;
        let err = api(parse_api_error_parts(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            body.to_string(),
            None,
        ));
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Integration not found");
        assert_eq!(err.code.as_deref(), Some("not_found"));
        assert_eq!(err.details, Some(serde_json::json!({ "id": "int_1" })));
        assert_eq!(err.raw_body.as_deref(), Some(body));
    }

    #[test]
    fn api_error_falls_back_to_top_level_message_then_status() {
        let err = api(parse_api_error_parts(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"message":"prompt is required","requestId":"req_9"}"#.to_string(),
            None,
        ));
        assert_eq!(err.message, "prompt is required");
        assert_eq!(err.request_id.as_deref(), Some("req_9"));

        let err = api(parse_api_error_parts(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            r#"{"unexpected":true}"#.to_string(),
            None,
        ));
        assert_eq!(err.message, "Bad Gateway");
    }

    #[test]
    fn api_error_uses_plain_body_and_header_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", HeaderValue::from_static("req_hdr"));
        let err = api(parse_api_error_parts(
            StatusCode::SERVICE_UNAVAILABLE,
            &headers,
            "upstream unavailable".to_string(),
            None,
        ));
        assert_eq!(err.message, "upstream unavailable");
        assert_eq!(err.request_id.as_deref(), Some("req_hdr"));

        let err = api(parse_api_error_parts(
            StatusCode::INTERNAL_SERVER_ERROR,
            &headers,
            String::new(),
            None,
        ));
        assert_eq!(err.message, "Internal Server Error");
        assert!(err.raw_body.is_none());
    }
}
