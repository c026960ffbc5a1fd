use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{header::ACCEPT, Method};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    api_key::{ApiKey, Credentials},
    errors::{Error, Result, RetryMetadata, TransportError, TransportErrorKind},
    http::{
        parse_api_error_parts, parse_header, request_id_from_headers, resolve_base_url,
        to_transport_error, HeaderList, RequestOptions, RetryConfig, RetryState,
    },
    normalize::{normalize_body, NormalizedItem},
    request::{build_request, build_typed, RequestDescriptor},
    telemetry::{HttpRequestMetrics, MetricsCallbacks, NormalizationMetrics, RequestContext, Telemetry},
    types::{
        CreateSessionRequest, GetResponseRequest, OperationKind, OperationRequest, RequestParams,
        SendMessageRequest,
    },
    CLIENT_HEADER, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, REQUEST_ID_HEADER,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub api_key: Option<ApiKey>,
    pub client_header: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy (defaults to 3 attempts, POST not retried).
    pub retry: Option<RetryConfig>,
    /// Default extra headers applied to all requests.
    pub default_headers: Option<HeaderList>,
    /// Optional metrics callbacks (HTTP latency, normalization outcome).
    pub metrics: Option<MetricsCallbacks>,
}

impl Config {
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self {
            base_url: Some(credentials.base_url),
            api_key: Some(credentials.api_key),
            ..Default::default()
        }
    }

    /// Read `AGENCII_API_KEY` / `AGENCII_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_credentials(Credentials::from_env()?))
    }
}

/// Async Agencii client. Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    base_url: String,
    api_key: ApiKey,
    client_header: Option<String>,
    http: reqwest::Client,
    request_timeout: Duration,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let base_url = resolve_base_url(cfg.base_url.as_deref())?;
        let api_key = cfg
            .api_key
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let retry = cfg.retry.unwrap_or_default();

        let http = match cfg.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|err| TransportError {
                    kind: TransportErrorKind::Connect,
                    message: "failed to build http client".to_string(),
                    source: Some(err),
                    retries: None,
                })?,
        };

        let client_header = cfg
            .client_header
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_CLIENT_HEADER.to_string()));

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                api_key,
                client_header,
                http,
                request_timeout,
                retry,
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    pub fn from_credentials(credentials: Credentials) -> Result<Self> {
        Self::new(Config::from_credentials(credentials))
    }

    pub fn chat(&self) -> ChatClient {
        ChatClient {
            inner: self.inner.clone(),
        }
    }
}

fn apply_header_list(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> Result<reqwest::RequestBuilder> {
    for entry in headers.iter() {
        if !entry.is_valid() {
            continue;
        }
        let (name, val) = parse_header(&entry.key, &entry.value)?;
        builder = builder.header(name, val);
    }
    Ok(builder)
}

/// Chat operations. Every call validates locally, sends the request and
/// returns the normalized response items.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    pub async fn send_message(
        &self,
        req: SendMessageRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options).await
    }

    pub async fn get_response(
        &self,
        req: GetResponseRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options).await
    }

    pub async fn create_session(
        &self,
        req: CreateSessionRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options).await
    }

    /// Run any typed operation request.
    pub async fn execute<R: OperationRequest>(
        &self,
        req: &R,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_typed(req)?;
        self.send(&descriptor, options).await
    }

    /// Run an operation from host-style named parameters.
    pub async fn execute_params(
        &self,
        kind: OperationKind,
        params: &RequestParams,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_request(kind, params)?;
        self.send(&descriptor, options).await
    }

    /// Send a built request and normalize the response.
    pub async fn send(
        &self,
        descriptor: &RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let (bytes, ctx) = self.inner.dispatch(descriptor, options).await?;
        let items = normalize_body(&bytes)?;
        self.inner
            .telemetry
            .record_normalized(NormalizationMetrics::from_items(&items, ctx));
        Ok(items)
    }

    /// Send a built request and return the decoded body untouched.
    pub async fn send_raw(
        &self,
        descriptor: &RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Value> {
        let (bytes, _) = self.inner.dispatch(descriptor, options).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ClientInner {
    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        options: RequestOptions,
    ) -> Result<(Vec<u8>, RequestContext)> {
        let method = Method::from(descriptor.method);
        let url = format!("{}{}", self.base_url, descriptor.path);
        let mut builder = self.http.request(method.clone(), url);
        if !descriptor.query.is_empty() {
            builder = builder.query(&descriptor.query_pairs());
        }
        builder = builder.json(&descriptor.body);
        builder = self.with_headers(builder, options.request_id.as_deref(), &options.headers)?;
        for (name, value) in &descriptor.headers {
            let (name, value) = parse_header(name, value)?;
            builder = builder.header(name, value);
        }
        builder = builder.timeout(options.timeout.unwrap_or(self.request_timeout));

        let retry = options.retry.unwrap_or_else(|| self.retry.clone());
        let ctx = RequestContext::new(descriptor.operation, method.as_str(), &descriptor.path)
            .with_request_id(options.request_id);
        let resp = self.send_with_retry(builder, method, retry, ctx.clone()).await?;
        let ctx = ctx.with_request_id(request_id_from_headers(resp.headers()));
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| to_transport_error(err, None))?;
        Ok((bytes.to_vec(), ctx))
    }

    fn with_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        request_id: Option<&str>,
        headers: &HeaderList,
    ) -> Result<reqwest::RequestBuilder> {
        builder = builder.header(ACCEPT, "application/json");
        if let Some(req_id) = request_id {
            if !req_id.trim().is_empty() {
                builder = builder.header(REQUEST_ID_HEADER, req_id);
            }
        }
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header(CLIENT_HEADER, client_header);
        }
        builder = builder.bearer_auth(self.api_key.as_str());

        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        apply_header_list(builder, headers)
    }

    async fn send_with_retry(
        &self,
        builder: reqwest::RequestBuilder,
        method: Method,
        retry: RetryConfig,
        ctx: RequestContext,
    ) -> Result<reqwest::Response> {
        let max_attempts = retry.max_attempts.max(1);
        let mut state = RetryState::new();
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            let attempt_builder = builder
                .try_clone()
                .ok_or_else(|| Error::Config("request body is not cloneable for retry".into()))?;
            #[cfg(feature = "tracing")]
            let span = tracing::debug_span!(
                "agencii.http",
                operation = %ctx.operation,
                method = %ctx.method,
                path = %ctx.path,
                attempt,
                max_attempts
            );
            #[cfg(feature = "tracing")]
            let _guard = span.enter();
            let result = attempt_builder.send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.record_http(&ctx, &resp, start, None, state.metadata());
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            status = %status,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "request completed"
                        );
                        return Ok(resp);
                    }
                    state.record_attempt(attempt);
                    state.record_status(status);

                    if retry.should_retry_status(&method, status) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    self.record_http(
                        &ctx,
                        &resp,
                        start,
                        Some(format!("http {}", status.as_u16())),
                        retries.clone(),
                    );
                    #[cfg(feature = "tracing")]
                    tracing::warn!(status = %status, attempt, "request failed; returning error");
                    let headers = resp.headers().clone();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(parse_api_error_parts(status, &headers, body, retries));
                }
                Err(err) => {
                    state.record_attempt(attempt);
                    state.record_error(&err);
                    if retry.should_retry_error(&method, &err) && attempt < max_attempts {
                        sleep(retry.backoff_delay(attempt)).await;
                        continue;
                    }

                    let retries = state.metadata();
                    if self.telemetry.http_enabled() {
                        self.telemetry.record_http(HttpRequestMetrics {
                            latency: start.elapsed(),
                            status: None,
                            error: Some(err.to_string()),
                            retries: retries.clone(),
                            context: ctx.clone(),
                        });
                    }
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "transport error");
                    return Err(to_transport_error(err, retries));
                }
            }
        }

        Err(Error::Transport(TransportError {
            kind: TransportErrorKind::Other,
            message: "request failed".to_string(),
            source: None,
            retries: state.metadata(),
        }))
    }

    fn record_http(
        &self,
        ctx: &RequestContext,
        resp: &reqwest::Response,
        start: Instant,
        error: Option<String>,
        retries: Option<RetryMetadata>,
    ) {
        if !self.telemetry.http_enabled() {
            return;
        }
        let context = ctx
            .clone()
            .with_request_id(request_id_from_headers(resp.headers()));
        self.telemetry.record_http(HttpRequestMetrics {
            latency: start.elapsed(),
            status: Some(resp.status().as_u16()),
            error,
            retries,
            context,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_api_key() {
        let err = Client::new(Config::default()).err().expect("missing key must fail");
        assert!(matches!(err, Error::Config(_)));
    }
}
