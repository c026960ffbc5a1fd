use std::{sync::Arc, thread, time::Duration, time::Instant};

use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder, Response},
    header::ACCEPT,
    Method,
};
use serde_json::Value;

use crate::{
    api_key::{ApiKey, Credentials},
    errors::{Error, Result, TransportError, TransportErrorKind},
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
    CLIENT_HEADER, DEFAULT_CLIENT_HEADER, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    REQUEST_ID_HEADER,
};

#[derive(Clone, Debug, Default)]
pub struct BlockingConfig {
    pub base_url: Option<String>,
    pub api_key: Option<ApiKey>,
    pub client_header: Option<String>,
    pub http_client: Option<HttpClient>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy (defaults to 3 attempts, POST not retried).
    pub retry: Option<RetryConfig>,
    pub default_headers: Option<HeaderList>,
    pub metrics: Option<MetricsCallbacks>,
}

impl BlockingConfig {
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self {
            base_url: Some(credentials.base_url),
            api_key: Some(credentials.api_key),
            ..Default::default()
        }
    }
}

/// Blocking Agencii client for callers without an async runtime.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    api_key: ApiKey,
    client_header: Option<String>,
    http: HttpClient,
    request_timeout: Duration,
    retry: RetryConfig,
    default_headers: Option<HeaderList>,
    telemetry: Telemetry,
}

impl BlockingClient {
    pub fn new(cfg: BlockingConfig) -> Result<Self> {
        let base_url = resolve_base_url(cfg.base_url.as_deref())?;
        let api_key = cfg
            .api_key
            .ok_or_else(|| Error::Config("api key is required".to_string()))?;

        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client {
            Some(client) => client,
            None => HttpClient::builder()
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
                retry: cfg.retry.unwrap_or_default(),
                default_headers: cfg.default_headers,
                telemetry: Telemetry::new(cfg.metrics),
            }),
        })
    }

    pub fn chat(&self) -> BlockingChatClient {
        BlockingChatClient {
            inner: self.inner.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BlockingChatClient {
    inner: Arc<ClientInner>,
}

impl BlockingChatClient {
    pub fn send_message(
        &self,
        req: SendMessageRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options)
    }

    pub fn get_response(
        &self,
        req: GetResponseRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options)
    }

    pub fn create_session(
        &self,
        req: CreateSessionRequest,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        self.execute(&req, options)
    }

    pub fn execute<R: OperationRequest>(
        &self,
        req: &R,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_typed(req)?;
        self.send(&descriptor, options)
    }

    pub fn execute_params(
        &self,
        kind: OperationKind,
        params: &RequestParams,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let descriptor = build_request(kind, params)?;
        self.send(&descriptor, options)
    }

    pub fn send(
        &self,
        descriptor: &RequestDescriptor,
        options: RequestOptions,
    ) -> Result<Vec<NormalizedItem>> {
        let (bytes, ctx) = self.inner.dispatch(descriptor, options)?;
        let items = normalize_body(&bytes)?;
        self.inner
            .telemetry
            .record_normalized(NormalizationMetrics::from_items(&items, ctx));
        Ok(items)
    }

    pub fn send_raw(&self, descriptor: &RequestDescriptor, options: RequestOptions) -> Result<Value> {
        let (bytes, _) = self.inner.dispatch(descriptor, options)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl ClientInner {
    fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        options: RequestOptions,
    ) -> Result<(Vec<u8>, RequestContext)> {
        let method = Method::from(descriptor.method);
        let url = format!("{}{}", self.base_url, descriptor.path);
        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json")
            .bearer_auth(self.api_key.as_str());
        if !descriptor.query.is_empty() {
            builder = builder.query(&descriptor.query_pairs());
        }
        builder = builder.json(&descriptor.body);
        if let Some(req_id) = options.request_id.as_deref() {
            if !req_id.trim().is_empty() {
                builder = builder.header(REQUEST_ID_HEADER, req_id);
            }
        }
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header(CLIENT_HEADER, client_header);
        }
        let extra = self.default_headers.iter().chain(std::iter::once(&options.headers));
        for list in extra {
            for entry in list.iter().filter(|e| e.is_valid()) {
                let (name, value) = parse_header(&entry.key, &entry.value)?;
                builder = builder.header(name, value);
            }
        }
        for (name, value) in &descriptor.headers {
            let (name, value) = parse_header(name, value)?;
            builder = builder.header(name, value);
        }
        builder = builder.timeout(options.timeout.unwrap_or(self.request_timeout));

        let retry = options.retry.unwrap_or_else(|| self.retry.clone());
        let ctx = RequestContext::new(descriptor.operation, method.as_str(), &descriptor.path)
            .with_request_id(options.request_id);
        let resp = self.send_with_retry(builder, method, retry, &ctx)?;
        let ctx = ctx.with_request_id(request_id_from_headers(resp.headers()));
        let bytes = resp.bytes().map_err(|err| to_transport_error(err, None))?;
        Ok((bytes.to_vec(), ctx))
    }

    fn send_with_retry(
        &self,
        builder: RequestBuilder,
        method: Method,
        retry: RetryConfig,
        ctx: &RequestContext,
    ) -> Result<Response> {
        let max_attempts = retry.max_attempts.max(1);
        let mut state = RetryState::new();
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            let attempt_builder = builder
                .try_clone()
                .ok_or_else(|| Error::Config("request body is not cloneable for retry".into()))?;
            #[cfg(feature = "tracing")]
            let _guard = tracing::debug_span!(
                "agencii.http",
                operation = %ctx.operation,
                method = %ctx.method,
                path = %ctx.path,
                attempt,
                max_attempts
            )
            .entered();

            match attempt_builder.send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.record_http(ctx, start, Some(status.as_u16()), None, &state);
                        return Ok(resp);
                    }
                    state.record_attempt(attempt);
                    state.record_status(status);
                    if retry.should_retry_status(&method, status) && attempt < max_attempts {
                        thread::sleep(retry.backoff_delay(attempt));
                        continue;
                    }
                    self.record_http(
                        ctx,
                        start,
                        Some(status.as_u16()),
                        Some(format!("http {}", status.as_u16())),
                        &state,
                    );
                    #[cfg(feature = "tracing")]
                    tracing::warn!(status = %status, attempt, "request failed; returning error");
                    let headers = resp.headers().clone();
                    let body = resp.text().unwrap_or_default();
                    return Err(parse_api_error_parts(status, &headers, body, state.metadata()));
                }
                Err(err) => {
                    state.record_attempt(attempt);
                    state.record_error(&err);
                    if retry.should_retry_error(&method, &err) && attempt < max_attempts {
                        thread::sleep(retry.backoff_delay(attempt));
                        continue;
                    }
                    self.record_http(ctx, start, None, Some(err.to_string()), &state);
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "transport error");
                    return Err(to_transport_error(err, state.metadata()));
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
        start: Instant,
        status: Option<u16>,
        error: Option<String>,
        state: &RetryState,
    ) {
        if self.telemetry.http_enabled() {
            self.telemetry.record_http(HttpRequestMetrics {
                latency: start.elapsed(),
                status,
                error,
                retries: state.metadata(),
                context: ctx.clone(),
            });
        }
    }
}
