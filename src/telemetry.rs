use std::{fmt, sync::Arc, time::Duration};

use crate::{normalize::NormalizedItem, types::OperationKind, RetryMetadata};

/// User-provided callbacks for emitting metrics without taking on a tracing dependency.
#[derive(Clone, Default)]
pub struct MetricsCallbacks {
    pub http_request: Option<Arc<dyn Fn(HttpRequestMetrics) + Send + Sync>>,
    pub normalized: Option<Arc<dyn Fn(NormalizationMetrics) + Send + Sync>>,
}

impl fmt::Debug for MetricsCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCallbacks")
            .field(
                "http_request",
                &self.http_request.as_ref().map(|_| "callback"),
            )
            .field("normalized", &self.normalized.as_ref().map(|_| "callback"))
            .finish()
    }
}

/// Common request metadata shared by all telemetry events.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub operation: OperationKind,
    pub method: String,
    pub path: String,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(
        operation: OperationKind,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            method: method.into(),
            path: path.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        if let Some(id) = request_id {
            if !id.trim().is_empty() {
                self.request_id = Some(id);
            }
        }
        self
    }
}

/// HTTP request latency and outcome.
#[derive(Clone, Debug)]
pub struct HttpRequestMetrics {
    pub latency: Duration,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub retries: Option<RetryMetadata>,
    pub context: RequestContext,
}

/// Outcome of normalizing one response batch.
#[derive(Clone, Debug)]
pub struct NormalizationMetrics {
    pub items: usize,
    pub missing_text: usize,
    pub missing_session_id: usize,
    pub context: RequestContext,
}

impl NormalizationMetrics {
    pub fn from_items(items: &[NormalizedItem], context: RequestContext) -> Self {
        Self {
            items: items.len(),
            missing_text: items.iter().filter(|i| i.text().is_none()).count(),
            missing_session_id: items.iter().filter(|i| i.session_id().is_none()).count(),
            context,
        }
    }
}

/// Internal helper that owns the registered callbacks (if any).
#[derive(Clone, Default)]
pub(crate) struct Telemetry {
    callbacks: MetricsCallbacks,
}

impl Telemetry {
    pub fn new(callbacks: Option<MetricsCallbacks>) -> Self {
        Self {
            callbacks: callbacks.unwrap_or_default(),
        }
    }

    pub fn http_enabled(&self) -> bool {
        self.callbacks.http_request.is_some()
    }

    pub fn record_http(&self, metrics: HttpRequestMetrics) {
        if let Some(cb) = &self.callbacks.http_request {
            cb(metrics);
        }
    }

    pub fn record_normalized(&self, metrics: NormalizationMetrics) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            operation = %metrics.context.operation,
            items = metrics.items,
            missing_text = metrics.missing_text,
            missing_session_id = metrics.missing_session_id,
            "normalized response"
        );
        if let Some(cb) = &self.callbacks.normalized {
            cb(metrics);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn callbacks_receive_metrics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let telemetry = Telemetry::new(Some(MetricsCallbacks {
            normalized: Some(Arc::new(move |m: NormalizationMetrics| {
                sink.lock().unwrap().push(m.items);
            })),
            ..Default::default()
        }));
        assert!(!telemetry.http_enabled());

        telemetry.record_normalized(NormalizationMetrics {
            items: 2,
            missing_text: 0,
            missing_session_id: 1,
            context: RequestContext::new(OperationKind::SendMessage, "POST", "/"),
        });
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn request_context_ignores_blank_request_id() {
        let ctx = RequestContext::new(OperationKind::GetResponse, "POST", "/chat/completions")
            .with_request_id(Some("  ".into()));
        assert!(ctx.request_id.is_none());
    }
}
