//! Minimal Rust SDK for the Agencii chat API.
//!
//! The crate has three pure building blocks that work without any transport:
//!
//! - [`build_request`] turns host parameters into a validated [`RequestDescriptor`].
//! - [`normalize`] maps backend response items onto the canonical
//!   `{ text, response, sessionId }` record.
//! - [`format_error`] extracts a readable message from any error shape.
//!
//! With the default `client` feature, [`Client`] wires them to `reqwest`.
//!
//! ```rust,ignore
//! use agencii::{ApiKey, Client, Config, RequestOptions, SendMessageRequest};
//!
//! let client = Client::new(Config {
//!     api_key: Some(ApiKey::parse(std::env::var("AGENCII_API_KEY")?)?),
//!     ..Default::default()
//! })?;
//! let items = client
//!     .chat()
//!     .send_message(
//!         SendMessageRequest::new("int_123", "Draft a reply to the last ticket"),
//!         RequestOptions::default(),
//!     )
//!     .await?;
//! println!("{:?} (session {:?})", items[0].text_str(), items[0].session_id_str());
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
// Error carries reqwest/serde sources by value; boxing would change the public API.
#![allow(clippy::result_large_err)]

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.agencii.com/v1";

/// Default client identification header value.
pub(crate) const DEFAULT_CLIENT_HEADER: &str = concat!("agencii-rust/", env!("CARGO_PKG_VERSION"));

/// HTTP header carrying the client identification.
pub const CLIENT_HEADER: &str = "X-Agencii-Client";

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// HTTP header name for request ID tracing.
pub const REQUEST_ID_HEADER: &str = "X-Agencii-Request-Id";

mod api_key;
mod error_format;
mod errors;
mod identifiers;
pub mod normalize;
pub mod request;
mod telemetry;
mod types;

#[cfg(feature = "client")]
mod client;
#[cfg(any(feature = "client", feature = "blocking"))]
mod http;

#[cfg(feature = "blocking")]
mod blocking;
#[cfg(feature = "mock")]
mod mock;

pub use api_key::{ApiKey, Credentials, API_KEY_ENV, BASE_URL_ENV};
pub use error_format::{format_error, message_from_value, ErrorInput, UNKNOWN_ERROR_MESSAGE};
#[cfg(any(feature = "client", feature = "blocking"))]
pub use errors::{TransportError, TransportErrorKind};
pub use errors::{APIError, Error, Result, RetryMetadata, ValidationError};
pub use identifiers::{IntegrationId, SessionId};
pub use normalize::{
    has_fields, normalize, normalize_body, normalize_item, split_batch, NormalizedItem,
};
pub use request::{
    build_request, build_typed, build_with_spec, flatten_metadata, HttpMethod, OperationSpec,
    RequestDescriptor,
};
pub use telemetry::{
    HttpRequestMetrics, MetricsCallbacks, NormalizationMetrics, RequestContext,
};
pub use types::{
    CreateSessionRequest, GetResponseRequest, MetadataEntry, OperationKind, OperationRequest,
    ParamKind, ParamValue, RequestParams, SendMessageRequest,
};

#[cfg(feature = "client")]
pub use client::{ChatClient, Client, Config};
#[cfg(any(feature = "client", feature = "blocking"))]
pub use http::{HeaderEntry, HeaderList, RequestOptions, RetryConfig};

#[cfg(feature = "blocking")]
pub use blocking::{BlockingChatClient, BlockingClient, BlockingConfig};
#[cfg(feature = "mock")]
pub use mock::{fixtures, MockChatClient, MockClient, MockConfig};
