//! Human-readable messages from heterogeneous error shapes.

use serde_json::Value;

use crate::errors::{APIError, Error};

/// Returned when no message can be extracted.
pub const UNKNOWN_ERROR_MESSAGE: &str =
    "An unknown error occurred while communicating with Agencii API";

/// Anything a caller may want to turn into a message.
#[derive(Debug, Clone, Copy)]
pub enum ErrorInput<'a> {
    /// A decoded error body, e.g. `{"error": {"message": ..}, "message": ..}`.
    Json(&'a Value),
    /// A Rust error value.
    Native(&'a (dyn std::error::Error + 'static)),
    /// Something with no recognizable shape.
    Unknown,
}

impl<'a> From<&'a Value> for ErrorInput<'a> {
    fn from(value: &'a Value) -> Self {
        ErrorInput::Json(value)
    }
}

impl<'a> From<&'a Error> for ErrorInput<'a> {
    fn from(err: &'a Error) -> Self {
        ErrorInput::Native(err)
    }
}

impl<'a> From<&'a APIError> for ErrorInput<'a> {
    fn from(err: &'a APIError) -> Self {
        ErrorInput::Native(err)
    }
}

/// Extract a message. Nested `error.message` wins over top-level `message`;
/// Rust errors yield their own message; everything else yields
/// [`UNKNOWN_ERROR_MESSAGE`].
pub fn format_error<'a>(err: impl Into<ErrorInput<'a>>) -> String {
    let message = match err.into() {
        ErrorInput::Json(value) => message_from_value(value).map(str::to_string),
        ErrorInput::Native(err) => native_message(err),
        ErrorInput::Unknown => None,
    };
    message.unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string())
}

/// `error.message`, then `message`, as non-empty strings.
pub fn message_from_value(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    object
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(non_empty_str)
        .or_else(|| object.get("message").and_then(non_empty_str))
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn native_message(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let api = err
        .downcast_ref::<APIError>()
        .or_else(|| match err.downcast_ref::<Error>() {
            Some(Error::Api(api)) => Some(api),
            _ => None,
        });
    let message = match api {
        Some(api) => api.message.clone(),
        None => err.to_string(),
    };
    (!message.is_empty()).then_some(message)
}

impl Error {
    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        format_error(self)
    }
}
