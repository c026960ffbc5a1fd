//! String identifier newtypes for Agencii concepts.
//!
//! All types implement `From<&str>`, `From<String>`, and `Into<String>` and
//! serialize as plain strings.
//!
//! ```ignore
//! use agencii::{IntegrationId, SessionId};
//!
//! let integration: IntegrationId = "int_123".into();
//! let session: SessionId = "sess_456".into();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates string wrapper newtypes with consistent implementations.
///
/// Each generated type trims whitespace from input values and serializes as a
/// plain string.
macro_rules! string_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

string_id_type!(
    SessionId,
    "Conversation session identifier. Correlates messages into one conversation."
);

string_id_type!(
    IntegrationId,
    "Agencii integration identifier. Selects which agency receives a message."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_trims_whitespace() {
        let id: SessionId = "  sess_1  ".into();
        assert_eq!(id.as_str(), "sess_1");
    }

    #[test]
    fn integration_id_empty_check() {
        assert!(IntegrationId::new("   ").is_empty());
        assert!(!IntegrationId::new("int_1").is_empty());
    }

    #[test]
    fn session_id_serializes_as_string() {
        let id = SessionId::new("sess_9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sess_9\"");
        let back: SessionId = serde_json::from_str("\"sess_9\"").unwrap();
        assert_eq!(back, id);
    }
}
