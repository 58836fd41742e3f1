//! Profile normalization
//!
//! Provider responses are converted into a [`CanonicalIdentity`] in exactly
//! one place, behind [`ProfileNormalizer`], so nothing downstream depends on
//! the provider's response shape.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{SsoError, SsoResult};
use crate::identity::CanonicalIdentity;

pub mod guild;

pub use guild::GuildProfileNormalizer;

/// Raw endpoint bodies keyed by endpoint name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponses {
    bodies: BTreeMap<String, String>,
}

impl RawResponses {
    /// Create an empty set of responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the body returned by an endpoint
    pub fn insert(&mut self, endpoint: impl Into<String>, body: impl Into<String>) {
        self.bodies.insert(endpoint.into(), body.into());
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(endpoint, body);
        self
    }

    /// Raw body of an endpoint, if it was fetched
    #[must_use]
    pub fn get(&self, endpoint: &str) -> Option<&str> {
        self.bodies.get(endpoint).map(String::as_str)
    }

    /// Parse an endpoint body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::MalformedResponse`] if the endpoint is missing or
    /// its body is not valid JSON
    pub fn json(&self, endpoint: &str) -> SsoResult<Value> {
        let body = self.get(endpoint).ok_or_else(|| {
            SsoError::MalformedResponse(format!("missing response from {endpoint} endpoint"))
        })?;

        serde_json::from_str(body).map_err(|e| {
            SsoError::MalformedResponse(format!("{endpoint} endpoint returned invalid JSON: {e}"))
        })
    }

    /// Number of recorded responses
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no responses were recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

/// Converts provider responses into a canonical identity
pub trait ProfileNormalizer: Send + Sync {
    /// Build the canonical identity from the fetched endpoint bodies
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::MalformedResponse`] if the external id is absent or
    /// a required body cannot be parsed
    fn normalize(&self, raw: &RawResponses) -> SsoResult<CanonicalIdentity>;
}

/// Render a scalar JSON value as a string
///
/// Numbers and strings are accepted; anything else is treated as absent.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_missing_endpoint() {
        let raw = RawResponses::new();
        assert!(matches!(
            raw.json("id"),
            Err(SsoError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_json_invalid_body() {
        let raw = RawResponses::new().with("id", "<html>oops</html>");
        let err = raw.json("id").unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(&json!(42)), Some("42".to_string()));
        assert_eq!(scalar_to_string(&json!("42")), Some("42".to_string()));
        assert_eq!(scalar_to_string(&json!(null)), None);
        assert_eq!(scalar_to_string(&json!({"id": 1})), None);
    }
}
