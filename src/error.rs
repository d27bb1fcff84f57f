//! Error types shared by the API client and the controllers.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Message shown when the server gives no usable explanation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Failures coming back from an entity endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No token in the session; the request was never sent.
    #[error("not logged in")]
    MissingToken,

    /// The server refused the token (401/403). The session has been cleared.
    #[error("session expired or not authorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Transport succeeded but the envelope carried a non-200 `code`.
    #[error("request rejected (code {code}): {}", .message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))]
    Rejected { code: i64, message: Option<String> },

    /// Non-2xx HTTP status other than an auth failure.
    #[error("server returned HTTP {status}: {}", .message.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))]
    Status { status: u16, message: Option<String> },

    /// The response carried no record for the requested id.
    #[error("record {id} not found in response")]
    NotFound { id: i64 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// The server-provided message, if there was one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } | ApiError::Status { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    /// Text suitable for an alert: the server message verbatim, otherwise a fallback.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::MissingToken | ApiError::Unauthorized { .. } | ApiError::NotFound { .. } => {
                self.to_string()
            }
            _ => self
                .server_message()
                .unwrap_or(GENERIC_FAILURE_MESSAGE)
                .to_string(),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::MissingToken | ApiError::Unauthorized { .. })
    }
}

/// Per-field validation messages. Empty means the record may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Why a dialog submit did not go through.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Invalid(FieldErrors),

    #[error("dialog is not open for editing")]
    NotOpen,

    #[error(transparent)]
    Api(#[from] ApiError),
}
