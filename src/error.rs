//! Error types.
//!
//! Transport failures are recoverable: the coordinator turns every one of
//! them into "no ads" and never surfaces them to the host conversation.

use thiserror::Error;

/// Failure of a single request to the ad server.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint address could not be formed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Network or transport layer failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Bad status: {0}")]
    BadStatus(u16),

    /// The response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// Status code for [`TransportError::BadStatus`].
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// A frame address that could not be formed from the ad server base.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameUrlError {
    /// The base address does not parse.
    #[error("Invalid ad server URL: {0}")]
    InvalidBase(#[from] url::ParseError),

    /// The base address has no path to extend (e.g. `mailto:`).
    #[error("Ad server URL cannot be a base: {0}")]
    NotABase(String),
}

/// Failure to construct an [`AdsProvider`](crate::provider::AdsProvider).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The configured ad server address is not a valid base URL.
    #[error("Invalid ad server URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The provider was created outside a Tokio runtime.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// A message from the ad frame that could not be interpreted.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The message was not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The message was not a JSON object.
    #[error("Message is not an object")]
    NotAnObject,

    /// The object carried no string `type` field.
    #[error("Message has no type")]
    MissingType,

    /// A known message type with a payload that does not match its schema.
    #[error("Malformed {kind} message: {reason}")]
    Malformed {
        /// The message type.
        kind: String,
        /// What was wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor() {
        assert_eq!(TransportError::BadStatus(500).status(), Some(500));
        let err = TransportError::from(url::ParseError::EmptyHost);
        assert!(err.status().is_none());
        assert!(err.to_string().starts_with("Invalid URL"));
    }
}
