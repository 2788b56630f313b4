//! Diagnostic payloads for `POST /error`.

use serde::{Deserialize, Serialize};

use super::preload::PreloadRequest;

/// A diagnostic event reported to the ad server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<AdditionalData>,
}

/// Context attached to an [`ErrorReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload_body_request: Option<PreloadRequest>,
}

impl ErrorReport {
    /// Create a report, attaching the preload request that led to it if any.
    #[must_use]
    pub fn new(error: impl Into<String>, request: Option<PreloadRequest>) -> Self {
        Self {
            error: error.into(),
            additional_data: request.map(|r| AdditionalData {
                preload_body_request: Some(r),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_without_context() {
        let report = ErrorReport::new("boom", None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }
}
