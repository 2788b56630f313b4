//! The `/preload` exchange.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::message::{Character, ChatMessage};

/// Where the host should place an ad relative to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdDisplayPosition {
    /// Below the assistant reply that triggered the ad.
    AfterAssistantMessage,
    /// Below the user message.
    AfterUserMessage,
}

/// A single bid returned by the ad server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    /// Server-side bid identifier, used to address the ad frame.
    pub bid_id: String,
    /// Placement code the bid was won for.
    pub code: String,
    /// Requested placement.
    #[serde(rename = "adDisplayPosition")]
    pub display_position: AdDisplayPosition,
}

/// Body of `POST /preload`: a snapshot of the conversation and its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadRequest {
    pub publisher_token: String,
    pub conversation_id: String,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_placement_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<Character>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertising_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Response of `POST /preload`.
///
/// A new response always replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadResponse {
    /// Ad session id to echo back on later preloads.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Bids in display order.
    #[serde(default)]
    pub bids: Vec<Bid>,
    /// Verbosity the server wants for upstream diagnostics.
    #[serde(default)]
    pub remote_log_level: Option<String>,
    /// Server-advertised preload timeout.
    #[serde(default)]
    pub preload_timeout: Option<i64>,
}

impl PreloadResponse {
    /// Parsed remote log level, if present and recognised.
    #[must_use]
    pub fn log_level(&self) -> Option<RemoteLogLevel> {
        self.remote_log_level
            .as_deref()
            .and_then(|s| s.parse().ok())
    }
}

/// Threshold for diagnostics the server wants to receive.
///
/// Ordered from most to least verbose; `Silent` disables reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RemoteLogLevel {
    Debug,
    Info,
    Log,
    Warn,
    #[default]
    Error,
    Silent,
}

impl FromStr for RemoteLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "log" => Ok(Self::Log),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "silent" => Ok(Self::Silent),
            other => Err(format!("unknown remote log level: {other}")),
        }
    }
}
