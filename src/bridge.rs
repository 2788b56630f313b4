//! Message protocol between the host and an embedded ad frame.
//!
//! The frame posts JSON objects of the form `{"type": "...", "data": {...}}`.
//! Each known type is decoded against its own schema into an
//! [`InlineAdEvent`]; types this SDK does not know are kept as
//! [`InlineAdEvent::Unknown`] with the raw payload. When the frame announces
//! itself with `init-iframe`, the host answers with an `update-iframe`
//! message carrying the [`AdConfig`].
//!
//! # Example
//!
//! ```rust
//! use kontext_ads::bridge::InlineAdEvent;
//!
//! let event = InlineAdEvent::from_json(r#"{"type":"resize-iframe","data":{"height":120}}"#).unwrap();
//! assert_eq!(event.height(), Some(120.0));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::BridgeError;
use crate::model::AdConfig;

const UNKNOWN_ERROR: &str = "Unknown error";

/// Payload of `view-iframe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewData {
    /// Bid id of the viewed ad.
    pub id: String,
    pub content: String,
    pub message_id: String,
    pub url: String,
}

/// Payload of `click-iframe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickData {
    /// Bid id of the clicked ad.
    pub id: String,
    pub content: String,
}

/// Payload of `resize-iframe`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeData {
    /// New content height in CSS pixels.
    pub height: f64,
}

/// Payload of `error-iframe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    pub message: String,
}

/// A message type this SDK does not interpret.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownData {
    /// The `type` field as sent.
    pub kind: String,
    /// The full message.
    pub payload: Value,
}

/// An event received from the ad frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineAdEvent {
    /// The frame finished loading and wants its configuration.
    Init,
    /// The ad has been viewed by the user.
    View(ViewData),
    /// The ad has been clicked by the user.
    Click(ClickData),
    /// The frame content changed height.
    Resize(ResizeData),
    /// The frame reported an error.
    Error(ErrorData),
    /// Unrecognised type, passed through untouched.
    Unknown(UnknownData),
}

impl InlineAdEvent {
    /// Decode a message from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, BridgeError> {
        let raw: Value = serde_json::from_str(text)?;
        Self::parse(&raw)
    }

    /// Decode a message already parsed as JSON.
    pub fn parse(raw: &Value) -> Result<Self, BridgeError> {
        let obj = raw.as_object().ok_or(BridgeError::NotAnObject)?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(BridgeError::MissingType)?;

        match kind {
            "init-iframe" => Ok(Self::Init),
            "view-iframe" => Ok(Self::View(decode_data(obj, kind)?)),
            "click-iframe" => Ok(Self::Click(decode_data(obj, kind)?)),
            "resize-iframe" => Ok(Self::Resize(decode_data(obj, kind)?)),
            "error-iframe" => {
                let message = obj
                    .get("message")
                    .or_else(|| obj.get("data").and_then(|d| d.get("message")))
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_ERROR);
                Ok(Self::Error(ErrorData {
                    message: message.to_string(),
                }))
            }
            other => Ok(Self::Unknown(UnknownData {
                kind: other.to_string(),
                payload: raw.clone(),
            })),
        }
    }

    /// The message type as it appears on the wire.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Init => "init-iframe",
            Self::View(_) => "view-iframe",
            Self::Click(_) => "click-iframe",
            Self::Resize(_) => "resize-iframe",
            Self::Error(_) => "error-iframe",
            Self::Unknown(data) => &data.kind,
        }
    }

    #[must_use]
    pub fn bid_id(&self) -> Option<&str> {
        match self {
            Self::View(data) => Some(&data.id),
            Self::Click(data) => Some(&data.id),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::View(data) => Some(&data.message_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::View(data) => Some(&data.content),
            Self::Click(data) => Some(&data.content),
            _ => None,
        }
    }

    #[must_use]
    pub fn height(&self) -> Option<f64> {
        match self {
            Self::Resize(data) => Some(data.height),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(data) => Some(&data.message),
            _ => None,
        }
    }
}

fn decode_data<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    kind: &str,
) -> Result<T, BridgeError> {
    let data = obj.get("data").ok_or_else(|| BridgeError::Malformed {
        kind: kind.to_string(),
        reason: "missing data".to_string(),
    })?;
    T::deserialize(data).map_err(|e| BridgeError::Malformed {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A message the host posts into the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundMessage {
    /// Hands the frame its ad configuration.
    #[serde(rename = "update-iframe")]
    UpdateIframe(AdConfig),
}

impl OutboundMessage {
    /// JSON form of the message.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Script that delivers the message when evaluated in the hosting page.
    pub fn to_script(&self) -> Result<String, serde_json::Error> {
        Ok(format!("window.postMessage({}, '*');", self.to_json()?))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Receives events from one ad frame. All methods default to doing nothing.
pub trait InlineAdDelegate: Send + Sync {
    fn on_view(&self, _config: &AdConfig, _data: &ViewData) {}
    fn on_click(&self, _config: &AdConfig, _data: &ClickData) {}
    fn on_resize(&self, _config: &AdConfig, _height: f64) {}
    fn on_error(&self, _config: &AdConfig, _message: &str) {}
    fn on_unknown(&self, _config: &AdConfig, _data: &UnknownData) {}
}

/// Host side of one embedded ad frame.
pub struct InlineAdSession {
    config: AdConfig,
    delegate: Arc<dyn InlineAdDelegate>,
    height: Option<f64>,
}

impl fmt::Debug for InlineAdSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineAdSession")
            .field("url", &self.config.url.as_str())
            .field("height", &self.height)
            .finish()
    }
}

impl InlineAdSession {
    #[must_use]
    pub fn new(config: AdConfig, delegate: Arc<dyn InlineAdDelegate>) -> Self {
        Self {
            config,
            delegate,
            height: None,
        }
    }

    /// Address the frame should load.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.config.url
    }

    #[must_use]
    pub fn config(&self) -> &AdConfig {
        &self.config
    }

    /// Last height reported by the frame.
    #[must_use]
    pub fn height(&self) -> Option<f64> {
        self.height
    }

    /// Handle a raw message from the frame.
    ///
    /// Returns the reply to post back, if any. Malformed messages are dropped.
    pub fn handle_message(&mut self, raw: &Value) -> Option<OutboundMessage> {
        match InlineAdEvent::parse(raw) {
            Ok(event) => self.handle_event(&event),
            Err(e) => {
                tracing::warn!(error = %e, url = %self.config.url, "Dropping frame message");
                None
            }
        }
    }

    /// Handle a decoded event.
    pub fn handle_event(&mut self, event: &InlineAdEvent) -> Option<OutboundMessage> {
        match event {
            InlineAdEvent::Init => {
                tracing::debug!(bid_id = %self.config.bid.bid_id, "Frame initialised");
                return Some(OutboundMessage::UpdateIframe(self.config.clone()));
            }
            InlineAdEvent::View(data) => self.delegate.on_view(&self.config, data),
            InlineAdEvent::Click(data) => self.delegate.on_click(&self.config, data),
            InlineAdEvent::Resize(data) => {
                self.height = Some(data.height);
                self.delegate.on_resize(&self.config, data.height);
            }
            InlineAdEvent::Error(data) => {
                tracing::warn!(
                    error = %data.message,
                    bid_id = %self.config.bid.bid_id,
                    "Frame error"
                );
                self.delegate.on_error(&self.config, &data.message);
            }
            InlineAdEvent::Unknown(data) => self.delegate.on_unknown(&self.config, data),
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AdConfigBuilder;
    use crate::model::{AdDisplayPosition, Bid, ChatMessage, PreloadResponse, Role, Theme};
    use serde_json::json;
    use std::sync::Mutex;

    fn config() -> AdConfig {
        let response = PreloadResponse {
            bids: vec![Bid {
                bid_id: "b1".to_string(),
                code: "inlineAd".to_string(),
                display_position: AdDisplayPosition::AfterAssistantMessage,
            }],
            ..Default::default()
        };
        let conversation = vec![ChatMessage::new("m1", Role::Assistant, "Hi")];
        AdConfigBuilder::new("https://server.megabrain.co", Theme::Light)
            .build(&response, &conversation)
            .remove(0)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl InlineAdDelegate for Recorder {
        fn on_view(&self, _config: &AdConfig, data: &ViewData) {
            self.events.lock().unwrap().push(format!("view:{}", data.id));
        }
        fn on_click(&self, _config: &AdConfig, data: &ClickData) {
            self.events.lock().unwrap().push(format!("click:{}", data.id));
        }
        fn on_resize(&self, _config: &AdConfig, height: f64) {
            self.events.lock().unwrap().push(format!("resize:{height}"));
        }
        fn on_error(&self, _config: &AdConfig, message: &str) {
            self.events.lock().unwrap().push(format!("error:{message}"));
        }
        fn on_unknown(&self, _config: &AdConfig, data: &UnknownData) {
            self.events.lock().unwrap().push(format!("unknown:{}", data.kind));
        }
    }

    #[test]
    fn test_parse_view() {
        let event = InlineAdEvent::parse(&json!({
            "type": "view-iframe",
            "data": {"id": "b1", "content": "Shoes", "messageId": "m1", "url": "https://x.test"}
        }))
        .unwrap();

        assert_eq!(event.kind(), "view-iframe");
        assert_eq!(event.bid_id(), Some("b1"));
        assert_eq!(event.message_id(), Some("m1"));
        assert_eq!(event.content(), Some("Shoes"));
    }

    #[test]
    fn test_parse_error_defaults_message() {
        let event = InlineAdEvent::parse(&json!({"type": "error-iframe"})).unwrap();
        assert_eq!(event.error_message(), Some(UNKNOWN_ERROR));

        let raw = json!({"type": "error-iframe", "message": "boom"});
        let event = InlineAdEvent::parse(&raw).unwrap();
        assert_eq!(event.error_message(), Some("boom"));
    }

    #[test]
    fn test_unknown_keeps_payload() {
        let raw = json!({"type": "hover-iframe", "data": {"x": 1}});
        let event = InlineAdEvent::parse(&raw).unwrap();

        match event {
            InlineAdEvent::Unknown(data) => {
                assert_eq!(data.kind, "hover-iframe");
                assert_eq!(data.payload, raw);
            }
            other => panic!("expected unknown event, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_messages() {
        assert!(matches!(
            InlineAdEvent::parse(&json!("init-iframe")),
            Err(BridgeError::NotAnObject)
        ));
        assert!(matches!(
            InlineAdEvent::parse(&json!({"data": {}})),
            Err(BridgeError::MissingType)
        ));
        assert!(matches!(
            InlineAdEvent::parse(&json!({"type": "resize-iframe", "data": {"height": "tall"}})),
            Err(BridgeError::Malformed { .. })
        ));
        assert!(matches!(
            InlineAdEvent::parse(&json!({"type": "click-iframe"})),
            Err(BridgeError::Malformed { .. })
        ));
        assert!(matches!(
            InlineAdEvent::from_json("{not json"),
            Err(BridgeError::Json(_))
        ));
    }

    #[test]
    fn test_init_replies_with_config() {
        let mut session = InlineAdSession::new(config(), Arc::new(Recorder::default()));

        let reply = session.handle_message(&json!({"type": "init-iframe"})).unwrap();
        let value: Value = serde_json::from_str(&reply.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "update-iframe");
        assert_eq!(value["data"]["messageId"], "m1");
        assert_eq!(value["data"]["bid"]["bidId"], "b1");
        assert!(reply.to_script().unwrap().starts_with("window.postMessage({"));
    }

    #[test]
    fn test_events_reach_delegate() {
        let recorder = Arc::new(Recorder::default());
        let mut session = InlineAdSession::new(config(), Arc::<Recorder>::clone(&recorder) as Arc<dyn InlineAdDelegate>);

        let messages = [
            json!({
                "type": "view-iframe",
                "data": {"id": "b1", "content": "c", "messageId": "m1", "url": "u"}
            }),
            json!({"type": "click-iframe", "data": {"id": "b1", "content": "c"}}),
            json!({"type": "resize-iframe", "data": {"height": 240.5}}),
            json!({"type": "error-iframe", "message": "boom"}),
            json!({"type": "custom-iframe"}),
            json!(42),
        ];
        for message in &messages {
            assert!(session.handle_message(message).is_none());
        }

        assert_eq!(session.height(), Some(240.5));
        assert_eq!(
            *recorder.events.lock().unwrap(),
            ["view:b1", "click:b1", "resize:240.5", "error:boom", "unknown:custom-iframe"]
        );
    }
}
