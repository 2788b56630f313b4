//! Renderable ad configurations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::message::ChatMessage;
use super::preload::Bid;

/// SDK tag reported to the ad frame.
pub const SDK_TAG: &str = "sdk-rust";

/// Everything an ad frame needs to render one bid.
///
/// Serialized as the `data` of the `update-iframe` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdConfig {
    /// Frame address on the ad server.
    pub url: Url,
    /// Conversation snapshot at build time.
    pub messages: Vec<ChatMessage>,
    /// Id of the assistant message this ad belongs to.
    pub message_id: String,
    /// Identifies this SDK to the frame.
    #[serde(rename = "sdk")]
    pub sdk_tag: String,
    /// Presentation hints such as `theme`.
    #[serde(rename = "otherParams")]
    pub extra_params: BTreeMap<String, String>,
    /// The bid being rendered.
    pub bid: Bid,
}
