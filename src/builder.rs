//! Turns a preload response into renderable ad configurations.
//!
//! Building is a pure function of the response and the conversation
//! snapshot: no network, no shared state, same inputs give the same output.

use std::collections::BTreeMap;

use url::Url;

use crate::error::FrameUrlError;
use crate::model::ad::SDK_TAG;
use crate::model::{AdConfig, Bid, ChatMessage, PreloadResponse, Theme};

/// Builds [`AdConfig`]s addressed at one ad server.
#[derive(Debug, Clone)]
pub struct AdConfigBuilder {
    base: Result<Url, url::ParseError>,
    theme: Theme,
}

impl AdConfigBuilder {
    /// Create a builder for the given ad server base address.
    #[must_use]
    pub fn new(ad_server_url: impl Into<String>, theme: Theme) -> Self {
        let raw = ad_server_url.into();
        Self {
            base: Url::parse(raw.trim_end_matches('/')),
            theme,
        }
    }

    /// Theme stamped into every config.
    #[must_use]
    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Build one config per bid, in bid order, tagged with the last message.
    ///
    /// Returns nothing for an empty conversation. Bids whose frame address
    /// cannot be formed are skipped.
    #[must_use]
    pub fn build(&self, response: &PreloadResponse, conversation: &[ChatMessage]) -> Vec<AdConfig> {
        let Some(last) = conversation.last() else {
            return Vec::new();
        };

        response
            .bids
            .iter()
            .filter_map(|bid| match self.frame_url(bid, &last.id) {
                Ok(url) => Some(AdConfig {
                    url,
                    messages: conversation.to_vec(),
                    message_id: last.id.clone(),
                    sdk_tag: SDK_TAG.to_string(),
                    extra_params: BTreeMap::from([(
                        "theme".to_string(),
                        self.theme.as_str().to_string(),
                    )]),
                    bid: bid.clone(),
                }),
                Err(e) => {
                    tracing::warn!(
                        bid_id = %bid.bid_id,
                        code = %bid.code,
                        error = %e,
                        "Skipping bid with malformed frame URL"
                    );
                    None
                }
            })
            .collect()
    }

    /// `{server}/api/frame/{bidId}?messageId={messageId}&code={code}`
    ///
    /// The bid id is a single path segment and both query values are
    /// form-encoded, so reserved characters in server-supplied ids cannot
    /// change the shape of the address.
    pub fn frame_url(&self, bid: &Bid, message_id: &str) -> Result<Url, FrameUrlError> {
        let mut url = self.base.clone()?;
        if url.cannot_be_a_base() {
            return Err(FrameUrlError::NotABase(url.into()));
        }
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| FrameUrlError::NotABase(bid.bid_id.clone()))?
            .pop_if_empty()
            .extend(["api", "frame", bid.bid_id.as_str()]);
        url.query_pairs_mut()
            .append_pair("messageId", message_id)
            .append_pair("code", &bid.code);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdDisplayPosition, Role};

    fn bid(id: &str, code: &str) -> Bid {
        Bid {
            bid_id: id.to_string(),
            code: code.to_string(),
            display_position: AdDisplayPosition::AfterAssistantMessage,
        }
    }

    fn response(bids: Vec<Bid>) -> PreloadResponse {
        PreloadResponse {
            bids,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_bid_embeds_ids() {
        let builder = AdConfigBuilder::new("https://server.megabrain.co", Theme::Light);
        let conversation = vec![ChatMessage::new("m1", Role::Assistant, "Sure!")];

        let configs = builder.build(&response(vec![bid("b1", "c1")]), &conversation);

        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(
            config.url.as_str(),
            "https://server.megabrain.co/api/frame/b1?messageId=m1&code=c1"
        );
        assert_eq!(config.message_id, "m1");
        assert_eq!(config.sdk_tag, SDK_TAG);
        assert_eq!(config.extra_params.get("theme").unwrap(), "light");
        assert_eq!(config.messages, conversation);
    }

    #[test]
    fn test_order_follows_bids_and_is_deterministic() {
        let builder = AdConfigBuilder::new("https://ads.example.com/", Theme::Dark);
        let conversation = vec![
            ChatMessage::new("u1", Role::User, "Hello"),
            ChatMessage::new("a1", Role::Assistant, "Hi"),
        ];
        let resp = response(vec![bid("b2", "x"), bid("b1", "y"), bid("b3", "z")]);

        let first = builder.build(&resp, &conversation);
        let second = builder.build(&resp, &conversation);

        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|c| c.bid.bid_id.as_str()).collect();
        assert_eq!(ids, ["b2", "b1", "b3"]);
        assert!(first[0].url.as_str().starts_with("https://ads.example.com/api/frame/b2"));
        assert_eq!(first[0].extra_params.get("theme").unwrap(), "dark");
    }

    #[test]
    fn test_empty_conversation_yields_nothing() {
        let builder = AdConfigBuilder::new("https://server.megabrain.co", Theme::Light);
        assert!(builder.build(&response(vec![bid("b1", "c1")]), &[]).is_empty());
    }

    #[test]
    fn test_malformed_url_skips_bid() {
        let builder = AdConfigBuilder::new("not a server", Theme::Light);
        let conversation = vec![ChatMessage::new("m1", Role::Assistant, "Hi")];

        let configs = builder.build(&response(vec![bid("b1", "c1")]), &conversation);
        assert!(configs.is_empty());
    }

    #[test]
    fn test_base_path_is_kept() {
        let builder = AdConfigBuilder::new("https://ads.example.com/v2/", Theme::Light);
        let url = builder.frame_url(&bid("b1", "c1"), "m1").unwrap();
        assert_eq!(url.as_str(), "https://ads.example.com/v2/api/frame/b1?messageId=m1&code=c1");
    }

    #[test]
    fn test_cannot_be_a_base_skips_bid() {
        let builder = AdConfigBuilder::new("mailto:ads@example.com", Theme::Light);
        let err = builder.frame_url(&bid("b1", "c1"), "m1").unwrap_err();
        assert!(matches!(err, FrameUrlError::NotABase(_)));
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let builder = AdConfigBuilder::new("https://server.megabrain.co", Theme::Light);

        let url = builder.frame_url(&bid("b#1", "c1"), "m1").unwrap();
        assert!(url.fragment().is_none());
        assert_eq!(url.path(), "/api/frame/b%231");
        assert_eq!(query(&url), vec![pair("messageId", "m1"), pair("code", "c1")]);

        let url = builder.frame_url(&bid("../../x", "c1"), "m1").unwrap();
        assert!(url.path().starts_with("/api/frame/"));
        assert_eq!(url.path_segments().unwrap().count(), 3);

        let url = builder.frame_url(&bid("b1", "c&messageId=evil"), "m?1").unwrap();
        assert_eq!(
            query(&url),
            vec![pair("messageId", "m?1"), pair("code", "c&messageId=evil")]
        );
    }

    #[test]
    fn test_serialized_payload_shape() {
        let builder = AdConfigBuilder::new("https://server.megabrain.co", Theme::Light);
        let conversation = vec![ChatMessage::new("m1", Role::Assistant, "Hi")];
        let configs = builder.build(&response(vec![bid("b1", "c1")]), &conversation);

        let json = serde_json::to_value(&configs[0]).unwrap();
        assert_eq!(json["sdk"], SDK_TAG);
        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["otherParams"]["theme"], "light");
        assert_eq!(json["bid"]["bidId"], "b1");
    }
}
