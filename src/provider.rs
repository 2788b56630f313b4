//! The ads provider façade.
//!
//! Hosts report each chat message as it is produced:
//!
//! - [`AdsProvider::on_user_message`] records the message and starts fetching
//!   bids for the new conversation state in the background.
//! - [`AdsProvider::on_assistant_message`] records the reply and returns the
//!   ads to show under it, waiting a bounded time for an outstanding fetch.
//!
//! Ad delivery is best-effort: neither call ever fails.
//!
//! # Example
//!
//! ```rust,no_run
//! use kontext_ads::{AdsProvider, ChatMessage, ProviderSettings};
//!
//! # async fn example() -> Result<(), kontext_ads::ProviderError> {
//! let settings = ProviderSettings::new("pub-token", "user-1", "conv-1", vec!["inlineAd".into()]);
//! let ads = AdsProvider::new(settings)?;
//!
//! ads.on_user_message(ChatMessage::user("Which running shoes should I buy?"));
//! let configs = ads.on_assistant_message(ChatMessage::assistant("Here are a few options...")).await;
//! for config in configs {
//!     println!("render {}", config.url);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::instrument;
use url::Url;

use crate::builder::AdConfigBuilder;
use crate::config::ProviderSettings;
use crate::conversation::Conversation;
use crate::coordinator::PreloadCoordinator;
use crate::diagnostics::DiagnosticReporter;
use crate::error::{ProviderError, TransportError};
use crate::model::{AdConfig, ChatMessage, PreloadRequest, Role};
use crate::transport::{AdServerClient, HttpTransport};

/// Injects ads into one conversation.
///
/// Cloning yields another handle to the same conversation and coordinator.
#[derive(Debug, Clone)]
pub struct AdsProvider {
    settings: Arc<ProviderSettings>,
    conversation: Conversation,
    coordinator: Option<PreloadCoordinator>,
}

impl AdsProvider {
    /// Create a provider talking to `settings.ad_server_url` over HTTP.
    ///
    /// Must be called from within a Tokio runtime unless the provider is
    /// disabled.
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        if settings.is_disabled {
            return Ok(Self::disabled(settings));
        }
        let url = parse_server_url(&settings.ad_server_url)?;
        let transport = HttpTransport::with_timeout(url.as_str(), settings.request_timeout())
            .map_err(|e| construction_error(&settings.ad_server_url, e))?;
        Self::with_client(settings, Arc::new(transport))
    }

    /// Create a provider using a custom ad server client.
    pub fn with_client(
        settings: ProviderSettings,
        client: Arc<dyn AdServerClient>,
    ) -> Result<Self, ProviderError> {
        if settings.is_disabled {
            return Ok(Self::disabled(settings));
        }
        parse_server_url(&settings.ad_server_url)?;
        let runtime = Handle::try_current()?;

        let builder = AdConfigBuilder::new(settings.ad_server_url.as_str(), settings.theme);
        let reporter = DiagnosticReporter::new(Arc::clone(&client), runtime.clone());
        let coordinator =
            PreloadCoordinator::new(client, builder, reporter, runtime, settings.waiter_policy);

        tracing::debug!(
            ad_server_url = %settings.ad_server_url,
            conversation_id = %settings.conversation_id,
            "Ads provider created"
        );

        Ok(Self {
            settings: Arc::new(settings),
            conversation: Conversation::new(),
            coordinator: Some(coordinator),
        })
    }

    fn disabled(settings: ProviderSettings) -> Self {
        tracing::info!(conversation_id = %settings.conversation_id, "Ads disabled");
        Self {
            settings: Arc::new(settings),
            conversation: Conversation::new(),
            coordinator: None,
        }
    }

    /// Seed the conversation with messages exchanged before the provider existed.
    #[must_use]
    pub fn with_history(mut self, messages: Vec<ChatMessage>) -> Self {
        self.conversation = Conversation::with_messages(messages);
        self
    }

    /// Record a user message and start preloading ads for it.
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub fn on_user_message(&self, message: ChatMessage) {
        let Some(coordinator) = &self.coordinator else {
            return;
        };
        self.conversation.push(message);
        coordinator.start_preload(self.preload_request());
    }

    /// Record an assistant message and return the ads to render after it.
    ///
    /// Returns immediately when bids are already loaded; otherwise waits up to
    /// the configured preload wait. Empty on timeout, failure or when disabled.
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub async fn on_assistant_message(&self, message: ChatMessage) -> Vec<AdConfig> {
        let Some(coordinator) = &self.coordinator else {
            return Vec::new();
        };
        self.conversation.push(message);
        let conversation = self.conversation.snapshot();

        if let Some(configs) = coordinator.ready_configs(&conversation) {
            tracing::debug!(ad_count = configs.len(), "Serving preloaded ads");
            return configs;
        }
        let configs = coordinator
            .await_readiness(conversation, self.settings.preload_wait())
            .await;
        tracing::debug!(ad_count = configs.len(), "Serving awaited ads");
        configs
    }

    /// Dispatch on the message role.
    pub async fn add_message(&self, message: ChatMessage) -> Vec<AdConfig> {
        match message.role {
            Role::User => {
                self.on_user_message(message);
                Vec::new()
            }
            Role::Assistant => self.on_assistant_message(message).await,
        }
    }

    /// Snapshot of the current state as a `/preload` body.
    #[must_use]
    pub fn preload_request(&self) -> PreloadRequest {
        let settings = &self.settings;
        let session_id = self
            .coordinator
            .as_ref()
            .and_then(PreloadCoordinator::session_id)
            .or_else(|| settings.session_id.clone());

        PreloadRequest {
            publisher_token: settings.publisher_token.clone(),
            conversation_id: settings.conversation_id.clone(),
            user_id: settings.user_id.clone(),
            messages: self.conversation.snapshot(),
            enabled_placement_codes: settings.enabled_placement_codes.clone(),
            variant_id: settings.variant_id.clone(),
            character: settings.character.clone(),
            advertising_id: settings.advertising_id.clone(),
            vendor_id: settings.vendor_id.clone(),
            session_id,
        }
    }

    /// All messages recorded so far.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.snapshot()
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.coordinator.is_none()
    }

    #[must_use]
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// The underlying coordinator; `None` when disabled.
    #[must_use]
    pub fn coordinator(&self) -> Option<&PreloadCoordinator> {
        self.coordinator.as_ref()
    }
}

fn construction_error(url: &str, error: TransportError) -> ProviderError {
    match error {
        TransportError::Transport(e) => ProviderError::Client(e),
        other => ProviderError::InvalidUrl {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

fn parse_server_url(raw: &str) -> Result<Url, ProviderError> {
    let url = Url::parse(raw).map_err(|e| ProviderError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ProviderError::InvalidUrl {
            url: raw.to_string(),
            reason: "not a base URL".to_string(),
        });
    }
    Ok(url)
}
