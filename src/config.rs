//! Configuration.
//!
//! [`ProviderSettings`] is what an [`AdsProvider`](crate::provider::AdsProvider)
//! is constructed from. [`AppConfig`] is the demo binary's layered
//! configuration: defaults, then an optional config file, then `KONTEXT_`
//! environment variables, then command line flags.

use std::time::Duration;

use clap::{Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::coordinator::{DEFAULT_PRELOAD_WAIT, WaiterPolicy};
use crate::model::{Character, Theme};

/// Production ad server.
pub const DEFAULT_AD_SERVER_URL: &str = "https://server.megabrain.co";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for one ads provider (one conversation).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// Publisher credential issued by the ad network.
    pub publisher_token: String,
    /// Stable id of the end user.
    pub user_id: String,
    /// Id of the conversation being monetized.
    pub conversation_id: String,
    /// Placement codes the host is able to render.
    #[serde(default)]
    pub enabled_placement_codes: Vec<String>,
    #[serde(default)]
    pub character: Option<Character>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub advertising_id: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    /// Initial ad session id; replaced by the one the server hands out.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Turn both entry points into no-ops.
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default = "default_ad_server_url")]
    pub ad_server_url: String,
    #[serde(default)]
    pub theme: Theme,
    /// How long an assistant turn waits for an outstanding preload.
    #[serde(default = "default_preload_wait_ms")]
    pub preload_wait_ms: u64,
    #[serde(default)]
    pub waiter_policy: WaiterPolicy,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_ad_server_url() -> String {
    DEFAULT_AD_SERVER_URL.to_string()
}

fn default_preload_wait_ms() -> u64 {
    DEFAULT_PRELOAD_WAIT.as_millis() as u64
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_millis() as u64
}

impl ProviderSettings {
    /// Settings with the required identifiers and defaults for the rest.
    #[must_use]
    pub fn new(
        publisher_token: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        enabled_placement_codes: Vec<String>,
    ) -> Self {
        Self {
            publisher_token: publisher_token.into(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            enabled_placement_codes,
            character: None,
            variant_id: None,
            advertising_id: None,
            vendor_id: None,
            session_id: None,
            is_disabled: false,
            ad_server_url: default_ad_server_url(),
            theme: Theme::default(),
            preload_wait_ms: default_preload_wait_ms(),
            waiter_policy: WaiterPolicy::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Point at a different ad server.
    #[must_use]
    pub fn with_ad_server_url(mut self, url: impl Into<String>) -> Self {
        self.ad_server_url = url.into();
        self
    }

    #[must_use]
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    #[must_use]
    pub fn with_character(mut self, character: Character) -> Self {
        self.character = Some(character);
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_preload_wait(mut self, wait: Duration) -> Self {
        self.preload_wait_ms = wait.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_waiter_policy(mut self, policy: WaiterPolicy) -> Self {
        self.waiter_policy = policy;
        self
    }

    #[must_use]
    pub fn disabled(mut self, is_disabled: bool) -> Self {
        self.is_disabled = is_disabled;
        self
    }

    /// Deadline for assistant turns.
    #[must_use]
    pub fn preload_wait(&self) -> Duration {
        Duration::from_millis(self.preload_wait_ms)
    }

    /// HTTP timeout for ad server calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Demo binary configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Ad server base URL
    #[arg(long, env = "AD_SERVER_URL")]
    pub ad_server_url: Option<String>,

    /// Publisher token
    #[arg(long, env = "PUBLISHER_TOKEN")]
    pub publisher_token: Option<String>,

    /// Frame theme (light or dark)
    #[arg(long)]
    pub theme: Option<String>,

    /// Disable ad delivery
    #[arg(long)]
    pub disabled: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// What the demo binary should do.
#[derive(Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// Chat on stdin and print the ads served after each assistant reply
    #[default]
    Chat,
    /// Run the development ad server
    MockServer {
        /// Port to listen on
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub ads: ProviderSettings,
    pub mock_server: MockServerConfig,
    #[serde(skip)]
    pub command: Command,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MockServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("ads.publisher_token", "demo-publisher")?
            .set_default("ads.user_id", "demo-user")?
            .set_default("ads.conversation_id", uuid::Uuid::new_v4().to_string())?
            .set_default("ads.ad_server_url", DEFAULT_AD_SERVER_URL)?
            .set_default("mock_server.host", "127.0.0.1")?
            .set_default("mock_server.port", 8787)?;

        // Explicit file must exist; ./kontext.{yaml,toml,json} is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("kontext").required(false)),
        };

        // E.g. KONTEXT_ADS__THEME=dark, KONTEXT_ADS__ENABLED_PLACEMENT_CODES=inlineAd,banner
        builder = builder.add_source(
            Environment::with_prefix("KONTEXT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ads.enabled_placement_codes"),
        );

        if let Some(url) = &cli.ad_server_url {
            builder = builder.set_override("ads.ad_server_url", url.as_str())?;
        }
        if let Some(token) = &cli.publisher_token {
            builder = builder.set_override("ads.publisher_token", token.as_str())?;
        }
        if let Some(theme) = &cli.theme {
            builder = builder.set_override("ads.theme", theme.as_str())?;
        }
        if let Some(disabled) = cli.disabled {
            builder = builder.set_override("ads.is_disabled", disabled)?;
        }
        if let Some(Command::MockServer { port: Some(port) }) = &cli.command {
            builder = builder.set_override("mock_server.port", i64::from(*port))?;
        }

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.command = cli.command.unwrap_or_default();
        Ok(cfg)
    }
}
