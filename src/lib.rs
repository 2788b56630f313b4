//! Kontext Ads
//!
//! Contextual advertising for conversational apps. The host reports each chat
//! message; the SDK preloads bids from the ad server as the user types and
//! hands back frame configurations to render once the assistant replies.
//!
//! # Architecture
//!
//! - **Provider**: [`AdsProvider`], the façade a host talks to
//! - **Coordinator**: generation-tagged preload fetches and a single bounded waiter
//! - **Transport**: [`AdServerClient`] seam with a `reqwest` implementation
//! - **Bridge**: the `postMessage` protocol spoken by rendered ad frames
//!
//! # Modules
//!
//! - [`model`]: wire types shared with the ad server
//! - [`coordinator`]: preload lifecycle
//! - [`builder`]: bids to frame configurations
//! - [`bridge`]: inline ad frame messages
//! - [`mock_server`]: development ad server

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod bridge;
pub mod builder;
pub mod config;
pub mod conversation;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod mock_server;
pub mod model;
pub mod provider;
pub mod telemetry;
pub mod transport;

pub use builder::AdConfigBuilder;
pub use config::{AppConfig, ProviderSettings};
pub use conversation::Conversation;
pub use coordinator::{FetchStatus, PreloadCoordinator, WaiterPolicy};
pub use diagnostics::DiagnosticReporter;
pub use error::{BridgeError, FrameUrlError, ProviderError, TransportError};
pub use model::{
    AdConfig, AdDisplayPosition, Bid, Character, ChatMessage, ErrorReport, PreloadRequest,
    PreloadResponse, RemoteLogLevel, Role, Theme,
};
pub use provider::AdsProvider;
pub use transport::{AdServerClient, HttpTransport};
