//! Data shapes exchanged with the ad server and the embedded ad frame.
//!
//! All types serialize with camelCase field names, matching the ad server's
//! JSON API.
//!
//! - [`message`]: conversation messages and host-side presentation settings
//! - [`preload`]: the `/preload` request and response, bids
//! - [`ad`]: renderable ad configurations
//! - [`report`]: diagnostic payloads sent to `/error`

pub mod ad;
pub mod message;
pub mod preload;
pub mod report;

pub use ad::AdConfig;
pub use message::{Character, ChatMessage, Role, Theme};
pub use preload::{AdDisplayPosition, Bid, PreloadRequest, PreloadResponse, RemoteLogLevel};
pub use report::{AdditionalData, ErrorReport};
