//! Kontext Ads demo binary.
//!
//! `chat` drives an [`AdsProvider`] from stdin; `mock-server` runs the
//! development ad server.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::match_same_arms)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use kontext_ads::config::{AppConfig, Command, MockServerConfig};
use kontext_ads::mock_server::{self, MockServerState};
use kontext_ads::{AdsProvider, ChatMessage, telemetry};

#[tokio::main]
async fn main() {
    // Load .env (if present)
    let _ = dotenv();

    telemetry::init();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let result = match config.command.clone() {
        Command::Chat => run_chat(config).await,
        Command::MockServer { .. } => run_mock_server(&config.mock_server).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_chat(config: AppConfig) -> anyhow::Result<()> {
    let ads = AdsProvider::new(config.ads)?;
    info!(
        name: "chat.started",
        disabled = ads.is_disabled(),
        server = %ads.settings().ad_server_url,
        "Type a message per line; ads are printed as JSON"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        ads.on_user_message(ChatMessage::user(line));

        let reply = format!("You said: {line}");
        println!("assistant: {reply}");
        for ad in ads.on_assistant_message(ChatMessage::assistant(reply)).await {
            println!("{}", serde_json::to_string(&ad)?);
        }
    }
    Ok(())
}

async fn run_mock_server(settings: &MockServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    info!(
        name: "server.started",
        address = %listener.local_addr()?,
        "Mock ad server listening"
    );
    mock_server::serve(listener, MockServerState::new()).await?;
    Ok(())
}
