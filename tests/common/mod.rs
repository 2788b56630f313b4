//! Shared test fixtures.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use kontext_ads::{
    AdDisplayPosition, AdServerClient, AdsProvider, Bid, ErrorReport, PreloadRequest,
    PreloadResponse, ProviderSettings, TransportError,
};

type Outcome = Result<PreloadResponse, TransportError>;

/// An ad server whose preload answers are released by the test.
///
/// Each `preload` call parks on its own gate until [`ScriptedClient::release`]
/// is called with that call's index.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    requests: Mutex<Vec<PreloadRequest>>,
    gates: Mutex<Vec<Option<oneshot::Sender<Outcome>>>>,
    reports: Mutex<Vec<ErrorReport>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> PreloadRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }

    /// Answer the `index`-th preload call.
    pub fn release(&self, index: usize, outcome: Outcome) {
        let gate = self.gates.lock().unwrap()[index]
            .take()
            .expect("preload call already released");
        let _ = gate.send(outcome);
    }

    /// Wait until at least `n` preload calls have been issued.
    pub async fn wait_for_calls(&self, n: usize) {
        until(|| self.calls() >= n).await;
    }

    /// Wait until at least `n` diagnostics have been uploaded.
    pub async fn wait_for_reports(&self, n: usize) {
        until(|| self.reports.lock().unwrap().len() >= n).await;
    }
}

#[async_trait]
impl AdServerClient for ScriptedClient {
    async fn preload(&self, request: &PreloadRequest) -> Result<PreloadResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        {
            // Register the gate before the request so `wait_for_calls` implies
            // the gate exists.
            self.gates.lock().unwrap().push(Some(tx));
            self.requests.lock().unwrap().push(request.clone());
        }
        rx.await.unwrap_or(Err(TransportError::BadStatus(599)))
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<(), TransportError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Poll `condition`, letting spawned tasks run in between.
pub async fn until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Give detached tasks a chance to run.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn settings() -> ProviderSettings {
    ProviderSettings::new("pub-token", "user-1", "conv-1", vec!["inlineAd".to_string()])
        .with_ad_server_url("https://server.megabrain.co")
        .with_preload_wait(Duration::from_secs(5))
}

pub fn provider(client: &Arc<ScriptedClient>) -> AdsProvider {
    provider_with(client, settings())
}

pub fn provider_with(client: &Arc<ScriptedClient>, settings: ProviderSettings) -> AdsProvider {
    let client = Arc::clone(client);
    let client: Arc<dyn AdServerClient> = client;
    AdsProvider::with_client(settings, client).expect("provider")
}

pub fn bids(session_id: &str, bid_ids: &[&str]) -> PreloadResponse {
    PreloadResponse {
        session_id: Some(session_id.to_string()),
        bids: bid_ids
            .iter()
            .map(|id| Bid {
                bid_id: (*id).to_string(),
                code: "inlineAd".to_string(),
                display_position: AdDisplayPosition::AfterAssistantMessage,
            })
            .collect(),
        remote_log_level: None,
        preload_timeout: None,
    }
}

/// In-memory sink for a thread-local `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture log output on the current thread until the guard is dropped.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
