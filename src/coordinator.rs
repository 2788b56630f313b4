//! Preload coordination.
//!
//! The coordinator owns at most one authoritative fetch of bids for the
//! current conversation state and answers "what ads are ready to show" for
//! an assistant turn, possibly before that fetch has finished.
//!
//! # Fetch identity
//!
//! Every [`PreloadCoordinator::start_preload`] bumps a generation counter. A
//! fetch result is applied only if its generation is still the active one and
//! the handle is still pending. Superseded fetches are not aborted at the
//! transport level; their results are dropped on arrival.
//!
//! # Waiting
//!
//! At most one waiter is registered at a time. A waiter is resolved exactly
//! once by whichever comes first: the active fetch completing, the deadline
//! elapsing, a newer waiter replacing it, or a newer fetch superseding the
//! one it waited on. All state lives behind one mutex, so the first writer
//! to take the waiter out of its slot is the one that resolves it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::builder::AdConfigBuilder;
use crate::diagnostics::DiagnosticReporter;
use crate::error::TransportError;
use crate::model::{AdConfig, ChatMessage, PreloadRequest, PreloadResponse};
use crate::transport::AdServerClient;

/// Default time an assistant turn waits for an outstanding preload.
pub const DEFAULT_PRELOAD_WAIT: Duration = Duration::from_secs(5);

/// What happens when a waiter registers while another is still waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaiterPolicy {
    /// The new waiter replaces the old one, which resolves with no ads.
    #[default]
    LastWins,
    /// The old waiter keeps its slot; the new one resolves with no ads.
    FirstWins,
}

/// Lifecycle of a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Request issued, no outcome yet.
    Pending,
    /// Response stored.
    Resolved,
    /// Request failed; waiters got no ads.
    Failed,
    /// Superseded by a newer fetch; its outcome is ignored.
    Cancelled,
}

/// One fetch attempt.
#[derive(Debug, Clone, Copy)]
struct FetchHandle {
    generation: u64,
    status: FetchStatus,
}

impl FetchHandle {
    fn pending(generation: u64) -> Self {
        Self {
            generation,
            status: FetchStatus::Pending,
        }
    }

    fn is_pending(&self) -> bool {
        self.status == FetchStatus::Pending
    }

    /// Move out of `Pending`. No-op from any other state.
    fn transition(&mut self, to: FetchStatus) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = to;
        true
    }
}

#[derive(Debug)]
struct Waiter {
    ticket: u64,
    conversation: Vec<ChatMessage>,
    tx: oneshot::Sender<Vec<AdConfig>>,
}

impl Waiter {
    fn resolve(self, configs: Vec<AdConfig>) {
        // The receiver is gone if the caller already timed out.
        let _ = self.tx.send(configs);
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    generation: u64,
    active: Option<FetchHandle>,
    response: Option<Arc<PreloadResponse>>,
    waiter: Option<Waiter>,
    next_ticket: u64,
    session_id: Option<String>,
}

#[derive(Debug)]
struct CoordinatorInner {
    client: Arc<dyn AdServerClient>,
    builder: AdConfigBuilder,
    reporter: DiagnosticReporter,
    runtime: Handle,
    policy: WaiterPolicy,
    state: Mutex<CoordinatorState>,
}

/// Coordinates preload fetches against an advancing conversation.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Debug, Clone)]
pub struct PreloadCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl PreloadCoordinator {
    /// Create a coordinator that runs fetches on `runtime`.
    #[must_use]
    pub fn new(
        client: Arc<dyn AdServerClient>,
        builder: AdConfigBuilder,
        reporter: DiagnosticReporter,
        runtime: Handle,
        policy: WaiterPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                builder,
                reporter,
                runtime,
                policy,
                state: Mutex::new(CoordinatorState::default()),
            }),
        }
    }

    /// Supersede any previous fetch and start a new one for `request`.
    ///
    /// Clears the stored response, resolves a registered waiter with no ads,
    /// and returns the generation of the new fetch.
    pub fn start_preload(&self, request: PreloadRequest) -> u64 {
        let (generation, superseded) = {
            let mut state = self.inner.lock();
            state.generation += 1;
            let generation = state.generation;

            let superseded = state.active.take().and_then(|mut handle| {
                handle
                    .transition(FetchStatus::Cancelled)
                    .then_some(handle.generation)
            });
            state.response = None;
            if let Some(waiter) = state.waiter.take() {
                waiter.resolve(Vec::new());
            }
            state.active = Some(FetchHandle::pending(generation));
            (generation, superseded)
        };

        tracing::info!(
            name: "preload.started",
            generation,
            superseded = ?superseded,
            message_count = request.messages.len(),
            "Preload started"
        );

        let inner = Arc::clone(&self.inner);
        drop(self.inner.runtime.spawn(async move {
            let outcome = inner.client.preload(&request).await;
            inner.complete(generation, outcome, request);
        }));

        generation
    }

    /// Configs for the stored response, if one has resolved.
    ///
    /// Never suspends.
    #[must_use]
    pub fn ready_configs(&self, conversation: &[ChatMessage]) -> Option<Vec<AdConfig>> {
        let response = self.inner.lock().response.clone()?;
        Some(self.inner.build(&response, conversation))
    }

    /// Wait up to `deadline` for the active fetch and build configs from it.
    ///
    /// Returns at once when a response is already stored, or when there is no
    /// pending fetch to wait on. Failure, timeout and displacement by another
    /// waiter all yield an empty result.
    pub async fn await_readiness(
        &self,
        conversation: Vec<ChatMessage>,
        deadline: Duration,
    ) -> Vec<AdConfig> {
        let (ticket, mut rx) = {
            let mut state = self.inner.lock();
            if let Some(response) = state.response.clone() {
                drop(state);
                return self.inner.build(&response, &conversation);
            }
            if !state.active.as_ref().is_some_and(FetchHandle::is_pending) {
                tracing::debug!("No preload in flight");
                return Vec::new();
            }
            if state.waiter.is_some() && self.inner.policy == WaiterPolicy::FirstWins {
                tracing::debug!("Another turn is already waiting for ads");
                return Vec::new();
            }

            state.next_ticket += 1;
            let ticket = state.next_ticket;
            let (tx, rx) = oneshot::channel();
            let waiter = Waiter {
                ticket,
                conversation,
                tx,
            };
            if let Some(previous) = state.waiter.replace(waiter) {
                tracing::debug!(ticket = previous.ticket, "Waiter displaced");
                previous.resolve(Vec::new());
            }
            (ticket, rx)
        };

        match tokio::time::timeout(deadline, &mut rx).await {
            Ok(Ok(configs)) => configs,
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                {
                    let mut state = self.inner.lock();
                    if state.waiter.as_ref().is_some_and(|w| w.ticket == ticket) {
                        state.waiter = None;
                    }
                }
                // A completion that took the waiter before we did still wins.
                match rx.try_recv() {
                    Ok(configs) => configs,
                    Err(_) => {
                        tracing::info!(
                            name: "preload.wait_timeout",
                            ticket,
                            deadline_ms = deadline.as_millis(),
                            "Timed out waiting for preload"
                        );
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Generation of the most recently started fetch (0 before the first).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Status of the active fetch, if any has been started.
    #[must_use]
    pub fn status(&self) -> Option<FetchStatus> {
        self.inner.lock().active.map(|h| h.status)
    }

    /// The stored response, if the active fetch has resolved.
    #[must_use]
    pub fn response(&self) -> Option<Arc<PreloadResponse>> {
        self.inner.lock().response.clone()
    }

    /// Ad session id learned from the latest authoritative response.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    /// Diagnostic reporter shared with this coordinator.
    #[must_use]
    pub fn reporter(&self) -> &DiagnosticReporter {
        &self.inner.reporter
    }
}

impl CoordinatorInner {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build(&self, response: &PreloadResponse, conversation: &[ChatMessage]) -> Vec<AdConfig> {
        if conversation.is_empty() {
            let _ = self
                .reporter
                .report("ERROR ad config requested without messages", None);
            return Vec::new();
        }
        self.builder.build(response, conversation)
    }

    /// Apply a fetch outcome if `generation` is still the active pending fetch.
    fn complete(
        &self,
        generation: u64,
        outcome: Result<PreloadResponse, TransportError>,
        request: PreloadRequest,
    ) {
        let mut state = self.lock();
        let authoritative = state
            .active
            .as_ref()
            .is_some_and(|h| h.generation == generation && h.is_pending());
        if !authoritative {
            drop(state);
            tracing::debug!(
                generation,
                succeeded = outcome.is_ok(),
                "Discarding result of superseded preload"
            );
            return;
        }

        match outcome {
            Ok(response) => {
                if let Some(handle) = state.active.as_mut() {
                    handle.transition(FetchStatus::Resolved);
                }
                if response.session_id.is_some() {
                    state.session_id.clone_from(&response.session_id);
                }
                let response = Arc::new(response);
                state.response = Some(Arc::clone(&response));
                let waiter = state.waiter.take();
                drop(state);

                if let Some(level) = response.log_level() {
                    self.reporter.set_remote_level(level);
                }
                tracing::info!(
                    name: "preload.resolved",
                    generation,
                    bid_count = response.bids.len(),
                    waiting = waiter.is_some(),
                    "Preload resolved"
                );

                if let Some(waiter) = waiter {
                    let configs = self.build(&response, &waiter.conversation);
                    waiter.resolve(configs);
                }
            }
            Err(e) => {
                if let Some(handle) = state.active.as_mut() {
                    handle.transition(FetchStatus::Failed);
                }
                let waiter = state.waiter.take();
                drop(state);

                if let Some(waiter) = waiter {
                    waiter.resolve(Vec::new());
                }
                let _ = self
                    .reporter
                    .report(&format!("ERROR preloading ads: {e}"), Some(request));
            }
        }
    }
}
