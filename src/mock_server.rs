//! Development ad server.
//!
//! Implements the endpoints the SDK talks to with canned behaviour, so hosts
//! can exercise ad delivery locally and tests can drive the real HTTP
//! transport. Not a model of the production auction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::model::{AdDisplayPosition, Bid, ErrorReport, PreloadRequest, PreloadResponse};

/// Placement served when a request names none.
const DEFAULT_PLACEMENT: &str = "inlineAd";

/// How `/preload` answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PreloadMode {
    /// One bid per enabled placement code.
    #[default]
    Bids,
    /// Fail with the given status.
    Status(u16),
    /// 200 with a body that is not a preload response.
    Garbage,
}

#[derive(Debug, Default)]
struct MockInner {
    mode: Mutex<PreloadMode>,
    delay: Mutex<Duration>,
    preloads: AtomicUsize,
    requests: Mutex<Vec<PreloadRequest>>,
    reports: Mutex<Vec<ErrorReport>>,
}

/// Shared, inspectable state of the development server.
#[derive(Debug, Clone, Default)]
pub struct MockServerState {
    inner: Arc<MockInner>,
}

impl MockServerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: PreloadMode) {
        *self.inner.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// Delay every `/preload` answer.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of `/preload` calls received.
    #[must_use]
    pub fn preload_count(&self) -> usize {
        self.inner.preloads.load(Ordering::SeqCst)
    }

    /// Bodies of all `/preload` calls received.
    #[must_use]
    pub fn requests(&self) -> Vec<PreloadRequest> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Diagnostics received on `/error`.
    #[must_use]
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.inner
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mode(&self) -> PreloadMode {
        self.inner
            .mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn delay(&self) -> Duration {
        *self.inner.delay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the router.
pub fn router(state: MockServerState) -> Router {
    Router::new()
        .route("/preload", post(preload_handler))
        .route("/error", post(error_handler))
        .route("/api/frame/{bid_id}", get(frame_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already bound listener until the task is dropped.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: MockServerState,
) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

async fn preload_handler(
    State(state): State<MockServerState>,
    Json(request): Json<PreloadRequest>,
) -> Response {
    let n = state.inner.preloads.fetch_add(1, Ordering::SeqCst) + 1;
    let codes = if request.enabled_placement_codes.is_empty() {
        vec![DEFAULT_PLACEMENT.to_string()]
    } else {
        request.enabled_placement_codes.clone()
    };
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| format!("mock-session-{}", request.conversation_id));

    tracing::info!(
        name: "mock.preload",
        preload = n,
        message_count = request.messages.len(),
        "Preload received"
    );
    state
        .inner
        .requests
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(request);

    let delay = state.delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match state.mode() {
        PreloadMode::Bids => {
            let bids = codes
                .into_iter()
                .enumerate()
                .map(|(i, code)| Bid {
                    bid_id: format!("bid-{n}-{i}"),
                    code,
                    display_position: AdDisplayPosition::AfterAssistantMessage,
                })
                .collect();
            Json(PreloadResponse {
                session_id: Some(session_id),
                bids,
                remote_log_level: Some("error".to_string()),
                preload_timeout: Some(5000),
            })
            .into_response()
        }
        PreloadMode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "preload failed").into_response()
        }
        PreloadMode::Garbage => (StatusCode::OK, "{\"bids\": 7}").into_response(),
    }
}

async fn error_handler(
    State(state): State<MockServerState>,
    Json(report): Json<ErrorReport>,
) -> StatusCode {
    tracing::info!(name: "mock.error_report", error = %report.error, "Diagnostic received");
    state
        .inner
        .reports
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(report);
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameQuery {
    message_id: Option<String>,
    code: Option<String>,
}

/// Minimal frame that speaks the bridge protocol.
///
/// Request values reach the page only as escaped attribute text or inside a
/// JSON literal.
async fn frame_handler(
    Path(bid_id): Path<String>,
    Query(query): Query<FrameQuery>,
) -> Html<String> {
    let message_id = query.message_id.unwrap_or_default();
    let code = query.code.unwrap_or_default();
    let frame = serde_json::json!({
        "id": &bid_id,
        "messageId": &message_id,
        "code": &code,
    });
    let frame = script_literal(&frame);
    let (bid_attr, code_attr, message_attr) =
        (escape_attr(&bid_id), escape_attr(&code), escape_attr(&message_id));

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<body>
<div id="ad" data-bid="{bid_attr}" data-code="{code_attr}" data-message="{message_attr}">Sponsored</div>
<script>
  const frame = {frame};
  const post = (type, data) => window.parent.postMessage({{ type, data }}, '*');
  window.addEventListener('message', (event) => {{
    if (event.data && event.data.type === 'update-iframe') {{
      post('view-iframe', {{ id: frame.id, content: 'Sponsored', messageId: frame.messageId, url: location.href }});
      post('resize-iframe', {{ height: document.body.scrollHeight }});
    }}
  }});
  document.getElementById('ad').addEventListener('click', () => post('click-iframe', {{ id: frame.id, content: 'Sponsored' }}));
  post('init-iframe');
</script>
</body>
</html>"#
    ))
}

/// JSON text safe to embed in a `<script>` element.
fn script_literal(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr(r#"a"><b>&'"#), "a&quot;&gt;&lt;b&gt;&amp;&#39;");
    }

    #[test]
    fn test_script_literal_cannot_close_the_element() {
        let value = serde_json::json!({ "id": "</script><script>alert(1)</script>" });
        let literal = script_literal(&value);
        assert!(!literal.contains('<'));
        assert!(literal.contains("\\u003c/script\\u003e"));
    }
}
