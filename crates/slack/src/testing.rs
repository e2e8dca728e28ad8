//! In-process stand-in for the Slack Web API.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, HeaderValue, StatusCode, Uri, header::RETRY_AFTER},
        response::{IntoResponse, Response},
        routing::any,
    },
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::sync::oneshot,
};

use crate::web::SlackWebClient;

#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub query: HashMap<String, String>,
    pub authorization: String,
    pub body: Value,
}

#[derive(Clone, Default)]
pub(crate) struct MockSlackApi {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    /// Answers keyed by API method; a missing entry answers `ok: false`.
    responses: Arc<HashMap<&'static str, Value>>,
    rate_limited: Arc<Mutex<Option<&'static str>>>,
}

impl MockSlackApi {
    /// Answer the next call to `method` with a 429 and `Retry-After: 7`.
    pub(crate) fn rate_limit_once(self, method: &'static str) -> Self {
        *self
            .rate_limited
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(method);
        self
    }
}

pub(crate) fn mock(responses: Vec<(&'static str, Value)>) -> MockSlackApi {
    MockSlackApi {
        responses: Arc::new(responses.into_iter().collect()),
        ..MockSlackApi::default()
    }
}

async fn slack_api_handler(
    State(state): State<MockSlackApi>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let method = uri.path().trim_start_matches('/').to_string();
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(CapturedRequest {
            method: method.clone(),
            query,
            authorization,
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });

    let limited = {
        let mut pending = state.rate_limited.lock().unwrap_or_else(|e| e.into_inner());
        if pending.is_some_and(|m| m == method) {
            pending.take();
            true
        } else {
            false
        }
    };
    if limited {
        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("7"));
        return response;
    }

    match state.responses.get(method.as_str()) {
        Some(answer) => Json(answer.clone()).into_response(),
        None => Json(json!({"ok": false, "error": "unknown_method"})).into_response(),
    }
}

/// Mock server bound to an ephemeral local port; shut down on drop.
pub(crate) struct MockServer {
    pub addr: SocketAddr,
    state: MockSlackApi,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub(crate) async fn start(state: MockSlackApi) -> Self {
        let app = Router::new()
            .route("/{*path}", any(slack_api_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind test listener: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("local addr: {e}"));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub(crate) fn client(&self) -> SlackWebClient {
        SlackWebClient::new(
            Secret::new("xoxb-test".to_string()),
            format!("http://{}/", self.addr),
        )
    }

    pub(crate) fn requests(&self) -> Vec<CapturedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
