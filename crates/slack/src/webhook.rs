//! Events API request URL.
//!
//! Every request is authenticated with the signing secret before its body is
//! parsed. Event callbacks are acknowledged with 200 as soon as they are
//! handed to the sink; processing happens on the sink's own tasks.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    aggrechans_relay::EventSink,
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
        response::{IntoResponse, Response},
        routing::post,
    },
    hmac::{Hmac, Mac},
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
    sha2::Sha256,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Result, SignatureError},
    events::decode_callback,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Requests whose timestamp is further than this from our clock are refused.
const MAX_CLOCK_SKEW_SECS: u64 = 60 * 5;

const SIGNATURE_VERSION: &str = "v0";

#[derive(Clone)]
pub struct WebhookState {
    signing_secret: Secret<String>,
    sink: Arc<dyn EventSink>,
}

impl WebhookState {
    pub fn new(signing_secret: Secret<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            signing_secret,
            sink,
        }
    }
}

pub fn webhook_router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, post(events_handler))
        .with_state(state)
}

/// Serve the request URL on `host:port` until `cancel` fires.
pub async fn serve(
    host: &str,
    port: u16,
    path: &str,
    state: WebhookState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, path, "webhook listening");

    axum::serve(listener, webhook_router(path, state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("webhook server stopped");
    Ok(())
}

/// Check `signature` against `v0=hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}"))`.
///
/// `now` is the current unix time in seconds; timestamps more than five
/// minutes away from it are refused even when the signature matches.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: u64,
) -> std::result::Result<(), SignatureError> {
    let sent_at: u64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(sent_at) > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }

    let Some(provided) = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
    else {
        return Err(SignatureError::Mismatch);
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    let computed = hex::encode(mac.finalize().into_bytes());

    if constant_time_eq(&computed, provided) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> std::result::Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

fn authenticate(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<(), SignatureError> {
    let timestamp = header(headers, TIMESTAMP_HEADER)?;
    let signature = header(headers, SIGNATURE_HEADER)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    verify_signature(secret, timestamp, body, signature, now)
}

async fn events_handler(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = authenticate(state.signing_secret.expose_secret(), &headers, &body) {
        warn!(error = %e, "webhook request rejected");
        let status = if e.is_malformed() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::UNAUTHORIZED
        };
        return status.into_response();
    }

    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "unreadable webhook body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        },
    };

    let kind = envelope["type"].as_str().unwrap_or_default().to_string();
    match kind.as_str() {
        "url_verification" => {
            let challenge = envelope["challenge"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            info!("answering url verification challenge");
            ([(CONTENT_TYPE, "text/plain")], challenge).into_response()
        },
        "event_callback" => {
            match decode_callback(envelope) {
                Ok(event) => state.sink.submit(event),
                Err(e) => warn!(error = %e, "undecodable event callback"),
            }
            StatusCode::OK.into_response()
        },
        _ => {
            debug!(kind = %kind, "webhook envelope ignored");
            StatusCode::OK.into_response()
        },
    }
}
