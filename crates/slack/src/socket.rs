//! Socket Mode transport.
//!
//! Opens a session URL with the app-level token, then reads envelopes off the
//! WebSocket. Every envelope is acknowledged before it is looked at; the
//! platform redelivers anything left unacknowledged for a few seconds.

use std::{sync::Arc, time::Duration};

use {
    aggrechans_common::retry::millis,
    aggrechans_relay::{EventSink, InboundEvent},
    futures::{SinkExt, StreamExt},
    secrecy::Secret,
    serde::Deserialize,
    serde_json::{Value, json},
    tokio_tungstenite::tungstenite::Message as WsMessage,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{error::Result, events::decode_callback, web::SlackWebClient};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The platform asked us to reconnect (connection rotation).
    Disconnect,
    /// The socket closed on its own.
    Closed,
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    envelope_id: Option<String>,
    payload: Option<Value>,
    reason: Option<String>,
}

/// What one text frame asks the session to do, after acknowledgement.
#[derive(Debug, PartialEq)]
enum FrameAction {
    Deliver(InboundEvent),
    Reconnect { reason: String },
    Ignore { kind: String },
}

impl Envelope {
    fn into_action(self) -> Result<FrameAction> {
        match self.kind.as_str() {
            "events_api" => {
                let payload = self.payload.unwrap_or_default();
                Ok(FrameAction::Deliver(decode_callback(payload)?))
            },
            "disconnect" => Ok(FrameAction::Reconnect {
                reason: self.reason.unwrap_or_default(),
            }),
            _ => Ok(FrameAction::Ignore { kind: self.kind }),
        }
    }
}

pub struct SocketModeClient {
    web: SlackWebClient,
    app_token: Secret<String>,
    sink: Arc<dyn EventSink>,
    initial_delay: Duration,
}

impl SocketModeClient {
    pub fn new(web: SlackWebClient, app_token: Secret<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            web,
            app_token,
            sink,
            initial_delay: INITIAL_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Keep a session open until `cancel` fires, reconnecting after
    /// disconnect requests and failures. Failed attempts back off
    /// exponentially up to a minute.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut delay = self.initial_delay;

        loop {
            match self.run_session(&cancel).await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Disconnect) => {
                    delay = self.initial_delay;
                    continue;
                },
                Ok(SessionEnd::Closed) => {
                    info!("socket mode connection closed, reconnecting");
                    delay = self.initial_delay;
                },
                Err(e) => {
                    warn!(error = %e, retry_in_ms = millis(delay), "socket mode session failed");
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {},
            }
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
        }

        info!("socket mode stopped");
    }

    async fn run_session(&self, cancel: &CancellationToken) -> Result<SessionEnd> {
        let url = self.web.open_connection(&self.app_token).await?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!("socket mode connected");

        let (mut write, mut read) = stream.split();

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                },
                frame = read.next() => frame,
            };

            let text = match frame {
                None | Some(Ok(WsMessage::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(WsMessage::Text(text))) => text,
                Some(Ok(_)) => continue,
            };

            let envelope: Envelope = match serde_json::from_str(text.as_str()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "unreadable socket mode frame");
                    continue;
                },
            };

            if let Some(envelope_id) = &envelope.envelope_id {
                let ack = json!({ "envelope_id": envelope_id });
                write.send(WsMessage::Text(ack.to_string().into())).await?;
            }

            match envelope.into_action() {
                Ok(FrameAction::Deliver(event)) => self.sink.submit(event),
                Ok(FrameAction::Reconnect { reason }) => {
                    info!(reason = %reason, "slack requested disconnect, reconnecting");
                    return Ok(SessionEnd::Disconnect);
                },
                Ok(FrameAction::Ignore { kind }) => debug!(kind = %kind, "socket mode frame ignored"),
                Err(e) => warn!(error = %e, "undecodable events_api payload"),
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        super::*,
        crate::testing::{MockServer, mock},
        rstest::rstest,
        tokio::{net::TcpListener, sync::oneshot},
    };

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<InboundEvent>>,
    }

    impl EventSink for RecordingSink {
        fn submit(&self, event: InboundEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn events_api(envelope_id: &str, event: Value) -> Value {
        json!({
            "envelope_id": envelope_id,
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": {"type": "event_callback", "event": event}
        })
    }

    #[rstest]
    #[case(json!({"type": "hello", "num_connections": 1}), FrameAction::Ignore { kind: "hello".into() })]
    #[case(
        json!({"type": "disconnect", "reason": "refresh_requested"}),
        FrameAction::Reconnect { reason: "refresh_requested".into() }
    )]
    #[case(
        json!({"type": "slash_commands", "envelope_id": "e1", "payload": {}}),
        FrameAction::Ignore { kind: "slash_commands".into() }
    )]
    #[case(
        events_api("e2", json!({"type": "channel_unarchive", "channel": "C9"})),
        FrameAction::Deliver(InboundEvent::ChannelUnarchive { channel: "C9".into() })
    )]
    fn frame_actions(#[case] frame: Value, #[case] expected: FrameAction) {
        let envelope: Envelope = serde_json::from_value(frame).unwrap();
        assert_eq!(envelope.into_action().unwrap(), expected);
    }

    #[test]
    fn events_api_with_bad_payload_is_an_error() {
        let envelope: Envelope = serde_json::from_value(json!({
            "type": "events_api",
            "envelope_id": "e3",
            "payload": {"type": "url_verification"}
        }))
        .unwrap();
        assert!(envelope.into_action().is_err());
    }

    #[tokio::test]
    async fn acknowledges_and_delivers_events_until_cancelled() {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = ws_listener.local_addr().unwrap();
        let (ack_tx, ack_rx) = oneshot::channel::<String>();

        tokio::spawn(async move {
            let (tcp, _) = ws_listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(WsMessage::Text(
                json!({"type": "hello", "num_connections": 1}).to_string().into(),
            ))
            .await
            .unwrap();
            let envelope = events_api(
                "env-1",
                json!({"type": "message", "channel": "C1", "user": "U1", "text": "hi", "ts": "1.0"}),
            );
            ws.send(WsMessage::Text(envelope.to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(frame)) = ws.next().await {
                if let WsMessage::Text(text) = frame {
                    let _ = ack_tx.send(text.to_string());
                    break;
                }
            }
            // Hold the socket open until the client closes it.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let server = MockServer::start(mock(vec![(
            "apps.connections.open",
            json!({"ok": true, "url": format!("ws://{ws_addr}/link")}),
        )]))
        .await;
        let sink = Arc::new(RecordingSink::default());
        let client = SocketModeClient::new(
            server.client(),
            Secret::new("xapp-test".to_string()),
            sink.clone(),
        )
        .with_reconnect_delay(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        let ack = tokio::time::timeout(Duration::from_secs(5), ack_rx)
            .await
            .expect("ack in time")
            .unwrap();
        let ack: Value = serde_json::from_str(&ack).unwrap();
        assert_eq!(ack, json!({"envelope_id": "env-1"}));

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.events.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event delivered");
        let events = sink.events.lock().unwrap().clone();
        assert!(matches!(&events[0], InboundEvent::Message(m) if m.text == "hi" && m.user == "U1"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run stops on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn failed_open_retries_until_cancelled() {
        let server = MockServer::start(mock(Vec::new())).await;
        let client = SocketModeClient::new(
            server.client(),
            Secret::new("xapp-test".to_string()),
            Arc::new(RecordingSink::default()),
        )
        .with_reconnect_delay(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { client.run(cancel).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.requests().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("open retried");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run stops on cancel")
            .unwrap();
        assert!(
            server
                .requests()
                .iter()
                .all(|r| r.method == "apps.connections.open")
        );
    }
}
