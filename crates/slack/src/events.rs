//! Events API payload decoding.
//!
//! Both transports receive the same `event_callback` envelope; only the
//! framing around it differs.

use {
    aggrechans_common::ChannelRecord,
    aggrechans_relay::{ChangedMessage, InboundEvent, MessageEvent, MessageSubtype},
    serde::Deserialize,
    serde_json::Value,
};

use crate::{
    error::{Error, Result},
    web::{WireChannel, WireUser},
};

/// Decode an `event_callback` envelope into the event it carries.
pub fn decode_callback(mut envelope: Value) -> Result<InboundEvent> {
    let envelope_type = envelope["type"].as_str().unwrap_or_default();
    if envelope_type != "event_callback" {
        return Err(Error::Message(format!(
            "expected an event_callback envelope, got {envelope_type:?}"
        )));
    }
    let Some(event) = envelope.get_mut("event").map(Value::take) else {
        return Err(Error::Message("event_callback without an event".into()));
    };
    decode_event(event)
}

/// Decode an inner event. Unknown event types become
/// [`InboundEvent::Unsupported`]; a known type with a malformed body is an
/// error.
pub fn decode_event(event: Value) -> Result<InboundEvent> {
    let kind = event["type"].as_str().unwrap_or_default().to_string();
    let decoded = match kind.as_str() {
        "message" => InboundEvent::Message(serde_json::from_value::<WireMessage>(event)?.into()),
        "channel_rename" => {
            InboundEvent::ChannelRename(serde_json::from_value::<ChannelEvent>(event)?.into_record())
        },
        "channel_created" => InboundEvent::ChannelCreated(
            serde_json::from_value::<ChannelEvent>(event)?.into_record(),
        ),
        "channel_unarchive" => InboundEvent::ChannelUnarchive {
            channel: serde_json::from_value::<UnarchiveEvent>(event)?.channel,
        },
        "user_change" => {
            InboundEvent::UserChange(serde_json::from_value::<UserChangeEvent>(event)?.user.into_profile())
        },
        _ => InboundEvent::Unsupported { kind },
    };
    Ok(decoded)
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
    thread_ts: Option<String>,
    #[serde(default)]
    subtype: String,
    message: Option<WireInnerMessage>,
}

#[derive(Deserialize)]
struct WireInnerMessage {
    #[serde(default)]
    text: String,
    #[serde(default)]
    ts: String,
    thread_ts: Option<String>,
    edited: Option<WireEdited>,
}

#[derive(Deserialize)]
struct WireEdited {
    #[serde(default)]
    user: String,
}

impl From<WireMessage> for MessageEvent {
    fn from(wire: WireMessage) -> Self {
        let subtype = MessageSubtype::parse(&wire.subtype);
        let changed = match (&subtype, wire.message) {
            (MessageSubtype::MessageChanged, Some(inner)) => Some(ChangedMessage {
                text: inner.text,
                ts: inner.ts,
                thread_ts: inner.thread_ts,
                editor: inner
                    .edited
                    .map(|edited| edited.user)
                    .filter(|user| !user.is_empty()),
            }),
            _ => None,
        };
        Self {
            channel: wire.channel,
            user: wire.user,
            text: wire.text,
            ts: wire.ts,
            thread_ts: wire.thread_ts,
            subtype,
            changed,
        }
    }
}

#[derive(Deserialize)]
struct ChannelEvent {
    channel: WireChannel,
}

impl ChannelEvent {
    fn into_record(self) -> ChannelRecord {
        self.channel.into_record()
    }
}

#[derive(Deserialize)]
struct UnarchiveEvent {
    channel: String,
}

#[derive(Deserialize)]
struct UserChangeEvent {
    user: WireUser,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        aggrechans_common::UserProfile,
        serde_json::json,
    };

    fn callback(event: Value) -> Value {
        json!({
            "token": "legacy",
            "team_id": "T1",
            "type": "event_callback",
            "event_id": "Ev1",
            "event_time": 1_700_000_000,
            "event": event,
        })
    }

    #[test]
    fn plain_message() {
        let event = decode_callback(callback(json!({
            "type": "message",
            "channel": "C1",
            "user": "U1",
            "text": "hello <@U2>",
            "ts": "1700000000.000100",
            "channel_type": "channel"
        })))
        .unwrap();

        assert_eq!(
            event,
            InboundEvent::Message(MessageEvent {
                channel: "C1".into(),
                user: "U1".into(),
                text: "hello <@U2>".into(),
                ts: "1700000000.000100".into(),
                ..MessageEvent::default()
            })
        );
    }

    #[test]
    fn thread_reply_keeps_thread_ts() {
        let event = decode_event(json!({
            "type": "message",
            "channel": "C1",
            "user": "U1",
            "text": "reply",
            "ts": "2.0",
            "thread_ts": "1.0"
        }))
        .unwrap();
        let InboundEvent::Message(message) = event else {
            panic!("expected a message");
        };
        assert_eq!(message.thread_ts.as_deref(), Some("1.0"));
        assert_eq!(message.subtype, MessageSubtype::Plain);
    }

    #[test]
    fn message_changed_carries_inner_message_and_editor() {
        let event = decode_event(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C1",
            "ts": "3.0",
            "hidden": true,
            "message": {
                "type": "message",
                "user": "U1",
                "text": "fixed typo",
                "ts": "1.0",
                "thread_ts": "0.5",
                "edited": {"user": "U1", "ts": "3.0"}
            },
            "previous_message": {"type": "message", "user": "U1", "text": "fixd typo", "ts": "1.0"}
        }))
        .unwrap();
        let InboundEvent::Message(message) = event else {
            panic!("expected a message");
        };

        assert!(message.user.is_empty());
        assert_eq!(message.subtype, MessageSubtype::MessageChanged);
        assert_eq!(
            message.changed,
            Some(ChangedMessage {
                text: "fixed typo".into(),
                ts: "1.0".into(),
                thread_ts: Some("0.5".into()),
                editor: Some("U1".into()),
            })
        );
    }

    #[test]
    fn message_changed_without_edit_marker_has_no_editor() {
        let event = decode_event(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C1",
            "ts": "3.0",
            "message": {"text": "unfurled", "ts": "1.0"}
        }))
        .unwrap();
        let InboundEvent::Message(message) = event else {
            panic!("expected a message");
        };
        assert_eq!(message.changed.and_then(|c| c.editor), None);
    }

    #[test]
    fn channel_lifecycle_events() {
        let renamed = decode_event(json!({
            "type": "channel_rename",
            "channel": {"id": "C1", "name": "new-name", "created": 1_360_782_804}
        }))
        .unwrap();
        assert_eq!(renamed, InboundEvent::ChannelRename(ChannelRecord::new("C1", "new-name")));

        let created = decode_event(json!({
            "type": "channel_created",
            "channel": {"id": "C2", "name": "fresh", "creator": "U1"}
        }))
        .unwrap();
        assert_eq!(created, InboundEvent::ChannelCreated(ChannelRecord::new("C2", "fresh")));

        let unarchived = decode_event(json!({
            "type": "channel_unarchive",
            "channel": "C3",
            "user": "U1"
        }))
        .unwrap();
        assert_eq!(unarchived, InboundEvent::ChannelUnarchive {
            channel: "C3".into()
        });
    }

    #[test]
    fn user_change_maps_profile() {
        let event = decode_event(json!({
            "type": "user_change",
            "user": {
                "id": "U1",
                "name": "alice2",
                "is_bot": false,
                "is_app_user": false,
                "profile": {"image_72": "https://img/a72.png", "display_name": "Alice"}
            }
        }))
        .unwrap();
        assert_eq!(
            event,
            InboundEvent::UserChange(UserProfile::member(
                "U1",
                "alice2",
                "https://img/a72.png",
                false,
                false
            ))
        );
    }

    #[test]
    fn unknown_event_type_is_unsupported() {
        let event = decode_event(json!({"type": "reaction_added", "reaction": "tada"})).unwrap();
        assert_eq!(event, InboundEvent::Unsupported {
            kind: "reaction_added".into()
        });
    }

    #[test]
    fn malformed_known_event_is_an_error() {
        let err = decode_event(json!({"type": "channel_rename", "channel": "C1"})).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn non_callback_envelope_is_rejected() {
        let err = decode_callback(json!({"type": "url_verification", "challenge": "x"})).unwrap_err();
        assert!(matches!(err, Error::Message(_)));
    }
}
