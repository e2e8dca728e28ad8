//! Slack adapter: the Web API client behind the directories and delivery,
//! event payload decoding, and the two inbound transports.
//!
//! - [`web`]: `conversations.*`, `users.*`, `bots.info`, `team.info`,
//!   `chat.postMessage`
//! - [`events`]: Events API payloads to [`InboundEvent`](aggrechans_relay::InboundEvent)
//! - [`socket`]: Socket Mode (outbound WebSocket, no public endpoint)
//! - [`webhook`]: Events API request URL with signature verification

pub mod error;
pub mod events;
pub mod socket;
pub mod web;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    error::{Error, Result, SignatureError},
    events::{decode_callback, decode_event},
    socket::SocketModeClient,
    web::SlackWebClient,
    webhook::{WebhookState, verify_signature, webhook_router},
};
