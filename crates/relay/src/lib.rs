//! Relay pipeline: turn inbound workspace events into messages posted to the
//! aggregate channels.
//!
//! - [`markup`]: mention and broadcast-tag rewriting
//! - [`permalink`]: message coordinates to links
//! - [`event`]: the closed set of events the pipeline understands
//! - [`delivery`]: outbound posting with rate-limit retry
//! - [`pipeline`]: per-event orchestration

pub mod delivery;
pub mod error;
pub mod event;
pub mod markup;
pub mod permalink;
pub mod pipeline;

pub use {
    delivery::{Delivery, MessagePoster, PostRequest, PostedMessage},
    error::{Error, Result},
    event::{ChangedMessage, InboundEvent, MessageEvent, MessageSubtype},
    pipeline::{EventSink, Outcome, RelayPipeline, RelaySink, SkipReason},
};
