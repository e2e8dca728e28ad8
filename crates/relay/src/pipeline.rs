use std::sync::Arc;

use {
    aggrechans_directory::{ChannelDirectory, UserDirectory},
    aggrechans_routing::Dispatcher,
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::{
    delivery::{Delivery, PostRequest},
    error::{Error, Result},
    event::{InboundEvent, MessageEvent, MessageSubtype},
    markup::{escape_broadcast_tags, replace_mentions},
    permalink::{build_permalink, format_message_link, is_thread_reply},
};

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Relayed { destination: String, ts: String },
    Skipped(SkipReason),
    /// A directory absorbed a rename, create, unarchive or user change.
    DirectoryUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BotMessage,
    IgnoredSubtype(String),
    /// System message without an author.
    NoAuthor,
    AutomatedAuthor { user_id: String },
    NotRouted { channel_name: String },
    Unsupported { kind: String },
}

/// The parts of a message event that survive subtype filtering.
struct Relayable<'a> {
    author: &'a str,
    text: &'a str,
    ts: &'a str,
    thread_ts: Option<&'a str>,
}

impl<'a> Relayable<'a> {
    fn classify(message: &'a MessageEvent) -> std::result::Result<Self, SkipReason> {
        let mut relayable = Self {
            author: &message.user,
            text: &message.text,
            ts: &message.ts,
            thread_ts: message.thread_ts.as_deref(),
        };

        match &message.subtype {
            MessageSubtype::BotMessage => return Err(SkipReason::BotMessage),
            MessageSubtype::MessageChanged => {
                if let Some(changed) = &message.changed {
                    relayable.text = &changed.text;
                    if !changed.ts.is_empty() {
                        relayable.ts = &changed.ts;
                    }
                    relayable.thread_ts = changed.thread_ts.as_deref();
                    if let Some(editor) = &changed.editor {
                        relayable.author = editor;
                    }
                }
            },
            MessageSubtype::FileShare
            | MessageSubtype::ChannelTopic
            | MessageSubtype::ChannelPurpose
            | MessageSubtype::Plain => {},
            MessageSubtype::ThreadBroadcast | MessageSubtype::Other(_) => {
                return Err(SkipReason::IgnoredSubtype(
                    message.subtype.as_str().to_string(),
                ));
            },
        }

        if relayable.author.is_empty() {
            return Err(SkipReason::NoAuthor);
        }
        Ok(relayable)
    }
}

/// Per-event orchestration: filter, resolve, route, rewrite, deliver.
///
/// Holds no per-event state; one instance serves every concurrent task.
pub struct RelayPipeline {
    channels: Arc<ChannelDirectory>,
    users: Arc<UserDirectory>,
    dispatcher: Arc<Dispatcher>,
    delivery: Delivery,
    workspace_domain: String,
}

impl RelayPipeline {
    pub fn new(
        channels: Arc<ChannelDirectory>,
        users: Arc<UserDirectory>,
        dispatcher: Arc<Dispatcher>,
        delivery: Delivery,
        workspace_domain: impl Into<String>,
    ) -> Self {
        Self {
            channels,
            users,
            dispatcher,
            delivery,
            workspace_domain: workspace_domain.into(),
        }
    }

    pub async fn handle(&self, event: InboundEvent, cancel: &CancellationToken) -> Result<Outcome> {
        match event {
            InboundEvent::Message(message) => self.relay_message(&message, cancel).await,
            InboundEvent::ChannelRename(record) => {
                self.channels.apply_rename(&record).await;
                Ok(Outcome::DirectoryUpdated)
            },
            InboundEvent::ChannelCreated(record) => {
                self.channels.apply_create(&record).await;
                Ok(Outcome::DirectoryUpdated)
            },
            InboundEvent::ChannelUnarchive { channel } => {
                let name = self.channels.resolve_name(&channel).await?;
                info!(channel_id = %channel, channel_name = %name, "channel unarchived");
                Ok(Outcome::DirectoryUpdated)
            },
            InboundEvent::UserChange(profile) => {
                self.users.apply_user_change(&profile).await;
                Ok(Outcome::DirectoryUpdated)
            },
            InboundEvent::Unsupported { kind } => {
                info!(kind = %kind, "unsupported event received");
                Ok(Outcome::Skipped(SkipReason::Unsupported { kind }))
            },
        }
    }

    async fn relay_message(&self, message: &MessageEvent, cancel: &CancellationToken) -> Result<Outcome> {
        let relayable = match Relayable::classify(message) {
            Ok(relayable) => relayable,
            Err(reason) => {
                if let SkipReason::IgnoredSubtype(subtype) = &reason {
                    info!(subtype = %subtype, channel_id = %message.channel, "ignoring message subtype");
                }
                return Ok(Outcome::Skipped(reason));
            },
        };

        let profile = self.users.resolve_profile(relayable.author).await?;
        if profile.is_automated() {
            return Ok(Outcome::Skipped(SkipReason::AutomatedAuthor {
                user_id: relayable.author.to_string(),
            }));
        }

        let channel_name = self.channels.resolve_name(&message.channel).await?;
        let Some(destination) = self.dispatcher.dispatch(&channel_name) else {
            debug!(channel_name = %channel_name, "channel not routed");
            return Ok(Outcome::Skipped(SkipReason::NotRouted { channel_name }));
        };

        let permalink = build_permalink(
            &self.workspace_domain,
            &message.channel,
            relayable.ts,
            relayable.thread_ts,
            &message.subtype,
        );
        let link = format_message_link(
            &permalink,
            &channel_name,
            is_thread_reply(relayable.ts, relayable.thread_ts, &message.subtype),
        );

        let (body, unfurl_disabled) = if message.subtype == MessageSubtype::FileShare {
            (String::new(), false)
        } else {
            let replaced = replace_mentions(relayable.text, self.users.as_ref()).await?;
            (escape_broadcast_tags(&replaced), true)
        };

        let request = PostRequest {
            channel: destination.to_string(),
            sender: profile.sender(),
            text: format!("{link} {body}"),
            blocks: Vec::new(),
            unfurl_disabled,
        };
        let posted = self.delivery.post(cancel, &request).await?;

        info!(
            source = %channel_name,
            destination = %request.channel,
            author = %profile.display_name,
            "message relayed"
        );
        Ok(Outcome::Relayed {
            destination: request.channel,
            ts: posted.ts,
        })
    }

    /// [`handle`](Self::handle) with the outcome logged. Failures never
    /// escape: the event is dropped.
    pub async fn process(&self, event: InboundEvent, cancel: &CancellationToken) {
        let kind = event.kind().to_string();
        match self.handle(event, cancel).await {
            Ok(Outcome::Skipped(reason)) => debug!(kind = %kind, ?reason, "event skipped"),
            Ok(_) => {},
            Err(Error::Cancelled) => debug!(kind = %kind, "event cancelled"),
            Err(e) => warn!(kind = %kind, error = %e, "event dropped"),
        }
    }
}

/// Hand-off point between a transport and the pipeline.
///
/// `submit` must return quickly: transports acknowledge the platform
/// independently of how processing turns out.
pub trait EventSink: Send + Sync {
    fn submit(&self, event: InboundEvent);
}

/// Runs every submitted event on its own task with a child of the shutdown
/// token, so cancelling the root stops in-flight delivery waits.
///
/// Clones share the same task set; [`drain`](Self::drain) waits for all of
/// them.
#[derive(Clone)]
pub struct RelaySink {
    pipeline: Arc<RelayPipeline>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl RelaySink {
    pub fn new(pipeline: Arc<RelayPipeline>, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            shutdown,
            tasks: TaskTracker::new(),
        }
    }

    /// Wait for every in-flight event task to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            info!(tasks = self.tasks.len(), "waiting for in-flight events");
        }
        self.tasks.wait().await;
    }
}

impl EventSink for RelaySink {
    fn submit(&self, event: InboundEvent) {
        if self.shutdown.is_cancelled() {
            debug!(kind = %event.kind(), "shutting down, event not processed");
            return;
        }
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.shutdown.child_token();
        self.tasks.spawn(async move {
            pipeline.process(event, &cancel).await;
        });
    }
}
