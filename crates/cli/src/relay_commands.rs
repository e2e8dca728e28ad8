//! `aggrechans run`: load configuration, warm the identity directories and
//! serve the selected transport until interrupted.

use std::{path::Path, sync::Arc};

use {
    aggrechans_common::RetryPolicy,
    aggrechans_config::{Severity, StoreConfig, Transport},
    aggrechans_directory::{ChannelDirectory, DurableTier, RedisStore, UserDirectory},
    aggrechans_relay::{Delivery, EventSink, RelayPipeline, RelaySink},
    aggrechans_routing::Dispatcher,
    aggrechans_slack::{SlackWebClient, SocketModeClient, WebhookState, webhook},
    anyhow::{Context, Result, bail},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::config_commands::diagnose;

pub async fn run(explicit: Option<&Path>) -> Result<()> {
    let (config, path) = aggrechans_config::load_or_discover(explicit)?;
    match &path {
        Some(path) => info!(path = %path.display(), "config loaded"),
        None => info!("no config file found, using environment"),
    }

    let diagnostics = diagnose(path.as_deref(), &config)?;
    for d in &diagnostics.diagnostics {
        match d.severity {
            Severity::Error => error!("{d}"),
            Severity::Warning => warn!("{d}"),
            Severity::Info => debug!("{d}"),
        }
    }
    if diagnostics.has_errors() {
        bail!(
            "invalid configuration: {} error(s)",
            diagnostics.count(Severity::Error)
        );
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&config.relay)?);
    info!(rules = %dispatcher.describe(), "dispatch rules loaded");

    let bot_token = config
        .slack
        .bot_token
        .clone()
        .context("slack.bot_token is required")?;
    let web = SlackWebClient::new(bot_token, config.slack.api_base.clone());
    let api = Arc::new(web.clone());

    let workspace_domain = match &config.slack.workspace_domain {
        Some(domain) => domain.clone(),
        None => web
            .team_domain()
            .await
            .context("resolving the workspace domain with team.info")?,
    };
    info!(workspace_domain = %workspace_domain, "workspace resolved");

    let durable = open_durable_tier(&config.store)?;
    let channels = Arc::new(ChannelDirectory::new(api.clone(), durable.clone()));
    let users = Arc::new(UserDirectory::new(api.clone(), durable.clone()));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    shutdown.cancel();
                },
                Err(e) => warn!(error = %e, "cannot listen for interrupt"),
            }
        }
    });

    let policy = RetryPolicy::from_limit(config.retry.max_rate_limit_retries);
    if durable.is_none() || config.store.preload {
        let (channel_count, user_count) = tokio::try_join!(
            channels.bulk_load(&shutdown, policy),
            users.bulk_load(&shutdown, policy),
        )
        .context("loading the identity directories")?;
        info!(
            channels = channel_count,
            users = user_count,
            "identity directories loaded"
        );
    }

    let delivery = Delivery::new(api, policy);
    let pipeline = Arc::new(RelayPipeline::new(
        channels,
        users,
        dispatcher,
        delivery,
        workspace_domain,
    ));
    let relay_sink = RelaySink::new(pipeline, shutdown.clone());
    let sink: Arc<dyn EventSink> = Arc::new(relay_sink.clone());

    let served = match config.slack.transport {
        Transport::Socket => {
            let app_token = config
                .slack
                .app_token
                .clone()
                .context("slack.app_token is required for the socket transport")?;
            SocketModeClient::new(web, app_token, sink)
                .run(shutdown)
                .await;
            Ok(())
        },
        Transport::Webhook => {
            let secret = config
                .slack
                .signing_secret
                .clone()
                .context("slack.signing_secret is required for the webhook transport")?;
            webhook::serve(
                &config.server.bind,
                config.server.port,
                &config.server.path,
                WebhookState::new(secret, sink),
                shutdown,
            )
            .await
        },
    };

    relay_sink.drain().await;
    served?;
    info!("aggrechans stopped");
    Ok(())
}

fn open_durable_tier(store: &StoreConfig) -> Result<Option<DurableTier>> {
    let Some(url) = store.redis_url.as_deref().filter(|url| !url.trim().is_empty()) else {
        info!("no durable store configured, identity caches are process-local");
        return Ok(None);
    };

    let redis = RedisStore::open(url).context("opening the redis store")?;
    let tier = DurableTier::new(Arc::new(redis), store.key_prefix.clone());
    info!(
        backend = tier.backend_name(),
        key_prefix = %store.key_prefix,
        "durable identity tier enabled"
    );
    Ok(Some(tier))
}
