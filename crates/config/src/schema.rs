//! Config schema types (slack credentials, relay rules, retry, durable store,
//! webhook server).

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggrechansConfig {
    pub slack: SlackConfig,
    pub relay: RelayConfig,
    pub retry: RetryConfig,
    pub store: StoreConfig,
    pub server: ServerConfig,
}

/// How inbound events reach the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Outbound WebSocket opened with the app-level token.
    #[default]
    Socket,
    /// Events API HTTP endpoint with signed requests.
    Webhook,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Socket => write!(f, "socket"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// Workspace credentials and API endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`) used for every Web API call.
    pub bot_token: Option<Secret<String>>,

    /// App-level token (`xapp-...`), required by the socket transport.
    pub app_token: Option<Secret<String>>,

    /// Signing secret, required by the webhook transport.
    pub signing_secret: Option<Secret<String>>,

    pub transport: Transport,

    /// Workspace subdomain used in permalinks. Looked up with `team.info`
    /// when unset.
    pub workspace_domain: Option<String>,

    /// Base URL of the Web API.
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            app_token: None,
            signing_secret: None,
            transport: Transport::Socket,
            workspace_domain: None,
            api_base: "https://slack.com/api".into(),
        }
    }
}

/// Where relayed messages go.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Single destination used when no dispatch rule table is loaded.
    pub aggregate_channel: Option<String>,

    /// Dispatch rule table, either structured or as a raw JSON document.
    pub dispatch: Option<DispatchDocument>,
}

/// A dispatch rule table as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DispatchDocument {
    Rules(Vec<RuleRecord>),
    /// JSON array of `{"prefix"|"suffix", "cid"}` objects.
    Json(String),
}

/// One record of the dispatch rule table. A record carrying both a prefix
/// and a suffix yields two independent rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default, alias = "cid")]
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Rate-limit retry budget for listings and delivery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// `None` retries until the owning task is cancelled.
    pub max_rate_limit_retries: Option<usize>,
}

/// Optional durable identity tier shared between instances.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis URL; absent means in-memory only.
    pub redis_url: Option<String>,
    /// Namespace for every key this process writes.
    pub key_prefix: String,
    /// Run the startup bulk loads even when the durable tier is configured.
    pub preload: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: "aggrechans".into(),
            preload: false,
        }
    }
}

/// Listener for the webhook transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            path: "/events-endpoint".into(),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: AggrechansConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.slack.transport, Transport::Socket);
        assert_eq!(cfg.slack.api_base, "https://slack.com/api");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.store.key_prefix, "aggrechans");
        assert!(cfg.relay.dispatch.is_none());
    }

    #[test]
    fn structured_rules_accept_cid_alias() {
        let cfg: AggrechansConfig = toml::from_str(
            r#"
            [relay]
            dispatch = [
              { prefix = "times_", cid = "C1" },
              { suffix = "_zatsu", destination = "C2" },
            ]
            "#,
        )
        .unwrap();
        let Some(DispatchDocument::Rules(rules)) = cfg.relay.dispatch else {
            panic!("expected structured rules");
        };
        assert_eq!(rules[0].destination, "C1");
        assert_eq!(rules[0].prefix.as_deref(), Some("times_"));
        assert_eq!(rules[1].destination, "C2");
        assert_eq!(rules[1].suffix.as_deref(), Some("_zatsu"));
    }

    #[test]
    fn raw_json_rules_are_kept_verbatim() {
        let cfg: AggrechansConfig = toml::from_str(
            r#"
            [relay]
            dispatch = '[{"prefix":"times_","cid":"C1"}]'
            "#,
        )
        .unwrap();
        assert_eq!(
            cfg.relay.dispatch,
            Some(DispatchDocument::Json(
                r#"[{"prefix":"times_","cid":"C1"}]"#.into()
            ))
        );
    }

    #[test]
    fn secrets_and_transport_parse() {
        let cfg: AggrechansConfig = toml::from_str(
            r#"
            [slack]
            bot_token = "xoxb-1"
            signing_secret = "shh"
            transport = "webhook"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.slack.transport, Transport::Webhook);
        assert_eq!(
            cfg.slack.bot_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("xoxb-1")
        );
        assert!(!format!("{:?}", cfg.slack).contains("shh"));
    }
}
