//! Configuration validation.
//!
//! Two passes: unknown-field detection over the raw TOML tree, and semantic
//! checks over the parsed (env-overridden) config.

use std::collections::HashMap;

use secrecy::{ExposeSecret, Secret};

use crate::schema::{AggrechansConfig, Transport};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "credentials", "routing", "store"
    pub category: &'static str,
    /// Dotted path, e.g. "slack.bot_token"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}] {}: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "[{}] {} ({}): {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

// ── Unknown-field detection ─────────────────────────────────────────────────

/// Expected shape of the configuration tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Either a scalar or an array of structs (the dispatch table).
    LeafOrArray(Box<KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, LeafOrArray, Struct};

    let rule = Struct(HashMap::from([
        ("destination", Leaf),
        ("cid", Leaf),
        ("prefix", Leaf),
        ("suffix", Leaf),
    ]));

    Struct(HashMap::from([
        (
            "slack",
            Struct(HashMap::from([
                ("bot_token", Leaf),
                ("app_token", Leaf),
                ("signing_secret", Leaf),
                ("transport", Leaf),
                ("workspace_domain", Leaf),
                ("api_base", Leaf),
            ])),
        ),
        (
            "relay",
            Struct(HashMap::from([
                ("aggregate_channel", Leaf),
                ("dispatch", LeafOrArray(Box::new(rule))),
            ])),
        ),
        (
            "retry",
            Struct(HashMap::from([("max_rate_limit_retries", Leaf)])),
        ),
        (
            "store",
            Struct(HashMap::from([
                ("redis_url", Leaf),
                ("key_prefix", Leaf),
                ("preload", Leaf),
            ])),
        ),
        (
            "server",
            Struct(HashMap::from([
                ("bind", Leaf),
                ("port", Leaf),
                ("path", Leaf),
            ])),
        ),
    ]))
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    path: &str,
    result: &mut ValidationResult,
) {
    match (schema, value) {
        (KnownKeys::Struct(fields), toml::Value::Table(table)) => {
            for (key, child) in table {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match fields.get(key.as_str()) {
                    Some(child_schema) => {
                        check_unknown_fields(child, child_schema, &child_path, result)
                    },
                    None => result.push(
                        Severity::Warning,
                        "unknown-field",
                        &child_path,
                        format!("unknown field \"{key}\""),
                    ),
                }
            }
        },
        (KnownKeys::LeafOrArray(item), toml::Value::Array(items)) => {
            for (i, child) in items.iter().enumerate() {
                check_unknown_fields(child, item, &format!("{path}[{i}]"), result);
            }
        },
        _ => {},
    }
}

/// Check raw TOML text for syntax errors and unknown fields.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            result.push(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            );
            return result;
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut result);
    result
}

// ── Semantic checks ─────────────────────────────────────────────────────────

fn secret_str(secret: &Option<Secret<String>>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.expose_secret().as_str())
        .filter(|s| !s.is_empty())
}

/// Check a loaded config for settings the process cannot start without.
#[must_use]
pub fn validate_config(config: &AggrechansConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match secret_str(&config.slack.bot_token) {
        None => result.push(
            Severity::Error,
            "credentials",
            "slack.bot_token",
            "SLACK_BOT_TOKEN must be set",
        ),
        Some(token) if !token.starts_with("xoxb-") => result.push(
            Severity::Error,
            "credentials",
            "slack.bot_token",
            "SLACK_BOT_TOKEN must have the prefix \"xoxb-\"",
        ),
        Some(_) => {},
    }

    match config.slack.transport {
        Transport::Socket => match secret_str(&config.slack.app_token) {
            None => result.push(
                Severity::Error,
                "credentials",
                "slack.app_token",
                "SLACK_APP_TOKEN must be set for the socket transport",
            ),
            Some(token) if !token.starts_with("xapp-") => result.push(
                Severity::Error,
                "credentials",
                "slack.app_token",
                "SLACK_APP_TOKEN must have the prefix \"xapp-\"",
            ),
            Some(_) => {},
        },
        Transport::Webhook => {
            if secret_str(&config.slack.signing_secret).is_none() {
                result.push(
                    Severity::Error,
                    "credentials",
                    "slack.signing_secret",
                    "SLACK_SIGNING_SECRET must be set for the webhook transport",
                );
            }
            if config.store.redis_url.is_none() {
                result.push(
                    Severity::Warning,
                    "store",
                    "store.redis_url",
                    "webhook transport without a durable store: instances cannot share identity caches",
                );
            }
        },
    }

    let has_destination = config
        .relay
        .aggregate_channel
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if config.relay.dispatch.is_none() && !has_destination {
        result.push(
            Severity::Error,
            "routing",
            "relay",
            "neither a dispatch rule table nor an aggregate channel is configured",
        );
    }

    if !config.server.path.starts_with('/') {
        result.push(
            Severity::Error,
            "syntax",
            "server.path",
            "webhook path must start with '/'",
        );
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::DispatchDocument};

    fn socket_config() -> AggrechansConfig {
        let mut cfg = AggrechansConfig::default();
        cfg.slack.bot_token = Some(Secret::new("xoxb-1".into()));
        cfg.slack.app_token = Some(Secret::new("xapp-1".into()));
        cfg.relay.aggregate_channel = Some("CAGG".into());
        cfg
    }

    #[test]
    fn complete_socket_config_is_clean() {
        let result = validate_config(&socket_config());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn token_prefixes_are_checked() {
        let mut cfg = socket_config();
        cfg.slack.bot_token = Some(Secret::new("xoxp-1".into()));
        cfg.slack.app_token = Some(Secret::new("bad".into()));
        let result = validate_config(&cfg);
        assert_eq!(result.count(Severity::Error), 2);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.contains("\"xoxb-\""))
        );
    }

    #[test]
    fn webhook_needs_signing_secret_and_warns_without_store() {
        let mut cfg = socket_config();
        cfg.slack.transport = Transport::Webhook;
        let result = validate_config(&cfg);
        assert!(result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);

        cfg.slack.signing_secret = Some(Secret::new("s".into()));
        cfg.store.redis_url = Some("redis://localhost".into());
        let result = validate_config(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn routing_requires_rules_or_destination() {
        let mut cfg = socket_config();
        cfg.relay.aggregate_channel = None;
        assert!(validate_config(&cfg).has_errors());

        cfg.relay.dispatch = Some(DispatchDocument::Json("[]".into()));
        assert!(!validate_config(&cfg).has_errors());
    }

    #[test]
    fn unknown_fields_are_reported_with_paths() {
        let result = validate_toml_str(
            r#"
            [slack]
            bot_tokn = "x"
            [relay]
            dispatch = [{ prefix = "a", cid = "C1", sufix = "b" }]
            [metrics]
            enabled = true
            "#,
        );
        let paths: Vec<&str> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"slack.bot_tokn"));
        assert!(paths.contains(&"relay.dispatch[0].sufix"));
        assert!(paths.contains(&"metrics"));
        assert!(!result.has_errors());
    }

    #[test]
    fn syntax_errors_are_errors() {
        let result = validate_toml_str("[slack\nbot_token = 1");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }
}
