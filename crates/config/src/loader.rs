use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::{AggrechansConfig, DispatchDocument, Transport},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "aggrechans.toml",
    "aggrechans.yaml",
    "aggrechans.yml",
    "aggrechans.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<AggrechansConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load the explicit file, or the first discovered one, then apply the
/// legacy environment overrides from the process environment.
///
/// Search order without an explicit path:
/// 1. `./aggrechans.{toml,yaml,yml,json}`
/// 2. `~/.config/aggrechans/aggrechans.{toml,yaml,yml,json}`
///
/// No file at all is not an error: the environment alone may be enough.
pub fn load_or_discover(explicit: Option<&Path>) -> Result<(AggrechansConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };

    let mut config = match &path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => {
            debug!("no config file found, using defaults");
            AggrechansConfig::default()
        },
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok((config, path))
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/aggrechans/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "aggrechans").map(|d| d.config_dir().to_path_buf())
}

/// Overlay the deployment environment variables on top of file values.
///
/// Empty variables are ignored.
pub fn apply_env_overrides(config: &mut AggrechansConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("SLACK_BOT_TOKEN") {
        config.slack.bot_token = Some(Secret::new(token));
    }
    if let Some(token) = var("SLACK_APP_TOKEN") {
        config.slack.app_token = Some(Secret::new(token));
    }
    if let Some(secret) = var("SLACK_SIGNING_SECRET") {
        config.slack.signing_secret = Some(Secret::new(secret));
    }
    if let Some(transport) = var("AGGRECHANS_TRANSPORT") {
        match transport.trim().to_ascii_lowercase().as_str() {
            "socket" => config.slack.transport = Transport::Socket,
            "webhook" => config.slack.transport = Transport::Webhook,
            other => warn!(value = other, "ignoring unknown AGGRECHANS_TRANSPORT"),
        }
    }
    if let Some(channel) = var("AGGREGATE_CHANNEL_ID") {
        config.relay.aggregate_channel = Some(channel);
    }
    if let Some(document) = var("DISPATCH_CHANNEL") {
        config.relay.dispatch = Some(DispatchDocument::Json(document));
    }
    if let Some(url) = var("REDIS_URL") {
        config.store.redis_url = Some(url);
    }
    if let Some(port) = var("PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> Result<AggrechansConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggrechans.toml");
        std::fs::write(
            &path,
            r#"
            [relay]
            aggregate_channel = "CAGG"
            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.relay.aggregate_channel.as_deref(), Some("CAGG"));
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn loads_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("aggrechans.yaml");
        std::fs::write(&yaml, "store:\n  redis_url: redis://localhost\n").unwrap();
        assert_eq!(
            load_config(&yaml).unwrap().store.redis_url.as_deref(),
            Some("redis://localhost")
        );

        let json = dir.path().join("aggrechans.json");
        std::fs::write(&json, r#"{"slack":{"transport":"webhook"}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().slack.transport, Transport::Webhook);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggrechans.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/aggrechans.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/aggrechans.toml"));
    }

    #[test]
    fn legacy_env_overrides_file_values() {
        let mut cfg = AggrechansConfig::default();
        cfg.relay.aggregate_channel = Some("CFILE".into());

        apply_env_overrides(
            &mut cfg,
            env(&[
                ("SLACK_BOT_TOKEN", "xoxb-env"),
                ("AGGREGATE_CHANNEL_ID", "CENV"),
                ("DISPATCH_CHANNEL", r#"[{"prefix":"times_","cid":"C1"}]"#),
                ("REDIS_URL", "redis://cache:6379/0"),
                ("PORT", "3000"),
                ("AGGRECHANS_TRANSPORT", "Webhook"),
            ]),
        );

        assert_eq!(
            cfg.slack.bot_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("xoxb-env")
        );
        assert_eq!(cfg.relay.aggregate_channel.as_deref(), Some("CENV"));
        assert!(matches!(cfg.relay.dispatch, Some(DispatchDocument::Json(_))));
        assert_eq!(cfg.store.redis_url.as_deref(), Some("redis://cache:6379/0"));
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.slack.transport, Transport::Webhook);
    }

    #[test]
    fn empty_or_invalid_env_values_are_ignored() {
        let mut cfg = AggrechansConfig::default();
        apply_env_overrides(&mut cfg, env(&[("AGGREGATE_CHANNEL_ID", "  "), ("PORT", "http")]));
        assert!(cfg.relay.aggregate_channel.is_none());
        assert_eq!(cfg.server.port, 8080);
    }
}
