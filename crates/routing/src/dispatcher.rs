use {aggrechans_config::RelayConfig, tracing::warn};

use crate::{
    error::{Error, Result},
    rules::{DispatchRule, MatchKind, parse_rules},
};

/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatcher {
    /// Prefix rules are consulted before suffix rules.
    Mapped {
        prefix: Vec<DispatchRule>,
        suffix: Vec<DispatchRule>,
    },
    /// Every channel goes to one destination.
    Single { destination: String },
}

impl Dispatcher {
    /// Build from the relay config.
    ///
    /// A broken or empty rule table falls back to the aggregate channel with a
    /// warning; without a fallback the table's error is returned.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let fallback = config
            .aggregate_channel
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let rules_err = match &config.dispatch {
            Some(document) => match parse_rules(document) {
                Ok(rules) => return Ok(Self::from_rules(rules)),
                Err(e) => e,
            },
            None => Error::NotConfigured,
        };

        match fallback {
            Some(destination) => {
                if config.dispatch.is_some() {
                    warn!(
                        error = %rules_err,
                        "dispatch rules disabled, relaying everything to the aggregate channel"
                    );
                }
                Ok(Self::Single {
                    destination: destination.to_string(),
                })
            },
            None => Err(rules_err),
        }
    }

    pub fn from_rules(rules: Vec<DispatchRule>) -> Self {
        let (prefix, suffix): (Vec<_>, Vec<_>) = rules
            .into_iter()
            .partition(|rule| rule.kind == MatchKind::Prefix);
        Self::Mapped { prefix, suffix }
    }

    /// Destination for `channel_name`, `None` when the channel is not relayed.
    #[must_use]
    pub fn dispatch(&self, channel_name: &str) -> Option<&str> {
        match self {
            Self::Single { destination } => Some(destination.as_str()),
            Self::Mapped { prefix, suffix } => prefix
                .iter()
                .chain(suffix)
                .find(|rule| rule.matches(channel_name))
                .map(|rule| rule.destination.as_str()),
        }
    }

    /// Human-readable rule listing, one rule per line.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Single { destination } => format!("send every message to:{destination}"),
            Self::Mapped { prefix, suffix } => prefix
                .iter()
                .chain(suffix)
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
