use std::fmt;

use aggrechans_config::{DispatchDocument, RuleRecord};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Prefix,
    Suffix,
}

/// One immutable routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRule {
    pub kind: MatchKind,
    pub pattern: String,
    pub destination: String,
}

impl DispatchRule {
    pub fn prefix(pattern: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Prefix,
            pattern: pattern.into(),
            destination: destination.into(),
        }
    }

    pub fn suffix(pattern: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            kind: MatchKind::Suffix,
            pattern: pattern.into(),
            destination: destination.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, channel_name: &str) -> bool {
        match self.kind {
            MatchKind::Prefix => channel_name.starts_with(&self.pattern),
            MatchKind::Suffix => channel_name.ends_with(&self.pattern),
        }
    }
}

impl fmt::Display for DispatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MatchKind::Prefix => "prefix",
            MatchKind::Suffix => "suffix",
        };
        write!(f, "{kind}[{}]->[{}]", self.pattern, self.destination)
    }
}

/// Expand a rule document into rules, in document order.
///
/// A record with both a prefix and a suffix yields two rules. Empty strings
/// count as absent.
pub fn parse_rules(document: &DispatchDocument) -> Result<Vec<DispatchRule>> {
    let parsed;
    let records: &[RuleRecord] = match document {
        DispatchDocument::Rules(records) => records,
        DispatchDocument::Json(raw) => {
            parsed = serde_json::from_str::<Vec<RuleRecord>>(raw)?;
            &parsed
        },
    };

    let mut rules = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let destination = record.destination.trim();
        if destination.is_empty() {
            return Err(Error::InvalidRule {
                index,
                reason: "destination channel id is empty",
            });
        }

        let prefix = record.prefix.as_deref().filter(|p| !p.is_empty());
        let suffix = record.suffix.as_deref().filter(|s| !s.is_empty());
        if prefix.is_none() && suffix.is_none() {
            return Err(Error::InvalidRule {
                index,
                reason: "neither prefix nor suffix is set",
            });
        }

        if let Some(prefix) = prefix {
            rules.push(DispatchRule::prefix(prefix, destination));
        }
        if let Some(suffix) = suffix {
            rules.push(DispatchRule::suffix(suffix, destination));
        }
    }

    if rules.is_empty() {
        return Err(Error::NoRules);
    }
    Ok(rules)
}
