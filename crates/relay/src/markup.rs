//! Inline markup rewriting for relayed message bodies.
//!
//! The destination channel must not re-trigger mentions or broadcasts, so
//! `<@U…>` becomes `<＠name>` and `<!channel>`-style tags lose their
//! notifying form. Both scanners are small explicit state machines: malformed
//! or unterminated tags degrade to plain text instead of failing.

use std::collections::HashMap;

use {
    aggrechans_common::types::USER_ID_SIGIL, aggrechans_directory::UserDirectory,
    async_trait::async_trait,
};

use crate::error::{Error, Result};

/// Replaces `@` in rewritten mentions.
pub const FULLWIDTH_AT: char = '＠';

/// Replaces `!` in neutralised broadcast tags.
pub const FULLWIDTH_BANG: char = '！';

/// Broadcast keywords kept as plain `@keyword` text.
const BROADCAST_KEYWORDS: &[&str] = &["channel", "everyone", "here", "group"];

/// Resolves a user id to the name shown in rewritten mentions.
#[async_trait]
pub trait DisplayNameResolver: Send + Sync {
    async fn display_name(&self, user_id: &str) -> aggrechans_directory::Result<String>;
}

#[async_trait]
impl DisplayNameResolver for UserDirectory {
    async fn display_name(&self, user_id: &str) -> aggrechans_directory::Result<String> {
        self.resolve_display_name(user_id).await
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum MentionScan {
    Plain,
    Open,
    At,
}

/// Ids of every `<@U…>` token, in order of appearance.
///
/// The id run starts at the user sigil and ends at the next `>`. Runs that
/// contain whitespace or another `<`, and runs with no closing `>`, are
/// ignored.
#[must_use]
pub fn extract_mention_ids(text: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut state = MentionScan::Plain;
    let mut resume_at = 0;

    for (i, c) in text.char_indices() {
        if i < resume_at {
            continue;
        }
        state = match (state, c) {
            (_, '<') => MentionScan::Open,
            (MentionScan::Open, '@') => MentionScan::At,
            (MentionScan::At, USER_ID_SIGIL) => {
                if let Some(len) = text[i..].find('>') {
                    let run = &text[i..i + len];
                    if !run.contains(|c: char| c == '<' || c.is_whitespace()) {
                        ids.push(run.to_string());
                        resume_at = i + len + 1;
                    }
                }
                MentionScan::Plain
            },
            _ => MentionScan::Plain,
        };
    }

    ids
}

/// Rewrite every `<@id>` token to `<＠display name>`.
///
/// Each distinct id is resolved once. A token of the form `<@U1|label>` is
/// resolved by the id before the `|`. Replacement is a single left-to-right
/// pass, so substituted names are never rescanned.
pub async fn replace_mentions(text: &str, resolver: &dyn DisplayNameResolver) -> Result<String> {
    let mut replacements: HashMap<String, String> = HashMap::new();
    for id in extract_mention_ids(text) {
        let token = format!("<@{id}>");
        if replacements.contains_key(&token) {
            continue;
        }
        let user_id = id.split('|').next().unwrap_or(&id);
        let name = resolver
            .display_name(user_id)
            .await
            .map_err(|source| Error::Resolve {
                user_id: user_id.to_string(),
                source,
            })?;
        replacements.insert(token, format!("<{FULLWIDTH_AT}{name}>"));
    }

    if replacements.is_empty() {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let token = candidate
            .find('>')
            .map(|end| &candidate[..=end])
            .and_then(|token| replacements.get_key_value(token));
        match token {
            Some((token, replacement)) => {
                out.push_str(replacement);
                rest = &candidate[token.len()..];
            },
            None => {
                out.push('<');
                rest = &candidate[1..];
            },
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Neutralise broadcast tags (`<!…>`).
///
/// - `<!channel>`, `<!everyone>`, `<!here>`, `<!group>` become `@channel` etc.
/// - `<!subteam^ID|label>` becomes `＠label`; the id is dropped.
/// - Any other terminated `<!…>` tag becomes `！`.
/// - An unterminated `<!` (no `>`, or another `<` first) keeps the `<`, turns
///   the `!` into `！`, and the rest of the text is scanned as usual.
///
/// The whole tag, brackets included, is consumed.
#[must_use]
pub fn escape_broadcast_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut resume_at = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if i < resume_at {
            continue;
        }
        let bang = chars.peek().is_some_and(|&(_, next)| next == '!');
        if c != '<' || !bang {
            out.push(c);
            continue;
        }

        // A `<` before the closing `>` means this tag never closed.
        let body_start = i + 1;
        let closing = text[body_start..]
            .find('>')
            .filter(|&len| !text[body_start..body_start + len].contains('<'));
        let Some(len) = closing else {
            out.push('<');
            out.push(FULLWIDTH_BANG);
            resume_at = body_start + 1;
            continue;
        };

        let body = &text[body_start..body_start + len];
        out.push_str(&rewrite_broadcast(body));
        resume_at = body_start + len + 1;
    }

    out
}

/// `body` is the tag content between `<` and `>`, starting with `!`.
fn rewrite_broadcast(body: &str) -> String {
    let (keyword, label) = match body.split_once('|') {
        Some((keyword, label)) => (keyword, Some(label)),
        None => (body, None),
    };
    let keyword = keyword.trim_start_matches('!');

    if BROADCAST_KEYWORDS.contains(&keyword) {
        return format!("@{keyword}");
    }
    if keyword.starts_with("subteam^") {
        return format!("{FULLWIDTH_AT}{}", label.unwrap_or_default());
    }
    FULLWIDTH_BANG.to_string()
}
