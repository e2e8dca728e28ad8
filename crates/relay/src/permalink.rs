use crate::event::MessageSubtype;

/// True when the message lives only inside a thread. A thread parent carries
/// its own `ts` as `thread_ts`, and broadcast copies of thread replies also
/// appear in the channel, so both count as top-level.
#[must_use]
pub fn is_thread_reply(ts: &str, thread_ts: Option<&str>, subtype: &MessageSubtype) -> bool {
    thread_ts.is_some_and(|thread_ts| !thread_ts.is_empty() && thread_ts != ts)
        && *subtype != MessageSubtype::ThreadBroadcast
}

/// Link to a message.
///
/// `domain` is the workspace subdomain (`acme` → `acme.slack.com`); a value
/// that already contains a dot is used as the host verbatim. The dot is
/// removed from the timestamp because mobile clients cannot follow links that
/// keep it.
#[must_use]
pub fn build_permalink(
    domain: &str,
    channel_id: &str,
    ts: &str,
    thread_ts: Option<&str>,
    subtype: &MessageSubtype,
) -> String {
    let host = if domain.contains('.') {
        domain.to_string()
    } else {
        format!("{domain}.slack.com")
    };
    let message_id = ts.replace('.', "");
    let uri = format!("https://{host}/archives/{channel_id}/p{message_id}");

    match thread_ts {
        Some(thread_ts) if is_thread_reply(ts, Some(thread_ts), subtype) => {
            format!("{uri}?thread_ts={thread_ts}&cid={channel_id}")
        },
        _ => uri,
    }
}

/// Link markup shown at the start of a relayed message: ``<uri|`#name`>``,
/// or ``<uri|`%name`>`` for thread replies.
#[must_use]
pub fn format_message_link(permalink: &str, channel_name: &str, thread_reply: bool) -> String {
    let sigil = if thread_reply { '%' } else { '#' };
    format!("<{permalink}|`{sigil}{channel_name}`>")
}
