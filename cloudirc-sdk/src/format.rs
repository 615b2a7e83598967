//! Transcript line and timestamp formatting.
//!
//! Event times arrive as microseconds since the Unix epoch and are rendered
//! in UTC.

use chrono::{DateTime, Utc};

use crate::event::Topic;

/// Header shown for channels whose topic is empty or missing.
pub const NO_TOPIC: &str = "No topic set";

fn datetime(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(micros.div_euclid(1_000_000), 0).unwrap_or_default()
}

/// `[HH:MM]` prefix for transcript lines.
pub fn clock_stamp(micros: i64) -> String {
    datetime(micros).format("[%H:%M]").to_string()
}

/// Long date used in conversation headers, e.g. `Tue Nov 14 22:13:20 UTC 2023`.
pub fn long_date(micros: i64) -> String {
    datetime(micros).format("%a %b %-d %H:%M:%S UTC %Y").to_string()
}

/// Header for a newly created conversation buffer.
pub fn conversation_header(created_micros: i64) -> String {
    format!("Chatting since: {}", long_date(created_micros))
}

/// Channel header derived from a `channel_init` topic.
pub fn display_topic(topic: Option<&Topic>) -> String {
    match topic.and_then(Topic::text) {
        Some(text) if !text.trim().is_empty() => sanitize_text(text),
        _ => NO_TOPIC.to_string(),
    }
}

/// Strip terminal control characters (ESC sequences, C0/C1 controls) from text.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|&c| c == '\t' || (c >= ' ' && c != '\x7f' && !('\u{80}'..='\u{9f}').contains(&c)))
        .collect()
}

pub fn message_line(micros: i64, from: &str, msg: &str) -> String {
    format!(
        "{} <{}> {}",
        clock_stamp(micros),
        sanitize_text(from),
        sanitize_text(msg)
    )
}

pub fn action_line(micros: i64, from: &str, msg: &str) -> String {
    format!(
        "{} * {} {}",
        clock_stamp(micros),
        sanitize_text(from),
        sanitize_text(msg)
    )
}

pub fn join_line(micros: i64, nick: &str, hostmask: &str) -> String {
    format!(
        "{}  -> {} joined ({})",
        clock_stamp(micros),
        sanitize_text(nick),
        sanitize_text(hostmask)
    )
}

pub fn part_line(micros: i64, nick: &str, hostmask: &str) -> String {
    format!(
        "{}  <- {} left ({})",
        clock_stamp(micros),
        sanitize_text(nick),
        sanitize_text(hostmask)
    )
}

pub fn quit_line(micros: i64, nick: &str, hostmask: &str, reason: &str) -> String {
    format!(
        "{}  <- {} quit ({}): {}",
        clock_stamp(micros),
        sanitize_text(nick),
        sanitize_text(hostmask),
        sanitize_text(reason)
    )
}

pub fn nick_line(micros: i64, old: &str, new: &str) -> String {
    format!(
        "{}  {} is now known as {}",
        clock_stamp(micros),
        sanitize_text(old),
        sanitize_text(new)
    )
}

pub fn topic_line(micros: i64, author: &str, text: &str) -> String {
    format!(
        "{}  {} changed the topic to: {}",
        clock_stamp(micros),
        sanitize_text(author),
        sanitize_text(text)
    )
}
