//! In-memory presentation model implementing [`PresentationSink`].
//!
//! `ChatView` owns channels, rosters, topics and transcripts. It lives on the
//! consumer task; renderers never touch it directly. Each `refresh` publishes
//! an immutable [`ViewSnapshot`] over a `watch` channel, which is the hand-off
//! point to whatever thread draws the UI.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::watch;

use crate::config::ViewConfig;
use crate::sink::{BufferIds, PresentationSink};

/// Maximum number of transcript lines kept per channel.
pub const MAX_LINES: usize = 1000;

/// Current topic of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicState {
    pub text: String,
    pub author: String,
    /// Microseconds since the Unix epoch.
    pub set_at: i64,
}

/// A channel or conversation buffer.
#[derive(Debug)]
pub struct Channel {
    pub name: String,
    pub ids: BufferIds,
    /// Header shown above the transcript (initial topic or conversation info).
    pub header: String,
    pub topic: Option<TopicState>,
    pub members: Vec<String>,
    pub lines: VecDeque<String>,
    /// Messages received while the channel was not active.
    pub unread: usize,
    /// Whether any unread message mentions our nick.
    pub has_mention: bool,
}

impl Channel {
    fn new(name: &str, header: &str, ids: BufferIds) -> Self {
        Self {
            name: name.to_string(),
            ids,
            header: header.to_string(),
            topic: None,
            members: Vec::new(),
            lines: VecDeque::new(),
            unread: 0,
            has_mention: false,
        }
    }

    pub fn push(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
        if self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
    }

    pub fn has_member(&self, nick: &str) -> bool {
        self.members.iter().any(|m| m.eq_ignore_ascii_case(nick))
    }

    fn set_members(&mut self, members: &[String]) {
        self.members.clear();
        for nick in members {
            if !self.has_member(nick) {
                self.members.push(nick.clone());
            }
        }
    }
}

/// Render-side summary of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub name: String,
    pub header: String,
    pub topic: Option<String>,
    pub members: usize,
    pub unread: usize,
    pub has_mention: bool,
    pub last_line: Option<String>,
}

/// Immutable view state published on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// Number of refreshes so far.
    pub frame: u64,
    pub active: Option<String>,
    pub channels: Vec<ChannelSummary>,
}

pub struct ChatView {
    /// Channels keyed by lowercase name.
    channels: BTreeMap<String, Channel>,
    /// Key of the active channel.
    active: Option<String>,
    own_nick: Option<String>,
    /// Channel to activate on `select_default_channel`, when it exists.
    last_channel: Option<String>,
    frames: u64,
    frames_tx: watch::Sender<ViewSnapshot>,
}

impl ChatView {
    /// Create an empty view and the receiver renderers subscribe to.
    pub fn new(config: &ViewConfig) -> (Self, watch::Receiver<ViewSnapshot>) {
        let (frames_tx, frames_rx) = watch::channel(ViewSnapshot::default());
        let view = Self {
            channels: BTreeMap::new(),
            active: None,
            own_nick: config.own_nick.clone(),
            last_channel: config.last_channel.as_ref().map(|c| c.to_lowercase()),
            frames: 0,
            frames_tx,
        };
        (view, frames_rx)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&name.to_lowercase())
    }

    /// Channels in name order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Display name of the active channel.
    pub fn active_channel(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|key| self.channels.get(key))
            .map(|c| c.name.as_str())
    }

    /// Number of refreshes performed.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Switch to a named channel and clear its unread state.
    pub fn switch_to(&mut self, name: &str) {
        let key = name.to_lowercase();
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.unread = 0;
            channel.has_mention = false;
            self.active = Some(key.clone());
            self.last_channel = Some(key);
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            frame: self.frames,
            active: self.active_channel().map(str::to_string),
            channels: self
                .channels
                .values()
                .map(|c| ChannelSummary {
                    name: c.name.clone(),
                    header: c.header.clone(),
                    topic: c.topic.as_ref().map(|t| t.text.clone()),
                    members: c.members.len(),
                    unread: c.unread,
                    has_mention: c.has_mention,
                    last_line: c.lines.back().cloned(),
                })
                .collect(),
        }
    }

    /// Look up a channel by name, rejecting a buffer-id mismatch when both
    /// sides know their id.
    fn channel_mut(&mut self, name: &str, bid: i64) -> Option<&mut Channel> {
        let channel = self.channels.get_mut(&name.to_lowercase())?;
        if bid != 0 && channel.ids.bid != 0 && channel.ids.bid != bid {
            tracing::trace!(name, bid, known = channel.ids.bid, "buffer id mismatch");
            return None;
        }
        Some(channel)
    }
}

impl PresentationSink for ChatView {
    fn create_channel(&mut self, name: &str, header: &str, ids: BufferIds, members: &[String]) {
        let key = name.to_lowercase();
        let channel = self
            .channels
            .entry(key)
            .or_insert_with(|| Channel::new(name, header, ids));
        channel.header = header.to_string();
        channel.ids = ids;
        channel.set_members(members);
    }

    fn remove_channel(&mut self, name: &str) {
        let key = name.to_lowercase();
        self.channels.remove(&key);
        if self.active.as_deref() == Some(key.as_str()) {
            self.active = self.channels.keys().next().cloned();
        }
    }

    fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(&name.to_lowercase())
    }

    fn register_activity(&mut self, channel: &str, text: &str) {
        let key = channel.to_lowercase();
        if self.active.as_deref() == Some(key.as_str()) {
            return;
        }
        let mentioned = self
            .own_nick
            .as_ref()
            .is_some_and(|nick| text.to_lowercase().contains(&nick.to_lowercase()));
        if let Some(channel) = self.channels.get_mut(&key) {
            channel.unread += 1;
            channel.has_mention |= mentioned;
        }
    }

    fn add_user(&mut self, channel: &str, nick: &str, bid: i64) {
        if let Some(channel) = self.channel_mut(channel, bid) {
            if !channel.has_member(nick) {
                channel.members.push(nick.to_string());
            }
        }
    }

    fn remove_user(&mut self, channel: &str, nick: &str, bid: i64) {
        if let Some(channel) = self.channel_mut(channel, bid) {
            channel.members.retain(|m| !m.eq_ignore_ascii_case(nick));
        }
    }

    fn rename_user(&mut self, channel: &str, old: &str, new: &str, _time: i64, bid: i64) -> bool {
        let Some(channel) = self.channel_mut(channel, bid) else {
            return false;
        };
        let Some(index) = channel
            .members
            .iter()
            .position(|m| m.eq_ignore_ascii_case(old))
        else {
            return false;
        };
        channel.members[index] = new.to_string();
        true
    }

    fn append_line(&mut self, channel: &str, bid: i64, line: &str) {
        if let Some(channel) = self.channel_mut(channel, bid) {
            channel.push(line);
        }
    }

    fn set_topic(&mut self, channel: &str, author: &str, text: &str, time: i64, bid: i64) -> bool {
        let Some(channel) = self.channel_mut(channel, bid) else {
            return false;
        };
        channel.topic = Some(TopicState {
            text: text.to_string(),
            author: author.to_string(),
            set_at: time,
        });
        true
    }

    fn select_default_channel(&mut self) {
        let last = self
            .last_channel
            .as_ref()
            .filter(|key| self.channels.contains_key(*key))
            .cloned();
        let current = self
            .active
            .as_ref()
            .filter(|key| self.channels.contains_key(*key))
            .cloned();
        self.active = last
            .or(current)
            .or_else(|| self.channels.keys().next().cloned());
        if let Some(channel) = self.active.as_ref().and_then(|key| self.channels.get_mut(key)) {
            channel.unread = 0;
            channel.has_mention = false;
        }
    }

    fn refresh(&mut self) {
        self.frames += 1;
        self.frames_tx.send_replace(self.snapshot());
    }
}
