//! Events pushed by the hosted IRC session, as seen by the pipeline.

use serde::{Deserialize, Deserializer};

use crate::sink::BufferIds;

/// Event type tag (the `type` field of every pushed message).
///
/// Tags the pipeline does not know are kept as `Unknown` so newer server
/// event types pass through as no-ops instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pointer to the backlog that must be fetched and replayed.
    OobInclude,
    /// Channel state snapshot: topic, ids and member roster.
    ChannelInit,
    /// We left a channel.
    YouPartedChannel,
    /// A message in a buffer.
    BufferMsg,
    /// Someone joined a channel.
    JoinedChannel,
    /// Someone left a channel.
    PartedChannel,
    /// A user changed nick.
    NickChange,
    /// Channel topic changed.
    ChannelTopic,
    /// A buffer was created (channel, conversation, console...).
    MakeBuffer,
    /// A `/me` action message.
    BufferMeMsg,
    /// Someone quit the network.
    Quit,
    /// Any tag this client does not handle.
    Unknown(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "oob_include" => Self::OobInclude,
            "channel_init" => Self::ChannelInit,
            "you_parted_channel" => Self::YouPartedChannel,
            "buffer_msg" => Self::BufferMsg,
            "joined_channel" => Self::JoinedChannel,
            "parted_channel" => Self::PartedChannel,
            "nickchange" => Self::NickChange,
            "channel_topic" => Self::ChannelTopic,
            "makebuffer" => Self::MakeBuffer,
            "buffer_me_msg" => Self::BufferMeMsg,
            "quit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::OobInclude => "oob_include",
            Self::ChannelInit => "channel_init",
            Self::YouPartedChannel => "you_parted_channel",
            Self::BufferMsg => "buffer_msg",
            Self::JoinedChannel => "joined_channel",
            Self::PartedChannel => "parted_channel",
            Self::NickChange => "nickchange",
            Self::ChannelTopic => "channel_topic",
            Self::MakeBuffer => "makebuffer",
            Self::BufferMeMsg => "buffer_me_msg",
            Self::Quit => "quit",
            Self::Unknown(tag) => tag,
        }
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// A channel member as listed in `channel_init`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub nick: String,
    #[serde(default)]
    pub usermask: Option<String>,
}

/// Topic payload. `channel_init` carries an object, `channel_topic` may carry
/// either a bare string or the same object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Topic {
    Text(String),
    Detailed {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        nick: Option<String>,
        #[serde(default)]
        time: Option<i64>,
    },
    /// Anything else the server sends in the topic slot.
    Other(serde_json::Value),
}

impl Topic {
    /// Topic text, if the payload carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Topic::Text(text) => Some(text),
            Topic::Detailed { text, .. } => text.as_deref(),
            Topic::Other(_) => None,
        }
    }
}

/// A decoded event.
///
/// One flat record covers every known kind. Only `kind` is guaranteed; every
/// other field is present only when it applies to that kind, so handlers must
/// check for the fields they need rather than assume empty defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub cid: Option<i64>,
    pub bid: Option<i64>,
    pub chan: Option<String>,
    /// Buffer name (`makebuffer`).
    pub name: Option<String>,
    pub from: Option<String>,
    pub msg: Option<String>,
    pub nick: Option<String>,
    pub hostmask: Option<String>,
    pub oldnick: Option<String>,
    pub newnick: Option<String>,
    pub author: Option<String>,
    pub topic: Option<Topic>,
    pub buffer_type: Option<String>,
    /// Buffer creation time, microseconds since the Unix epoch.
    pub created: Option<i64>,
    /// Event id; doubles as the event time in microseconds.
    pub eid: Option<i64>,
    /// Event time in microseconds, when sent separately from `eid`.
    pub time: Option<i64>,
    pub members: Option<Vec<Member>>,
    /// Original message bytes, kept for kind-specific re-decoding.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl Event {
    /// Connection and buffer ids, zero when absent.
    pub fn ids(&self) -> BufferIds {
        BufferIds {
            cid: self.cid.unwrap_or(0),
            bid: self.bid.unwrap_or(0),
        }
    }

    /// Event time in microseconds since the Unix epoch (0 when unknown).
    pub fn timestamp_micros(&self) -> i64 {
        self.time.or(self.eid).unwrap_or(0)
    }

    /// Member nicks from a `channel_init` roster.
    pub fn member_nicks(&self) -> Vec<String> {
        self.members
            .iter()
            .flatten()
            .map(|m| m.nick.clone())
            .collect()
    }
}
