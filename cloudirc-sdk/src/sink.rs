//! Presentation sink: the mutation surface the dispatcher drives.
//!
//! The pipeline never stores channel, roster or topic state itself. Every
//! change goes through this trait, and every call is made from the single
//! consumer task. A sink backed by a UI toolkit with its own thread rules is
//! responsible for handing work over to that toolkit (see
//! [`crate::view::ChatView`], which publishes snapshots through a channel).

/// Connection and buffer ids of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferIds {
    pub cid: i64,
    pub bid: i64,
}

pub trait PresentationSink {
    /// Create a channel, or reset header, ids and roster of an existing one.
    fn create_channel(&mut self, name: &str, header: &str, ids: BufferIds, members: &[String]);

    /// Remove a channel and its transcript.
    fn remove_channel(&mut self, name: &str);

    /// Whether the view currently knows this channel.
    fn has_channel(&self, name: &str) -> bool;

    /// Track unread/mention activity caused by a message.
    fn register_activity(&mut self, channel: &str, text: &str);

    fn add_user(&mut self, channel: &str, nick: &str, bid: i64);

    fn remove_user(&mut self, channel: &str, nick: &str, bid: i64);

    /// Rename a roster entry. Returns `false` when channel or user is unknown.
    fn rename_user(&mut self, channel: &str, old: &str, new: &str, time: i64, bid: i64) -> bool;

    /// Append a formatted transcript line.
    fn append_line(&mut self, channel: &str, bid: i64, line: &str);

    /// Replace the channel topic. Returns `false` when the channel is unknown.
    fn set_topic(&mut self, channel: &str, author: &str, text: &str, time: i64, bid: i64) -> bool;

    /// Activate the last-viewed (or first) channel.
    fn select_default_channel(&mut self);

    /// Redraw once.
    fn refresh(&mut self);
}
