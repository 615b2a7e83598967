//! Event dispatcher: type tag -> handler -> presentation sink mutations.
//!
//! Each handler takes the event plus a [`Replay`] mode. Under
//! `Replay::Backlog` the handlers skip the mutations the backlog's structural
//! pass already made (channel creation, roster seeding) and keep only the
//! transcript record. Live dispatch of a recognized event is followed by
//! exactly one refresh; backlog dispatch never refreshes per event.
//!
//! | tag                  | suppressed under `Replay::Backlog`      |
//! |----------------------|-----------------------------------------|
//! | `channel_init`       | channel creation                        |
//! | `you_parted_channel` | everything                              |
//! | `buffer_msg`         | nothing (still gated on a known channel) |
//! | `joined_channel`     | roster add                              |
//! | `parted_channel`     | roster removal                          |
//! | `quit`               | roster removal                          |
//! | `nickchange`, `channel_topic`, `makebuffer`, `buffer_me_msg` | nothing |

use crate::event::{Event, EventKind};
use crate::format;
use crate::sink::PresentationSink;

/// Whether an event is new or is catching the view up from backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    Live,
    Backlog,
}

impl Replay {
    pub fn is_backlog(self) -> bool {
        self == Replay::Backlog
    }
}

type Handler<S> = fn(&mut Dispatcher<S>, &Event, Replay);

/// Applies events to a [`PresentationSink`].
pub struct Dispatcher<S> {
    sink: S,
}

impl<S: PresentationSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Apply one event. Unrecognized tags are a no-op: no sink call, no refresh.
    ///
    /// `oob_include` is not handled here; the event pump intercepts it and
    /// runs the backlog reconciler instead.
    pub fn dispatch(&mut self, event: &Event, replay: Replay) {
        let Some(handler) = Self::handler_for(&event.kind) else {
            tracing::trace!(kind = event.kind.tag(), "no handler for event, ignoring");
            return;
        };

        handler(self, event, replay);

        if replay == Replay::Live {
            self.sink.refresh();
        }
    }

    fn handler_for(kind: &EventKind) -> Option<Handler<S>> {
        let handler: Handler<S> = match kind {
            EventKind::ChannelInit => Self::on_channel_init,
            EventKind::YouPartedChannel => Self::on_you_parted_channel,
            EventKind::BufferMsg => Self::on_buffer_msg,
            EventKind::JoinedChannel => Self::on_joined_channel,
            EventKind::PartedChannel => Self::on_parted_channel,
            EventKind::NickChange => Self::on_nick_change,
            EventKind::ChannelTopic => Self::on_channel_topic,
            EventKind::MakeBuffer => Self::on_make_buffer,
            EventKind::BufferMeMsg => Self::on_buffer_me_msg,
            EventKind::Quit => Self::on_quit,
            EventKind::OobInclude | EventKind::Unknown(_) => return None,
        };
        Some(handler)
    }

    /// Create the channel described by a `channel_init` event.
    ///
    /// Shared by the live handler and the backlog structural pass.
    pub fn init_channel(&mut self, event: &Event) {
        let Some(chan) = event.chan.as_deref() else {
            tracing::debug!("channel_init without chan, ignoring");
            return;
        };
        let header = format::display_topic(event.topic.as_ref());
        self.sink
            .create_channel(chan, &header, event.ids(), &event.member_nicks());
    }

    fn on_channel_init(&mut self, event: &Event, replay: Replay) {
        if !replay.is_backlog() {
            self.init_channel(event);
        }
    }

    fn on_you_parted_channel(&mut self, event: &Event, replay: Replay) {
        if replay.is_backlog() {
            return;
        }
        if let Some(chan) = event.chan.as_deref() {
            self.sink.remove_channel(chan);
        }
    }

    fn on_buffer_msg(&mut self, event: &Event, _replay: Replay) {
        let (Some(chan), Some(from), Some(msg)) = (
            event.chan.as_deref(),
            event.from.as_deref(),
            event.msg.as_deref(),
        ) else {
            return;
        };
        // Messages for channels the view has not created yet are dropped.
        if !self.sink.has_channel(chan) {
            tracing::trace!(chan, "buffer_msg for unknown channel dropped");
            return;
        }
        let line = format::message_line(event.timestamp_micros(), from, msg);
        self.sink.register_activity(chan, msg);
        self.sink.append_line(chan, event.ids().bid, &line);
    }

    fn on_joined_channel(&mut self, event: &Event, replay: Replay) {
        let (Some(chan), Some(nick)) = (event.chan.as_deref(), event.nick.as_deref()) else {
            return;
        };
        let bid = event.ids().bid;
        if !replay.is_backlog() {
            self.sink.add_user(chan, nick, bid);
        }
        let hostmask = event.hostmask.as_deref().unwrap_or_default();
        let line = format::join_line(event.timestamp_micros(), nick, hostmask);
        self.sink.append_line(chan, bid, &line);
    }

    fn on_parted_channel(&mut self, event: &Event, replay: Replay) {
        let (Some(chan), Some(nick)) = (event.chan.as_deref(), event.nick.as_deref()) else {
            return;
        };
        let bid = event.ids().bid;
        if !replay.is_backlog() {
            self.sink.remove_user(chan, nick, bid);
        }
        let hostmask = event.hostmask.as_deref().unwrap_or_default();
        let line = format::part_line(event.timestamp_micros(), nick, hostmask);
        self.sink.append_line(chan, bid, &line);
    }

    fn on_nick_change(&mut self, event: &Event, _replay: Replay) {
        let (Some(chan), Some(old), Some(new)) = (
            event.chan.as_deref(),
            event.oldnick.as_deref(),
            event.newnick.as_deref(),
        ) else {
            return;
        };
        let time = event.timestamp_micros();
        let bid = event.ids().bid;
        if self.sink.rename_user(chan, old, new, time, bid) {
            self.sink
                .append_line(chan, bid, &format::nick_line(time, old, new));
        }
    }

    fn on_channel_topic(&mut self, event: &Event, _replay: Replay) {
        let Some(chan) = event.chan.as_deref() else {
            return;
        };
        let author = event
            .author
            .as_deref()
            .or(event.from.as_deref())
            .unwrap_or_default();
        let text = event
            .topic
            .as_ref()
            .and_then(|t| t.text())
            .unwrap_or_default();
        let time = event.timestamp_micros();
        let bid = event.ids().bid;
        if self.sink.set_topic(chan, author, text, time, bid) {
            self.sink
                .append_line(chan, bid, &format::topic_line(time, author, text));
        }
    }

    fn on_make_buffer(&mut self, event: &Event, _replay: Replay) {
        if event.buffer_type.as_deref() != Some("conversation") {
            return;
        }
        let Some(name) = event.name.as_deref() else {
            return;
        };
        let header = format::conversation_header(event.created.unwrap_or(0));
        self.sink.create_channel(name, &header, event.ids(), &[]);
    }

    fn on_buffer_me_msg(&mut self, event: &Event, _replay: Replay) {
        let (Some(chan), Some(from), Some(msg)) = (
            event.chan.as_deref(),
            event.from.as_deref(),
            event.msg.as_deref(),
        ) else {
            return;
        };
        let line = format::action_line(event.timestamp_micros(), from, msg);
        self.sink.append_line(chan, event.ids().bid, &line);
    }

    fn on_quit(&mut self, event: &Event, replay: Replay) {
        let (Some(chan), Some(nick)) = (event.chan.as_deref(), event.nick.as_deref()) else {
            return;
        };
        let bid = event.ids().bid;
        if !replay.is_backlog() {
            self.sink.remove_user(chan, nick, bid);
        }
        let hostmask = event.hostmask.as_deref().unwrap_or_default();
        let reason = event.msg.as_deref().unwrap_or_default();
        let line = format::quit_line(event.timestamp_micros(), nick, hostmask, reason);
        self.sink.append_line(chan, bid, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode;
    use crate::sink::BufferIds;
    use crate::sink::testing::{RecordingSink, SinkCall};

    fn ev(json: &str) -> Event {
        decode(json.as_bytes()).expect("test event should decode")
    }

    fn with_channel() -> Dispatcher<RecordingSink> {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(
            &ev(r##"{"type":"channel_init","chan":"#x","cid":1,"bid":2,"members":[{"nick":"a"},{"nick":"b"}]}"##),
            Replay::Live,
        );
        d.sink_mut().calls.clear();
        d
    }

    #[test]
    fn live_channel_init_creates_channel_and_refreshes() {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(
            &ev(r##"{"type":"channel_init","chan":"#x","cid":1,"bid":2,"topic":{"text":"hi"},"members":[{"nick":"a"}]}"##),
            Replay::Live,
        );
        assert_eq!(
            d.sink().calls,
            vec![
                SinkCall::CreateChannel {
                    name: "#x".into(),
                    header: "hi".into(),
                    ids: BufferIds { cid: 1, bid: 2 },
                    members: vec!["a".into()],
                },
                SinkCall::Refresh,
            ]
        );
    }

    #[test]
    fn backlog_channel_init_is_silent() {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(
            &ev(r##"{"type":"channel_init","chan":"#x","members":[]}"##),
            Replay::Backlog,
        );
        assert!(d.sink().calls.is_empty());
    }

    #[test]
    fn unknown_tag_makes_no_calls() {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(&ev(r#"{"type":"foo_bar","chan":"x"}"#), Replay::Live);
        d.dispatch(&ev(r#"{"type":"foo_bar"}"#), Replay::Backlog);
        assert!(d.sink().calls.is_empty());
    }

    #[test]
    fn oob_include_is_not_dispatched() {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(&ev(r#"{"type":"oob_include","url":"/b"}"#), Replay::Live);
        assert!(d.sink().calls.is_empty());
    }

    #[test]
    fn live_join_adds_user_and_line() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"joined_channel","chan":"#x","bid":2,"nick":"c","hostmask":"c@h","eid":0}"##),
            Replay::Live,
        );
        assert_eq!(
            d.sink().calls,
            vec![
                SinkCall::AddUser("#x".into(), "c".into()),
                SinkCall::Line("#x".into(), "[00:00]  -> c joined (c@h)".into()),
                SinkCall::Refresh,
            ]
        );
    }

    #[test]
    fn backlog_join_keeps_line_only() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"joined_channel","chan":"#x","nick":"c","hostmask":"c@h"}"##),
            Replay::Backlog,
        );
        assert_eq!(
            d.sink().calls,
            vec![SinkCall::Line(
                "#x".into(),
                "[00:00]  -> c joined (c@h)".into()
            )]
        );
    }

    #[test]
    fn part_follows_replay_policy() {
        let mut d = with_channel();
        let part = ev(r##"{"type":"parted_channel","chan":"#x","nick":"a","hostmask":"a@h"}"##);

        d.dispatch(&part, Replay::Backlog);
        assert_eq!(d.sink().rosters["#x"], vec!["a".to_string(), "b".to_string()]);

        d.dispatch(&part, Replay::Live);
        assert_eq!(d.sink().rosters["#x"], vec!["b".to_string()]);
        assert_eq!(d.sink().lines("#x").len(), 2);
        assert_eq!(d.sink().refreshes(), 1);
    }

    #[test]
    fn quit_removes_user_and_records_reason() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"quit","chan":"#x","nick":"b","hostmask":"b@host","msg":"Ping timeout","eid":1700000000000000}"##),
            Replay::Live,
        );
        assert_eq!(d.sink().rosters["#x"], vec!["a".to_string()]);
        assert_eq!(
            d.sink().lines("#x"),
            vec!["[22:13]  <- b quit (b@host): Ping timeout".to_string()]
        );
        assert_eq!(d.sink().refreshes(), 1);
    }

    #[test]
    fn backlog_quit_keeps_roster() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"quit","chan":"#x","nick":"b","hostmask":"b@host","msg":"bye"}"##),
            Replay::Backlog,
        );
        assert_eq!(d.sink().rosters["#x"].len(), 2);
        assert_eq!(d.sink().lines("#x").len(), 1);
    }

    #[test]
    fn buffer_msg_requires_known_channel() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"buffer_msg","chan":"#nowhere","from":"a","msg":"hi"}"##),
            Replay::Live,
        );
        assert_eq!(d.sink().calls, vec![SinkCall::Refresh]);

        d.sink_mut().calls.clear();
        d.dispatch(
            &ev(r##"{"type":"buffer_msg","chan":"#x","from":"a","msg":"hi"}"##),
            Replay::Backlog,
        );
        assert_eq!(
            d.sink().calls,
            vec![
                SinkCall::Activity("#x".into()),
                SinkCall::Line("#x".into(), "[00:00] <a> hi".into()),
            ]
        );
    }

    #[test]
    fn you_parted_removes_channel_only_when_live() {
        let mut d = with_channel();
        let parted = ev(r##"{"type":"you_parted_channel","chan":"#x"}"##);
        d.dispatch(&parted, Replay::Backlog);
        assert!(d.sink().calls.is_empty());

        d.dispatch(&parted, Replay::Live);
        assert_eq!(
            d.sink().calls,
            vec![SinkCall::RemoveChannel("#x".into()), SinkCall::Refresh]
        );
    }

    #[test]
    fn nick_change_applies_in_both_modes() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"nickchange","chan":"#x","oldnick":"a","newnick":"alice"}"##),
            Replay::Backlog,
        );
        assert_eq!(d.sink().rosters["#x"], vec!["alice".to_string(), "b".to_string()]);
        assert_eq!(
            d.sink().lines("#x"),
            vec!["[00:00]  a is now known as alice".to_string()]
        );
    }

    #[test]
    fn nick_change_of_unknown_user_writes_nothing() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"nickchange","chan":"#x","oldnick":"zed","newnick":"zz"}"##),
            Replay::Live,
        );
        assert!(d.sink().lines("#x").is_empty());
        assert_eq!(d.sink().refreshes(), 1);
    }

    #[test]
    fn topic_change_sets_topic_and_line() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"channel_topic","chan":"#x","author":"op","topic":"new topic"}"##),
            Replay::Backlog,
        );
        assert_eq!(
            d.sink().calls,
            vec![
                SinkCall::SetTopic("#x".into(), "op".into(), "new topic".into()),
                SinkCall::Line(
                    "#x".into(),
                    "[00:00]  op changed the topic to: new topic".into()
                ),
            ]
        );
    }

    #[test]
    fn makebuffer_creates_conversation_only() {
        let mut d = Dispatcher::new(RecordingSink::default());
        d.dispatch(
            &ev(r#"{"type":"makebuffer","buffer_type":"channel","name":"chan"}"#),
            Replay::Live,
        );
        assert_eq!(d.sink().calls, vec![SinkCall::Refresh]);

        d.sink_mut().calls.clear();
        d.dispatch(
            &ev(r#"{"type":"makebuffer","buffer_type":"conversation","name":"bob","cid":1,"bid":9,"created":1700000000000000}"#),
            Replay::Backlog,
        );
        assert_eq!(
            d.sink().calls,
            vec![SinkCall::CreateChannel {
                name: "bob".into(),
                header: "Chatting since: Tue Nov 14 22:13:20 UTC 2023".into(),
                ids: BufferIds { cid: 1, bid: 9 },
                members: vec![],
            }]
        );
    }

    #[test]
    fn action_message_appends_line() {
        let mut d = with_channel();
        d.dispatch(
            &ev(r##"{"type":"buffer_me_msg","chan":"#x","from":"a","msg":"waves"}"##),
            Replay::Live,
        );
        assert_eq!(d.sink().lines("#x"), vec!["[00:00] * a waves".to_string()]);
        assert_eq!(d.sink().refreshes(), 1);
    }

    #[test]
    fn missing_fields_are_reference_misses() {
        let mut d = with_channel();
        d.dispatch(&ev(r#"{"type":"joined_channel","nick":"c"}"#), Replay::Live);
        d.dispatch(&ev(r#"{"type":"quit"}"#), Replay::Live);
        assert_eq!(d.sink().calls, vec![SinkCall::Refresh, SinkCall::Refresh]);
    }
}
