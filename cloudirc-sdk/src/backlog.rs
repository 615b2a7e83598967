//! Backlog fetch, parsing and two-pass reconciliation.
//!
//! The server announces its retained history with an `oob_include` event that
//! points at a JSON array of ordinary events. The pump fetches that array and
//! hands it to [`reconcile`], which applies it in two passes:
//!
//! 1. structural: every `channel_init` creates its channel and roster;
//! 2. content: every event is dispatched with [`Replay::Backlog`].
//!
//! Then the default channel is selected and the sink refreshes exactly once.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::BacklogConfig;
use crate::dispatch::{Dispatcher, Replay};
use crate::envelope::decode;
use crate::error::FetchError;
use crate::event::{Event, EventKind};
use crate::sink::PresentationSink;

/// Source of backlog payloads.
#[async_trait]
pub trait BacklogFetcher: Send + Sync {
    /// Fetch the raw backlog body named by `backlog_ref`.
    async fn fetch(&self, session_token: &str, backlog_ref: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches backlog over HTTPS with the session cookie.
pub struct HttpBacklogFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBacklogFetcher {
    pub fn new(config: &BacklogConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Absolute references are used as-is; anything else is joined to the base URL.
    pub fn resolve(&self, backlog_ref: &str) -> String {
        if backlog_ref.starts_with("https://") || backlog_ref.starts_with("http://") {
            backlog_ref.to_string()
        } else if backlog_ref.starts_with('/') {
            format!("{}{backlog_ref}", self.base_url)
        } else {
            format!("{}/{backlog_ref}", self.base_url)
        }
    }
}

#[async_trait]
impl BacklogFetcher for HttpBacklogFetcher {
    async fn fetch(&self, session_token: &str, backlog_ref: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.resolve(backlog_ref);
        tracing::debug!(%url, "fetching backlog");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::COOKIE, format!("session={session_token}"))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        tracing::debug!(bytes = body.len(), "backlog fetched");
        Ok(body.to_vec())
    }
}

/// Exponential backoff for backlog fetch retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        BacklogConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt.min(20) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Fetch with retries. Returns the last error once attempts run out.
pub async fn fetch_with_retry(
    fetcher: &dyn BacklogFetcher,
    session_token: &str,
    backlog_ref: &str,
    policy: &RetryPolicy,
) -> Result<Vec<u8>, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match fetcher.fetch(session_token, backlog_ref).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt + 1 < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Backlog fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parse a backlog body into an ordered batch.
///
/// Elements that fail to decode are dropped; a body that is not a JSON array
/// yields an empty batch.
pub fn parse_backlog(body: &[u8]) -> Vec<Event> {
    let items: Vec<serde_json::Value> = match serde_json::from_slice(body) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "Backlog body is not an event array, replaying nothing");
            return Vec::new();
        }
    };

    let total = items.len();
    let batch: Vec<Event> = items
        .into_iter()
        .filter_map(|item| {
            let raw = serde_json::to_vec(&item).ok()?;
            match decode(&raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed backlog entry");
                    None
                }
            }
        })
        .collect();

    if batch.len() < total {
        tracing::debug!(kept = batch.len(), total, "backlog partially decoded");
    }
    batch
}

/// Counters reported after a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Channels created by the structural pass.
    pub channels: usize,
    /// Events replayed by the content pass.
    pub events: usize,
}

/// Apply a historical batch: structural pass, content pass, one refresh.
pub fn reconcile<S: PresentationSink>(
    batch: Vec<Event>,
    dispatcher: &mut Dispatcher<S>,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for event in batch.iter().filter(|e| e.kind == EventKind::ChannelInit) {
        dispatcher.init_channel(event);
        stats.channels += 1;
    }

    for event in &batch {
        dispatcher.dispatch(event, Replay::Backlog);
        stats.events += 1;
    }

    let sink = dispatcher.sink_mut();
    sink.select_default_channel();
    sink.refresh();

    stats
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::ViewConfig;
    use crate::sink::testing::{RecordingSink, SinkCall};
    use crate::view::ChatView;

    fn batch(json: &str) -> Vec<Event> {
        parse_backlog(json.as_bytes())
    }

    #[test]
    fn parses_array_and_drops_bad_entries() {
        let events = batch(
            r##"[{"type":"channel_init","chan":"#x"},{"chan":"no type"},42,{"type":"buffer_msg","chan":"#x","from":"a","msg":"m"}]"##,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::ChannelInit);
        assert_eq!(events[1].kind, EventKind::BufferMsg);
        assert!(!events[1].raw.is_empty());
    }

    #[test]
    fn non_array_body_yields_empty_batch() {
        assert!(batch(r#"{"type":"buffer_msg"}"#).is_empty());
        assert!(parse_backlog(b"<html>").is_empty());
    }

    #[test]
    fn replayed_join_does_not_duplicate_roster_entry() {
        let (view, _rx) = ChatView::new(&ViewConfig::default());
        let mut dispatcher = Dispatcher::new(view);
        let events = batch(
            r##"[
                {"type":"channel_init","chan":"#x","cid":1,"bid":2,"members":[{"nick":"a"},{"nick":"b"}]},
                {"type":"joined_channel","chan":"#x","bid":2,"nick":"c","hostmask":"c@h"}
            ]"##,
        );

        let stats = reconcile(events, &mut dispatcher);
        assert_eq!(stats, ReconcileStats { channels: 1, events: 2 });

        let view = dispatcher.sink();
        let channel = view.channel("#x").expect("channel created by structural pass");
        // Replayed joins only add a line; the channel_init roster already
        // reflects who was present when the backlog was cut.
        assert_eq!(channel.members, vec!["a", "b"]);
        let joins: Vec<_> = channel
            .lines
            .iter()
            .filter(|l| l.contains("c joined"))
            .collect();
        assert_eq!(joins.len(), 1);
    }

    #[test]
    fn refreshes_exactly_once_regardless_of_batch_size() {
        let mut dispatcher = Dispatcher::new(RecordingSink::default());
        reconcile(Vec::new(), &mut dispatcher);
        assert_eq!(
            dispatcher.sink().calls,
            vec![SinkCall::SelectDefault, SinkCall::Refresh]
        );

        let mut dispatcher = Dispatcher::new(RecordingSink::default());
        let mut json = String::from(r##"[{"type":"channel_init","chan":"#x","members":[]}"##);
        for i in 0..50 {
            json.push_str(&format!(
                r##",{{"type":"buffer_msg","chan":"#x","from":"a","msg":"m{i}"}}"##
            ));
        }
        json.push(']');
        reconcile(batch(&json), &mut dispatcher);

        assert_eq!(dispatcher.sink().refreshes(), 1);
        assert_eq!(dispatcher.sink().lines("#x").len(), 50);
        assert_eq!(dispatcher.sink().calls.last(), Some(&SinkCall::Refresh));
    }

    #[test]
    fn structural_pass_runs_before_content() {
        let mut dispatcher = Dispatcher::new(RecordingSink::default());
        // The message precedes its channel_init in batch order.
        let events = batch(
            r##"[
                {"type":"buffer_msg","chan":"#late","from":"a","msg":"early"},
                {"type":"channel_init","chan":"#late","members":[{"nick":"a"}]}
            ]"##,
        );
        reconcile(events, &mut dispatcher);

        let calls = &dispatcher.sink().calls;
        assert!(matches!(calls[0], SinkCall::CreateChannel { .. }));
        assert_eq!(dispatcher.sink().lines("#late").len(), 1);
        let creates = calls
            .iter()
            .filter(|c| matches!(c, SinkCall::CreateChannel { .. }))
            .count();
        assert_eq!(creates, 1, "content pass must not re-create channels");
    }

    #[test]
    fn retry_delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
    }

    #[test]
    fn resolves_relative_and_absolute_refs() {
        let fetcher = HttpBacklogFetcher::new(&BacklogConfig {
            base_url: "https://api.example.com/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            fetcher.resolve("/chat/backlog?id=1"),
            "https://api.example.com/chat/backlog?id=1"
        );
        assert_eq!(
            fetcher.resolve("chat/backlog"),
            "https://api.example.com/chat/backlog"
        );
        assert_eq!(
            fetcher.resolve("https://other.example.com/b"),
            "https://other.example.com/b"
        );
    }

    struct FlakyFetcher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl BacklogFetcher for FlakyFetcher {
        async fn fetch(&self, _token: &str, _backlog_ref: &str) -> Result<Vec<u8>, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status(503))
            } else {
                Ok(b"[]".to_vec())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let fetcher = FlakyFetcher {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let body = fetch_with_retry(&fetcher, "tok", "/b", &fast_policy(3))
            .await
            .expect("third attempt succeeds");
        assert_eq!(body, b"[]".to_vec());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fetcher = FlakyFetcher {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = fetch_with_retry(&fetcher, "tok", "/b", &fast_policy(2))
            .await
            .expect_err("never succeeds");
        assert!(matches!(err, FetchError::Status(503)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    /// Serve exactly one HTTP/1.1 response on a loopback port. The handle
    /// resolves to the raw request head.
    async fn serve_once(
        status: &'static str,
        body: &'static [u8],
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            // The client may hang up early on an error status.
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.write_all(body).await;
            let _ = stream.shutdown().await;
            String::from_utf8_lossy(&head).into_owned()
        });
        (base_url, handle)
    }

    fn http_fetcher(base_url: String) -> HttpBacklogFetcher {
        HttpBacklogFetcher::new(&BacklogConfig {
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn http_fetch_sends_session_cookie_and_returns_body() {
        const BODY: &[u8] = br##"[{"type":"channel_init","chan":"#x"}]"##;
        let (base_url, server) = serve_once("200 OK", BODY).await;

        let body = http_fetcher(base_url)
            .fetch("tok", "/chat/backlog?id=7")
            .await
            .expect("200 response");
        assert_eq!(body, BODY.to_vec());

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /chat/backlog?id=7 HTTP/1.1\r\n"), "{head}");
        assert!(
            head.lines()
                .any(|l| l.to_ascii_lowercase() == "cookie: session=tok"),
            "{head}"
        );
    }

    #[tokio::test]
    async fn http_fetch_maps_error_status() {
        let (base_url, server) = serve_once("503 Service Unavailable", b"busy").await;

        let err = http_fetcher(base_url)
            .fetch("tok", "chat/backlog")
            .await
            .expect_err("503 is not a backlog");
        assert!(matches!(err, FetchError::Status(503)), "{err:?}");

        let head = server.await.unwrap();
        assert!(head.starts_with("GET /chat/backlog HTTP/1.1\r\n"), "{head}");
    }
}
