//! The event pump: single consumer of the event queue.
//!
//! Live events go straight to the dispatcher. An `oob_include` event stops the
//! pump while the backlog is fetched and reconciled; events arriving in the
//! meantime wait in the queue (and backpressure the transport once it is
//! full), so no live event is applied before the history it builds on.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::backlog::{self, BacklogFetcher};
use crate::config::PipelineConfig;
use crate::dispatch::{Dispatcher, Replay};
use crate::event::{Event, EventKind};
use crate::queue::{EventReceiver, EventSubmitter, event_queue};
use crate::sink::PresentationSink;

pub struct Pipeline<S> {
    config: PipelineConfig,
    session_token: String,
    fetcher: Arc<dyn BacklogFetcher>,
    dispatcher: Dispatcher<S>,
}

impl<S: PresentationSink + Send + 'static> Pipeline<S> {
    pub fn new(
        config: PipelineConfig,
        session_token: impl Into<String>,
        fetcher: Arc<dyn BacklogFetcher>,
        sink: S,
    ) -> Self {
        Self {
            config,
            session_token: session_token.into(),
            fetcher,
            dispatcher: Dispatcher::new(sink),
        }
    }

    /// Create the queue and run the pump on a tokio task.
    ///
    /// The task resolves to the sink once every [`EventSubmitter`] clone has
    /// been dropped and the queue is drained.
    pub fn spawn(self) -> (EventSubmitter, JoinHandle<S>) {
        let (submitter, events) = event_queue(self.config.effective_queue_capacity());
        let handle = tokio::spawn(self.run(events));
        (submitter, handle)
    }

    /// Drain `events` until the queue closes.
    pub async fn run(mut self, mut events: EventReceiver) -> S {
        tracing::debug!(
            capacity = self.config.effective_queue_capacity(),
            "Event pump started"
        );
        while let Some(event) = events.next().await {
            self.process(event).await;
        }
        tracing::debug!("Event queue closed, pump stopping");
        self.dispatcher.into_sink()
    }

    async fn process(&mut self, event: Event) {
        match event.kind {
            EventKind::OobInclude => self.include_backlog(&event).await,
            _ => self.dispatcher.dispatch(&event, Replay::Live),
        }
    }

    async fn include_backlog(&mut self, event: &Event) {
        let Some(include) = event.oob_include() else {
            tracing::warn!("oob_include without a backlog url, ignoring");
            return;
        };

        let policy = self.config.backlog.retry_policy();
        let batch = match backlog::fetch_with_retry(
            self.fetcher.as_ref(),
            &self.session_token,
            &include.url,
            &policy,
        )
        .await
        {
            Ok(body) => backlog::parse_backlog(&body),
            Err(e) => {
                tracing::warn!(error = %e, url = %include.url, "Backlog unavailable, replaying nothing");
                Vec::new()
            }
        };

        let stats = backlog::reconcile(batch, &mut self.dispatcher);
        tracing::info!(
            channels = stats.channels,
            events = stats.events,
            "Backlog reconciled"
        );
    }
}
