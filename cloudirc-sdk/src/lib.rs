//! Event ingestion pipeline for hosted IRC sessions.
//!
//! Raw pushed messages are decoded ([`envelope`]), serialized through one
//! bounded queue ([`queue`]) and applied by a single consumer ([`pipeline`])
//! to a presentation sink ([`sink`]). The one-time backlog announced by an
//! `oob_include` event is fetched and reconciled ([`backlog`]) before any later
//! live event is dispatched ([`dispatch`]).

pub mod backlog;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod event;
pub mod format;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod view;

pub use backlog::{BacklogFetcher, HttpBacklogFetcher, ReconcileStats, RetryPolicy};
pub use config::{BacklogConfig, PipelineConfig, ViewConfig};
pub use dispatch::{Dispatcher, Replay};
pub use envelope::{OobInclude, decode};
pub use error::{DecodeError, FetchError};
pub use event::{Event, EventKind, Member, Topic};
pub use pipeline::Pipeline;
pub use queue::{EventReceiver, EventSubmitter, event_queue};
pub use sink::{BufferIds, PresentationSink};
pub use view::{ChatView, ViewSnapshot};
