//! cloudirc-replay: feed a recorded (or piped) session event stream through
//! the ingestion pipeline and render the resulting chat view.
//!
//! Input is one JSON event per line. An `oob_include` event triggers a
//! backlog fetch against the configured API host using the session token.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cloudirc_sdk::{ChatView, HttpBacklogFetcher, Pipeline, ViewSnapshot};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Resolved, Session};

#[derive(Parser, Debug)]
#[command(name = "cloudirc-replay", about = "Replay a hosted IRC session event stream")]
pub struct Cli {
    /// Event stream, one JSON message per line ("-" for stdin)
    #[arg(long, default_value = "-")]
    pub input: String,

    /// Session cookie for backlog requests
    #[arg(long, env = "CLOUDIRC_SESSION")]
    pub session_token: Option<String>,

    /// Base URL that relative backlog references are resolved against
    #[arg(long)]
    pub backlog_url: Option<String>,

    /// Maximum number of decoded events waiting for the pump
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Our nick, for mention tracking
    #[arg(long)]
    pub nick: Option<String>,

    /// Config file (defaults to ~/.config/cloudirc/replay.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print every channel transcript after the stream ends
    #[arg(long)]
    pub dump: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with CLOUDIRC_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("CLOUDIRC_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("cloudirc_cli=info".parse()?)
        .add_directive("cloudirc_sdk=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let file_config = Config::load(cli.config.as_deref());
    let mut session = Session::load();
    let resolved = Resolved::merge(&cli, &file_config, &session);
    if resolved.session_token.is_empty() {
        tracing::warn!("No session token configured, backlog requests will be anonymous");
    }

    let fetcher = Arc::new(
        HttpBacklogFetcher::new(&resolved.pipeline.backlog)
            .context("failed to build backlog HTTP client")?,
    );
    let (view, frames) = ChatView::new(&resolved.pipeline.view);
    let (submitter, pump) = Pipeline::new(
        resolved.pipeline.clone(),
        resolved.session_token.clone(),
        fetcher,
        view,
    )
    .spawn();
    let renderer = tokio::spawn(render(frames));

    let reader: Box<dyn AsyncRead + Unpin + Send> = if cli.input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(&cli.input)
            .await
            .with_context(|| format!("can't open {}", cli.input))?;
        Box::new(file)
    };
    let mut lines = BufReader::new(reader).lines();
    let mut fed = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if submitter.is_closed() {
            tracing::warn!("Event pump stopped, discarding remaining input");
            break;
        }
        submitter.submit(line.as_bytes()).await;
        fed += 1;
    }
    drop(submitter);
    tracing::info!(messages = fed, "Input exhausted, draining queue");

    let view = pump.await.context("event pump panicked")?;
    renderer.abort();

    if cli.dump {
        dump(&view);
    }

    session.last_channel = view.active_channel().map(str::to_string);
    session.save();
    Ok(())
}

/// Log every published snapshot until the view is dropped.
async fn render(mut frames: watch::Receiver<ViewSnapshot>) {
    while frames.changed().await.is_ok() {
        let snapshot = frames.borrow_and_update().clone();
        tracing::info!(
            frame = snapshot.frame,
            active = snapshot.active.as_deref().unwrap_or("-"),
            channels = snapshot.channels.len(),
            "View refreshed"
        );
        for channel in &snapshot.channels {
            tracing::debug!(
                channel = %channel.name,
                members = channel.members,
                unread = channel.unread,
                mention = channel.has_mention,
                last = channel.last_line.as_deref().unwrap_or(""),
            );
        }
    }
}

fn dump(view: &ChatView) {
    for channel in view.channels() {
        println!("== {} ({} members)", channel.name, channel.members.len());
        println!("   {}", channel.header);
        if let Some(ref topic) = channel.topic {
            println!("   topic: {} (set by {})", topic.text, topic.author);
        }
        for line in &channel.lines {
            println!("{line}");
        }
        println!();
    }
}
