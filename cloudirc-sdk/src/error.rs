//! Error types for the ingestion pipeline.
//!
//! None of these are fatal: a failed decode drops one message and a failed
//! backlog fetch degrades to an empty replay.

use thiserror::Error;

/// A pushed message could not be decoded into an event envelope.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The backlog could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure.
    #[error("backlog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("backlog request returned HTTP {0}")]
    Status(u16),
    /// Any other fetcher-specific failure.
    #[error("backlog fetch failed: {0}")]
    Other(String),
}
