use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the fetch client once retries are spent.
///
/// A non-2xx answer is not an error; it comes back as `FetchOutcome::NotAvailable`.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("document cache I/O failed for {id}: {source}")]
    Cache {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors from the OpenAI-compatible completion endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("completion contained no text")]
    EmptyResponse,

    #[error("response was not the expected JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no API key configured")]
    MissingApiKey,
}

/// Run-level input problems. Any of these aborts before workers start.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("no PMC identifiers found in {origin}")]
    NoIds { origin: String },
}

/// Pipeline stage an item was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Extracting,
    Persisting,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Persisting => "persisting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item failure, caught at the orchestrator boundary.
#[derive(Debug, Error)]
#[error("{stage}: {message}")]
pub struct PipelineError {
    pub stage: Stage,
    pub message: String,
}

impl PipelineError {
    pub fn new(stage: Stage, err: impl std::fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}
