//! Error types for each collaborator and for a whole run.

use thiserror::Error;

use crate::types::Device;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot contains no versions")]
    Empty,
    #[error("malformed version {version:?} for {device}")]
    MalformedVersion { device: Device, version: String },
    #[error("snapshot is missing required devices: {0}")]
    MissingDevices(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("release page returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not parse release page: {0}")]
    Parse(String),
    #[error("no release statements found on page")]
    NoStatements,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("post rejected with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("refusing to post an empty message")]
    EmptyMessage,
}

/// Failures that abort a whole check run before any store write.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("release source fetch failed: {0}")]
    SourceFetchFailed(SourceError),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),
    #[error("reading stored release for {device} failed: {source}")]
    StoreReadFailed {
        device: Device,
        #[source]
        source: StoreError,
    },
}

impl From<SourceError> for RunError {
    fn from(err: SourceError) -> Self {
        // Validation failures surfaced by the source are structural, not transport.
        match err {
            SourceError::Snapshot(inner) => RunError::InvalidSnapshot(inner),
            other => RunError::SourceFetchFailed(other),
        }
    }
}

/// A check run that completed but left at least one device failed.
#[derive(Debug, Error)]
#[error("{failed} of {total} device updates failed")]
pub struct DegradedRun {
    pub failed: usize,
    pub total: usize,
}
