//! Error taxonomy for the fingerprinting engine.
//!
//! Mirrors the kinds described in the engine design: input errors,
//! capacity/fingerprint errors, and store errors. Fingerprint-empty on
//! `identify` is deliberately *not* a variant here; it is modeled as
//! `Ok(None)` by the matcher, a legitimate "no match" outcome rather than
//! a failure. Capacity events (fingerprint cap reached, query truncated) are
//! not variants either, since they are non-fatal by definition; see
//! [`CapacityWarning`].

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("input audio is empty")]
    EmptyInput,

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("no fingerprints could be generated from this audio")]
    NoFingerprints,

    #[error("a song with file_path {0:?} is already ingested")]
    DuplicatePath(PathBuf),

    #[error("song {0} not found")]
    NotFound(u64),

    #[error("failed to decode audio file {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema mismatch: store was created with {found}, engine expects {expected}")]
    SchemaMismatch { expected: String, found: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Non-fatal capacity event. Carried on the success path of `ingest`/
/// `identify` rather than raised as an `EngineError`: the call still
/// succeeded, it just hit a configured bound along the way.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum CapacityWarning {
    FingerprintCapReached { limit: usize },
    QueryTruncated { truncated_seconds: f32 },
}
