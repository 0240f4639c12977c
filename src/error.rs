use std::path::PathBuf;

/// Errors from the masked error metrics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("sequence lengths differ (truth {truth}, prediction {prediction}, mask {mask})")]
    LengthMismatch {
        truth: usize,
        prediction: usize,
        mask: usize,
    },

    #[error("mask selects no entries")]
    EmptyMask,
}

/// Errors raised while turning a batch into game records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("batch columns are misaligned: {0}")]
    MisalignedBatch(String),

    #[error("game {uuid} has misaligned player columns: {detail}")]
    MisalignedGame { uuid: String, detail: String },
}

/// Errors raised while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not a message envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid payload for {kind}: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read config from {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Top-level error for the monitor and the CLI.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("usage: {0}")]
    Usage(String),
}
