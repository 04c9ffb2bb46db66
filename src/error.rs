//! Error taxonomy for the rollup pipeline.

use thiserror::Error;

/// Result alias used throughout the pipeline and store modules.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors raised while fetching, aggregating, or reconciling records.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required identifier, credential, or the aggregation attribute is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A temporal property value could not be parsed.
    #[error("cannot parse date property '{property}' value '{value}': {reason}")]
    Parse {
        property: String,
        value: String,
        reason: String,
    },

    /// An existing summary record is missing a property the upsert relies on.
    #[error("record {record_id} has no '{property}' property")]
    SchemaMismatch { record_id: String, property: String },

    /// The remote store rejected a request.
    #[error("Notion API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The remote store answered with something outside its contract.
    #[error("unexpected response from record store: {0}")]
    Protocol(String),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Configuration(message.into())
    }

    /// True for errors that invalidate a single record rather than the run.
    pub fn is_record_local(&self) -> bool {
        matches!(self, SyncError::Parse { .. })
    }
}
