// 🚨 Error taxonomy
//
// Scope of each error:
//   ParseError        one record, caller chooses skip or abort
//   JobFetchError     one provider, absorbed at the worker boundary
//   NoProvidersError  one orchestrator run, nothing dispatched
//   PersistenceError  the whole batch, always rolled back

use thiserror::Error;

/// Price or record text that cannot be turned into a PricePoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Cleaned price text contains no digits
    #[error("no digits in price text {0:?}")]
    NoDigits(String),

    /// Digits present but the result is not a decimal
    #[error("invalid price {raw:?} (cleaned to {cleaned:?})")]
    InvalidNumber { raw: String, cleaned: String },

    /// Both retail and promotional text are empty
    #[error("record has neither a retail nor a promotional price")]
    MissingPrice,

    /// A field that forms an identity key is blank
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Failure of a single scrape job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFetchError {
    /// Source could not be read or decoded
    #[error("source error: {0}")]
    Source(String),

    /// Job did not finish inside the configured timeout
    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// Job task panicked or was cancelled
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl JobFetchError {
    pub fn failed<E: std::fmt::Display>(err: E) -> Self {
        JobFetchError::Source(err.to_string())
    }
}

/// `run()` was called with an empty job set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ProvidersNotFoundException: no scrape jobs registered")]
pub struct NoProvidersError;

/// Storage-layer failure
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// begin/commit/rollback called out of order
    #[error("transaction state error: {0}")]
    Transaction(&'static str),
}

/// Failure of a single `reconcile` call
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Failure that aborts a whole ingest cycle
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    NoProviders(#[from] NoProvidersError),

    /// Batch rolled back after a storage failure
    #[error("ingest rolled back: {0}")]
    Persistence(#[from] PersistenceError),

    /// Batch rolled back because the abort policy rejects unparseable records
    #[error("ingest rolled back at record {hyperlink:?}: {source}")]
    Parse {
        hyperlink: String,
        #[source]
        source: ParseError,
    },
}

/// Configuration loading or validation error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_providers_message_keeps_legacy_name() {
        assert!(NoProvidersError.to_string().contains("ProvidersNotFoundException"));
    }

    #[test]
    fn test_reconcile_error_wraps_parse_error() {
        let err: ReconcileError = ParseError::MissingPrice.into();
        assert!(matches!(err, ReconcileError::Parse(ParseError::MissingPrice)));
        assert_eq!(
            err.to_string(),
            "record has neither a retail nor a promotional price"
        );
    }

    #[test]
    fn test_job_fetch_error_from_display() {
        let err = JobFetchError::failed("connection refused");
        assert_eq!(err, JobFetchError::Source("connection refused".to_string()));
    }
}
