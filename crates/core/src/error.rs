//! # Kernel Errors
//!
//! Typed failures at the three external seams (store, bus, oracle) plus
//! topology lookups. Application glue wraps these in `anyhow`.

use thiserror::Error;

/// Failure reported by an [`ArtifactStore`](crate::store::ArtifactStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("artifact not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("invalid artifact location: {0}")]
    InvalidLocation(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Failure reported by a [`MessageBus`](crate::bus::MessageBus).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("topic name must not be empty")]
    EmptyTopic,

    #[error("bus closed: {0}")]
    Closed(String),
}

/// Failure reported by a [`DecisionOracle`](crate::oracle::DecisionOracle).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),

    #[error("malformed oracle output: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("unknown agent role: {0}")]
    UnknownRole(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("interview-records", "conv-1.txt");
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "artifact not found: interview-records/conv-1.txt"
        );
    }
}
