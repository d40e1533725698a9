//! Error types for the transfer library.

use thiserror::Error;

use crate::staging::StagingState;
use crate::store::StoreError;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A column's in-memory type has no warehouse equivalent
    #[error("Unsupported type for column {column}: {semantic_type} ({reason})")]
    UnsupportedColumnType {
        column: String,
        semantic_type: String,
        reason: String,
    },

    /// Transfer options are contradictory or incomplete
    #[error("Invalid transfer options: {0}")]
    InvalidTransferOptions(String),

    /// CREATE TABLE requested with no columns
    #[error("Table {0} has no columns")]
    EmptyTableDefinition(String),

    /// Table definition failed validation
    #[error("Invalid table definition: {0}")]
    InvalidTableDefinition(String),

    /// Object store call failed during a transfer
    #[error("Staging failed after reaching {reached}: {source}")]
    StagingTransport {
        reached: StagingState,
        #[source]
        source: StoreError,
    },

    /// Coordinator method called out of order
    #[error("Staging coordinator is {actual}, expected {expected}")]
    StagingOrder {
        expected: &'static str,
        actual: StagingState,
    },

    /// Warehouse rejected or failed a statement
    #[error("Warehouse execution failed: {message}\n  Statement: {statement}")]
    WarehouseExecution { statement: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// In-memory table could not be built, parsed or serialized
    #[error("Frame error: {0}")]
    Frame(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited text error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BridgeError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        BridgeError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn unsupported(
        column: impl Into<String>,
        semantic_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BridgeError::UnsupportedColumnType {
            column: column.into(),
            semantic_type: semantic_type.into(),
            reason: reason.into(),
        }
    }

    pub fn options(message: impl Into<String>) -> Self {
        BridgeError::InvalidTransferOptions(message.into())
    }

    pub fn staging(reached: StagingState, source: StoreError) -> Self {
        BridgeError::StagingTransport { reached, source }
    }

    /// Create a WarehouseExecution error. `statement` must already be redacted.
    pub fn execution(statement: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::WarehouseExecution {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// True for errors raised before any collaborator was contacted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_)
                | BridgeError::UnsupportedColumnType { .. }
                | BridgeError::InvalidTransferOptions(_)
                | BridgeError::EmptyTableDefinition(_)
                | BridgeError::InvalidTableDefinition(_)
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Config(_) | BridgeError::Yaml(_) => 2,
            BridgeError::UnsupportedColumnType { .. }
            | BridgeError::InvalidTransferOptions(_)
            | BridgeError::EmptyTableDefinition(_)
            | BridgeError::InvalidTableDefinition(_) => 3,
            BridgeError::StagingTransport { .. } | BridgeError::StagingOrder { .. } => 4,
            BridgeError::WarehouseExecution { .. } | BridgeError::Pool { .. } => 5,
            BridgeError::Frame(_) | BridgeError::Csv(_) | BridgeError::Json(_) => 6,
            BridgeError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_classified() {
        assert!(BridgeError::options("bad").is_validation());
        assert!(BridgeError::EmptyTableDefinition("t".into()).is_validation());
        assert!(!BridgeError::execution("COPY", "boom").is_validation());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BridgeError::Config("x".into()).exit_code(), 2);
        assert_eq!(BridgeError::options("x").exit_code(), 3);
        assert_eq!(BridgeError::execution("s", "m").exit_code(), 5);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = BridgeError::staging(
            StagingState::Idle,
            StoreError::transport("put", "s3://b/k", "connection reset"),
        );
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Staging failed after reaching Idle"));
        assert!(detailed.contains("Caused by:\n  1:"));
        assert!(detailed.contains("connection reset"));
    }
}
