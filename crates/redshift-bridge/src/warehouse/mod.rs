//! Warehouse collaborator.

mod redshift;
mod tls;

pub use redshift::RedshiftPool;
pub use tls::{connector, SslMode};

use async_trait::async_trait;

use crate::error::Result;
use crate::frame::{from_text_rows, DataFrame};
use crate::statement::GeneratedStatement;

#[cfg(test)]
use mockall::automock;

/// Result of one executed statement.
///
/// Cells are kept in the warehouse's text representation; `None` is NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub rows_affected: u64,
}

impl QueryOutput {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Default::default()
        }
    }

    pub fn into_frame(self) -> Result<DataFrame> {
        from_text_rows(self.columns, &self.rows)
    }
}

/// Executes statements against the warehouse.
///
/// Errors are reported as `BridgeError::WarehouseExecution` carrying the
/// redacted statement text.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, statement: &GeneratedStatement) -> Result<QueryOutput>;
}
