//! Redshift connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime, Timeouts};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, SimpleQueryMessage};
use tracing::{debug, info};

use super::{connector, QueryOutput, SslMode, Warehouse};
use crate::config::WarehouseConfig;
use crate::error::{BridgeError, Result};
use crate::frame::Value;
use crate::statement::GeneratedStatement;

/// Pooled connections to a Redshift cluster.
pub struct RedshiftPool {
    pool: Pool,
}

impl RedshiftPool {
    /// Create the pool and check that a connection can be made.
    pub async fn new(config: &WarehouseConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("redshift-bridge");
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let timeouts = Timeouts {
            wait: Some(Duration::from_secs(config.connect_timeout_secs)),
            ..Default::default()
        };

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mgr = match connector(ssl_mode) {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .timeouts(timeouts)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BridgeError::pool(e.to_string(), "creating Redshift pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| BridgeError::pool(e.to_string(), "testing Redshift connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| BridgeError::pool(e.to_string(), "testing Redshift connection"))?;

        info!(
            "Connected to Redshift: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }
}

fn db_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({}): {}", db.message(), db.code().code(), detail),
            None => format!("{} ({})", db.message(), db.code().code()),
        },
        None => e.to_string(),
    }
}

/// Bound values as text parameters; nulls bind as SQL NULL.
fn text_params(values: &[Value]) -> Vec<Option<String>> {
    values.iter().map(Value::to_field).collect()
}

#[async_trait]
impl Warehouse for RedshiftPool {
    async fn execute(&self, statement: &GeneratedStatement) -> Result<QueryOutput> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| BridgeError::pool(e.to_string(), "executing statement"))?;
        let shown = statement.redacted();
        debug!("Executing:\n{}", shown);

        // Bound values travel as text; statements cast placeholders as needed.
        if !statement.bound_values.is_empty() {
            let params = text_params(&statement.bound_values);
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            let prepared = client
                .prepare_typed(&statement.text, &vec![Type::TEXT; params.len()])
                .await
                .map_err(|e| BridgeError::execution(&shown, db_message(&e)))?;
            let rows_affected = client
                .execute(&prepared, &refs)
                .await
                .map_err(|e| BridgeError::execution(&shown, db_message(&e)))?;
            return Ok(QueryOutput::affected(rows_affected));
        }

        let messages = client
            .simple_query(&statement.text)
            .await
            .map_err(|e| BridgeError::execution(&shown, db_message(&e)))?;

        let mut output = QueryOutput::default();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if output.columns.is_empty() {
                        output.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                    }
                    output
                        .rows
                        .push((0..row.len()).map(|i| row.get(i).map(str::to_string)).collect());
                }
                SimpleQueryMessage::CommandComplete(n) => output.rows_affected += n,
                _ => {}
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_params() {
        let params = text_params(&[Value::Int(7), Value::Null, Value::Bool(true)]);
        assert_eq!(
            params,
            vec![Some("7".to_string()), None, Some("true".to_string())]
        );
    }
}
