//! Configuration validation.

use super::{Config, StoreBackend};
use crate::error::{BridgeError, Result};
use crate::warehouse::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if let Some(wh) = &config.warehouse {
        if wh.host.is_empty() {
            return Err(BridgeError::Config("warehouse.host is required".into()));
        }
        if wh.database.is_empty() {
            return Err(BridgeError::Config("warehouse.database is required".into()));
        }
        if wh.user.is_empty() {
            return Err(BridgeError::Config("warehouse.user is required".into()));
        }
        if wh.port == 0 {
            return Err(BridgeError::Config("warehouse.port cannot be 0".into()));
        }
        if wh.max_connections == 0 {
            return Err(BridgeError::Config(
                "warehouse.max_connections must be at least 1".into(),
            ));
        }
        SslMode::parse(&wh.ssl_mode)?;
    }

    let os = &config.object_store;
    if os.backend == StoreBackend::S3
        && os.access_key_id.is_some() != os.secret_access_key.is_some()
    {
        return Err(BridgeError::Config(
            "object_store.access_key_id and object_store.secret_access_key must be set together"
                .into(),
        ));
    }

    let t = &config.transfer;
    if t.staging_prefix.starts_with('/') {
        return Err(BridgeError::Config(format!(
            "transfer.staging_prefix must be relative to the bucket, got '{}'",
            t.staging_prefix
        )));
    }
    if t.text_sizing.floor == 0 {
        return Err(BridgeError::Config(
            "transfer.text_sizing.floor must be at least 1".into(),
        ));
    }
    if t.text_sizing.floor > t.text_sizing.cap || t.text_sizing.cap > 65535 {
        return Err(BridgeError::Config(format!(
            "transfer.text_sizing must satisfy floor <= cap <= 65535, got floor={} cap={}",
            t.text_sizing.floor, t.text_sizing.cap
        )));
    }
    if matches!(&t.iam_role, Some(arn) if arn.is_empty()) {
        return Err(BridgeError::Config(
            "transfer.iam_role cannot be empty".into(),
        ));
    }

    Ok(())
}
