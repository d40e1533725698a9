//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::statement::{Credentials, TransferOptions};
use crate::typemap::TextSizing;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Redshift connection. Only needed by operations that run statements.
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    /// Object store used for staging and unload output.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Transfer behavior.
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Redshift connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Cluster endpoint host.
    pub host: String,

    /// Port (default: 5439).
    #[serde(default = "default_redshift_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    /// Process-local store, for tests and local experiments.
    Memory,
}

/// Object store client settings.
///
/// Unset credentials fall back to the standard AWS environment variables.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub session_token: Option<String>,

    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub allow_http: bool,
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ObjectStoreConfig")
            .field("backend", &self.backend)
            .field("region", &self.region)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// Transfer behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Render statements instead of running them.
    #[serde(default)]
    pub dry_run: bool,

    /// Bucket for staged load files.
    #[serde(default)]
    pub staging_bucket: String,

    /// Key prefix for staged load files (default: "redshift-bridge").
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,

    /// IAM role the warehouse assumes to reach the object store. Used when
    /// the per-call options carry no credentials.
    #[serde(default)]
    pub iam_role: Option<String>,

    /// varchar sizing for inferred text columns.
    #[serde(default)]
    pub text_sizing: TextSizing,

    /// Defaults for load, unload and read options.
    #[serde(default)]
    pub options: TransferOptions,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            staging_bucket: String::new(),
            staging_prefix: default_staging_prefix(),
            iam_role: None,
            text_sizing: TextSizing::default(),
            options: TransferOptions::default(),
        }
    }
}

impl TransferConfig {
    /// Credentials to apply when a call does not bring its own.
    pub fn default_credentials(&self) -> Option<Credentials> {
        self.options.credentials.clone().or_else(|| {
            self.iam_role
                .as_ref()
                .map(|arn| Credentials::IamRole { arn: arn.clone() })
        })
    }
}

fn default_redshift_port() -> u16 {
    5439
}

fn default_require() -> String {
    "require".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_staging_prefix() -> String {
    "redshift-bridge".to_string()
}
