//! # redshift-bridge
//!
//! Move tables between memory, S3 and Amazon Redshift.
//!
//! This library provides:
//!
//! - **Type inference** from in-memory column types to Redshift column types
//! - **Statement generation** for CREATE TABLE, COPY and UNLOAD
//! - **Staged transfers** that upload, load and clean up in a fixed order
//! - **Dry-run mode** that renders statements without touching S3 or Redshift
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use redshift_bridge::{
//!     Config, ExistencePolicy, FacadeSettings, LoadSource, ObjectStoreBackend, RedshiftPool,
//!     TransferFacade,
//! };
//!
//! #[tokio::main]
//! async fn main() -> redshift_bridge::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let warehouse = RedshiftPool::new(config.require_warehouse("load")?).await?;
//!     let store = ObjectStoreBackend::new(config.object_store.clone());
//!     let facade = TransferFacade::new(
//!         Arc::new(store),
//!         Arc::new(warehouse),
//!         FacadeSettings::from_config(&config.transfer),
//!     );
//!
//!     let frame = redshift_bridge::frame::from_delimited(
//!         b"id,name\n1,alpha\n",
//!         &Default::default(),
//!     )?;
//!     let table = facade.infer_definition(
//!         &frame,
//!         "public.events".parse()?,
//!         ExistencePolicy::DropFirst,
//!         &Default::default(),
//!     )?;
//!     facade
//!         .load(LoadSource::Frame(&frame), &table, &config.transfer.options)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod frame;
pub mod schema;
pub mod staging;
pub mod statement;
pub mod store;
pub mod typemap;
pub mod warehouse;

// Re-exports for convenient access
pub use codec::Compression;
pub use config::{Config, ObjectStoreConfig, StoreBackend, TransferConfig, WarehouseConfig};
pub use error::{BridgeError, Result};
pub use facade::{FacadeSettings, LoadReport, LoadSource, Outcome, TransferFacade};
pub use frame::{DataFrame, SemanticType, Series, Value};
pub use schema::{ColumnSpec, ExistencePolicy, QualifiedName, TableDefinition};
pub use staging::{CleanupWarning, StagedArtifact, StagingCoordinator, StagingState};
pub use statement::{Credentials, GeneratedStatement, StagedLocation, TransferOptions};
pub use store::{ObjectStoreBackend, StagingStore, StoreError};
pub use typemap::{TextSizing, TypeMapper};
pub use warehouse::{QueryOutput, RedshiftPool, Warehouse};
