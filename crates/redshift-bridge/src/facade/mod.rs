//! Entry surface for transfers.
//!
//! [`TransferFacade`] composes statement generation and the staging
//! coordinator. Whether calls execute or only render statements is fixed
//! when the facade is built.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codec::Compression;
use crate::config::TransferConfig;
use crate::error::{BridgeError, Result};
use crate::frame::{from_delimited, DataFrame, Value};
use crate::schema::{ExistencePolicy, QualifiedName, TableDefinition};
use crate::staging::{
    file_needs_encoding, CleanupWarning, StageSource, StagedArtifact, StagingCoordinator,
    StagingState,
};
use crate::statement::{
    build_create_table, build_load_statement, build_unload_statement, Credentials,
    GeneratedStatement, StagedLocation, TransferOptions,
};
use crate::store::{PutOptions, StagingStore};
use crate::typemap::{TextSizing, TypeMapper};
use crate::warehouse::Warehouse;

/// Construction-time settings for a [`TransferFacade`].
#[derive(Debug, Clone, Default)]
pub struct FacadeSettings {
    /// Render statements instead of running them.
    pub dry_run: bool,
    /// Bucket used for staging keys the facade generates.
    pub staging_bucket: String,
    pub staging_prefix: String,
    /// Applied to calls whose options carry no credentials.
    pub default_credentials: Option<Credentials>,
    pub text_sizing: TextSizing,
}

impl FacadeSettings {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            staging_bucket: config.staging_bucket.clone(),
            staging_prefix: config.staging_prefix.clone(),
            default_credentials: config.default_credentials(),
            text_sizing: config.text_sizing,
        }
    }
}

/// Result of a facade call: the value produced, or the statements a dry run
/// would have executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Executed(T),
    DryRun(Vec<GeneratedStatement>),
}

impl<T> Outcome<T> {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Outcome::DryRun(_))
    }

    pub fn executed(self) -> Option<T> {
        match self {
            Outcome::Executed(value) => Some(value),
            Outcome::DryRun(_) => None,
        }
    }

    pub fn statements(&self) -> &[GeneratedStatement] {
        match self {
            Outcome::Executed(_) => &[],
            Outcome::DryRun(statements) => statements,
        }
    }
}

/// Data to load into a table.
#[derive(Debug, Clone, Copy)]
pub enum LoadSource<'a> {
    Frame(&'a DataFrame),
    /// A local delimited file matching the transfer options.
    File(&'a Path),
    /// An object already in the store. It is never deleted.
    Staged(&'a StagedLocation),
}

/// Summary of a completed load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub artifact: StagedArtifact,
    pub rows_loaded: u64,
    pub state: StagingState,
    pub cleanup_warning: Option<CleanupWarning>,
}

/// Create, load, unload and read tables through a staging store.
pub struct TransferFacade {
    store: Arc<dyn StagingStore>,
    warehouse: Arc<dyn Warehouse>,
    settings: FacadeSettings,
    mapper: TypeMapper,
}

impl TransferFacade {
    pub fn new(
        store: Arc<dyn StagingStore>,
        warehouse: Arc<dyn Warehouse>,
        settings: FacadeSettings,
    ) -> Self {
        let mapper = TypeMapper::new(settings.text_sizing);
        Self {
            store,
            warehouse,
            settings,
            mapper,
        }
    }

    pub fn settings(&self) -> &FacadeSettings {
        &self.settings
    }

    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    fn coordinator(&self) -> StagingCoordinator<'_> {
        StagingCoordinator::new(self.store.as_ref(), self.warehouse.as_ref())
    }

    fn effective_options(&self, opts: &TransferOptions) -> TransferOptions {
        let mut opts = opts.clone();
        if opts.credentials.is_none() {
            opts.credentials = self.settings.default_credentials.clone();
        }
        opts
    }

    /// Generated staging location for a load into `table`.
    pub fn staging_location(
        &self,
        table: &QualifiedName,
        opts: &TransferOptions,
    ) -> Result<StagedLocation> {
        if self.settings.staging_bucket.is_empty() {
            return Err(BridgeError::Config(
                "transfer.staging_bucket is required to stage data".into(),
            ));
        }
        let prefix = self.settings.staging_prefix.trim_matches('/');
        let name = format!(
            "{}-{}.csv{}",
            table.table(),
            Uuid::new_v4().simple(),
            opts.compression.extension()
        );
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        Ok(StagedLocation::new(&self.settings.staging_bucket, key))
    }

    /// Create `definition` in the warehouse.
    pub async fn create_table(&self, definition: &TableDefinition) -> Result<Outcome<()>> {
        let statement = build_create_table(definition)?;
        if self.settings.dry_run {
            return self.coordinator().dry_run(vec![statement]).map(Outcome::DryRun);
        }
        self.warehouse.execute(&statement).await?;
        info!("Created table {}", definition.name());
        Ok(Outcome::Executed(()))
    }

    /// Stage `source` under a generated key and load it into `target`.
    ///
    /// The table is created according to its existence policy before the
    /// COPY runs.
    pub async fn load(
        &self,
        source: LoadSource<'_>,
        target: &TableDefinition,
        opts: &TransferOptions,
    ) -> Result<Outcome<LoadReport>> {
        let location = match source {
            LoadSource::Staged(location) => location.clone(),
            LoadSource::Frame(_) | LoadSource::File(_) => {
                self.staging_location(target.name(), opts)?
            }
        };
        self.load_at(source, location, target, opts).await
    }

    /// Like [`TransferFacade::load`] with a caller-chosen staging location.
    ///
    /// For frame and file sources the object is uploaded to `location`; a
    /// key that already exists is overwritten and kept afterwards.
    pub async fn load_at(
        &self,
        source: LoadSource<'_>,
        location: StagedLocation,
        target: &TableDefinition,
        opts: &TransferOptions,
    ) -> Result<Outcome<LoadReport>> {
        let mut opts = self.effective_options(opts);
        match source {
            LoadSource::Staged(_) => {}
            LoadSource::Frame(_) | LoadSource::File(_) if opts.manifest => {
                return Err(BridgeError::options(
                    "manifest loads need an existing manifest object as the source",
                ));
            }
            LoadSource::Frame(_) => {
                opts.null_as = Some(opts.staged_null().to_string());
            }
            LoadSource::File(path) => {
                file_needs_encoding(path, opts.compression)?;
            }
        }
        let columns = opts.columns.as_deref();
        let statements = vec![
            build_create_table(target)?,
            build_load_statement(target.name(), &location, columns, &opts)?,
        ];

        let mut coordinator = self.coordinator();
        if self.settings.dry_run {
            return coordinator.dry_run(statements).map(Outcome::DryRun);
        }

        let subset;
        let stage_source = match source {
            LoadSource::Frame(frame) => match columns {
                Some(cols) => {
                    subset = frame.select(cols)?;
                    StageSource::Frame(&subset)
                }
                None => StageSource::Frame(frame),
            },
            LoadSource::File(path) => StageSource::File(path),
            LoadSource::Staged(_) => StageSource::Existing,
        };

        let artifact = coordinator.stage(stage_source, location, &opts).await?;
        let outputs = coordinator.execute(&statements).await?;
        let rows_loaded = outputs.last().map_or(0, |o| o.rows_affected);
        let cleanup_warning = coordinator.cleanup().await?;
        info!("Loaded {} rows into {}", rows_loaded, target.name());

        Ok(Outcome::Executed(LoadReport {
            artifact,
            rows_loaded,
            state: coordinator.state(),
            cleanup_warning,
        }))
    }

    /// Run `query` as an UNLOAD to `destination` and report the objects
    /// written.
    pub async fn unload(
        &self,
        query: &str,
        destination: &StagedLocation,
        opts: &TransferOptions,
    ) -> Result<Outcome<Vec<StagedArtifact>>> {
        let opts = self.effective_options(opts);
        let statement = build_unload_statement(query, destination, &opts)?;

        let mut coordinator = self.coordinator();
        if self.settings.dry_run {
            return coordinator.dry_run(vec![statement]).map(Outcome::DryRun);
        }
        coordinator
            .unload(&statement, destination, &opts)
            .await
            .map(Outcome::Executed)
    }

    /// Download one delimited object and parse it.
    ///
    /// Compression is taken from the options, or from the key's extension
    /// when the options say none.
    pub async fn read(
        &self,
        location: &StagedLocation,
        opts: &TransferOptions,
    ) -> Result<Outcome<DataFrame>> {
        let compression = read_compression(&location.key, opts);
        opts.validate_for_read(compression)?;
        if self.settings.dry_run {
            info!("[dry-run] would read {}", location);
            return Ok(Outcome::DryRun(Vec::new()));
        }
        self.fetch_frame(location, compression, opts)
            .await
            .map(Outcome::Executed)
    }

    /// Read and concatenate every object under a key prefix, skipping
    /// manifests.
    pub async fn read_prefix(
        &self,
        prefix: &StagedLocation,
        opts: &TransferOptions,
    ) -> Result<Outcome<DataFrame>> {
        opts.validate_for_read(read_compression(&prefix.key, opts))?;
        if self.settings.dry_run {
            info!("[dry-run] would read objects under {}", prefix);
            return Ok(Outcome::DryRun(Vec::new()));
        }

        let keys = self
            .store
            .list(&prefix.bucket, &prefix.key)
            .await
            .map_err(|e| BridgeError::staging(StagingState::Idle, e))?;
        let mut frames = Vec::new();
        for key in keys
            .into_iter()
            .filter(|k| !k.ends_with('/') && !k.ends_with("manifest"))
        {
            let compression = read_compression(&key, opts);
            opts.validate_for_read(compression)?;
            let location = StagedLocation::new(&prefix.bucket, key);
            frames.push(self.fetch_frame(&location, compression, opts).await?);
        }
        info!("Read {} object(s) under {}", frames.len(), prefix);
        DataFrame::concat(frames).map(Outcome::Executed)
    }

    async fn fetch_frame(
        &self,
        location: &StagedLocation,
        compression: Compression,
        opts: &TransferOptions,
    ) -> Result<DataFrame> {
        let data = self
            .store
            .get(&location.bucket, &location.key)
            .await
            .map_err(|e| BridgeError::staging(StagingState::Idle, e))?;
        let raw = compression.decode(&data)?;
        from_delimited(&raw, &opts.unloaded_format())
    }

    /// Run a query and return its result set.
    pub async fn query(&self, sql: &str) -> Result<Outcome<DataFrame>> {
        let statement = GeneratedStatement::new(sql.trim());
        if self.settings.dry_run {
            return self.coordinator().dry_run(vec![statement]).map(Outcome::DryRun);
        }
        self.warehouse.execute(&statement).await?.into_frame().map(Outcome::Executed)
    }

    /// Run a statement with positional `$n` parameters and return the rows
    /// it affected. Parameters are sent as text.
    pub async fn execute_with(&self, sql: &str, params: Vec<Value>) -> Result<Outcome<u64>> {
        let statement = GeneratedStatement::with_values(sql.trim(), params);
        if self.settings.dry_run {
            return self.coordinator().dry_run(vec![statement]).map(Outcome::DryRun);
        }
        let output = self.warehouse.execute(&statement).await?;
        Ok(Outcome::Executed(output.rows_affected))
    }

    /// Derive a table definition from a frame's column types.
    ///
    /// `overrides` maps column names to explicit warehouse types.
    pub fn infer_definition(
        &self,
        frame: &DataFrame,
        name: QualifiedName,
        existence: ExistencePolicy,
        overrides: &HashMap<String, String>,
    ) -> Result<TableDefinition> {
        let columns = self.mapper.infer_columns(frame, overrides)?;
        TableDefinition::builder(name)
            .columns(columns)
            .existence(existence)
            .build()
    }

    /// Upload a local file as-is.
    pub async fn upload_file(
        &self,
        path: &Path,
        location: &StagedLocation,
    ) -> Result<Outcome<StagedArtifact>> {
        if self.settings.dry_run {
            info!("[dry-run] would upload {} to {}", path.display(), location);
            return Ok(Outcome::DryRun(Vec::new()));
        }
        let data = tokio::fs::read(path).await?;
        let existed = self
            .store
            .exists(&location.bucket, &location.key)
            .await
            .map_err(|e| BridgeError::staging(StagingState::Idle, e))?;
        if existed {
            warn!("{} already exists and will be overwritten", location);
        }
        let size = data.len();
        self.store
            .put(
                &location.bucket,
                &location.key,
                Bytes::from(data),
                &PutOptions::default(),
            )
            .await
            .map_err(|e| BridgeError::staging(StagingState::Idle, e))?;
        info!("Uploaded {} bytes to {}", size, location);
        Ok(Outcome::Executed(StagedArtifact {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            created_by_this_call: !existed,
        }))
    }

    /// Download an object to a local file, returning the bytes written.
    pub async fn download_file(
        &self,
        location: &StagedLocation,
        path: &Path,
    ) -> Result<Outcome<u64>> {
        if self.settings.dry_run {
            info!("[dry-run] would download {} to {}", location, path.display());
            return Ok(Outcome::DryRun(Vec::new()));
        }
        let data = self
            .store
            .get(&location.bucket, &location.key)
            .await
            .map_err(|e| BridgeError::staging(StagingState::Idle, e))?;
        tokio::fs::write(path, &data).await?;
        info!("Downloaded {} bytes from {}", data.len(), location);
        Ok(Outcome::Executed(data.len() as u64))
    }
}

fn read_compression(key: &str, opts: &TransferOptions) -> Compression {
    match opts.compression {
        Compression::None => Compression::from_key(key),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;
    use crate::schema::ColumnSpec;
    use crate::store::{MockStagingStore, ObjectStoreBackend};
    use crate::warehouse::{MockWarehouse, QueryOutput};

    fn settings(dry_run: bool) -> FacadeSettings {
        FacadeSettings {
            dry_run,
            staging_bucket: "bkt".into(),
            staging_prefix: "stage/".into(),
            default_credentials: Some(Credentials::IamRole {
                arn: "arn:aws:iam::123:role/rs".into(),
            }),
            text_sizing: TextSizing::default(),
        }
    }

    fn untouched_store() -> MockStagingStore {
        let mut store = MockStagingStore::new();
        store.expect_put().never();
        store.expect_get().never();
        store.expect_delete().never();
        store.expect_list().never();
        store.expect_exists().never();
        store
    }

    fn untouched_warehouse() -> MockWarehouse {
        let mut warehouse = MockWarehouse::new();
        warehouse.expect_execute().never();
        warehouse
    }

    fn definition(policy: ExistencePolicy) -> TableDefinition {
        TableDefinition::builder("public.events".parse().unwrap())
            .column(ColumnSpec::new("id", "integer").not_null())
            .column(ColumnSpec::new("name", "varchar(256)"))
            .existence(policy)
            .build()
            .unwrap()
    }

    fn frame() -> DataFrame {
        DataFrame::from_rows(
            &["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_never_touches_collaborators() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(true),
        );
        let def = definition(ExistencePolicy::DropFirst);
        let opts = TransferOptions::default();

        let created = facade.create_table(&def).await.unwrap();
        assert!(created.statements()[0].text.starts_with("DROP TABLE IF EXISTS"));

        let loaded = facade
            .load(LoadSource::Frame(&frame()), &def, &opts)
            .await
            .unwrap();
        let statements = loaded.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].text.starts_with("COPY \"public\".\"events\""));
        assert!(statements[1].text.contains("FROM 's3://bkt/stage/events-"));

        let unloaded = facade
            .unload("SELECT 1", &StagedLocation::new("bkt", "out/"), &opts)
            .await
            .unwrap();
        assert!(unloaded.statements()[0].text.starts_with("UNLOAD ('SELECT 1')"));

        let read = facade
            .read(&StagedLocation::new("bkt", "out/000"), &opts)
            .await
            .unwrap();
        assert!(read.is_dry_run());

        assert!(facade.query("SELECT 1").await.unwrap().is_dry_run());
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(false),
        );
        let opts = TransferOptions {
            delimiter: '"',
            ..Default::default()
        };
        let err = facade
            .load(
                LoadSource::Frame(&frame()),
                &definition(ExistencePolicy::FailIfExists),
                &opts,
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let mut s = settings(false);
        s.default_credentials = None;
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            s,
        );
        let err = facade
            .unload("SELECT 1", &StagedLocation::new("bkt", "out/"), &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransferOptions(_)));
    }

    #[tokio::test]
    async fn test_load_cleans_up_staged_object() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_execute()
            .times(2)
            .returning(|_| Ok(QueryOutput::affected(2)));
        let facade = TransferFacade::new(store.clone(), Arc::new(warehouse), settings(false));

        let report = facade
            .load(
                LoadSource::Frame(&frame()),
                &definition(ExistencePolicy::AppendIfExists),
                &TransferOptions::default(),
            )
            .await
            .unwrap()
            .executed()
            .unwrap();
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.state, StagingState::CleanedUp);
        assert!(report.artifact.key.starts_with("stage/events-"));
        assert!(!store.exists("bkt", &report.artifact.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_with_retain_keeps_staged_object() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_execute()
            .times(2)
            .returning(|_| Ok(QueryOutput::affected(2)));
        let facade = TransferFacade::new(store.clone(), Arc::new(warehouse), settings(false));
        let opts = TransferOptions {
            retain_staged: true,
            compression: Compression::Gzip,
            ..Default::default()
        };

        let report = facade
            .load(
                LoadSource::Frame(&frame()),
                &definition(ExistencePolicy::AppendIfExists),
                &opts,
            )
            .await
            .unwrap()
            .executed()
            .unwrap();
        assert_eq!(report.state, StagingState::Retained);
        assert!(report.artifact.key.ends_with(".csv.gz"));
        assert!(store.exists("bkt", &report.artifact.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_load_column_subset() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        let mut warehouse = MockWarehouse::new();
        warehouse.expect_execute().times(2).returning(|s| {
            if s.text.starts_with("COPY") {
                assert!(s.text.starts_with("COPY \"public\".\"events\" (\"name\")"));
            }
            Ok(QueryOutput::affected(2))
        });
        let facade = TransferFacade::new(store.clone(), Arc::new(warehouse), settings(false));
        let opts = TransferOptions {
            columns: Some(vec!["name".into()]),
            retain_staged: true,
            ..Default::default()
        };
        let location = StagedLocation::new("bkt", "manual/events.csv");

        facade
            .load_at(
                LoadSource::Frame(&frame()),
                location.clone(),
                &definition(ExistencePolicy::AppendIfExists),
                &opts,
            )
            .await
            .unwrap();
        let staged = store.get("bkt", "manual/events.csv").await.unwrap();
        assert_eq!(&staged[..], b"name\na\nb\n");
    }

    #[tokio::test]
    async fn test_load_from_staged_object_keeps_it() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        store
            .put("bkt", "in/data.csv", Bytes::from_static(b"id\n1\n"), &PutOptions::default())
            .await
            .unwrap();
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_execute()
            .times(2)
            .returning(|_| Ok(QueryOutput::affected(1)));
        let facade = TransferFacade::new(store.clone(), Arc::new(warehouse), settings(false));
        let location = StagedLocation::new("bkt", "in/data.csv");

        let report = facade
            .load(
                LoadSource::Staged(&location),
                &definition(ExistencePolicy::AppendIfExists),
                &TransferOptions::default(),
            )
            .await
            .unwrap()
            .executed()
            .unwrap();
        assert!(!report.artifact.created_by_this_call);
        assert!(store.exists("bkt", "in/data.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_prefix_skips_manifest() {
        let store = Arc::new(ObjectStoreBackend::in_memory());
        for (key, body) in [
            ("out/run_0000_part_00", "id,name\n1,a\n"),
            ("out/run_0001_part_00", "id,name\n2,b\n"),
            ("out/run_manifest", "{\"entries\": []}"),
        ] {
            store
                .put("bkt", key, Bytes::from(body), &PutOptions::default())
                .await
                .unwrap();
        }
        let facade =
            TransferFacade::new(store, Arc::new(untouched_warehouse()), settings(false));
        let df = facade
            .read_prefix(&StagedLocation::new("bkt", "out/run_"), &TransferOptions::default())
            .await
            .unwrap()
            .executed()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.names().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_query_returns_frame() {
        let mut warehouse = MockWarehouse::new();
        warehouse.expect_execute().times(1).returning(|_| {
            Ok(QueryOutput {
                columns: vec!["n".into()],
                rows: vec![vec![Some("7".into())], vec![None]],
                rows_affected: 2,
            })
        });
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(warehouse),
            settings(false),
        );
        let df = facade.query("SELECT n FROM t").await.unwrap().executed().unwrap();
        assert_eq!(df.column("n").unwrap().values(), &[Value::Int(7), Value::Null]);
    }

    #[tokio::test]
    async fn test_execute_with_passes_bound_values() {
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_execute()
            .withf(|s| {
                s.text == "DELETE FROM t WHERE id = $1"
                    && s.bound_values == vec![Value::Int(42)]
            })
            .times(1)
            .returning(|_| Ok(QueryOutput::affected(1)));
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(warehouse),
            settings(false),
        );
        let n = facade
            .execute_with("DELETE FROM t WHERE id = $1", vec![Value::Int(42)])
            .await
            .unwrap();
        assert_eq!(n, Outcome::Executed(1));
    }

    #[tokio::test]
    async fn test_manifest_load_needs_staged_source() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(false),
        );
        let def = definition(ExistencePolicy::DropFirst);
        let opts = TransferOptions {
            manifest: true,
            header: false,
            ..Default::default()
        };

        let err = facade
            .load(LoadSource::Frame(&frame()), &def, &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransferOptions(_)));

        let manifest = StagedLocation::new("bkt", "in/events.manifest");
        let dry = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(true),
        );
        let outcome = dry
            .load(LoadSource::Staged(&manifest), &def, &opts)
            .await
            .unwrap();
        assert!(outcome.statements()[1].text.ends_with("\nMANIFEST"));
    }

    #[tokio::test]
    async fn test_frame_load_declares_null_marker() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(true),
        );
        let def = definition(ExistencePolicy::DropFirst);
        let outcome = facade
            .load(LoadSource::Frame(&frame()), &def, &TransferOptions::default())
            .await
            .unwrap();
        assert!(outcome.statements()[1].text.contains("\nNULL AS '\\\\N'\n"));

        let outcome = facade
            .load(
                LoadSource::Staged(&StagedLocation::new("bkt", "in/e.csv")),
                &def,
                &TransferOptions::default(),
            )
            .await
            .unwrap();
        assert!(!outcome.statements()[1].text.contains("NULL AS"));
    }

    #[tokio::test]
    async fn test_file_load_with_mismatched_codec_rejected() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(true),
        );
        let def = definition(ExistencePolicy::DropFirst);
        let opts = TransferOptions {
            compression: Compression::Gzip,
            ..Default::default()
        };
        let err = facade
            .load(LoadSource::File(Path::new("events.csv.zst")), &def, &opts)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("events.csv.zst"));
    }

    #[test]
    fn test_infer_definition() {
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            settings(false),
        );
        let mut overrides = HashMap::new();
        overrides.insert("name".to_string(), "varchar(10)".to_string());
        let def = facade
            .infer_definition(
                &frame(),
                "events".parse().unwrap(),
                ExistencePolicy::DropFirst,
                &overrides,
            )
            .unwrap();
        let types: Vec<&str> = def.columns().iter().map(|c| c.warehouse_type.as_str()).collect();
        assert_eq!(types, vec!["smallint", "varchar(10)"]);
        assert!(!def.columns()[0].nullable);
    }

    #[test]
    fn test_staging_location_requires_bucket() {
        let mut s = settings(false);
        s.staging_bucket.clear();
        let facade = TransferFacade::new(
            Arc::new(untouched_store()),
            Arc::new(untouched_warehouse()),
            s,
        );
        let err = facade
            .staging_location(&"t".parse().unwrap(), &TransferOptions::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
