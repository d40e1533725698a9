//! Staging lifecycle for a single transfer.
//!
//! A [`StagingCoordinator`] owns the bookkeeping for one staged object: it
//! uploads (or adopts) the object, runs the statements that consume it, and
//! decides whether the object is deleted afterwards. The state machine is
//!
//! ```text
//! Idle -> Staged -> Executed -> CleanedUp | Retained
//! ```
//!
//! with `Failed` reachable from every non-terminal state. Only objects the
//! coordinator itself uploaded to a previously free key are ever deleted.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::Compression;
use crate::error::{BridgeError, Result};
use crate::frame::{to_delimited, DataFrame};
use crate::statement::{FileFormat, GeneratedStatement, StagedLocation, TransferOptions};
use crate::store::{PutOptions, StagingStore, StoreError};
use crate::warehouse::{QueryOutput, Warehouse};

/// Lifecycle state of a staged transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StagingState {
    Idle,
    Staged,
    Executed,
    CleanedUp,
    Retained,
    Failed,
}

impl StagingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StagingState::Idle => "Idle",
            StagingState::Staged => "Staged",
            StagingState::Executed => "Executed",
            StagingState::CleanedUp => "CleanedUp",
            StagingState::Retained => "Retained",
            StagingState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StagingState::CleanedUp | StagingState::Retained | StagingState::Failed
        )
    }
}

impl fmt::Display for StagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An object in the staging store touched by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedArtifact {
    pub bucket: String,
    pub key: String,
    /// True only when this transfer wrote the object to a key that did not
    /// exist beforehand.
    pub created_by_this_call: bool,
}

impl StagedArtifact {
    fn at(location: &StagedLocation, created_by_this_call: bool) -> Self {
        Self {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            created_by_this_call,
        }
    }

    pub fn location(&self) -> StagedLocation {
        StagedLocation::new(&self.bucket, &self.key)
    }
}

/// Where the staged bytes come from.
#[derive(Debug, Clone, Copy)]
pub enum StageSource<'a> {
    /// Serialized with the options' delimited layout and compression.
    Frame(&'a DataFrame),
    /// Uploaded byte for byte.
    File(&'a Path),
    /// Already in the store; nothing is uploaded.
    Existing,
}

/// A staged object that should have been deleted but was not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupWarning {
    pub bucket: String,
    pub key: String,
    pub message: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "staged object s3://{}/{} was not deleted: {}",
            self.bucket, self.key, self.message
        )
    }
}

/// Drives one transfer through its staging states.
pub struct StagingCoordinator<'a> {
    store: &'a dyn StagingStore,
    warehouse: &'a dyn Warehouse,
    state: StagingState,
    artifact: Option<StagedArtifact>,
    retain: bool,
}

impl<'a> StagingCoordinator<'a> {
    pub fn new(store: &'a dyn StagingStore, warehouse: &'a dyn Warehouse) -> Self {
        Self {
            store,
            warehouse,
            state: StagingState::Idle,
            artifact: None,
            retain: false,
        }
    }

    pub fn state(&self) -> StagingState {
        self.state
    }

    pub fn artifact(&self) -> Option<&StagedArtifact> {
        self.artifact.as_ref()
    }

    fn require_state(&self, expected: StagingState) -> Result<()> {
        if self.state != expected {
            return Err(BridgeError::StagingOrder {
                expected: expected.as_str(),
                actual: self.state,
            });
        }
        Ok(())
    }

    fn transport_failure(&mut self, source: StoreError) -> BridgeError {
        let reached = self.state;
        self.state = StagingState::Failed;
        BridgeError::staging(reached, source)
    }

    /// Put the source at `location` (Idle -> Staged).
    ///
    /// Serialization errors leave the coordinator Idle; store failures move
    /// it to Failed. An upload that fails is never deleted, since its outcome
    /// is unknown.
    pub async fn stage(
        &mut self,
        source: StageSource<'_>,
        location: StagedLocation,
        options: &TransferOptions,
    ) -> Result<StagedArtifact> {
        self.require_state(StagingState::Idle)?;
        self.retain = options.retain_staged;
        let store = self.store;

        let payload = match source {
            StageSource::Existing => None,
            StageSource::Frame(frame) => {
                let text = to_delimited(frame, &options.staging_format())?;
                Some(options.compression.encode(text)?)
            }
            StageSource::File(path) => {
                let encode = file_needs_encoding(path, options.compression)?;
                match tokio::fs::read(path).await {
                    Ok(data) if encode => Some(options.compression.encode(data)?),
                    Ok(data) => Some(data),
                    Err(e) => {
                        self.state = StagingState::Failed;
                        return Err(BridgeError::Io(e));
                    }
                }
            }
        };

        let existed = match store.exists(&location.bucket, &location.key).await {
            Ok(found) => found,
            Err(e) => return Err(self.transport_failure(e)),
        };

        let Some(payload) = payload else {
            if !existed {
                return Err(self.transport_failure(StoreError::NotFound(location.uri())));
            }
            info!("Using existing object {}", location);
            let artifact = StagedArtifact::at(&location, false);
            self.artifact = Some(artifact.clone());
            self.state = StagingState::Staged;
            return Ok(artifact);
        };

        if existed {
            warn!(
                "{} already exists and will be overwritten; it will be kept after the transfer",
                location
            );
        }

        let size = payload.len();
        let put_options = PutOptions {
            content_type: Some(content_type(options).to_string()),
        };
        if let Err(e) = store
            .put(&location.bucket, &location.key, Bytes::from(payload), &put_options)
            .await
        {
            return Err(self.transport_failure(e));
        }
        info!("Staged {} bytes at {}", size, location);

        let artifact = StagedArtifact::at(&location, !existed);
        self.artifact = Some(artifact.clone());
        self.state = StagingState::Staged;
        Ok(artifact)
    }

    /// Run `statements` in order (Staged -> Executed).
    ///
    /// On the first failure the coordinator moves to Failed and makes one
    /// attempt to delete an object it owns, unless it is retained.
    pub async fn execute(&mut self, statements: &[GeneratedStatement]) -> Result<Vec<QueryOutput>> {
        self.require_state(StagingState::Staged)?;
        let warehouse = self.warehouse;

        let mut outputs = Vec::with_capacity(statements.len());
        for statement in statements {
            match warehouse.execute(statement).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    self.state = StagingState::Failed;
                    self.discard_after_failure().await;
                    return Err(e);
                }
            }
        }
        self.state = StagingState::Executed;
        Ok(outputs)
    }

    async fn discard_after_failure(&mut self) {
        let Some(artifact) = self.artifact.as_ref() else {
            return;
        };
        if self.retain || !artifact.created_by_this_call {
            info!("Keeping s3://{}/{} after failed transfer", artifact.bucket, artifact.key);
            return;
        }
        match self.store.delete(&artifact.bucket, &artifact.key).await {
            Ok(()) => info!(
                "Deleted s3://{}/{} after failed transfer",
                artifact.bucket, artifact.key
            ),
            Err(e) => warn!(
                "Could not delete s3://{}/{} after failed transfer: {}",
                artifact.bucket, artifact.key, e
            ),
        }
    }

    /// Finish an executed transfer (Executed -> CleanedUp | Retained).
    ///
    /// A failed delete is reported as a warning, not an error: the data has
    /// already been loaded.
    pub async fn cleanup(&mut self) -> Result<Option<CleanupWarning>> {
        self.require_state(StagingState::Executed)?;

        let Some(artifact) = self.artifact.as_ref() else {
            self.state = StagingState::Retained;
            return Ok(None);
        };
        if self.retain || !artifact.created_by_this_call {
            debug!("Retaining s3://{}/{}", artifact.bucket, artifact.key);
            self.state = StagingState::Retained;
            return Ok(None);
        }

        match self.store.delete(&artifact.bucket, &artifact.key).await {
            Ok(()) => {
                debug!("Deleted s3://{}/{}", artifact.bucket, artifact.key);
                self.state = StagingState::CleanedUp;
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "Could not delete s3://{}/{}: {}",
                    artifact.bucket, artifact.key, e
                );
                let warning = CleanupWarning {
                    bucket: artifact.bucket.clone(),
                    key: artifact.key.clone(),
                    message: e.to_string(),
                };
                self.state = StagingState::Retained;
                Ok(Some(warning))
            }
        }
    }

    /// Record what would run without touching either collaborator
    /// (Idle -> Retained).
    pub fn dry_run(&mut self, statements: Vec<GeneratedStatement>) -> Result<Vec<GeneratedStatement>> {
        self.require_state(StagingState::Idle)?;
        for statement in &statements {
            info!("[dry-run] would execute:\n{}", statement.redacted());
        }
        self.state = StagingState::Retained;
        Ok(statements)
    }

    /// Run an UNLOAD and report the objects it wrote (Idle -> Retained).
    ///
    /// The destination prefix is listed before and after execution; keys
    /// that appear are reported as created by this call. With
    /// ALLOWOVERWRITE, keys that already existed are reported too, as not
    /// created. Unloaded objects are never deleted.
    pub async fn unload(
        &mut self,
        statement: &GeneratedStatement,
        destination: &StagedLocation,
        options: &TransferOptions,
    ) -> Result<Vec<StagedArtifact>> {
        self.require_state(StagingState::Idle)?;
        let store = self.store;
        let bucket = destination.bucket.as_str();
        let prefix = destination.unload_prefix(options.file_prefix.as_deref());

        let before: HashSet<String> = match store.list(bucket, &prefix).await {
            Ok(keys) => keys.into_iter().collect(),
            Err(e) => return Err(self.transport_failure(e)),
        };
        if !before.is_empty() && !options.unload.allow_overwrite {
            warn!(
                "{} object(s) already exist under s3://{}/{}",
                before.len(),
                bucket,
                prefix
            );
        }

        if let Err(e) = self.warehouse.execute(statement).await {
            self.state = StagingState::Failed;
            return Err(e);
        }
        self.state = StagingState::Executed;

        let after = match store.list(bucket, &prefix).await {
            Ok(keys) => keys,
            Err(e) => return Err(self.transport_failure(e)),
        };
        let mut artifacts: Vec<StagedArtifact> = after
            .into_iter()
            .filter_map(|key| {
                let created = !before.contains(&key);
                (created || options.unload.allow_overwrite).then(|| StagedArtifact {
                    bucket: bucket.to_string(),
                    key,
                    created_by_this_call: created,
                })
            })
            .collect();

        if artifacts.is_empty() && !options.unload.parallel {
            let key = single_part_key(&prefix, options);
            match store.exists(bucket, &key).await {
                Ok(true) => artifacts.push(StagedArtifact {
                    bucket: bucket.to_string(),
                    key,
                    created_by_this_call: true,
                }),
                Ok(false) => {}
                Err(e) => return Err(self.transport_failure(e)),
            }
        }

        if artifacts.is_empty() {
            warn!("UNLOAD to s3://{}/{} produced no objects", bucket, prefix);
        } else {
            info!(
                "UNLOAD wrote {} object(s) under s3://{}/{}",
                artifacts.len(),
                bucket,
                prefix
            );
        }
        self.state = StagingState::Retained;
        Ok(artifacts)
    }
}

/// Name of the only file a non-parallel UNLOAD writes.
fn single_part_key(prefix: &str, options: &TransferOptions) -> String {
    let suffix = options
        .file_suffix
        .as_deref()
        .map(|s| format!(".{}", s.trim_start_matches('.')))
        .unwrap_or_default();
    format!("{}000{}{}", prefix, suffix, options.compression.extension())
}

/// Whether a local file has to be compressed before it is staged with
/// `compression`.
///
/// A file whose extension already names a codec is staged verbatim and must
/// match `compression`.
pub(crate) fn file_needs_encoding(path: &Path, compression: Compression) -> Result<bool> {
    let on_disk = Compression::from_key(&path.to_string_lossy());
    if on_disk == compression {
        return Ok(false);
    }
    if on_disk == Compression::None && compression.is_local() {
        return Ok(true);
    }
    Err(BridgeError::options(format!(
        "{} is {} on disk but the transfer is configured for {}",
        path.display(),
        on_disk,
        compression
    )))
}

fn content_type(options: &TransferOptions) -> &'static str {
    match (options.compression, options.format) {
        (Compression::None, FileFormat::Csv) => "text/csv",
        (Compression::None, FileFormat::Delimited) => "text/plain",
        (Compression::Gzip, _) => "application/gzip",
        (Compression::Zstd, _) => "application/zstd",
        _ => "application/octet-stream",
    }
}
