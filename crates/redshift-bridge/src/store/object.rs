//! [`StagingStore`] on top of the `object_store` crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutPayload};
use tracing::debug;

use super::{PutOptions, StagingStore, StoreError, StoreResult};
use crate::config::{ObjectStoreConfig, StoreBackend};
use crate::error::{BridgeError, Result};

/// One `object_store` client per bucket, created on first use.
pub struct ObjectStoreBackend {
    config: ObjectStoreConfig,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreBackend {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Process-local store; buckets spring into existence when first used.
    pub fn in_memory() -> Self {
        Self::new(ObjectStoreConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        })
    }

    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| BridgeError::pool("object store cache poisoned", bucket.to_string()))?;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }
        let store = self.build(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn build(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        match self.config.backend {
            StoreBackend::Memory => Ok(Arc::new(InMemory::new())),
            StoreBackend::S3 => {
                let cfg = &self.config;
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &cfg.region {
                    builder = builder.with_region(region);
                }
                if let Some(id) = &cfg.access_key_id {
                    builder = builder.with_access_key_id(id);
                }
                if let Some(secret) = &cfg.secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if let Some(token) = &cfg.session_token {
                    builder = builder.with_token(token);
                }
                if let Some(endpoint) = &cfg.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if cfg.allow_http {
                    builder = builder.with_allow_http(true);
                }
                let store = builder.build().map_err(|e| {
                    BridgeError::pool(e.to_string(), format!("building S3 client for {}", bucket))
                })?;
                debug!("Created S3 client for bucket {}", bucket);
                Ok(Arc::new(store))
            }
        }
    }

    fn client(&self, operation: &'static str, bucket: &str) -> StoreResult<Arc<dyn ObjectStore>> {
        self.store(bucket)
            .map_err(|e| StoreError::transport(operation, format!("s3://{}", bucket), e.to_string()))
    }
}

fn map_err(operation: &'static str, bucket: &str, key: &str) -> impl Fn(object_store::Error) -> StoreError {
    let location = format!("s3://{}/{}", bucket, key);
    move |e| match e {
        object_store::Error::NotFound { .. } => StoreError::NotFound(location.clone()),
        other => StoreError::transport(operation, location.clone(), other.to_string()),
    }
}

#[async_trait]
impl StagingStore for ObjectStoreBackend {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> StoreResult<()> {
        let store = self.client("put", bucket)?;
        let mut attributes = Attributes::new();
        if let Some(ct) = &options.content_type {
            attributes.insert(Attribute::ContentType, ct.clone().into());
        }
        let opts = object_store::PutOptions {
            attributes,
            ..Default::default()
        };
        store
            .put_opts(&Path::from(key), PutPayload::from(data), opts)
            .await
            .map_err(map_err("put", bucket, key))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StoreResult<Bytes> {
        let store = self.client("get", bucket)?;
        let on_err = map_err("get", bucket, key);
        let result = store.get(&Path::from(key)).await.map_err(&on_err)?;
        result.bytes().await.map_err(on_err)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let store = self.client("delete", bucket)?;
        store
            .delete(&Path::from(key))
            .await
            .map_err(map_err("delete", bucket, key))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let store = self.client("list", bucket)?;
        // object_store prefixes match whole path segments, so list the
        // enclosing folder and filter on the raw prefix.
        let folder = prefix.rsplit_once('/').map(|(dir, _)| Path::from(dir));
        let metas: Vec<_> = store
            .list(folder.as_ref())
            .try_collect()
            .await
            .map_err(map_err("list", bucket, prefix))?;
        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|m| m.location.to_string())
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let store = self.client("head", bucket)?;
        match store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_err("head", bucket, key)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = ObjectStoreBackend::in_memory();
        let opts = PutOptions::default();
        store
            .put("b", "stage/a.csv", Bytes::from_static(b"x,y\n"), &opts)
            .await
            .unwrap();
        assert!(store.exists("b", "stage/a.csv").await.unwrap());
        assert_eq!(store.get("b", "stage/a.csv").await.unwrap(), Bytes::from_static(b"x,y\n"));
        store.delete("b", "stage/a.csv").await.unwrap();
        assert!(!store.exists("b", "stage/a.csv").await.unwrap());
        assert!(matches!(
            store.get("b", "stage/a.csv").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let store = ObjectStoreBackend::in_memory();
        let opts = PutOptions::default();
        store.put("one", "k", Bytes::from_static(b"1"), &opts).await.unwrap();
        assert!(!store.exists("two", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_uses_raw_prefix() {
        let store = ObjectStoreBackend::in_memory();
        let opts = PutOptions::default();
        for key in [
            "out/run1_0000_part_00",
            "out/run1_0001_part_00",
            "out/run2_0000_part_00",
            "out/nested/run1_x",
            "top_level",
        ] {
            store.put("b", key, Bytes::from_static(b"."), &opts).await.unwrap();
        }
        assert_eq!(
            store.list("b", "out/run1_").await.unwrap(),
            vec!["out/run1_0000_part_00", "out/run1_0001_part_00"]
        );
        assert_eq!(store.list("b", "top").await.unwrap(), vec!["top_level"]);
        assert_eq!(store.list("b", "out/").await.unwrap().len(), 4);
        assert!(store.list("b", "missing/").await.unwrap().is_empty());
    }
}
