// carp-server/src/artifact_store.rs
// ============================================================================
// Module: Replay Manifest Artifact Storage
// Description: Sink/reader trait pair for persisting replay manifests, with
//              a path-traversal-safe filesystem backend and an S3 backend.
// Purpose: Let operators export replay manifests for long-term retention
//          without coupling the runtime itself to a storage backend.
// Dependencies: carp-core, aws-sdk-s3, aws-config, serde_jcs, tokio, async-trait
// ============================================================================

//! ## Overview
//! A [`ReplayManifest`] is written through one of two [`ArtifactSink`]
//! implementations — [`FilesystemArtifactStore`] for local and CI use, or
//! [`S3ArtifactStore`] for durable object-storage export — both serializing
//! via RFC 8785 canonical JSON so the stored bytes are exactly what a
//! content hash would be computed over. Keys/paths are derived from a
//! manifest's trace id and name; the filesystem backend rejects any key
//! that would escape its root directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use carp_core::ReplayManifest;
use thiserror::Error;
use tokio::fs;

/// Maximum length of a single path component accepted in a manifest key.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total length of an assembled manifest key.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while storing or reading a replay manifest.
#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    /// The supplied key is not a safe relative path (absolute, empty, a
    /// `..` component, or over a length bound).
    #[error("invalid manifest key {0:?}")]
    InvalidKey(String),
    /// The manifest could not be serialized to canonical JSON.
    #[error("failed to encode manifest: {0}")]
    Encode(String),
    /// The stored bytes could not be parsed back into a manifest.
    #[error("failed to decode manifest: {0}")]
    Decode(String),
    /// No manifest exists at the given key.
    #[error("no manifest stored at {0:?}")]
    NotFound(String),
    /// The backend's I/O layer reported an error.
    #[error("artifact store io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Key Validation
// ============================================================================

/// Validates that `key` is a safe, bounded relative path: no absolute
/// prefix, no `..`/`.` components, every component within
/// [`MAX_PATH_COMPONENT_LENGTH`], and the whole key within
/// [`MAX_TOTAL_PATH_LENGTH`].
fn validate_key(key: &str) -> Result<(), ArtifactStoreError> {
    if key.is_empty() || key.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ArtifactStoreError::InvalidKey(key.to_string()));
    }
    let path = Path::new(key);
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                if segment.len() > MAX_PATH_COMPONENT_LENGTH {
                    return Err(ArtifactStoreError::InvalidKey(key.to_string()));
                }
            }
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArtifactStoreError::InvalidKey(key.to_string()));
            }
        }
    }
    Ok(())
}

/// Derives the default storage key for a manifest from its trace id and
/// name, so callers need not invent one themselves.
#[must_use]
pub fn default_manifest_key(manifest: &ReplayManifest) -> String {
    format!("{}/manifest.json", manifest.trace_id.as_str())
}

// ============================================================================
// SECTION: Trait Pair
// ============================================================================

/// Persists a [`ReplayManifest`] to durable storage.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Writes `manifest` under `key`, overwriting any prior manifest there.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError`] when `key` is unsafe, encoding fails,
    /// or the backend write fails.
    async fn put(&self, key: &str, manifest: &ReplayManifest) -> Result<(), ArtifactStoreError>;
}

/// Reads a previously stored [`ReplayManifest`] back.
#[async_trait]
pub trait ArtifactReader: Send + Sync {
    /// Loads the manifest stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactStoreError::NotFound`] when no manifest exists at
    /// `key`, and [`ArtifactStoreError::Decode`] when the stored bytes do
    /// not parse as a manifest.
    async fn get(&self, key: &str) -> Result<ReplayManifest, ArtifactStoreError>;
}

fn encode(manifest: &ReplayManifest) -> Result<Vec<u8>, ArtifactStoreError> {
    serde_jcs::to_string(manifest)
        .map(String::into_bytes)
        .map_err(|err| ArtifactStoreError::Encode(err.to_string()))
}

fn decode(bytes: &[u8]) -> Result<ReplayManifest, ArtifactStoreError> {
    serde_json::from_slice(bytes).map_err(|err| ArtifactStoreError::Decode(err.to_string()))
}

// ============================================================================
// SECTION: Filesystem Backend
// ============================================================================

/// Filesystem-backed artifact store rooted at one directory; every key is
/// validated before being joined to the root so a manifest can never be
/// written or read outside it.
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Builds a store rooted at `root`. The directory is not created here;
    /// callers create it as part of deployment setup.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactStoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ArtifactSink for FilesystemArtifactStore {
    async fn put(&self, key: &str, manifest: &ReplayManifest) -> Result<(), ArtifactStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        }
        let bytes = encode(manifest)?;
        fs::write(&path, bytes)
            .await
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))
    }
}

#[async_trait]
impl ArtifactReader for FilesystemArtifactStore {
    async fn get(&self, key: &str) -> Result<ReplayManifest, ArtifactStoreError> {
        let path = self.resolve(key)?;
        let bytes = fs::read(&path).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ArtifactStoreError::NotFound(key.to_string())
            } else {
                ArtifactStoreError::Io(err.to_string())
            }
        })?;
        decode(&bytes)
    }
}

// ============================================================================
// SECTION: S3 Backend
// ============================================================================

/// S3-backed artifact store writing under one bucket/prefix.
pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ArtifactStore {
    /// Builds a store over `bucket`, prefixing every key with `prefix`
    /// (empty string for no prefix).
    #[must_use]
    pub async fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    fn object_key(&self, key: &str) -> Result<String, ArtifactStoreError> {
        validate_key(key)?;
        if self.prefix.is_empty() {
            Ok(key.to_string())
        } else {
            Ok(format!("{}/{key}", self.prefix.trim_end_matches('/')))
        }
    }
}

#[async_trait]
impl ArtifactSink for S3ArtifactStore {
    async fn put(&self, key: &str, manifest: &ReplayManifest) -> Result<(), ArtifactStoreError> {
        let object_key = self.object_key(key)?;
        let bytes = encode(manifest)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(bytes))
            .content_type("application/json")
            .send()
            .await
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactReader for S3ArtifactStore {
    async fn get(&self, key: &str) -> Result<ReplayManifest, ArtifactStoreError> {
        let object_key = self.object_key(key)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|err| ArtifactStoreError::NotFound(format!("{object_key}: {err}")))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| ArtifactStoreError::Io(err.to_string()))?
            .into_bytes();
        decode(&bytes)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use carp_core::REPLAY_MANIFEST_VERSION;
    use carp_core::Timestamp;
    use carp_core::TraceId;
    use carp_core::default_nondeterminism_rules;

    use super::*;

    fn sample_manifest() -> ReplayManifest {
        ReplayManifest {
            manifest_version: REPLAY_MANIFEST_VERSION.to_string(),
            trace_id: TraceId::new("trace-abc"),
            artifacts: vec![],
            nondeterminism_rules: default_nondeterminism_rules(),
            root_hash: "0".repeat(64),
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn key_validation_rejects_traversal_and_absolute_paths() {
        assert!(validate_key("trace-abc/manifest.json").is_ok());
        assert!(validate_key("../escape/manifest.json").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("").is_err());
    }

    #[tokio::test]
    async fn filesystem_store_round_trips_a_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());
        let manifest = sample_manifest();
        let key = default_manifest_key(&manifest);

        store.put(&key, &manifest).await.expect("put");
        let loaded = store.get(&key).await.expect("get");
        assert_eq!(loaded, manifest);
    }

    #[tokio::test]
    async fn filesystem_store_rejects_traversal_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());
        let manifest = sample_manifest();
        assert!(matches!(
            store.put("../escape.json", &manifest).await,
            Err(ArtifactStoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn filesystem_store_reports_not_found_for_missing_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path());
        assert!(matches!(
            store.get("missing/manifest.json").await,
            Err(ArtifactStoreError::NotFound(_))
        ));
    }
}
