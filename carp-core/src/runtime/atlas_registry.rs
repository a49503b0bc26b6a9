// carp-core/src/runtime/atlas_registry.rs
// ============================================================================
// Module: Atlas Registry (C2)
// Description: Loads, validates, and caches Atlas capability bundles.
// Purpose: The sole path by which an Atlas directory becomes usable context
//          and actions for the Resolver; enforces all-or-nothing loads.
// Dependencies: crate::core::atlas, std::fs, std::sync
// ============================================================================

//! ## Overview
//! An Atlas bundle lives on disk as a directory: a manifest file plus the
//! context pack, policy, and adapter files it references by relative path.
//! The registry validates the manifest before reading anything else it
//! points at, loads every referenced file in one pass, and only then makes
//! the bundle visible under its Atlas id. A bundle that fails validation or
//! is missing a referenced file never partially registers. Loaded bundles
//! are cached by the canonicalized absolute path they were loaded from, so
//! re-loading the same directory is a cache hit rather than a re-read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::AdapterDescriptor;
use crate::core::Atlas;
use crate::core::AtlasDependency;
use crate::core::AtlasId;
use crate::core::AtlasManifest;
use crate::core::AtlasPolicyFile;
use crate::core::ContextPack;
use crate::core::ContextPackContentType;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or looking up an Atlas.
#[derive(Debug, Error)]
pub enum AtlasRegistryError {
    /// No Atlas is registered under the requested id.
    #[error("atlas {0:?} not found")]
    AtlasNotFound(String),
    /// The manifest, or a file it references, failed validation.
    #[error("atlas at {path:?} failed validation: {reason}")]
    AtlasValidationError {
        /// Directory the Atlas was being loaded from.
        path: String,
        /// Human-readable validation failure.
        reason: String,
    },
    /// Reading a bundle file failed.
    #[error("atlas io error at {path:?}: {reason}")]
    Io {
        /// Path of the file that failed to read.
        path: String,
        /// Underlying I/O error text.
        reason: String,
    },
}

// ============================================================================
// SECTION: Manifest Validation
// ============================================================================

/// Validates a parsed manifest's structural invariants beyond what `serde`
/// already enforces: non-empty id/version/name, and every declared
/// dependency naming a non-empty id.
fn validate_manifest(manifest: &AtlasManifest) -> Result<(), String> {
    if manifest.id.as_str().trim().is_empty() {
        return Err("manifest id must not be empty".to_string());
    }
    if manifest.version.trim().is_empty() {
        return Err("manifest version must not be empty".to_string());
    }
    if manifest.name.trim().is_empty() {
        return Err("manifest name must not be empty".to_string());
    }
    for dependency in &manifest.dependencies {
        if dependency.id.as_str().trim().is_empty() {
            return Err("dependency id must not be empty".to_string());
        }
    }
    Ok(())
}

/// Infers a context pack's content type from its file extension, defaulting
/// to plain text for anything unrecognized.
fn infer_content_type(relative_path: &str) -> ContextPackContentType {
    let lower = relative_path.to_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        ContextPackContentType::Markdown
    } else if lower.ends_with(".json") {
        ContextPackContentType::Json
    } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        ContextPackContentType::Yaml
    } else {
        ContextPackContentType::Plain
    }
}

/// Capability embedded in a context pack's filename by convention
/// (`capability__rest-of-name.ext`), or `None` if the file carries no such
/// prefix.
fn capability_from_filename(relative_path: &str) -> Option<String> {
    let file_name = Path::new(relative_path).file_name()?.to_str()?;
    let (capability, _) = file_name.split_once("__")?;
    (!capability.is_empty()).then(|| capability.to_string())
}

// ============================================================================
// SECTION: Loading
// ============================================================================

fn io_error(path: &Path, error: &std::io::Error) -> AtlasRegistryError {
    AtlasRegistryError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

fn read_file(bundle_root: &Path, relative_path: &str) -> Result<String, AtlasRegistryError> {
    let full_path = bundle_root.join(relative_path);
    fs::read_to_string(&full_path).map_err(|error| io_error(&full_path, &error))
}

fn read_json(bundle_root: &Path, relative_path: &str) -> Result<serde_json::Value, AtlasRegistryError> {
    let raw = read_file(bundle_root, relative_path)?;
    serde_json::from_str(&raw).map_err(|error| AtlasRegistryError::AtlasValidationError {
        path: bundle_root.join(relative_path).display().to_string(),
        reason: format!("invalid json: {error}"),
    })
}

/// Loads one Atlas bundle from `bundle_root`: the manifest, then every
/// context pack, policy file, and adapter descriptor it references. Fails
/// without registering anything if the manifest is invalid or any
/// referenced file is missing or malformed.
fn load_bundle(bundle_root: &Path) -> Result<Atlas, AtlasRegistryError> {
    let manifest_path = bundle_root.join("manifest.json");
    let manifest_raw =
        fs::read_to_string(&manifest_path).map_err(|error| io_error(&manifest_path, &error))?;
    let manifest: AtlasManifest =
        serde_json::from_str(&manifest_raw).map_err(|error| AtlasRegistryError::AtlasValidationError {
            path: manifest_path.display().to_string(),
            reason: format!("invalid manifest json: {error}"),
        })?;
    validate_manifest(&manifest).map_err(|reason| AtlasRegistryError::AtlasValidationError {
        path: manifest_path.display().to_string(),
        reason,
    })?;

    let mut context_packs = Vec::with_capacity(manifest.context_packs.len());
    for relative_path in &manifest.context_packs {
        let content = read_file(bundle_root, relative_path)?;
        context_packs.push(ContextPack {
            relative_path: relative_path.clone(),
            content_type: infer_content_type(relative_path),
            content,
            capability: capability_from_filename(relative_path),
        });
    }

    let mut policy_files = Vec::with_capacity(manifest.policy_files.len());
    for relative_path in &manifest.policy_files {
        let value = read_json(bundle_root, relative_path)?;
        let policy_file: AtlasPolicyFile =
            serde_json::from_value(value).map_err(|error| AtlasRegistryError::AtlasValidationError {
                path: bundle_root.join(relative_path).display().to_string(),
                reason: format!("invalid policy file: {error}"),
            })?;
        policy_files.push(policy_file);
    }

    let mut adapters = Vec::with_capacity(manifest.adapter_descriptors.len());
    for relative_path in &manifest.adapter_descriptors {
        let content = read_json(bundle_root, relative_path)?;
        let name = Path::new(relative_path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(relative_path)
            .to_string();
        adapters.push(AdapterDescriptor { name, content });
    }

    Ok(Atlas {
        manifest,
        context_packs,
        policy_files,
        adapters,
        loaded_from: bundle_root.display().to_string(),
    })
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Atlas Registry (C2): loads bundles from disk and caches them in memory,
/// indexed both by cache key (resolved directory path) and by Atlas id.
pub struct AtlasRegistry {
    by_path: Mutex<HashMap<PathBuf, AtlasId>>,
    by_id: Mutex<HashMap<AtlasId, Atlas>>,
}

impl AtlasRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_path: Mutex::new(HashMap::new()),
            by_id: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the Atlas bundle rooted at `path`, registering it under its
    /// manifest id. Returns the cached bundle without touching disk again
    /// if this exact resolved path was already loaded.
    ///
    /// # Errors
    ///
    /// Returns [`AtlasRegistryError::AtlasValidationError`] when the
    /// manifest or a referenced file fails validation, or
    /// [`AtlasRegistryError::Io`] when a referenced file cannot be read.
    pub fn load(&self, path: &Path) -> Result<Atlas, AtlasRegistryError> {
        let resolved = fs::canonicalize(path).map_err(|error| io_error(path, &error))?;

        if let Ok(by_path) = self.by_path.lock() {
            if let Some(atlas_id) = by_path.get(&resolved) {
                if let Ok(by_id) = self.by_id.lock() {
                    if let Some(atlas) = by_id.get(atlas_id) {
                        return Ok(atlas.clone());
                    }
                }
            }
        }

        let atlas = load_bundle(&resolved)?;
        let atlas_id = atlas.manifest.id.clone();

        if let Ok(mut by_path) = self.by_path.lock() {
            by_path.insert(resolved, atlas_id.clone());
        }
        if let Ok(mut by_id) = self.by_id.lock() {
            by_id.insert(atlas_id, atlas.clone());
        }

        Ok(atlas)
    }

    /// Returns the registered Atlas with the given id, if any.
    #[must_use]
    pub fn get(&self, atlas_id: &AtlasId) -> Option<Atlas> {
        self.by_id.lock().ok()?.get(atlas_id).cloned()
    }

    /// Removes an Atlas from the registry. Idempotent: unregistering an
    /// unknown id is not an error.
    pub fn unregister(&self, atlas_id: &AtlasId) {
        if let Ok(mut by_id) = self.by_id.lock() {
            by_id.remove(atlas_id);
        }
        if let Ok(mut by_path) = self.by_path.lock() {
            by_path.retain(|_, registered_id| registered_id != atlas_id);
        }
    }

    /// Lists every currently registered Atlas id.
    #[must_use]
    pub fn list(&self) -> Vec<AtlasId> {
        self.by_id
            .lock()
            .map(|by_id| by_id.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every registered Atlas declaring the given capability.
    #[must_use]
    pub fn get_by_capability(&self, capability: &str) -> Vec<Atlas> {
        self.by_id
            .lock()
            .map(|by_id| {
                by_id
                    .values()
                    .filter(|atlas| atlas.has_capability(capability))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns `atlas`'s declared dependencies that are not currently
    /// registered, for a caller that wants to surface an unresolved
    /// dependency before relying on the bundle.
    #[must_use]
    pub fn missing_dependencies(&self, atlas: &Atlas) -> Vec<AtlasDependency> {
        let Ok(by_id) = self.by_id.lock() else {
            return atlas.manifest.dependencies.clone();
        };
        atlas
            .manifest
            .dependencies
            .iter()
            .filter(|dependency| !by_id.contains_key(&dependency.id))
            .cloned()
            .collect()
    }
}

impl Default for AtlasRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bundle(dir: &Path) {
        fs::write(
            dir.join("manifest.json"),
            serde_json::json!({
                "id": "demo.atlas",
                "version": "1.0.0",
                "name": "Demo Atlas",
                "capabilities": ["echo"],
                "context_packs": ["guidelines.md"],
                "policy_files": [],
                "adapter_descriptors": [],
                "dependencies": [],
                "certification_flags": []
            })
            .to_string(),
        )
        .expect("write manifest");
        let mut file = fs::File::create(dir.join("guidelines.md")).expect("create context pack");
        file.write_all(b"be nice").expect("write context pack");
    }

    fn temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("carp-atlas-registry-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn load_registers_a_valid_bundle_by_manifest_id() {
        let dir = temp_dir("load-valid");
        write_bundle(&dir);
        let registry = AtlasRegistry::new();
        let atlas = registry.load(&dir).expect("load");
        assert_eq!(atlas.manifest.id.as_str(), "demo.atlas");
        assert_eq!(atlas.context_packs.len(), 1);
        assert!(registry.get(&AtlasId::new("demo.atlas")).is_some());
    }

    #[test]
    fn load_is_cached_on_repeated_calls_for_the_same_path() {
        let dir = temp_dir("load-cached");
        write_bundle(&dir);
        let registry = AtlasRegistry::new();
        let first = registry.load(&dir).expect("first load");
        let second = registry.load(&dir).expect("second load");
        assert_eq!(first, second);
    }

    #[test]
    fn load_fails_without_registering_when_a_referenced_file_is_missing() {
        let dir = temp_dir("load-missing-file");
        fs::write(
            dir.join("manifest.json"),
            serde_json::json!({
                "id": "broken.atlas",
                "version": "1.0.0",
                "name": "Broken Atlas",
                "capabilities": [],
                "context_packs": ["missing.md"],
                "policy_files": [],
                "adapter_descriptors": [],
                "dependencies": [],
                "certification_flags": []
            })
            .to_string(),
        )
        .expect("write manifest");
        let registry = AtlasRegistry::new();
        let result = registry.load(&dir);
        assert!(result.is_err());
        assert!(registry.get(&AtlasId::new("broken.atlas")).is_none());
    }

    #[test]
    fn unregister_removes_an_atlas_and_is_idempotent() {
        let dir = temp_dir("unregister");
        write_bundle(&dir);
        let registry = AtlasRegistry::new();
        registry.load(&dir).expect("load");
        let atlas_id = AtlasId::new("demo.atlas");
        registry.unregister(&atlas_id);
        assert!(registry.get(&atlas_id).is_none());
        registry.unregister(&atlas_id);
    }

    #[test]
    fn get_by_capability_filters_registered_atlases() {
        let dir = temp_dir("by-capability");
        write_bundle(&dir);
        let registry = AtlasRegistry::new();
        registry.load(&dir).expect("load");
        assert_eq!(registry.get_by_capability("echo").len(), 1);
        assert_eq!(registry.get_by_capability("deploy").len(), 0);
    }
}
