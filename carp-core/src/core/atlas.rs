// carp-core/src/core/atlas.rs
// ============================================================================
// Module: CARP Runtime Atlas Model
// Description: Capability package schema loaded from a directory bundle.
// Purpose: Define the manifest, context packs, policy files, and adapter
//          descriptors the Atlas Registry loads and caches.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! An Atlas is a versioned capability package: a manifest plus context
//! packs, policy files, and adapter descriptors. The registry validates the
//! manifest schema before reading any other file and caches the assembled
//! bundle by its absolute directory path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AtlasId;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Declared dependency on another Atlas, by id and version requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasDependency {
    /// Dependency Atlas identifier.
    pub id: AtlasId,
    /// Version requirement string (semver range).
    pub version: String,
}

/// Atlas manifest: the schema-validated entry point of a capability package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasManifest {
    /// Semantic identifier of this Atlas.
    pub id: AtlasId,
    /// Semver version string.
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Relative paths to context pack files.
    #[serde(default)]
    pub context_packs: Vec<String>,
    /// Relative paths to policy files.
    #[serde(default)]
    pub policy_files: Vec<String>,
    /// Relative paths to adapter descriptor files.
    #[serde(default)]
    pub adapter_descriptors: Vec<String>,
    /// Declared Atlas dependencies.
    #[serde(default)]
    pub dependencies: Vec<AtlasDependency>,
    /// Certification flags (e.g. `"reviewed"`, `"production-ready"`).
    #[serde(default)]
    pub certification_flags: Vec<String>,
}

// ============================================================================
// SECTION: Context Pack
// ============================================================================

/// Content type of a context pack file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPackContentType {
    /// Markdown text.
    Markdown,
    /// JSON document.
    Json,
    /// Plain text.
    Plain,
    /// YAML document.
    Yaml,
}

/// A loaded context pack file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPack {
    /// Path relative to the Atlas bundle root.
    pub relative_path: String,
    /// Inferred or declared content type.
    pub content_type: ContextPackContentType,
    /// Raw file content.
    pub content: String,
    /// Capability this pack is scoped to, if declared.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub capability: Option<String>,
}

// ============================================================================
// SECTION: Policy File
// ============================================================================

/// A policy file bundled with an Atlas, mounted into the Policy Engine on
/// demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasPolicyFile {
    /// Policy file identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Ordered rule definitions, as opaque structured data (parsed into
    /// `carp_core::policy::PolicyRule` by the Atlas Registry).
    #[serde(default)]
    pub rules: Vec<Value>,
    /// Default values referenced by rules (e.g. default rate-limit window).
    #[serde(default)]
    pub defaults: Value,
}

impl AtlasPolicyFile {
    /// Parses `rules` into [`PolicyRule`](crate::core::policy::PolicyRule)
    /// records, silently dropping entries that do not match the rule
    /// schema rather than failing the whole file.
    #[must_use]
    pub fn parsed_rules(&self) -> Vec<crate::core::policy::PolicyRule> {
        self.rules
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}

// ============================================================================
// SECTION: Adapter Descriptor
// ============================================================================

/// An adapter descriptor, loaded as opaque structured data and later mapped
/// into `AllowedAction` records by the Resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    /// Adapter name, referenced by the manifest.
    pub name: String,
    /// Raw adapter descriptor content (tool/function definitions).
    pub content: Value,
}

// ============================================================================
// SECTION: Assembled Atlas
// ============================================================================

/// A fully loaded and validated Atlas capability package.
///
/// # Invariants
/// - Cached by absolute resolved directory path.
/// - Either the full bundle registers, or nothing does (no partial loads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atlas {
    /// Schema-validated manifest.
    pub manifest: AtlasManifest,
    /// Loaded context packs.
    pub context_packs: Vec<ContextPack>,
    /// Loaded policy files.
    pub policy_files: Vec<AtlasPolicyFile>,
    /// Loaded adapter descriptors.
    pub adapters: Vec<AdapterDescriptor>,
    /// Absolute path this Atlas was loaded from (the cache key).
    pub loaded_from: String,
}

impl Atlas {
    /// Returns the Atlas's own identifier.
    #[must_use]
    pub fn id(&self) -> &AtlasId {
        &self.manifest.id
    }

    /// Returns whether this Atlas declares the given capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.manifest.capabilities.iter().any(|c| c == capability)
    }

    /// Returns context packs, optionally filtered to those scoped to a
    /// capability (packs with no declared capability are always included).
    #[must_use]
    pub fn context_blocks_for(&self, capability: Option<&str>) -> Vec<&ContextPack> {
        self.context_packs
            .iter()
            .filter(|pack| match (&pack.capability, capability) {
                (Some(pack_cap), Some(wanted)) => pack_cap == wanted,
                (None, _) => true,
                (Some(_), None) => false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas() -> Atlas {
        Atlas {
            manifest: AtlasManifest {
                id: AtlasId::new("demo.atlas"),
                version: "1.0.0".to_string(),
                name: "Demo Atlas".to_string(),
                capabilities: vec!["echo".to_string()],
                context_packs: vec![],
                policy_files: vec![],
                adapter_descriptors: vec![],
                dependencies: vec![],
                certification_flags: vec![],
            },
            context_packs: vec![
                ContextPack {
                    relative_path: "guidelines.md".to_string(),
                    content_type: ContextPackContentType::Markdown,
                    content: "be nice".to_string(),
                    capability: None,
                },
                ContextPack {
                    relative_path: "echo.md".to_string(),
                    content_type: ContextPackContentType::Markdown,
                    content: "echo stuff".to_string(),
                    capability: Some("echo".to_string()),
                },
            ],
            policy_files: vec![],
            adapters: vec![],
            loaded_from: "/atlases/demo".to_string(),
        }
    }

    #[test]
    fn has_capability_checks_the_manifest_list() {
        let atlas = atlas();
        assert!(atlas.has_capability("echo"));
        assert!(!atlas.has_capability("deploy"));
    }

    #[test]
    fn context_blocks_for_includes_unscoped_and_matching_scoped_packs() {
        let atlas = atlas();
        let filtered = atlas.context_blocks_for(Some("echo"));
        assert_eq!(filtered.len(), 2);

        let other = atlas.context_blocks_for(Some("deploy"));
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].relative_path, "guidelines.md");
    }
}
