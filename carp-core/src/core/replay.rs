// carp-core/src/core/replay.rs
// ============================================================================
// Module: CARP Runtime Replay Manifests
// Description: Manifest, nondeterminism rules, and comparison types used to
//              replay and diff a prior trace against a fresh one.
// Purpose: Give operators a deterministic way to say "did this run behave
//          the same way" despite expected sources of nondeterminism (clocks,
//          generated identifiers, ordering).
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A replay manifest records every artifact produced by a run (name, URI,
//! sha256, content type) alongside an ordered list of nondeterminism rules
//! that tell the comparator which fields to ignore, normalize, mask, or
//! pattern-match rather than compare byte-for-byte. Comparing two manifests
//! (or a manifest against a fresh trace) yields a [`ReplayResult`] carrying
//! zero or more [`ReplayDifference`] records, each tagged with a severity so
//! callers can decide whether a mismatch is actionable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// One artifact recorded in a replay manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayArtifact {
    /// Artifact name, matching the name used in the originating trace event.
    pub name: String,
    /// Path (relative to the manifest) or URI the artifact content was
    /// captured at.
    pub path: String,
    /// Lowercase hex SHA-256 digest of the captured content.
    pub sha256: String,
    /// Declared content type.
    pub content_type: String,
}

// ============================================================================
// SECTION: Nondeterminism Rules
// ============================================================================

/// How a nondeterminism rule treats a matched field or path during
/// comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NondeterminismRuleKind {
    /// The field is skipped entirely during comparison.
    Ignore,
    /// The field is normalized (e.g. timestamp truncated to the day) before
    /// comparison.
    Normalize {
        /// Name of the built-in normalization to apply (e.g.
        /// `"timestamp_day"`, `"whitespace"`).
        normalizer: String,
    },
    /// The field is replaced with a fixed mask value before comparison.
    Mask {
        /// Mask value substituted for the field's actual content.
        replacement: String,
    },
    /// The field must match a regular expression rather than compare
    /// equal verbatim.
    Pattern {
        /// Regular expression the field's value must match in both runs.
        regex: String,
    },
}

/// A rule describing one expected source of nondeterminism between two
/// runs of the same trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NondeterminismRule {
    /// Dotted path, supporting `*` wildcards per path segment, identifying
    /// which fields this rule governs (e.g. `"payload.request_id"`,
    /// `"artifacts.*.uri"`).
    pub path_pattern: String,
    /// How matched fields are treated.
    pub kind: NondeterminismRuleKind,
}

/// The built-in rules applied unless a manifest overrides them: event
/// timestamps and trace/span identifiers are expected to differ between
/// runs and are ignored by default.
#[must_use]
pub fn default_nondeterminism_rules() -> Vec<NondeterminismRule> {
    vec![
        NondeterminismRule {
            path_pattern: "time".to_string(),
            kind: NondeterminismRuleKind::Ignore,
        },
        NondeterminismRule {
            path_pattern: "trace.span_id".to_string(),
            kind: NondeterminismRuleKind::Ignore,
        },
        NondeterminismRule {
            path_pattern: "trace.trace_id".to_string(),
            kind: NondeterminismRuleKind::Ignore,
        },
    ]
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Wire-format version of the replay manifest schema.
pub const REPLAY_MANIFEST_VERSION: &str = "1.0";

/// A replay manifest: the recorded shape of one run, suitable for later
/// comparison against a fresh run of the same trace.
///
/// # Invariants
/// - `root_hash` is the SHA-256 of the canonical JSON of `artifacts` sorted
///   by `name`, computed once all artifacts are recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayManifest {
    /// Manifest schema version.
    pub manifest_version: String,
    /// Trace this manifest was captured from.
    pub trace_id: TraceId,
    /// Recorded artifacts.
    pub artifacts: Vec<ReplayArtifact>,
    /// Nondeterminism rules in force for comparisons against this manifest.
    pub nondeterminism_rules: Vec<NondeterminismRule>,
    /// Combined root hash over all artifact records.
    pub root_hash: String,
    /// Timestamp the manifest was created.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Severity of a single difference found during replay comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceSeverity {
    /// Informational; expected variation not covered by an explicit rule.
    Info,
    /// An event present in one run is absent from the other.
    Warning,
    /// A field present in both runs diverged in value, or a field required
    /// by the baseline is missing from the candidate; invalidates the
    /// replay.
    Error,
}

/// One recorded divergence between the baseline and candidate runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDifference {
    /// Dotted path of the diverged field.
    pub path: String,
    /// Value observed in the baseline manifest.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub baseline: Option<Value>,
    /// Value observed in the candidate run.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub candidate: Option<Value>,
    /// Assigned severity.
    pub severity: DifferenceSeverity,
}

/// The outcome of comparing a baseline manifest against a candidate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether the candidate matched the baseline once nondeterminism
    /// rules were applied (no [`DifferenceSeverity::Error`] differences).
    pub matched: bool,
    /// All recorded differences, in the order found.
    pub differences: Vec<ReplayDifference>,
}

impl ReplayResult {
    /// Builds a result from a difference list, deriving `matched` from the
    /// absence of any error-severity difference.
    #[must_use]
    pub fn from_differences(differences: Vec<ReplayDifference>) -> Self {
        let matched = !differences
            .iter()
            .any(|difference| difference.severity == DifferenceSeverity::Error);
        Self {
            matched,
            differences,
        }
    }
}

// ============================================================================
// SECTION: Path Matching
// ============================================================================

/// Returns whether a dotted path matches a rule's `path_pattern`, where `*`
/// in the pattern matches exactly one path segment.
#[must_use]
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let path_segments: Vec<&str> = path.split('.').collect();
    if pattern_segments.len() != path_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(pattern_segment, path_segment)| {
            *pattern_segment == "*" || pattern_segment == path_segment
        })
}
