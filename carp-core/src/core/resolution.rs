// carp-core/src/core/resolution.rs
// ============================================================================
// Module: CARP Runtime Resolution Model
// Description: The bundle the Resolver (C5) hands back for one request.
// Purpose: Define context blocks, allowed/deny actions, and the assembled
//          Resolution record, plus the resolve request/response envelope.
// Dependencies: crate::core::{identifiers, time, atlas, policy, trace}, serde, serde_json
// ============================================================================

//! ## Overview
//! A Resolution is the Resolver's answer to "given this session, Atlas, and
//! goal, what context applies and what may I do?" It bundles ranked context
//! blocks with their provenance, the actions currently permitted, any deny
//! rules in force, and a confidence score discounted by risk and constraint
//! narrowing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::atlas::ContextPackContentType;
use crate::core::identifiers::AtlasId;
use crate::core::identifiers::BlockId;
use crate::core::identifiers::ResolutionId;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SessionId;
use crate::core::policy::RiskTier;
use crate::core::time::Timestamp;
use crate::core::trace::TraceContext;

// ============================================================================
// SECTION: Context Blocks
// ============================================================================

/// What kind of provenance backs a context block's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEvidenceKind {
    /// Sourced from a registered Atlas's context pack file.
    AtlasContextPack,
    /// Synthesized by the runtime itself (baseline guidance, task context).
    RuntimeBaseline,
    /// Derived from the policy decision made for this resolution.
    PolicyDecision,
}

/// Where a context block's content originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvidence {
    /// What kind of source this evidence points at.
    #[serde(rename = "type")]
    pub kind: SourceEvidenceKind,
    /// Reference to the source within its kind (a relative path for an Atlas
    /// context pack, a synthetic `builtin/<name>` path otherwise).
    #[serde(rename = "ref")]
    pub reference: String,
    /// Lowercase hex SHA-256 digest of the block's content.
    pub sha256: String,
}

/// Content type of an assembled context block.
///
/// Distinct from [`ContextPackContentType`](crate::core::atlas::ContextPackContentType):
/// an Atlas context pack may be authored as YAML, but a block folded into a
/// Resolution only ever carries one of these four wire-level types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextBlockContentType {
    /// Markdown text.
    Markdown,
    /// JSON document.
    Json,
    /// Plain text.
    Plain,
    /// PNG image, base64-encoded in `content`.
    Png,
}

impl From<ContextPackContentType> for ContextBlockContentType {
    /// Atlas context packs may be authored as YAML; a Resolution's content
    /// blocks have no YAML variant, so a YAML pack folds down to plain text.
    fn from(value: ContextPackContentType) -> Self {
        match value {
            ContextPackContentType::Markdown => Self::Markdown,
            ContextPackContentType::Json => Self::Json,
            ContextPackContentType::Plain | ContextPackContentType::Yaml => Self::Plain,
        }
    }
}

/// A ranked slice of context assembled into a Resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Identifier of this block within the Resolution.
    pub block_id: BlockId,
    /// Short description of why this block was included (e.g.
    /// `"agent-guidelines"`, `"task-context"`, `"policy-context"`).
    pub purpose: String,
    /// Seconds this block remains valid for before a caller should treat it
    /// as stale and re-resolve.
    pub ttl_seconds: u64,
    /// Content type of `content`.
    pub content_type: ContextBlockContentType,
    /// Block content.
    pub content: String,
    /// Relevance rank; lower is more relevant. Ties broken by `block_id`
    /// lexicographic order for determinism.
    pub rank: u32,
    /// Field paths redacted from this block's content, if any.
    #[serde(default)]
    pub redactions: Vec<String>,
    /// Provenance of this block's content.
    pub source_evidence: SourceEvidence,
}

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Kind of action an Atlas adapter may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A structured tool call.
    ToolCall,
    /// A Model Context Protocol call.
    McpCall,
    /// A CLI command invocation.
    CliCommand,
    /// A generic agent-exposed tool.
    AgentTool,
}

/// An action currently permitted under the active Resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedAction {
    /// Action identifier (e.g. `"cra.echo"`).
    pub action_id: String,
    /// Kind of action.
    pub kind: ActionKind,
    /// Declared risk tier.
    pub risk_tier: RiskTier,
    /// Name of the adapter that exposes this action.
    pub adapter: String,
    /// JSON Schema (or schema-shaped) description of accepted parameters.
    #[serde(default)]
    pub parameters_schema: Value,
    /// Constraints intrinsic to this action (e.g. `"read-only"`,
    /// `"sandboxed"`), independent of any policy-level constraint.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Whether a grant of this action requires human approval before
    /// dispatch: the OR of the policy decision's `requires_approval`,
    /// `risk_tier == high`, and this action's own intrinsic requirement.
    pub requires_approval: bool,
    /// Dispatch timeout in milliseconds, applied by the Action Executor.
    pub timeout_ms: u64,
    /// Atlas this action was sourced from.
    pub source_atlas: AtlasId,
}

/// A deny rule currently in force against candidate actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyRule {
    /// Rule identifier, surfaced for audit purposes.
    pub rule_id: RuleId,
    /// Glob pattern denied targets must not match.
    pub pattern: String,
    /// Human-readable reason this rule exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

// ============================================================================
// SECTION: Merge Rules
// ============================================================================

/// How conflicting context/action contributions from multiple Atlases are
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeConflictPolicy {
    /// Fail the resolution outright on conflict.
    Fail,
    /// The most recently merged Atlas's contribution wins.
    LastWriteWins,
    /// The higher-priority Atlas's contribution wins.
    Priority,
}

/// Merge configuration applied when multiple Atlases contribute to one
/// Resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRules {
    /// Conflict policy to apply.
    pub conflict_policy: MergeConflictPolicy,
    /// Atlas ids in priority order (highest first), used when
    /// `conflict_policy` is [`MergeConflictPolicy::Priority`].
    #[serde(default)]
    pub priority_order: Vec<AtlasId>,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// The assembled answer to one resolve request.
///
/// # Invariants
/// - `confidence` is in `[0.0, 1.0]`, rounded to two decimal places.
/// - `context_blocks` are returned in ascending `rank` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Resolution identifier.
    pub resolution_id: ResolutionId,
    /// Owning session.
    pub session_id: SessionId,
    /// Atlases that contributed to this Resolution.
    pub atlases: Vec<AtlasId>,
    /// Ranked context blocks.
    pub context_blocks: Vec<ContextBlock>,
    /// Actions currently permitted.
    pub allowed_actions: Vec<AllowedAction>,
    /// Deny rules currently in force.
    pub deny_rules: Vec<DenyRule>,
    /// Merge policy applied when multiple Atlases contributed to this
    /// Resolution.
    pub merge_rules: MergeRules,
    /// Confidence score discounted by risk tier and constraint narrowing.
    pub confidence: f64,
    /// Guidance for the caller on what to do next; non-empty and phrased
    /// around the approval workflow when `allowed_actions` contains any
    /// action with `requires_approval == true`.
    pub next_steps: Vec<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Resolve Request / Response
// ============================================================================

/// A request to resolve context and actions for a session against one or
/// more Atlases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Session the resolution is performed on behalf of.
    pub session_id: SessionId,
    /// Atlases to resolve against, in contribution order.
    pub atlases: Vec<AtlasId>,
    /// Free-form natural-language or structured goal describing the intent.
    pub goal: String,
    /// Declared risk tier of the task; reduces confidence and, at `high`,
    /// forces `requires_approval` on every allowed action.
    pub risk_tier: RiskTier,
    /// Target platforms the caller intends to execute allowed actions on
    /// (e.g. `"cli"`, `"mcp"`); informational, does not filter actions.
    #[serde(default)]
    pub target_platforms: Vec<String>,
    /// Inbound trace context this resolution's span is parented to: the new
    /// span's parent is `trace.parent_span_id` if present, else
    /// `trace.span_id`.
    pub trace: TraceContext,
    /// Capability filter, if the caller wants to narrow context/actions to
    /// one declared capability.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub capability: Option<String>,
    /// Merge configuration when multiple Atlases are supplied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub merge_rules: Option<MergeRules>,
}

/// The response to a resolve request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponse {
    /// The assembled Resolution.
    pub resolution: Resolution,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;

    #[test]
    fn confidence_stays_within_unit_interval() {
        let resolution = Resolution {
            resolution_id: ResolutionId::new("r1"),
            session_id: SessionId::new("s1"),
            atlases: vec![AtlasId::new("a1")],
            context_blocks: vec![],
            allowed_actions: vec![],
            deny_rules: vec![],
            merge_rules: MergeRules {
                conflict_policy: MergeConflictPolicy::LastWriteWins,
                priority_order: vec![],
            },
            confidence: 0.85,
            next_steps: vec!["proceed with the allowed actions".to_string()],
            created_at: Timestamp::parse("2026-01-01T00:00:00Z").expect("time"),
        };
        assert!((0.0..=1.0).contains(&resolution.confidence));
    }
}
