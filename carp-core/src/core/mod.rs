// carp-core/src/core/mod.rs
// ============================================================================
// Module: CARP Runtime Core Data Model
// Description: Submodule declarations for the domain types shared by every
//              runtime component.
// Purpose: Re-export a flat, stable surface so callers depend on
//          `carp_core::core::X` without knowing which file defines it.
// Dependencies: (see individual submodules)
// ============================================================================

//! ## Overview
//! This module groups the pure data model: identifiers, timestamps, and the
//! record types for sessions, trace events, Atlases, policy, resolutions,
//! grants/executions, and replay manifests. None of these types hold
//! runtime behavior beyond small, pure helper methods; the stateful
//! components that operate on them live under `crate::runtime`.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod atlas;
pub mod grant;
pub mod hashing;
pub mod identifiers;
pub mod policy;
pub mod replay;
pub mod resolution;
pub mod session;
pub mod time;
pub mod trace;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use atlas::AdapterDescriptor;
pub use atlas::Atlas;
pub use atlas::AtlasDependency;
pub use atlas::AtlasManifest;
pub use atlas::AtlasPolicyFile;
pub use atlas::ContextPack;
pub use atlas::ContextPackContentType;

pub use grant::ActionExecution;
pub use grant::ActionGrant;
pub use grant::ApprovalRequest;
pub use grant::ExecuteRequest;
pub use grant::ExecuteResponse;
pub use grant::ExecutionState;

pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use hashing::hash_canonical_json;
pub use hashing::hash_canonical_json_numeric_normalized;

pub use identifiers::ActionId;
pub use identifiers::AtlasId;
pub use identifiers::BlockId;
pub use identifiers::DecisionId;
pub use identifiers::ExecutionId;
pub use identifiers::GrantId;
pub use identifiers::PrincipalId;
pub use identifiers::ResolutionId;
pub use identifiers::RuleId;
pub use identifiers::SessionId;
pub use identifiers::SpanId;
pub use identifiers::TraceId;

pub use policy::ConflictPolicy;
pub use policy::PolicyConstraints;
pub use policy::PolicyContext;
pub use policy::PolicyDecision;
pub use policy::PolicyEffect;
pub use policy::PolicyRule;
pub use policy::PolicyRuleKind;
pub use policy::RiskTier;

pub use replay::DifferenceSeverity;
pub use replay::NondeterminismRule;
pub use replay::NondeterminismRuleKind;
pub use replay::REPLAY_MANIFEST_VERSION;
pub use replay::ReplayArtifact;
pub use replay::ReplayDifference;
pub use replay::ReplayManifest;
pub use replay::ReplayResult;
pub use replay::default_nondeterminism_rules;
pub use replay::path_matches;

pub use resolution::ActionKind;
pub use resolution::AllowedAction;
pub use resolution::ContextBlock;
pub use resolution::ContextBlockContentType;
pub use resolution::DenyRule;
pub use resolution::MergeConflictPolicy;
pub use resolution::MergeRules;
pub use resolution::Resolution;
pub use resolution::ResolveRequest;
pub use resolution::ResolveResponse;
pub use resolution::SourceEvidence;
pub use resolution::SourceEvidenceKind;

pub use session::MAX_SESSION_TTL_SECONDS;
pub use session::MIN_SESSION_TTL_SECONDS;
pub use session::Principal;
pub use session::PrincipalKind;
pub use session::Session;
pub use session::SessionCounters;
pub use session::SessionEndReason;
pub use session::SessionState;
pub use session::SessionSummary;

pub use time::Timestamp;
pub use time::TimestampParseError;

pub use trace::TRACE_VERSION;
pub use trace::Actor;
pub use trace::ActorKind;
pub use trace::ArtifactShapeError;
pub use trace::AtlasRef;
pub use trace::EventArtifact;
pub use trace::Severity;
pub use trace::TraceContext;
pub use trace::TraceEvent;
pub use trace::event_type;
pub use trace::validate_sha256;
