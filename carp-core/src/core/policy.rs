// carp-core/src/core/policy.rs
// ============================================================================
// Module: CARP Runtime Policy Model
// Description: Policy rules, evaluation context, and decisions for the
//              Policy Engine (C3).
// Purpose: Define the data shapes the Policy Engine folds over when
//          evaluating a resolution or execution request.
// Dependencies: crate::core::{identifiers, time}, carp_policy_logic, serde, serde_json
// ============================================================================

//! ## Overview
//! A policy rule is one of five kinds (`scope`, `deny_pattern`,
//! `risk_approval`, `rate_limit`, `redaction`), each carrying a compositional
//! condition evaluated with tri-state (Kleene) logic so that a rule whose
//! condition cannot be evaluated fails closed rather than silently passing.
//! Evaluation folds an ordered rule list into one [`PolicyDecision`]; rule
//! order is significant and is never reordered by the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::RuleId;
use carp_policy_logic::Requirement;

// ============================================================================
// SECTION: Policy Rule
// ============================================================================

/// Risk tier a `risk_approval` rule gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Low risk; no additional gating.
    Low,
    /// Medium risk; confidence is discounted.
    Medium,
    /// High risk; confidence is discounted further and approval is commonly
    /// required.
    High,
}

/// Conflict resolution policy when multiple rules of overlapping scope fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The whole evaluation fails if rules conflict.
    Fail,
    /// The last matching rule in declaration order wins.
    LastWriteWins,
    /// The rule with the higher declared priority wins.
    Priority,
}

/// The kind-specific body of a policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRuleKind {
    /// Restricts which scopes an action may be granted under.
    Scope {
        /// Scopes this rule permits.
        allowed_scopes: Vec<String>,
    },
    /// Denies actions whose target matches a glob pattern.
    DenyPattern {
        /// Glob pattern matched against the action's target (e.g. a file
        /// path or command string).
        pattern: String,
    },
    /// Requires human approval above a risk tier.
    RiskApproval {
        /// Risk tier at and above which approval is required.
        at_or_above: RiskTier,
    },
    /// Bounds the rate of matching actions within a sliding window.
    RateLimit {
        /// Maximum matching actions permitted within the window.
        max_count: u32,
        /// Sliding window length, in seconds.
        window_seconds: u64,
    },
    /// Marks fields in the result for redaction before it is surfaced.
    Redaction {
        /// Dotted field paths to redact.
        fields: Vec<String>,
    },
}

/// A single policy rule: a kind, a compositional condition, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable rule identifier, used in decision audit trails.
    pub rule_id: RuleId,
    /// Declaration-order priority; higher wins under [`ConflictPolicy::Priority`].
    #[serde(default)]
    pub priority: i64,
    /// Kind-specific rule body.
    #[serde(flatten)]
    pub kind: PolicyRuleKind,
    /// Compositional condition gating whether this rule applies; `None`
    /// means the rule always applies.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<Requirement<String>>,
}

// ============================================================================
// SECTION: Evaluation Context
// ============================================================================

/// The facts a [`PolicyRule`] condition is evaluated against.
///
/// Predicate names in a rule's [`Requirement`] are looked up against
/// `facts` as tri-state booleans; a name absent from `facts` evaluates to
/// `Unknown` rather than `False`, so that missing information fails a
/// conservative engine closed rather than silently permissive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyContext {
    /// Scopes the acting session currently holds.
    pub session_scopes: Vec<String>,
    /// Candidate action identifier, if evaluating an action grant.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action_id: Option<String>,
    /// Declared risk tier of the candidate action.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub risk_tier: Option<RiskTier>,
    /// Target string the action would operate on (path, command, URI).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<String>,
    /// Opaque named facts available to rule conditions.
    #[serde(default)]
    pub facts: BTreeMap<String, bool>,
    /// Free-form structured context (e.g. request parameters) rules may
    /// inspect via predicate evaluation.
    #[serde(default)]
    pub extra: Value,
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// The effect a policy evaluation resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    /// Unconditionally permitted.
    Allow,
    /// Permitted subject to attached constraints (e.g. redactions).
    AllowWithConstraints,
    /// Requires human approval before execution.
    RequireApproval,
    /// Denied outright.
    Deny,
}

/// Constraints attached to an `allow_with_constraints` or `require_approval`
/// decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConstraints {
    /// Dotted field paths to redact from the result.
    #[serde(default)]
    pub redact_fields: Vec<String>,
    /// Additional scopes the grant is narrowed to, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub narrowed_scopes: Option<Vec<String>>,
}

/// The outcome of folding an ordered rule list over a [`PolicyContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Final resolved effect.
    pub effect: PolicyEffect,
    /// Rule ids that contributed to the decision, in evaluation order.
    pub matched_rules: Vec<RuleId>,
    /// Constraints accumulated from matched rules.
    pub constraints: PolicyConstraints,
    /// Whether this decision itself requires human approval before the
    /// gated action may proceed. Kept distinct from `effect` so callers can
    /// test for approval without matching on the effect lattice; always
    /// `true` when `effect == RequireApproval`.
    pub requires_approval: bool,
    /// Human-readable reason for the decision (e.g. the denying rule's id).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl PolicyDecision {
    /// An unconditional, unconstrained allow with no matched rules.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            effect: PolicyEffect::Allow,
            matched_rules: Vec::new(),
            constraints: PolicyConstraints::default(),
            requires_approval: false,
            reason: None,
        }
    }

    /// Returns whether this decision permits proceeding at all (i.e. is not
    /// a [`PolicyEffect::Deny`]).
    #[must_use]
    pub fn permits_proceeding(&self) -> bool {
        self.effect != PolicyEffect::Deny
    }
}
