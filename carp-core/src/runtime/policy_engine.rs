// carp-core/src/runtime/policy_engine.rs
// ============================================================================
// Module: Policy Engine (C3)
// Description: Folds an ordered rule list into one decision per request.
// Purpose: The runtime's sole gate between a candidate action/resolution
//          and permission to proceed.
// Dependencies: crate::core::policy, carp_policy_logic, std::sync
// ============================================================================

//! ## Overview
//! Rules are evaluated in insertion order. Each applicable rule returns a
//! partial decision; the engine folds partial decisions left to right:
//! any deny short-circuits immediately, `require_approval` sets the running
//! effect unless a prior deny was seen, `allow_with_constraints` upgrades
//! only from a running `allow`, and the absence of any partial decision
//! resolves to `allow`. A rule's applicability condition is evaluated under
//! Kleene tri-state logic so that missing facts fail a deny-relevant
//! predicate closed rather than silently permitting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use carp_policy_logic::GroupCounts;
use carp_policy_logic::KleeneLogic;
use carp_policy_logic::Requirement;
use carp_policy_logic::TriLogic;
use carp_policy_logic::TriState;

use crate::core::ConflictPolicy;
use crate::core::PolicyConstraints;
use crate::core::PolicyContext;
use crate::core::PolicyDecision;
use crate::core::PolicyEffect;
use crate::core::PolicyRule;
use crate::core::PolicyRuleKind;
use crate::core::RiskTier;
use crate::core::RuleId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Built-in Rules
// ============================================================================

/// Glob patterns for obviously destructive commands, denied unconditionally
/// by the built-in baseline rule.
const DESTRUCTIVE_GLOBS: &[&str] = &[
    "rm -rf *",
    "rm -rf /",
    "dd if=*",
    "mkfs.*",
    ":(){:|:&};:",
    "*.production.*",
    "DROP TABLE*",
    "DELETE FROM*",
];

/// Metadata key substrings redacted by the built-in redaction rule.
const SENSITIVE_KEY_SUBSTRINGS: &[&str] =
    &["password", "secret", "token", "api_key", "credential"];

/// Builds the default rule set installed at engine construction: one deny
/// rule per entry in [`DESTRUCTIVE_GLOBS`] (kept as separate rules since a
/// joined `|`-delimited pattern would mis-split a glob like the fork bomb
/// pattern that itself contains a literal `|`), a risk-approval rule for
/// `risk_tier == high`, and a redaction rule over [`SENSITIVE_KEY_SUBSTRINGS`].
#[must_use]
pub fn builtin_rules() -> Vec<PolicyRule> {
    let mut rules: Vec<PolicyRule> = DESTRUCTIVE_GLOBS
        .iter()
        .enumerate()
        .map(|(index, pattern)| PolicyRule {
            rule_id: RuleId::new(format!("builtin.deny-destructive.{index}")),
            priority: 0,
            kind: PolicyRuleKind::DenyPattern {
                pattern: (*pattern).to_string(),
            },
            condition: None,
        })
        .collect();
    rules.extend(vec![
        PolicyRule {
            rule_id: RuleId::new("builtin.require-approval-high-risk"),
            priority: 0,
            kind: PolicyRuleKind::RiskApproval {
                at_or_above: RiskTier::High,
            },
            condition: None,
        },
        PolicyRule {
            rule_id: RuleId::new("builtin.redact-sensitive"),
            priority: 0,
            kind: PolicyRuleKind::Redaction {
                fields: SENSITIVE_KEY_SUBSTRINGS
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            },
            condition: None,
        },
    ]);
    rules
}

// ============================================================================
// SECTION: Glob Matching
// ============================================================================

/// Compiles a glob (`*` → any run, `?` → any char, other characters
/// literal) into an anchored, case-insensitive matcher and tests `target`.
#[must_use]
pub fn glob_matches(pattern: &str, target: &str) -> bool {
    let compiled = compile_glob(pattern);
    regex_lite_match(&compiled, &target.to_lowercase())
}

/// Normalizes free text the way deny-pattern matching expects: any run of
/// non-alphanumeric characters collapses to a single `.`, the result is
/// lowercased, consecutive dots are deduplicated, and leading/trailing dots
/// are trimmed.
#[must_use]
pub fn normalize_goal(goal: &str) -> String {
    let mut normalized = String::with_capacity(goal.len());
    let mut last_was_dot = false;
    for ch in goal.chars() {
        if ch.is_alphanumeric() {
            normalized.push(ch.to_ascii_lowercase());
            last_was_dot = false;
        } else if !last_was_dot {
            normalized.push('.');
            last_was_dot = true;
        }
    }
    normalized.trim_matches('.').to_string()
}

/// One compiled glob token.
enum GlobToken {
    /// Matches any run of zero or more characters.
    AnyRun,
    /// Matches exactly one character.
    AnyChar,
    /// Matches this literal character (already lowercased).
    Literal(char),
}

fn compile_glob(pattern: &str) -> Vec<GlobToken> {
    pattern
        .chars()
        .map(|ch| match ch {
            '*' => GlobToken::AnyRun,
            '?' => GlobToken::AnyChar,
            other => GlobToken::Literal(other.to_ascii_lowercase()),
        })
        .collect()
}

/// Backtracking glob matcher over a pre-compiled token list.
fn regex_lite_match(tokens: &[GlobToken], text: &str) -> bool {
    fn recurse(tokens: &[GlobToken], text: &[char]) -> bool {
        match tokens.split_first() {
            None => text.is_empty(),
            Some((GlobToken::AnyRun, rest)) => {
                (0..=text.len()).any(|split| recurse(rest, &text[split..]))
            }
            Some((GlobToken::AnyChar, rest)) => {
                !text.is_empty() && recurse(rest, &text[1..])
            }
            Some((GlobToken::Literal(expected), rest)) => {
                matches!(text.first(), Some(actual) if actual == expected) && recurse(rest, &text[1..])
            }
        }
    }
    let chars: Vec<char> = text.chars().collect();
    recurse(tokens, &chars)
}

// ============================================================================
// SECTION: Condition Evaluation
// ============================================================================

/// Evaluates a rule's named-predicate condition against the context's
/// `facts` map, under Kleene tri-state logic: a predicate name absent from
/// `facts` evaluates to [`TriState::Unknown`] rather than `False`.
fn evaluate_condition(condition: &Requirement<String>, ctx: &PolicyContext) -> TriState {
    let logic = KleeneLogic;
    eval_node(condition, ctx, &logic)
}

/// Recursively folds a [`Requirement`] tree into a [`TriState`], delegating
/// the universal AND/OR/NOT/group combinators to `logic` and resolving
/// leaves against `ctx.facts`.
fn eval_node(node: &Requirement<String>, ctx: &PolicyContext, logic: &KleeneLogic) -> TriState {
    match node {
        Requirement::Predicate(name) => ctx.facts.get(name).map_or(TriState::Unknown, |value| {
            if *value {
                TriState::True
            } else {
                TriState::False
            }
        }),
        Requirement::Not(inner) => logic.not(eval_node(inner, ctx, logic)),
        Requirement::And(items) => items
            .iter()
            .map(|item| eval_node(item, ctx, logic))
            .fold(TriState::True, |acc, value| logic.and(acc, value)),
        Requirement::Or(items) => items
            .iter()
            .map(|item| eval_node(item, ctx, logic))
            .fold(TriState::False, |acc, value| logic.or(acc, value)),
        Requirement::RequireGroup { min, reqs } => {
            let mut satisfied = 0usize;
            let mut unknown = 0usize;
            for req in reqs {
                match eval_node(req, ctx, logic) {
                    TriState::True => satisfied += 1,
                    TriState::Unknown => unknown += 1,
                    TriState::False => {}
                }
            }
            logic.require_group(
                *min,
                GroupCounts {
                    satisfied,
                    unknown,
                    total: reqs.len(),
                },
            )
        }
    }
}

/// Returns whether a rule applies to `ctx`: an absent condition always
/// applies; a present condition applies unless it evaluates definitely
/// `False` (an `Unknown` result fails closed — the rule is treated as
/// applicable, matching the engine's "exception inside a rule ⇒ deny"
/// posture for deny-relevant predicates).
fn rule_applies(rule: &PolicyRule, ctx: &PolicyContext) -> bool {
    match &rule.condition {
        None => true,
        Some(condition) => !matches!(evaluate_condition(condition, ctx), TriState::False),
    }
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

/// A sliding-window rate-limit counter keyed by `(principal_id, action_id or "any")`.
#[derive(Default)]
struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<Timestamp>>>,
}

impl RateLimiter {
    fn check_and_record(&self, key: &str, max_count: u32, window_seconds: u64, now: Timestamp) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            return false;
        };
        let entries = windows.entry(key.to_string()).or_default();
        entries.retain(|seen| now.saturating_millis_since(*seen) < window_seconds * 1000);
        if entries.len() as u32 >= max_count {
            return false;
        }
        entries.push(now);
        true
    }
}

// ============================================================================
// SECTION: Policy Engine
// ============================================================================

/// Policy Engine (C3): folds an ordered rule list into one [`PolicyDecision`].
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    conflict_policy: ConflictPolicy,
    rate_limiter: RateLimiter,
}

impl PolicyEngine {
    /// Creates a policy engine seeded with the built-in default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(builtin_rules())
    }

    /// Creates a policy engine with an explicit rule set (e.g. built-ins
    /// plus Atlas-contributed rules).
    #[must_use]
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules,
            conflict_policy: ConflictPolicy::LastWriteWins,
            rate_limiter: RateLimiter::default(),
        }
    }

    /// Appends additional rules (e.g. mounted from an Atlas's policy file)
    /// after the existing set, preserving insertion order.
    pub fn extend_rules(&mut self, rules: impl IntoIterator<Item = PolicyRule>) {
        self.rules.extend(rules);
    }

    /// Evaluates `ctx` against every rule in insertion order, folding
    /// partial decisions per the engine's precedence algorithm.
    #[must_use]
    pub fn evaluate(&self, ctx: &PolicyContext) -> PolicyDecision {
        self.evaluate_with_extra(ctx, &[])
    }

    /// Evaluates `ctx` against the engine's own rule set followed by
    /// `extra_rules` (e.g. rules mounted from an Atlas's policy file for the
    /// duration of one resolve call), without mutating the engine's stored
    /// rule set.
    #[must_use]
    pub fn evaluate_with_extra(&self, ctx: &PolicyContext, extra_rules: &[PolicyRule]) -> PolicyDecision {
        let now = Timestamp::now();
        let mut effect = PolicyEffect::Allow;
        let mut matched_rules = Vec::new();
        let mut constraints = PolicyConstraints::default();
        let mut reason = None;

        for rule in self.rules.iter().chain(extra_rules.iter()) {
            if !rule_applies(rule, ctx) {
                continue;
            }

            let Some(partial) = self.evaluate_rule(rule, ctx, now) else {
                continue;
            };

            matched_rules.push(rule.rule_id.clone());

            match partial.effect {
                PolicyEffect::Deny => {
                    return PolicyDecision {
                        effect: PolicyEffect::Deny,
                        matched_rules,
                        constraints,
                        requires_approval: false,
                        reason: partial.reason.or(reason),
                    };
                }
                PolicyEffect::RequireApproval => {
                    effect = PolicyEffect::RequireApproval;
                    reason = partial.reason.or(reason);
                }
                PolicyEffect::AllowWithConstraints => {
                    if effect == PolicyEffect::Allow {
                        effect = PolicyEffect::AllowWithConstraints;
                    }
                    merge_constraints(&mut constraints, partial.constraints, self.conflict_policy);
                }
                PolicyEffect::Allow => {}
            }
        }

        PolicyDecision {
            requires_approval: effect == PolicyEffect::RequireApproval,
            effect,
            matched_rules,
            constraints,
            reason,
        }
    }

    /// Returns every currently configured `deny_pattern` rule, from the
    /// engine's own rule set plus `extra_rules`, as [`crate::core::DenyRule`]
    /// records suitable for surfacing in a Resolution.
    #[must_use]
    pub fn deny_rules_for(&self, extra_rules: &[PolicyRule]) -> Vec<crate::core::DenyRule> {
        self.rules
            .iter()
            .chain(extra_rules.iter())
            .filter_map(|rule| match &rule.kind {
                PolicyRuleKind::DenyPattern { pattern } => Some(crate::core::DenyRule {
                    rule_id: rule.rule_id.clone(),
                    pattern: pattern.clone(),
                    reason: None,
                }),
                _ => None,
            })
            .collect()
    }

    /// Evaluates one rule in isolation, returning `None` when the rule's
    /// kind-specific check does not fire for this context.
    fn evaluate_rule(
        &self,
        rule: &PolicyRule,
        ctx: &PolicyContext,
        now: Timestamp,
    ) -> Option<PartialDecision> {
        match &rule.kind {
            PolicyRuleKind::Scope { allowed_scopes } => {
                let violates = !ctx
                    .session_scopes
                    .iter()
                    .all(|scope| allowed_scopes.iter().any(|allowed| allowed == scope));
                violates.then(|| PartialDecision::deny(format!(
                    "session scopes not covered by rule {}",
                    rule.rule_id
                )))
            }
            PolicyRuleKind::DenyPattern { pattern } => {
                let candidates = deny_match_candidates(ctx);
                let matched = pattern
                    .split('|')
                    .any(|glob| candidates.iter().any(|candidate| glob_matches(glob, candidate)));
                matched.then(|| {
                    PartialDecision::deny(format!("matched deny pattern for rule {}", rule.rule_id))
                })
            }
            PolicyRuleKind::RiskApproval { at_or_above } => ctx
                .risk_tier
                .filter(|tier| tier >= at_or_above)
                .map(|_| PartialDecision::require_approval(format!(
                    "risk tier at or above {at_or_above:?} requires approval"
                ))),
            PolicyRuleKind::RateLimit {
                max_count,
                window_seconds,
            } => {
                let key = format!(
                    "{}:{}",
                    ctx.facts.get("principal_id_present").is_some().then_some("scoped").unwrap_or("any"),
                    ctx.action_id.as_deref().unwrap_or("any")
                );
                let allowed = self
                    .rate_limiter
                    .check_and_record(&key, *max_count, *window_seconds, now);
                (!allowed).then(|| PartialDecision::deny(format!(
                    "rate limit exceeded for rule {}",
                    rule.rule_id
                )))
            }
            PolicyRuleKind::Redaction { fields } => {
                let matched_fields = redaction_matches(ctx, fields);
                (!matched_fields.is_empty())
                    .then(|| PartialDecision::allow_with_redactions(matched_fields))
            }
        }
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The candidate strings deny patterns are checked against: raw
/// `action_id`, raw `target`, the goal carried in `extra.goal` if present,
/// and the goal's normalized form.
fn deny_match_candidates(ctx: &PolicyContext) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(action_id) = &ctx.action_id {
        candidates.push(action_id.clone());
    }
    if let Some(target) = &ctx.target {
        candidates.push(target.clone());
    }
    if let Some(goal) = ctx.extra.get("goal").and_then(|value| value.as_str()) {
        candidates.push(goal.to_string());
        candidates.push(normalize_goal(goal));
    }
    candidates
}

/// Returns the configured redaction field names that substring-match (case
/// insensitively) any metadata key present in `ctx.facts` or `ctx.extra`.
fn redaction_matches(ctx: &PolicyContext, fields: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = ctx.facts.keys().cloned().collect();
    if let Some(object) = ctx.extra.as_object() {
        keys.extend(object.keys().cloned());
    }
    fields
        .iter()
        .filter(|field| {
            keys.iter()
                .any(|key| key.to_lowercase().contains(&field.to_lowercase()))
        })
        .cloned()
        .collect()
}

/// One rule's contribution to the folded decision.
struct PartialDecision {
    effect: PolicyEffect,
    constraints: PolicyConstraints,
    reason: Option<String>,
}

impl PartialDecision {
    fn deny(reason: String) -> Self {
        Self {
            effect: PolicyEffect::Deny,
            constraints: PolicyConstraints::default(),
            reason: Some(reason),
        }
    }

    fn require_approval(reason: String) -> Self {
        Self {
            effect: PolicyEffect::RequireApproval,
            constraints: PolicyConstraints::default(),
            reason: Some(reason),
        }
    }

    fn allow_with_redactions(redact_fields: Vec<String>) -> Self {
        Self {
            effect: PolicyEffect::AllowWithConstraints,
            constraints: PolicyConstraints {
                redact_fields,
                narrowed_scopes: None,
            },
            reason: None,
        }
    }
}

/// Merges one rule's constraint contribution into the running total:
/// last-writer-wins on scope narrowing, union on redaction fields.
fn merge_constraints(
    running: &mut PolicyConstraints,
    incoming: PolicyConstraints,
    _conflict_policy: ConflictPolicy,
) {
    for field in incoming.redact_fields {
        if !running.redact_fields.contains(&field) {
            running.redact_fields.push(field);
        }
    }
    if incoming.narrowed_scopes.is_some() {
        running.narrowed_scopes = incoming.narrowed_scopes;
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
    use std::collections::BTreeMap;

    fn ctx() -> PolicyContext {
        PolicyContext {
            session_scopes: vec!["carp.resolve".to_string()],
            action_id: None,
            risk_tier: None,
            target: None,
            facts: BTreeMap::new(),
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn glob_matches_star_and_question_mark() {
        assert!(glob_matches("rm -rf *", "rm -rf /home/user"));
        assert!(glob_matches("mkfs.*", "mkfs.ext4"));
        assert!(glob_matches("a?c", "abc"));
        assert!(!glob_matches("a?c", "abbc"));
    }

    #[test]
    fn normalize_goal_collapses_non_alphanumeric_runs() {
        assert_eq!(
            normalize_goal("Deploy to production environment!"),
            "deploy.to.production.environment"
        );
    }

    #[test]
    fn default_engine_denies_destructive_commands() {
        let engine = PolicyEngine::new();
        let mut context = ctx();
        context.target = Some("rm -rf /".to_string());
        let decision = engine.evaluate(&context);
        assert_eq!(decision.effect, PolicyEffect::Deny);
    }

    #[test]
    fn default_engine_requires_approval_for_high_risk() {
        let engine = PolicyEngine::new();
        let mut context = ctx();
        context.risk_tier = Some(RiskTier::High);
        let decision = engine.evaluate(&context);
        assert_eq!(decision.effect, PolicyEffect::RequireApproval);
    }

    #[test]
    fn default_engine_allows_low_risk_benign_action() {
        let engine = PolicyEngine::new();
        let mut context = ctx();
        context.risk_tier = Some(RiskTier::Low);
        context.target = Some("echo hello".to_string());
        let decision = engine.evaluate(&context);
        assert_eq!(decision.effect, PolicyEffect::Allow);
    }

    #[test]
    fn redaction_rule_fires_on_sensitive_metadata_keys() {
        let engine = PolicyEngine::new();
        let mut context = ctx();
        context.extra = serde_json::json!({"api_key": "shh", "count": 3});
        let decision = engine.evaluate(&context);
        assert_eq!(decision.effect, PolicyEffect::AllowWithConstraints);
        assert!(decision.constraints.redact_fields.contains(&"api_key".to_string()));
    }

    #[test]
    fn rate_limit_rule_denies_once_window_is_exceeded() {
        let engine = PolicyEngine::with_rules(vec![PolicyRule {
            rule_id: RuleId::new("test.rate-limit"),
            priority: 0,
            kind: PolicyRuleKind::RateLimit {
                max_count: 1,
                window_seconds: 60,
            },
            condition: None,
        }]);
        let mut context = ctx();
        context.action_id = Some("cra.echo".to_string());
        let first = engine.evaluate(&context);
        assert_eq!(first.effect, PolicyEffect::Allow);
        let second = engine.evaluate(&context);
        assert_eq!(second.effect, PolicyEffect::Deny);
    }

    #[test]
    fn unknown_condition_fact_fails_closed_as_applicable() {
        let engine = PolicyEngine::with_rules(vec![PolicyRule {
            rule_id: RuleId::new("test.conditional-deny"),
            priority: 0,
            kind: PolicyRuleKind::DenyPattern {
                pattern: "anything".to_string(),
            },
            condition: Some(Requirement::Predicate("undeclared_fact".to_string())),
        }]);
        let mut context = ctx();
        context.target = Some("anything".to_string());
        let decision = engine.evaluate(&context);
        assert_eq!(decision.effect, PolicyEffect::Deny);
    }
}
