// carp-server/src/auth.rs
// ============================================================================
// Module: Server Authentication & RBAC
// Description: Resolves inbound bearer/API-key credentials to a Principal,
//              and an optional RBAC permission layer in front of the core.
// Purpose: Perimeter authn/authz for carp-server's REST surface, kept
//          strictly separate from the governed TRACE stream.
// Dependencies: carp-core, serde, thiserror, crate::security
// ============================================================================

//! ## Overview
//! Two credential schemes are accepted: `Authorization: Bearer <token>` and
//! `X-API-Key: <key>`. Both are resolved against a static table loaded at
//! startup — no external IdP integration. An unauthenticated request is
//! treated as anonymous; RBAC, when a role table is configured, is an
//! additional perimeter gate layered in front of the policy engine, never a
//! substitute for it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use carp_core::Principal;
use carp_core::PrincipalId;
use carp_core::PrincipalKind;
use serde::Serialize;
use thiserror::Error;

use crate::security::constant_time_eq;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// The two credential headers `carp-server` accepts.
#[derive(Debug, Clone, Default)]
pub struct InboundCredential {
    /// `Authorization: Bearer <token>` value, token only (scheme stripped).
    pub bearer_token: Option<String>,
    /// `X-API-Key` header value.
    pub api_key: Option<String>,
}

// ============================================================================
// SECTION: Credential Table
// ============================================================================

/// One configured credential: the secret it matches and the principal it
/// resolves to.
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    /// Shared secret (bearer token or API key) this entry matches.
    pub secret: String,
    /// Principal the credential resolves to.
    pub principal: Principal,
    /// Role names granted to this principal, consulted by [`RbacPolicy`].
    pub roles: Vec<String>,
}

/// Static credential table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    entries: Vec<CredentialEntry>,
}

impl CredentialTable {
    /// Builds an empty credential table (every request is anonymous).
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers one credential entry.
    #[must_use]
    pub fn with_entry(mut self, entry: CredentialEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Resolves a presented secret against the table using a constant-time
    /// comparison against every entry, so lookup time does not depend on
    /// which entry (if any) matches.
    fn resolve(&self, presented: &str) -> Option<&CredentialEntry> {
        let mut matched = None;
        for entry in &self.entries {
            if constant_time_eq(entry.secret.as_bytes(), presented.as_bytes()) {
                matched = Some(entry);
            }
        }
        matched
    }
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// How the caller authenticated, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credential presented; the request is governed only by scope
    /// checks inside the session it operates on.
    Anonymous,
    /// `Authorization: Bearer <token>` resolved to a principal.
    BearerToken,
    /// `X-API-Key` resolved to a principal.
    ApiKey,
}

/// The resolved identity of one inbound request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Method used to authenticate, if any.
    pub method: AuthMethod,
    /// Resolved principal; `None` for an anonymous request.
    pub principal: Option<Principal>,
    /// Roles granted to the resolved principal, if RBAC is configured.
    pub roles: Vec<String>,
}

impl AuthContext {
    /// The anonymous context assigned to a request with no credential.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            method: AuthMethod::Anonymous,
            principal: None,
            roles: Vec::new(),
        }
    }

    /// The principal this context's request acts as, falling back to an
    /// anonymous agent principal when no credential resolved.
    #[must_use]
    pub fn principal_or_anonymous(&self) -> Principal {
        self.principal.clone().unwrap_or_else(|| Principal {
            kind: PrincipalKind::Agent,
            id: PrincipalId::new("anonymous"),
            org_id: None,
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication or authorization failure.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential was presented but did not resolve to a known principal.
    #[error("invalid credential")]
    InvalidCredential,
    /// RBAC is configured and the resolved principal's roles do not grant
    /// the permission the request requires.
    #[error("principal lacks permission {0:?}")]
    Forbidden(String),
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves an inbound credential against `table`. A request presenting no
/// credential at all resolves to [`AuthContext::anonymous`]; a request
/// presenting one that does not match any entry is rejected rather than
/// silently falling back to anonymous, so a typo'd token never passes as
/// "no token."
///
/// # Errors
///
/// Returns [`AuthError::InvalidCredential`] when a credential was presented
/// but does not match the table.
pub fn resolve_credential(
    table: &CredentialTable,
    credential: &InboundCredential,
) -> Result<AuthContext, AuthError> {
    let (presented, method) = match (&credential.bearer_token, &credential.api_key) {
        (Some(token), _) => (token.as_str(), AuthMethod::BearerToken),
        (None, Some(key)) => (key.as_str(), AuthMethod::ApiKey),
        (None, None) => return Ok(AuthContext::anonymous()),
    };

    match table.resolve(presented) {
        Some(entry) => Ok(AuthContext {
            method,
            principal: Some(entry.principal.clone()),
            roles: entry.roles.clone(),
        }),
        None => Err(AuthError::InvalidCredential),
    }
}

// ============================================================================
// SECTION: RBAC
// ============================================================================

/// A named permission an RBAC role may grant. Strings rather than an enum:
/// the permission set is operator-configured and not closed.
pub type Permission = String;

/// Maps role names to permission sets, with role inheritance.
#[derive(Debug, Clone, Default)]
pub struct RbacPolicy {
    roles: BTreeMap<String, BTreeSet<Permission>>,
    inherits: BTreeMap<String, Vec<String>>,
}

impl RbacPolicy {
    /// An RBAC policy with no roles configured; every permission check
    /// passes trivially, matching "disabled unless a role table is
    /// configured."
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns whether this policy has any roles configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Registers a role's direct permission set.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>, permissions: Vec<Permission>) -> Self {
        self.roles.insert(role.into(), permissions.into_iter().collect());
        self
    }

    /// Registers a role's parent roles, whose permissions it also inherits.
    #[must_use]
    pub fn with_inherits(mut self, role: impl Into<String>, parents: Vec<String>) -> Self {
        self.inherits.insert(role.into(), parents);
        self
    }

    fn permissions_for_role(&self, role: &str, seen: &mut BTreeSet<String>) -> BTreeSet<Permission> {
        if !seen.insert(role.to_string()) {
            return BTreeSet::new();
        }
        let mut permissions = self.roles.get(role).cloned().unwrap_or_default();
        if let Some(parents) = self.inherits.get(role) {
            for parent in parents {
                permissions.extend(self.permissions_for_role(parent, seen));
            }
        }
        permissions
    }

    /// Checks whether `roles` grants `permission`. Always `true` when RBAC
    /// is [`RbacPolicy::disabled`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when RBAC is enabled and none of
    /// `roles` grants `permission`.
    pub fn check(&self, roles: &[String], permission: &str) -> Result<(), AuthError> {
        if !self.is_enabled() {
            return Ok(());
        }
        for role in roles {
            let mut seen = BTreeSet::new();
            if self.permissions_for_role(role, &mut seen).contains(permission) {
                return Ok(());
            }
        }
        Err(AuthError::Forbidden(permission.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> CredentialTable {
        CredentialTable::new().with_entry(CredentialEntry {
            secret: "tok-abc123".to_string(),
            principal: Principal {
                kind: PrincipalKind::Service,
                id: PrincipalId::new("svc-ci"),
                org_id: None,
            },
            roles: vec!["operator".to_string()],
        })
    }

    #[test]
    fn no_credential_resolves_anonymous() {
        let ctx = resolve_credential(&sample_table(), &InboundCredential::default()).expect("resolve");
        assert_eq!(ctx.method, AuthMethod::Anonymous);
        assert!(ctx.principal.is_none());
    }

    #[test]
    fn matching_bearer_token_resolves_principal() {
        let credential = InboundCredential {
            bearer_token: Some("tok-abc123".to_string()),
            api_key: None,
        };
        let ctx = resolve_credential(&sample_table(), &credential).expect("resolve");
        assert_eq!(ctx.method, AuthMethod::BearerToken);
        assert_eq!(ctx.principal.unwrap().id, PrincipalId::new("svc-ci"));
    }

    #[test]
    fn unmatched_token_is_rejected() {
        let credential = InboundCredential {
            bearer_token: Some("not-a-real-token".to_string()),
            api_key: None,
        };
        assert!(matches!(
            resolve_credential(&sample_table(), &credential),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn disabled_rbac_permits_everything() {
        let rbac = RbacPolicy::disabled();
        assert!(rbac.check(&[], "admin:policies").is_ok());
    }

    #[test]
    fn rbac_checks_inherited_permissions() {
        let rbac = RbacPolicy::default()
            .with_role("viewer", vec!["trace:read".to_string()])
            .with_role("operator", vec!["carp:resolve".to_string(), "carp:execute".to_string()])
            .with_inherits("operator", vec!["viewer".to_string()]);
        assert!(rbac.check(&["operator".to_string()], "trace:read").is_ok());
        assert!(rbac.check(&["operator".to_string()], "admin:policies").is_err());
    }
}
