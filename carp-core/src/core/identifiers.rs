// carp-core/src/core/identifiers.rs
// ============================================================================
// Module: CARP Runtime Identifiers
// Description: Canonical opaque identifiers for sessions, traces, and actions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout the CARP
//! runtime. Identifiers are opaque wrappers over UUID strings and serialize
//! transparently; validation of UUID shape is left to the boundary that
//! parses untrusted input (the CARP envelope decoder), not to these simple
//! wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Newtype Macro
// ============================================================================

/// Declares an opaque, string-backed identifier newtype with the standard
/// `new`/`as_str`/`Display`/`From` surface shared by every identifier below.
macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

id_type!(SessionId, "Session identifier (UUID).");
id_type!(TraceId, "Trace identifier rooting one session's event log (UUID).");
id_type!(SpanId, "Span identifier within a trace (UUID).");
id_type!(AtlasId, "Semantic identifier of an Atlas capability package.");
id_type!(ActionId, "Action identifier, dotted/dash ASCII (e.g. \"cra.echo\").");
id_type!(ResolutionId, "Identifier of a single Resolution bundle (UUID).");
id_type!(GrantId, "Identifier of a materialized action grant (UUID).");
id_type!(ExecutionId, "Identifier of a single action execution (UUID).");
id_type!(RuleId, "Stable identifier of a policy rule.");
id_type!(BlockId, "Identifier of a context block within a Resolution.");
id_type!(DecisionId, "Identifier of a logged policy decision (UUID).");
id_type!(PrincipalId, "Opaque identifier of an authenticated principal.");
