// carp-server/src/security.rs
// ============================================================================
// Module: Constant-Time Credential Comparison
// Description: A single timing-safe equality check for credential material.
// Purpose: Give every auth path one place to compare secrets without leaking
//          length-dependent timing through a short-circuiting `==`.
// Dependencies: subtle
// ============================================================================

//! ## Overview
//! `subtle::ConstantTimeEq` compares in time independent of where the first
//! differing byte falls. A length mismatch is itself a side channel, so
//! unequal-length inputs are rejected before the constant-time comparison
//! rather than being compared byte-for-byte against a truncated slice.

use subtle::ConstantTimeEq;

/// Compares two byte strings for equality in constant time with respect to
/// their content. Returns `false` immediately on a length mismatch, which
/// is already public information for credential material of known shape
/// (e.g. a fixed-length API key).
#[must_use]
pub fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    lhs.ct_eq(rhs).into()
}
