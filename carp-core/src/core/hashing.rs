// carp-core/src/core/hashing.rs
// ============================================================================
// Module: CARP Runtime Canonical Hashing
// Description: RFC 8785 JSON canonicalization and content hashing utilities.
// Purpose: Provide deterministic hashes for specs, logs, and runpack artifacts.
// Dependencies: serde, serde_jcs, sha2, bigdecimal
// ============================================================================

//! ## Overview
//! CARP Runtime hashes all canonical JSON using RFC 8785 (JCS) to guarantee stable,
//! replayable digests. Binary payloads are hashed directly over raw bytes.
//!
//! Execution parameters and results additionally run through numeric
//! normalization before hashing: every JSON number is re-rendered from an
//! arbitrary-precision decimal so that equivalent numerals (`1.5`, `1.50`,
//! `1.500`) always hash identically, independent of how the value was
//! originally formatted upstream.
//!
//! Security posture: hashing is part of audit integrity; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for CARP Runtime artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing (FIPS-friendly default).
    Sha256,
}

/// Default hash algorithm for CARP Runtime.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Deterministic content hash representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON using the provided algorithm.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes a value's canonical JSON after normalizing every embedded number
/// through an arbitrary-precision decimal, so formatting differences that
/// do not change a number's value (trailing zeros, `+` signs, redundant
/// exponents) never produce a different digest.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json_numeric_normalized<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let mut json =
        serde_json::to_value(value).map_err(|err| HashError::Canonicalization(err.to_string()))?;
    normalize_numbers(&mut json);
    hash_canonical_json(algorithm, &json)
}

/// Recursively replaces every JSON number with its arbitrary-precision
/// normalized form. Numbers that fail to round-trip (practically
/// unreachable for anything `serde_json` itself produced) are left as-is
/// rather than dropped.
fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(number) => {
            if let Some(normalized) = BigDecimal::from_str(&number.to_string())
                .ok()
                .map(|decimal| decimal.normalized().to_string())
                .and_then(|text| serde_json::Number::from_str(&text).ok())
            {
                *value = Value::Number(normalized);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest::new(HashAlgorithm::Sha256, &digest)
        }
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
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
    fn equivalent_numerals_hash_identically() {
        let a = serde_json::json!({"amount": 1.5, "name": "x"});
        let b = serde_json::json!({"amount": 1.50, "name": "x"});
        let hash_a = hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &a)
            .expect("hash a");
        let hash_b = hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &b)
            .expect("hash b");
        assert_eq!(hash_a.value, hash_b.value);
    }

    #[test]
    fn differing_values_hash_differently() {
        let a = serde_json::json!({"amount": 1.5});
        let b = serde_json::json!({"amount": 1.6});
        let hash_a = hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &a)
            .expect("hash a");
        let hash_b = hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &b)
            .expect("hash b");
        assert_ne!(hash_a.value, hash_b.value);
    }

    #[test]
    fn plain_canonical_hash_is_order_independent() {
        let a = serde_json::json!({"a": 1, "b": 2});
        let b = serde_json::json!({"b": 2, "a": 1});
        let hash_a = hash_canonical_json(HashAlgorithm::Sha256, &a).expect("hash a");
        let hash_b = hash_canonical_json(HashAlgorithm::Sha256, &b).expect("hash b");
        assert_eq!(hash_a.value, hash_b.value);
    }
}
