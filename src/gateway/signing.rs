//! Canonical field signing for the hosted-redirect gateway protocol.
//!
//! The gateway authenticates both directions with a pre-shared symmetric
//! secret: every field except `signature` and `encoding` participates,
//! field names are sorted ascending in byte order, the *values* are joined
//! with `|`, and the HMAC-SHA512 digest of that string is base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::BTreeMap;

use crate::error::{MarketError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Field carrying the signature itself; never part of the signed input.
pub const SIGNATURE_FIELD: &str = "signature";
/// Transport-encoding hint some gateway versions add; excluded as well.
pub const ENCODING_FIELD: &str = "encoding";

/// The deterministic signing input for a field map.
///
/// `BTreeMap` iteration gives the required ascending byte-order key sort.
pub fn canonical_input(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(name, _)| name.as_str() != SIGNATURE_FIELD && name.as_str() != ENCODING_FIELD)
        .map(|(_, value)| value.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

/// Signs a field map with the shared secret.
pub fn sign(secret: &str, fields: &BTreeMap<String, String>) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| MarketError::IntegrityViolation("invalid signing key".to_string()))?;
    mac.update(canonical_input(fields).as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verifies the `signature` field of an inbound field map.
///
/// A missing, undecodable or mismatching signature is an integrity
/// failure; the caller must not act on any of the fields.
pub fn verify(secret: &str, fields: &BTreeMap<String, String>) -> Result<()> {
    let supplied = fields.get(SIGNATURE_FIELD).ok_or_else(|| {
        MarketError::IntegrityViolation("callback is missing its signature".to_string())
    })?;
    let digest = BASE64.decode(supplied).map_err(|_| {
        MarketError::IntegrityViolation("callback signature is not valid base64".to_string())
    })?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| MarketError::IntegrityViolation("invalid signing key".to_string()))?;
    mac.update(canonical_input(fields).as_bytes());
    mac.verify_slice(&digest).map_err(|_| {
        MarketError::IntegrityViolation("callback signature mismatch".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonical_input_sorts_by_name_and_joins_values() {
        let map = fields(&[("b", "2"), ("a", "1"), ("c", "3")]);
        assert_eq!(canonical_input(&map), "1|2|3");
    }

    #[test]
    fn test_canonical_input_excludes_signature_and_encoding() {
        let map = fields(&[
            ("amount", "200.00"),
            ("signature", "bogus"),
            ("encoding", "UTF-8"),
            ("orderid", "abc123"),
        ]);
        assert_eq!(canonical_input(&map), "200.00|abc123");
    }

    #[test]
    fn test_sign_is_deterministic() {
        let map = fields(&[("amount", "10.00"), ("orderid", "x1")]);
        let s1 = sign("secret", &map).unwrap();
        let s2 = sign("secret", &map).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_verify_round_trip() {
        let mut map = fields(&[("amount", "10.00"), ("orderid", "x1")]);
        let sig = sign("secret", &map).unwrap();
        map.insert(SIGNATURE_FIELD.to_string(), sig);
        assert!(verify("secret", &map).is_ok());
    }

    #[test]
    fn test_tampered_field_invalidates_signature() {
        let mut map = fields(&[("amount", "10.00"), ("orderid", "x1")]);
        let sig = sign("secret", &map).unwrap();
        map.insert(SIGNATURE_FIELD.to_string(), sig);
        map.insert("amount".to_string(), "999.00".to_string());

        assert!(matches!(
            verify("secret", &map),
            Err(MarketError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let map = fields(&[("amount", "10.00")]);
        assert!(matches!(
            verify("secret", &map),
            Err(MarketError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let mut map = fields(&[("amount", "10.00"), ("orderid", "x1")]);
        let sig = sign("secret", &map).unwrap();
        map.insert(SIGNATURE_FIELD.to_string(), sig);
        assert!(verify("other-secret", &map).is_err());
    }
}
