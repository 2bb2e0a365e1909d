//! Detached JWS parsing and ES256 verification.
//!
//! Manifest signatures are compact JWS with an empty payload segment
//! (`header..signature`); the payload is reconstructed from the canonical
//! JSON of the document minus its `signature` field. Verification
//! reassembles the full compact form and hands it to `jsonwebtoken` with
//! built-in claim validation disabled: the payload is a configuration
//! document, not a claims set with `exp`/`nbf`.

use crate::keys::{Es256PublicKey, TrustStore};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use wayfarer_core::SigningError;

/// Protected header of a manifest signature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A parsed detached JWS (`header..signature`).
#[derive(Debug, Clone)]
pub struct DetachedJws {
    pub header: JwsHeader,
    header_b64: String,
    signature_b64: String,
}

impl DetachedJws {
    /// Parse the compact serialization, requiring an empty payload segment.
    pub fn parse(compact: &str) -> Result<Self, SigningError> {
        let segments: Vec<&str> = compact.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(SigningError::MalformedJws {
                reason: "expected three dot-separated segments".to_string(),
            });
        };
        if !payload_b64.is_empty() {
            return Err(SigningError::MalformedJws {
                reason: "payload segment must be empty for a detached JWS".to_string(),
            });
        }
        if header_b64.is_empty() || signature_b64.is_empty() {
            return Err(SigningError::MalformedJws {
                reason: "header and signature segments must be non-empty".to_string(),
            });
        }

        let header_bytes =
            URL_SAFE_NO_PAD
                .decode(header_b64)
                .map_err(|e| SigningError::MalformedJws {
                    reason: format!("header is not base64url: {e}"),
                })?;
        let header: JwsHeader =
            serde_json::from_slice(&header_bytes).map_err(|e| SigningError::MalformedJws {
                reason: format!("header is not valid JSON: {e}"),
            })?;

        Ok(Self {
            header,
            header_b64: (*header_b64).to_string(),
            signature_b64: (*signature_b64).to_string(),
        })
    }

    /// Reattach a payload, producing the full compact serialization.
    pub fn attach(&self, payload: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            self.header_b64,
            URL_SAFE_NO_PAD.encode(payload),
            self.signature_b64
        )
    }
}

/// Verify a detached JWS over `payload` with a key resolved from `trust`.
///
/// Requires `alg = "ES256"` and a `kid` the trust store knows.
pub fn verify_detached(
    compact: &str,
    payload: &[u8],
    trust: &TrustStore,
) -> Result<(), SigningError> {
    let jws = DetachedJws::parse(compact)?;

    if jws.header.alg != "ES256" {
        return Err(SigningError::UnsupportedAlgorithm {
            alg: jws.header.alg.clone(),
        });
    }
    let kid = jws
        .header
        .kid
        .clone()
        .ok_or_else(|| SigningError::MalformedJws {
            reason: "header is missing kid".to_string(),
        })?;
    let key = trust
        .resolve(&kid)
        .ok_or(SigningError::KeyNotFound { kid })?;

    verify_compact(&jws.attach(payload), &key).map(|_| ())
}

/// Verify a full compact ES256 JWS against a public key and return its
/// decoded payload. Claim-level validation is disabled: callers own the
/// semantics of what they signed.
pub fn verify_compact(token: &str, key: &Es256PublicKey) -> Result<Value, SigningError> {
    let decoding_key =
        DecodingKey::from_ec_components(&key.x, &key.y).map_err(|e| SigningError::KeyMaterial {
            reason: e.to_string(),
        })?;

    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<Value>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| SigningError::InvalidSignature {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    fn header_b64(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json.as_bytes())
    }

    #[test]
    fn parses_a_detached_jws() {
        let compact = format!(
            "{}..{}",
            header_b64(r#"{"alg":"ES256","kid":"signer-1"}"#),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let jws = DetachedJws::parse(&compact).unwrap();
        assert_eq!(jws.header.alg, "ES256");
        assert_eq!(jws.header.kid.as_deref(), Some("signer-1"));
    }

    #[test]
    fn rejects_a_non_empty_payload_segment() {
        let compact = format!(
            "{}.{}.{}",
            header_b64(r#"{"alg":"ES256","kid":"k"}"#),
            URL_SAFE_NO_PAD.encode(b"payload"),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let err = DetachedJws::parse(&compact).unwrap_err();
        assert!(matches!(err, SigningError::MalformedJws { .. }));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(matches!(
            DetachedJws::parse("onlyonesegment"),
            Err(SigningError::MalformedJws { .. })
        ));
        assert!(matches!(
            DetachedJws::parse("a.b"),
            Err(SigningError::MalformedJws { .. })
        ));
    }

    #[test]
    fn rejects_garbage_header() {
        let compact = format!("not-base64!..{}", URL_SAFE_NO_PAD.encode(b"sig"));
        assert!(matches!(
            DetachedJws::parse(&compact),
            Err(SigningError::MalformedJws { .. })
        ));
    }

    #[test]
    fn verify_rejects_unsupported_algorithm() {
        let compact = format!(
            "{}..{}",
            header_b64(r#"{"alg":"HS256","kid":"k"}"#),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let trust = TrustStore::new();
        let err = verify_detached(&compact, b"{}", &trust).unwrap_err();
        assert_eq!(
            err,
            SigningError::UnsupportedAlgorithm {
                alg: "HS256".to_string()
            }
        );
    }

    #[test]
    fn verify_reports_unknown_kid() {
        let compact = format!(
            "{}..{}",
            header_b64(r#"{"alg":"ES256","kid":"nobody"}"#),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let trust = TrustStore::new();
        let err = verify_detached(&compact, b"{}", &trust).unwrap_err();
        assert_eq!(
            err,
            SigningError::KeyNotFound {
                kid: "nobody".to_string()
            }
        );
    }

    #[test]
    fn verify_requires_a_kid() {
        let compact = format!(
            "{}..{}",
            header_b64(r#"{"alg":"ES256"}"#),
            URL_SAFE_NO_PAD.encode(b"sig")
        );
        let trust = TrustStore::new();
        assert!(matches!(
            verify_detached(&compact, b"{}", &trust),
            Err(SigningError::MalformedJws { .. })
        ));
    }
}
