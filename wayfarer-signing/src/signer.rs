//! ES256 envelope signer.
//!
//! Signs outbound bridge envelopes and handshake session proofs, and
//! produces detached manifest signatures for provider-side tooling. The
//! default construction is an ephemeral key generated per process; the
//! corresponding public JWK is surfaced so receivers can verify.

use crate::canonical::canonical_json;
use crate::keys::Es256PublicKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use p256::SecretKey;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use wayfarer_core::SigningError;

/// An ES256 signer bound to a `kid`.
pub struct EnvelopeSigner {
    kid: String,
    encoding_key: EncodingKey,
    public_jwk: Es256PublicKey,
}

impl std::fmt::Debug for EnvelopeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSigner")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl EnvelopeSigner {
    /// Generate a fresh ephemeral P-256 key. The key never leaves the
    /// process; distribution of the public half to pages happens through
    /// the `bridge_ready` payload.
    pub fn ephemeral() -> Result<Self, SigningError> {
        let mut rng = rand::rng();
        let secret = loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            // Rejected only for the zero scalar or values past the group
            // order, so this terminates immediately in practice.
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                break secret;
            }
        };
        Self::from_secret(secret, None)
    }

    /// Load a provisioned signing key from PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str, kid: impl Into<String>) -> Result<Self, SigningError> {
        let secret = SecretKey::from_pkcs8_pem(pem).map_err(|e| SigningError::KeyMaterial {
            reason: format!("invalid PKCS#8 key: {e}"),
        })?;
        Self::from_secret(secret, Some(kid.into()))
    }

    fn from_secret(secret: SecretKey, kid: Option<String>) -> Result<Self, SigningError> {
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SigningError::KeyMaterial {
                reason: format!("failed to encode key: {e}"),
            })?;
        let encoding_key =
            EncodingKey::from_ec_pem(pem.as_bytes()).map_err(|e| SigningError::KeyMaterial {
                reason: e.to_string(),
            })?;

        let point = secret.public_key().to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(SigningError::KeyMaterial {
                reason: "public key has no affine coordinates".to_string(),
            });
        };
        let public_jwk = Es256PublicKey {
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
        };

        // Default kid is a truncated digest of the uncompressed point, so
        // independently generated keys never collide on identifier.
        let kid = kid.unwrap_or_else(|| {
            let digest = Sha256::digest(point.as_bytes());
            URL_SAFE_NO_PAD.encode(&digest[..16])
        });

        Ok(Self {
            kid,
            encoding_key,
            public_jwk,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public half of the signing key, for receivers.
    pub fn public_jwk(&self) -> &Es256PublicKey {
        &self.public_jwk
    }

    /// Sign a claims value as a full compact JWS. The claims serialize in
    /// canonical form (sorted keys), so receivers can re-derive the signed
    /// bytes from the decoded payload.
    pub fn sign_claims(&self, claims: &Value) -> Result<String, SigningError> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding_key).map_err(|e| SigningError::InvalidSignature {
            reason: e.to_string(),
        })
    }

    /// Produce a detached signature (`header..signature`) over the
    /// canonical JSON of `document`. The document must not contain the
    /// `signature` field it will later carry.
    pub fn sign_detached(&self, document: &Value) -> Result<String, SigningError> {
        let token = self.sign_claims(document)?;
        let segments: Vec<&str> = token.split('.').collect();
        let [header, _payload, signature] = segments.as_slice() else {
            return Err(SigningError::MalformedJws {
                reason: "signer produced an unexpected compact form".to_string(),
            });
        };
        Ok(format!("{header}..{signature}"))
    }
}
