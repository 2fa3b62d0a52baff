//! HMAC-SHA256 access tokens.
//!
//! Access tokens are issued by the external auth service and signed with its
//! shared secret. The server verifies them locally when configured with that
//! secret; `sign_jwt` exists for tooling and tests.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::ServiceError;

/// JWT header (always HS256).
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// JWT expiry: 1 hour in seconds.
pub const JWT_EXPIRY_SECS: u64 = 3600;

/// Claims the server reads from an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
}

/// Sign a JWT for the given user. Returns the encoded JWT string.
pub fn sign_jwt(user_id: &str, email: Option<&str>, secret: &str, now_unix: u64) -> String {
    let claims = TokenClaims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        iat: now_unix,
        exp: now_unix + JWT_EXPIRY_SECS,
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(JWT_HEADER.as_bytes());
    // Serializing a struct of strings and integers cannot fail.
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);

    let signing_input = format!("{header_b64}.{payload_b64}");
    let sig_b64 = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), signing_input.as_bytes()));

    format!("{signing_input}.{sig_b64}")
}

/// Verify a JWT and return its claims if the signature and expiry check out.
pub fn verify_jwt(token: &str, secret: &str, now_unix: u64) -> Result<TokenClaims, ServiceError> {
    let invalid = || ServiceError::Unauthorized("Invalid or expired token".into());

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let actual_sig = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
    let mut mac = new_mac(secret.as_bytes());
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&actual_sig).map_err(|_| invalid())?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claims: TokenClaims = serde_json::from_slice(&payload_bytes).map_err(|_| invalid())?;

    if now_unix > claims.exp || claims.sub.is_empty() {
        return Err(invalid());
    }

    Ok(claims)
}

// ── Internal ────────────────────────────────────────────────────────────────

fn new_mac(key: &[u8]) -> Hmac<Sha256> {
    // HMAC accepts keys of any length; `new_from_slice` only fails for
    // fixed-size MACs.
    match Hmac::<Sha256>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
