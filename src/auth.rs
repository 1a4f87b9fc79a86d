//! Password hashing and session tokens
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 digests with a per-user
//! random salt. Session tokens are `base64url(claims).base64url(sig)`
//! where the signature is HMAC-SHA256 over the encoded claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::db::{Role, User};

type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,
    #[error("Invalid token signature")]
    BadSignature,
}

/// Derived password material, both parts base64url-encoded for storage.
#[derive(Debug, Clone)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> PasswordHash {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let digest = derive(password, &salt);
    PasswordHash {
        hash: URL_SAFE_NO_PAD.encode(digest),
        salt: URL_SAFE_NO_PAD.encode(salt),
    }
}

/// Verify a password against stored hash material in constant time.
/// Undecodable stored material verifies as false rather than erroring;
/// it can only mean a corrupted row.
pub fn verify_password(password: &str, salt: &str, hash: &str) -> bool {
    let (Ok(salt), Ok(expected)) = (URL_SAFE_NO_PAD.decode(salt), URL_SAFE_NO_PAD.decode(hash))
    else {
        return false;
    };
    let digest = derive(password, &salt);
    constant_time_eq(&digest, &expected)
}

fn derive(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}

/// Byte comparison that does not short-circuit on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Token claims. `iat` is a unix timestamp in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
}

impl Claims {
    pub fn for_user(user: &User) -> Self {
        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Issue a signed session token for the given claims.
pub fn issue_token(claims: &Claims, secret: &str) -> String {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    let sig = sign(payload.as_bytes(), secret);
    format!("{payload}.{sig}")
}

/// Verify a token's signature and decode its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let (payload, sig) = token.split_once('.').ok_or(AuthError::MalformedToken)?;

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| AuthError::MalformedToken)?;

    let mut mac = mac_for(secret);
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::BadSignature)?;

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&claims_bytes).map_err(|_| AuthError::MalformedToken)
}

fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = mac_for(secret);
    mac.update(payload);
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_password_round_trip() {
        let hashed = hash_password("senha123");
        assert!(verify_password("senha123", &hashed.salt, &hashed.hash));
        assert!(!verify_password("senha124", &hashed.salt, &hashed.hash));
    }

    #[test]
    fn test_password_salts_differ() {
        let a = hash_password("same-password");
        let b = hash_password("same-password");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_verify_rejects_corrupted_material() {
        assert!(!verify_password("pw", "not base64!!", "also not base64!!"));
    }

    fn claims() -> Claims {
        Claims {
            sub: 42,
            email: "ana@example.com".to_string(),
            role: Role::Student,
            iat: Utc::now().timestamp_millis(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let token = issue_token(&claims(), "secret");
        let decoded = verify_token(&token, "secret").unwrap();
        assert_eq!(decoded.sub, 42);
        assert_eq!(decoded.email, "ana@example.com");
        assert_eq!(decoded.role, Role::Student);
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let token = issue_token(&claims(), "secret");
        assert!(matches!(
            verify_token(&token, "other-secret").unwrap_err(),
            AuthError::BadSignature
        ));
    }

    #[test]
    fn test_token_rejects_tampered_payload() {
        let token = issue_token(&claims(), "secret");
        let (_, sig) = token.split_once('.').unwrap();

        let forged_claims = Claims {
            sub: 1,
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            iat: Utc::now().timestamp_millis(),
        };
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let forged = format!("{forged_payload}.{sig}");

        assert!(matches!(
            verify_token(&forged, "secret").unwrap_err(),
            AuthError::BadSignature
        ));
    }

    #[test]
    fn test_token_rejects_garbage() {
        assert!(matches!(
            verify_token("no-dot-here", "secret").unwrap_err(),
            AuthError::MalformedToken
        ));
        assert!(matches!(
            verify_token("a.b", "secret").unwrap_err(),
            AuthError::MalformedToken
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
