//! Deep-link action tokens.
//!
//! Push buttons carry a signed token so a later tap can resolve intent
//! without re-authenticating. Format: `base64url(claims).base64url(hmac)`,
//! HMAC-SHA256 over the encoded claims, default 6 h TTL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Claims embedded in an action token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionClaims {
    pub user: String,
    pub entity_type: String,
    pub entity_id: String,
    pub route_fallback: String,
    pub event_family: String,
    pub iat: i64,
    pub exp: i64,
}

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    SecretMissing,
    InvalidFormat,
    InvalidSignature,
    InvalidPayload,
    Expired,
}

fn sign(secret: &str, encoded: &[u8]) -> Result<Vec<u8>, TokenError> {
    if secret.trim().is_empty() {
        return Err(TokenError::SecretMissing);
    }
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::SecretMissing)?;
    mac.update(encoded);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Issue a token for `claims` with `iat`/`exp` stamped from `now`.
pub fn create_action_token(
    secret: &str,
    user: &str,
    entity_type: &str,
    entity_id: &str,
    route_fallback: &str,
    event_family: &str,
    ttl_secs: u64,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = ActionClaims {
        user: user.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        route_fallback: route_fallback.to_string(),
        event_family: event_family.to_string(),
        iat: now.timestamp(),
        exp: now.timestamp() + ttl_secs.max(1) as i64,
    };
    let encoded = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&claims).map_err(|_| TokenError::InvalidPayload)?,
    );
    let sig = sign(secret, encoded.as_bytes())?;
    Ok(format!("{}.{}", encoded, URL_SAFE_NO_PAD.encode(sig)))
}

/// Verify signature and expiry; returns the claims on success.
pub fn verify_action_token(
    secret: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<ActionClaims, TokenError> {
    let mut parts = token.trim().splitn(2, '.');
    let encoded = parts.next().filter(|p| !p.is_empty());
    let sig = parts.next().filter(|p| !p.is_empty());
    let (encoded, sig) = match (encoded, sig) {
        (Some(e), Some(s)) => (e, s),
        _ => return Err(TokenError::InvalidFormat),
    };

    if secret.trim().is_empty() {
        return Err(TokenError::SecretMissing);
    }
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| TokenError::InvalidSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::SecretMissing)?;
    mac.update(encoded.as_bytes());
    // Constant-time comparison
    mac.verify_slice(&sig_bytes)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| TokenError::InvalidPayload)?;
    let claims: ActionClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenError::InvalidPayload)?;

    if claims.exp <= now.timestamp() {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap()
    }

    fn sample_token(secret: &str) -> String {
        create_action_token(
            secret,
            "Zaldy",
            "task",
            "42",
            "/daily-tasks",
            "urgent_due",
            3600,
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let token = sample_token("s3cret");
        let claims = verify_action_token("s3cret", &token, now()).unwrap();
        assert_eq!(claims.user, "Zaldy");
        assert_eq!(claims.entity_id, "42");
        assert_eq!(claims.event_family, "urgent_due");
        assert_eq!(claims.exp, now().timestamp() + 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sample_token("s3cret");
        let later = now() + chrono::Duration::hours(2);
        assert_eq!(
            verify_action_token("s3cret", &token, later),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let token = sample_token("s3cret");
        let mut forged = token.clone();
        forged.pop();
        forged.push('A');
        assert!(matches!(
            verify_action_token("s3cret", &forged, now()),
            Err(TokenError::InvalidSignature) | Err(TokenError::InvalidFormat)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sample_token("s3cret");
        assert_eq!(
            verify_action_token("other", &token, now()),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_missing_secret_refuses_to_sign() {
        assert!(matches!(
            create_action_token("", "Z", "task", "1", "/", "general", 60, now()),
            Err(TokenError::SecretMissing)
        ));
    }

    #[test]
    fn test_garbage_token_is_invalid_format() {
        assert_eq!(
            verify_action_token("s3cret", "nodotseparator", now()),
            Err(TokenError::InvalidFormat)
        );
    }
}
