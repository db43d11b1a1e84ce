use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::integration::IntegrationProvider;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued state token remains valid. Generous enough for a user
/// to finish the provider's consent screen.
const STATE_TTL: Duration = Duration::minutes(10);

/// Identity carried across the OAuth redirect. The token is
/// `base64url(json-claims).base64url(hmac)`, so the callback can be
/// validated without any server-side session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateClaims {
    pub user_id: Uuid,
    pub provider: IntegrationProvider,
    pub exp: i64,
}

#[derive(Error, Debug, PartialEq)]
pub enum StateTokenError {
    #[error("malformed state token")]
    Malformed,
    #[error("state token signature mismatch")]
    SignatureMismatch,
    #[error("state token expired")]
    Expired,
}

fn sign(secret: &str, payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length; new_from_slice cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn encode(secret: &str, user_id: Uuid, provider: IntegrationProvider) -> String {
    let claims = StateClaims {
        user_id,
        provider,
        exp: (OffsetDateTime::now_utc() + STATE_TTL).unix_timestamp(),
    };
    // StateClaims has no non-serializable fields; to_vec cannot fail.
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let payload_b64 = URL_SAFE_NO_PAD.encode(&payload);
    let sig_b64 = URL_SAFE_NO_PAD.encode(sign(secret, payload_b64.as_bytes()));
    format!("{payload_b64}.{sig_b64}")
}

pub fn decode(secret: &str, token: &str) -> Result<StateClaims, StateTokenError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(StateTokenError::Malformed)?;

    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| StateTokenError::Malformed)?;
    let expected = sign(secret, payload_b64.as_bytes());
    if expected.ct_eq(&sig).unwrap_u8() != 1 {
        return Err(StateTokenError::SignatureMismatch);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| StateTokenError::Malformed)?;
    let claims: StateClaims =
        serde_json::from_slice(&payload).map_err(|_| StateTokenError::Malformed)?;

    if claims.exp < OffsetDateTime::now_utc().unix_timestamp() {
        return Err(StateTokenError::Expired);
    }

    Ok(claims)
}
