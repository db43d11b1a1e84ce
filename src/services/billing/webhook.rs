use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

use crate::services::billing::BillingEvent;

type HmacSha256 = Hmac<Sha256>;

/// How far a signature timestamp may drift from our clock before the
/// delivery is treated as a replay.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("payload is not a well-formed event")]
    InvalidPayload,
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    r#type: String,
}

fn compute_signature(secret: &str, timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Authenticate the raw request body against a `t=...,v1=...` signature
/// header. The signed material is `"{t}.{raw body}"`, so the bytes passed
/// here must be exactly what arrived on the wire.
pub fn verify(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<BillingEvent, SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    if (now - ts).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let expected = compute_signature(secret, timestamp, payload);
    let authentic = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|sig| expected.ct_eq(&sig).unwrap_u8() == 1)
            .unwrap_or(false)
    });
    if !authentic {
        return Err(SignatureError::SignatureMismatch);
    }

    let envelope: EventEnvelope =
        serde_json::from_slice(payload).map_err(|_| SignatureError::InvalidPayload)?;
    let payload =
        serde_json::from_slice(payload).map_err(|_| SignatureError::InvalidPayload)?;

    Ok(BillingEvent {
        id: envelope.id,
        r#type: envelope.r#type,
        payload,
    })
}

/// Produce a valid signature header for a payload, for tests exercising the
/// verifier end to end.
#[cfg(test)]
pub fn sign_for_tests(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let sig = compute_signature(secret, &timestamp.to_string(), payload);
    format!("t={},v1={}", timestamp, hex::encode(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn event_body(id: &str, kind: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": id,
            "type": kind,
            "data": { "object": {} }
        }))
        .unwrap()
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn accepts_valid_signature() {
        let body = event_body("evt_1", "customer.subscription.updated");
        let header = sign_for_tests(SECRET, now(), &body);

        let event = verify(&body, &header, SECRET).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.r#type, "customer.subscription.updated");
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = event_body("evt_1", "customer.subscription.updated");
        let header = sign_for_tests("whsec_other", now(), &body);

        assert_eq!(
            verify(&body, &header, SECRET),
            Err(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_mutated_payload() {
        let body = event_body("evt_1", "customer.subscription.updated");
        let header = sign_for_tests(SECRET, now(), &body);

        let mut tampered = body.clone();
        let pos = tampered.iter().position(|b| *b == b'1').unwrap();
        tampered[pos] = b'2';

        assert_eq!(
            verify(&tampered, &header, SECRET),
            Err(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = event_body("evt_1", "checkout.session.completed");
        let header = sign_for_tests(SECRET, now() - 600, &body);

        assert_eq!(
            verify(&body, &header, SECRET),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn rejects_malformed_header() {
        let body = event_body("evt_1", "checkout.session.completed");
        assert_eq!(
            verify(&body, "nonsense", SECRET),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify(&body, "t=123", SECRET),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn accepts_secondary_v1_candidate_during_secret_rotation() {
        let body = event_body("evt_1", "customer.subscription.deleted");
        let ts = now();
        let good = sign_for_tests(SECRET, ts, &body);
        let good_sig = good.split_once(",v1=").unwrap().1.to_string();
        let header = format!("t={ts},v1={},v1={good_sig}", "00".repeat(32));

        assert!(verify(&body, &header, SECRET).is_ok());
    }
}
