use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use axum::http::{
    header::{AUTHORIZATION, ORIGIN},
    HeaderMap,
};
use homeroom_core::{DisplayName, UserId};
use homeroom_protocol::{Envelope, EventType, PROTOCOL_VERSION};
use pasetors::{
    claims::{Claims, ClaimsValidationRules},
    keys::SymmetricKey,
    local,
    token::UntrustedToken,
    version4::V4,
    Local,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{
    core::{AppState, AuthContext},
    errors::AuthFailure,
};

pub(crate) fn symmetric_key_from_secret(secret: &str) -> anyhow::Result<SymmetricKey<V4>> {
    let key_bytes: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
    SymmetricKey::<V4>::from(&key_bytes).map_err(|e| anyhow!("token key init failed: {e}"))
}

/// Mint an access token the way the portal's credential service does.
///
/// The gateway never calls this at runtime; it exists so operators and tests
/// can produce credentials compatible with `verify_token`.
///
/// # Errors
/// Returns an error when the claims cannot be built or encrypted.
pub fn issue_access_token(
    secret: &str,
    user_id: &str,
    display_name: &str,
    ttl: Duration,
) -> anyhow::Result<String> {
    let key = symmetric_key_from_secret(secret)?;
    let mut claims =
        Claims::new_expires_in(&ttl).map_err(|e| anyhow!("claims init failed: {e}"))?;
    claims
        .subject(user_id)
        .map_err(|e| anyhow!("claim sub failed: {e}"))?;
    claims
        .add_additional("display_name", display_name)
        .map_err(|e| anyhow!("claim display_name failed: {e}"))?;

    local::encrypt(&key, &claims, None, None).map_err(|e| anyhow!("access token mint failed: {e}"))
}

/// The one verification routine shared by the websocket handshake and the
/// HTTP read endpoints.
pub(crate) fn verify_token(state: &AppState, token: &str) -> Result<AuthContext, AuthFailure> {
    let untrusted =
        UntrustedToken::<Local, V4>::try_from(token).map_err(|_| AuthFailure::InvalidToken)?;
    let validation_rules = ClaimsValidationRules::new();
    let trusted = local::decrypt(&state.token_key, &untrusted, &validation_rules, None, None)
        .map_err(|_| AuthFailure::InvalidToken)?;
    let claims = trusted
        .payload_claims()
        .ok_or(AuthFailure::InvalidToken)?;

    let user_id = claims
        .get_claim("sub")
        .and_then(serde_json::Value::as_str)
        .ok_or(AuthFailure::InvalidToken)?;
    let display_name = claims
        .get_claim("display_name")
        .and_then(serde_json::Value::as_str)
        .ok_or(AuthFailure::InvalidToken)?;

    Ok(AuthContext {
        user_id: UserId::try_from(user_id.to_owned()).map_err(|_| AuthFailure::InvalidToken)?,
        display_name: DisplayName::try_from(display_name.to_owned())
            .map_err(|_| AuthFailure::InvalidToken)?,
    })
}

pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AuthFailure> {
    let access_token = bearer_token(headers).ok_or(AuthFailure::MissingToken)?;
    verify_token(state, access_token)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    header.strip_prefix("Bearer ")
}

/// Browser clients send an `Origin` header on the upgrade; when an allowlist
/// is configured it must match. Requests without the header (non-browser
/// clients) pass, matching how same-origin policy actually binds.
pub(crate) fn origin_allowed(allowed_origins: &[String], headers: &HeaderMap) -> bool {
    if allowed_origins.is_empty() {
        return true;
    }
    let Some(origin) = headers.get(ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    allowed_origins.iter().any(|candidate| candidate == origin)
}

pub(crate) fn now_unix() -> i64 {
    let now = SystemTime::now();
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

pub(crate) fn outbound_event<T: Serialize>(event_type: &str, data: T) -> String {
    let envelope = Envelope {
        v: PROTOCOL_VERSION,
        t: EventType::try_from(event_type.to_owned()).unwrap_or_else(|_| {
            EventType::try_from(String::from("ready")).expect("valid event type")
        }),
        d: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
    };

    serde_json::to_string(&envelope)
        .unwrap_or_else(|_| String::from(r#"{"v":1,"t":"ready","d":{}}"#))
}
