//! Bearer token decoding
//!
//! Pure functions over compact `header.payload.signature` tokens. Nothing
//! here verifies signatures; the server does that. We only need the claims
//! to know when a token stops being worth sending.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::TokenError;

/// Decoded claims of a token payload
#[derive(Debug, Clone, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    /// `exp` in seconds since the epoch
    pub fn exp(&self) -> Option<f64> {
        self.0.get("exp").and_then(Value::as_f64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Split a token and decode its payload segment
pub fn parse_claims(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Segments(segments.len()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| TokenError::Base64(e.to_string()))?;

    match serde_json::from_slice::<Value>(&payload) {
        Ok(Value::Object(map)) => Ok(Claims(map)),
        Ok(other) => Err(TokenError::Json(format!("expected object, found {other}"))),
        Err(e) => Err(TokenError::Json(e.to_string())),
    }
}

/// Absolute expiry: `exp` seconds scaled to milliseconds
pub fn compute_expiry(claims: &Claims) -> Result<DateTime<Utc>, TokenError> {
    let exp = claims.exp().ok_or(TokenError::MissingExpiry)?;
    let millis = (exp * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| TokenError::Json(format!("'exp' claim {exp} is out of range")))
}

pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    compute_expiry(&parse_claims(token)?)
}

/// True once `now` is past the token's expiry
pub fn is_expired(token: &str, now: DateTime<Utc>) -> Result<bool, TokenError> {
    Ok(token_expiry(token)? < now)
}
