use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::Error;

/// Claims decoded from an ID token issued by the identity provider.
///
/// Tokens arrive over the TLS channel of the code-exchange (or refresh)
/// response, so the transport authenticates the issuer; this module checks
/// the claims we rely on (`iss`, `aud`, `exp`, and `nonce` when the login
/// attempt supplied one) and exposes the payload for role derivation.
#[derive(Debug, Clone)]
pub struct IdTokenClaims {
    inner: JsonValue,
}

impl IdTokenClaims {
    /// Gets a claim value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.inner.get(key)
    }

    /// Gets a claim as a string slice, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(JsonValue::as_str)
    }

    /// The whole payload as JSON.
    #[must_use]
    pub fn as_json(&self) -> &JsonValue {
        &self.inner
    }

    /// Consume into the raw payload.
    #[must_use]
    pub fn into_json(self) -> JsonValue {
        self.inner
    }
}

/// Decodes an ID token and validates its claims.
///
/// `expected_nonce` is `Some` for a fresh authorization-code login and `None`
/// for a refresh grant (providers do not echo the nonce on refresh).
///
/// # Errors
///
/// Returns [`Error::Token`] if the token is not a three-part JWT, the payload
/// is not valid JSON, or the `iss`/`aud`/`exp`/`nonce` claims do not match.
pub fn decode_id_token(
    token: &str,
    expected_issuer: &str,
    expected_audience: &str,
    expected_nonce: Option<&str>,
) -> Result<IdTokenClaims, Error> {
    let payload = decode_payload(token)?;

    let issuer = payload
        .get("iss")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::Token("missing claim: iss".into()))?;
    if issuer != expected_issuer {
        return Err(Error::Token(format!(
            "iss: expected '{expected_issuer}', got '{issuer}'"
        )));
    }

    // Cognito puts the client id in `aud`; some providers use an array.
    let audience_ok = match payload.get("aud") {
        Some(JsonValue::String(aud)) => aud == expected_audience,
        Some(JsonValue::Array(auds)) => auds
            .iter()
            .any(|a| a.as_str() == Some(expected_audience)),
        _ => false,
    };
    if !audience_ok {
        return Err(Error::Token(format!("aud: expected '{expected_audience}'")));
    }

    let exp = payload
        .get("exp")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| Error::Token("missing claim: exp".into()))?;
    if exp <= OffsetDateTime::now_utc().unix_timestamp() {
        return Err(Error::Token("token expired".into()));
    }

    if let Some(expected) = expected_nonce {
        let nonce = payload
            .get("nonce")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::Token("missing claim: nonce".into()))?;
        if nonce != expected {
            return Err(Error::Token("nonce mismatch".into()));
        }
    }

    Ok(IdTokenClaims { inner: payload })
}

/// Decodes the payload segment of a JWT without validating claims.
fn decode_payload(token: &str) -> Result<JsonValue, Error> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Token("invalid token format".into()));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| Error::Token("invalid payload encoding".into()))?;
    serde_json::from_slice(&bytes).map_err(|_| Error::Token("invalid payload JSON".into()))
}

#[cfg(test)]
pub(crate) fn encode_unsigned(payload: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{body}.sig")
}
