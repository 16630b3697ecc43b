//! Validated access tokens and their claims.

use serde_json::{Map, Value};

/// Claim set extracted from a verified token payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Entries of a claim that is either a space-separated string or an
    /// array of strings. `None` when the claim is absent.
    pub fn entries(&self, name: &str) -> Option<Vec<&str>> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.split_whitespace().collect()),
            Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
            _ => Some(Vec::new()),
        }
    }
}

/// An access token that passed signature, issuer, audience and expiry checks.
///
/// The raw bearer string is not retained.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub issuer: String,
    pub audience: Vec<String>,
    /// Expiry, seconds since the Unix epoch.
    pub expires_at: u64,
    pub claims: Claims,
}

impl AccessToken {
    /// Build from a verified payload. `iss`, `aud` and `exp` are required
    /// claims, so a verified payload always has them.
    pub(crate) fn from_claims(claims: Claims) -> Self {
        let issuer = claims.str("iss").unwrap_or_default().to_string();
        let audience = claims
            .entries("aud")
            .unwrap_or_default()
            .into_iter()
            .map(String::from)
            .collect();
        let expires_at = claims.get("exp").and_then(Value::as_u64).unwrap_or(0);
        Self {
            issuer,
            audience,
            expires_at,
            claims,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.str("sub")
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}
