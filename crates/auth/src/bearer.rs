//! Bearer token gate.
//!
//! Extracts the token from `Authorization: Bearer <token>`, validates it with
//! a [`Validator`](super::Validator) and then checks the delegated scope. The
//! scope check never runs unless validation succeeded.

use crate::{
    Authenticator, Validator,
    decision::AuthError,
    scope::{Grant, ScopeAuthorizer},
};

/// Extract the credential from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. A header with another scheme
/// or an empty credential counts as no token at all.
pub fn bearer_token(value: Option<&http::HeaderValue>) -> Option<&str> {
    let value = value?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticates bearer tokens and authorizes their scope.
#[derive(Clone)]
pub struct BearerAuth<V> {
    validator: V,
    authorizer: ScopeAuthorizer,
}

impl<V> BearerAuth<V> {
    pub fn new(validator: V, authorizer: ScopeAuthorizer) -> Self {
        Self {
            validator,
            authorizer,
        }
    }
}

impl<V: Validator> BearerAuth<V> {
    /// Run both gates against a raw `Authorization` header.
    pub async fn check(&self, authorization: Option<&http::HeaderValue>) -> Result<Grant, AuthError> {
        let token = bearer_token(authorization).ok_or(AuthError::MissingToken)?;
        let token = self.validator.validate(token).await?;
        self.authorizer.authorize(token)
    }
}

impl<V> Authenticator for BearerAuth<V>
where
    V: Validator,
{
    type Claims = Grant;

    async fn authenticate(&self, parts: &http::request::Parts) -> Result<Grant, AuthError> {
        self.check(parts.headers.get(http::header::AUTHORIZATION))
            .await
    }
}
