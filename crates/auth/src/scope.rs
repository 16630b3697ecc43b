//! Delegated-scope authorization.
//!
//! A [`Grant`] is the only proof of authorization the rest of the server
//! accepts, and the only way to obtain one is [`ScopeAuthorizer::authorize`]
//! on an already validated [`AccessToken`].

use std::sync::Arc;

use crate::{
    decision::{AuthError, AuthorizationDecision},
    token::AccessToken,
};

/// Claim that carries delegated scopes in Entra ID access tokens.
pub const DEFAULT_SCOPE_CLAIM: &str = "scp";

/// Checks that a token's scope claim carries one required scope.
#[derive(Clone, Debug)]
pub struct ScopeAuthorizer {
    claim: String,
    required: String,
}

impl ScopeAuthorizer {
    /// Require `scope` in the [`DEFAULT_SCOPE_CLAIM`] claim.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            claim: DEFAULT_SCOPE_CLAIM.to_string(),
            required: scope.into(),
        }
    }

    /// Read scopes from a different claim, e.g. `scope` for RFC 8693 issuers.
    pub fn claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = claim.into();
        self
    }

    pub fn authorize(&self, token: AccessToken) -> Result<Grant, AuthError> {
        let granted = token
            .claims
            .entries(&self.claim)
            .is_some_and(|entries| entries.contains(&self.required.as_str()));
        if !granted {
            return Err(AuthError::MissingScope {
                required: self.required.clone(),
            });
        }
        Ok(Grant {
            token: Arc::new(token),
            scope: self.required.clone(),
            decision: AuthorizationDecision::allow(),
        })
    }
}

/// An authenticated and authorized caller.
#[derive(Clone, Debug)]
pub struct Grant {
    token: Arc<AccessToken>,
    scope: String,
    decision: AuthorizationDecision,
}

impl Grant {
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// The scope that was checked to produce this grant.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The verdict recorded when the grant was issued.
    pub fn decision(&self) -> AuthorizationDecision {
        self.decision
    }

    pub fn subject(&self) -> Option<&str> {
        self.token.subject()
    }
}
