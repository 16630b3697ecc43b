//! # smcp-auth
//!
//! The authorization boundary of an MCP resource server: bearer token
//! validation against an identity authority, delegated-scope authorization,
//! and the unauthenticated discovery document that tells clients where to
//! get a token.
//!
//! The [`AuthLayer`] tower middleware runs an [`Authenticator`] before the
//! wrapped service. On success the resulting claims (a [`Grant`] for
//! [`BearerAuth`]) are inserted into the request extensions; on failure the
//! request is answered with 401 or 403 and never reaches the inner service.
//!
//! ```rust,ignore
//! use smcp_auth::{AuthLayer, BearerAuth, ScopeAuthorizer, jwt::JwtValidator};
//! use smcp_auth::oauth::ResourceServerConfig;
//!
//! let validator = JwtValidator::from_jwks_url(jwks_uri)
//!     .issuer(issuer)
//!     .audience("https://mcp.example.com/mcp")
//!     .build()?;
//! let gate = BearerAuth::new(validator, ScopeAuthorizer::new("mcp:tools"));
//!
//! let app = axum::Router::new()
//!     .route("/mcp", post(handler).layer(AuthLayer::new(gate).with_resource_server(rs_config)));
//! ```

mod bearer;
mod decision;

pub mod jwt;
pub mod keys;
pub mod oauth;
pub mod scope;
pub mod token;

pub use bearer::{BearerAuth, bearer_token};
pub use decision::{AuthError, AuthorizationDecision, InvalidToken, Reason};
pub use scope::{Grant, ScopeAuthorizer};
pub use token::{AccessToken, Claims};

use futures::future::BoxFuture;
use http::{Request, Response};
use oauth::{ResourceServerConfig, auth_error_response};
use std::task::{Context, Poll};

/// Trait for admitting or rejecting incoming requests.
///
/// On success, `Claims` is inserted into `http::Extensions`.
pub trait Authenticator: Clone + Send + Sync + 'static {
    /// The claims type produced on successful authentication.
    type Claims: Clone + Send + Sync + 'static;

    /// Validate the request and return claims, or the reason it is rejected.
    fn authenticate(
        &self,
        parts: &http::request::Parts,
    ) -> impl Future<Output = Result<Self::Claims, AuthError>> + Send;
}

/// Trait for validating a bearer credential.
///
/// Wrapped by [`BearerAuth`], which handles extraction from the
/// `Authorization` header and the scope check.
pub trait Validator: Clone + Send + Sync + 'static {
    /// Validate the token and return its claims.
    fn validate(&self, token: &str) -> impl Future<Output = Result<AccessToken, AuthError>> + Send;
}

/// Tower [`Layer`](tower::Layer) that applies [`AuthService`].
#[derive(Clone)]
pub struct AuthLayer<A> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
}

impl<A> AuthLayer<A> {
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            resource_server: None,
        }
    }

    /// Configure OAuth resource server metadata for error responses.
    ///
    /// When set, 401 and 403 responses carry a `WWW-Authenticate` header with
    /// `resource_metadata` and `scope` parameters per the MCP authorization
    /// specification.
    pub fn with_resource_server(mut self, config: ResourceServerConfig) -> Self {
        self.resource_server = Some(config);
        self
    }
}

impl<A, S> tower::Layer<S> for AuthLayer<A>
where
    A: Clone,
{
    type Service = AuthService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            authenticator: self.authenticator.clone(),
            resource_server: self.resource_server.clone(),
            inner,
        }
    }
}

/// Tower service that authenticates requests before forwarding them.
///
/// Admitted requests carry the claims and an allowing
/// [`AuthorizationDecision`] in their extensions. Rejected ones are answered
/// with the status of the denying decision.
#[derive(Clone)]
pub struct AuthService<A, S> {
    authenticator: A,
    resource_server: Option<ResourceServerConfig>,
    inner: S,
}

impl<A, S, B> tower::Service<Request<B>> for AuthService<A, S>
where
    A: Authenticator,
    S: tower::Service<Request<B>, Response = Response<axum::body::Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let authenticator = self.authenticator.clone();
        let resource_server = self.resource_server.clone();
        let mut inner = self.inner.clone();
        // swap to ensure poll_ready state is preserved
        std::mem::swap(&mut self.inner, &mut inner);

        Box::pin(async move {
            let (parts, body) = req.into_parts();

            match authenticator.authenticate(&parts).await {
                Ok(claims) => {
                    let decision = AuthorizationDecision::allow();
                    tracing::debug!(
                        path = %parts.uri.path(),
                        reason = decision.reason.as_str(),
                        "request authorized"
                    );
                    let mut req = Request::from_parts(parts, body);
                    req.extensions_mut().insert(claims);
                    req.extensions_mut().insert(decision);
                    inner.call(req).await
                }
                Err(err) => {
                    let decision = err.decision();
                    tracing::warn!(
                        path = %parts.uri.path(),
                        reason = decision.reason.as_str(),
                        status = decision.status().as_u16(),
                        "request rejected: {err}"
                    );
                    Ok(auth_error_response(&err, resource_server.as_ref()))
                }
            }
        })
    }
}
