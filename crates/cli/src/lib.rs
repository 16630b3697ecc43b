//! Process startup for the secure MCP server.
//!
//! Resolves configuration from flags and the environment once, assembles
//! the validator, authorizer and capability registry, and serves until
//! Ctrl-C.

use anyhow::{Context, Result};
use axum::Router;
use clap::{ArgAction, Parser, builder::BoolishValueParser};
use smcp::{ConfigError, Dispatcher, Registry, ServerConfig, transport};
use smcp_auth::{Authenticator, BearerAuth, Grant, ScopeAuthorizer, jwt::JwtValidator};
use std::{net::SocketAddr, sync::Arc, time::Duration};

/// Secure MCP server: tools behind Entra ID delegated scopes.
#[derive(Debug, Parser)]
#[command(name = "smcp", version, about)]
pub struct Cli {
    /// App Service host name; when set, the base URL is `https://<host>`.
    #[arg(long, env = "WEBSITE_HOSTNAME")]
    pub website_hostname: Option<String>,

    /// External base URL of this deployment.
    #[arg(long, env = "SMCP_BASE_URL")]
    pub base_url: Option<String>,

    /// Entra ID tenant id.
    #[arg(long, env = "AZURE_AD_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id of the protected API.
    #[arg(long, env = "AZURE_AD_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "SMCP_AUTHORITY_HOST")]
    pub authority_host: Option<String>,

    /// Override the signing-key endpoint.
    #[arg(long, env = "SMCP_JWKS_URI")]
    pub jwks_uri: Option<String>,

    #[arg(long, env = "SMCP_REQUIRED_SCOPE", default_value = smcp::config::DEFAULT_REQUIRED_SCOPE)]
    pub required_scope: String,

    #[arg(long, env = "SMCP_SCOPE_CLAIM", default_value = smcp::config::DEFAULT_SCOPE_CLAIM)]
    pub scope_claim: String,

    /// Scope advertised in the discovery document.
    #[arg(long = "scope-supported", env = "MCP_SCOPE")]
    pub scope_supported: Option<String>,

    /// Allow cross-origin requests from browser clients.
    #[arg(
        long,
        env = "SMCP_CORS",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub cors: bool,

    #[arg(long, env = "SMCP_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    #[arg(long, env = "SMCP_KEY_TTL_SECS", default_value_t = 3600)]
    pub key_ttl_secs: u64,

    /// Minimum spacing between key refreshes after an unknown kid or a
    /// failed fetch.
    #[arg(long, env = "SMCP_KEY_REFRESH_SECS", default_value_t = 10)]
    pub key_refresh_secs: u64,

    #[arg(long, env = "SMCP_VALIDATION_TIMEOUT_SECS", default_value_t = 5)]
    pub validation_timeout_secs: u64,

    /// Do not fetch signing keys before accepting requests.
    #[arg(long)]
    pub no_warm: bool,
}

impl Cli {
    /// `WEBSITE_HOSTNAME` wins over an explicit base URL.
    pub fn resolved_base_url(&self) -> Option<String> {
        self.website_hostname
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| format!("https://{host}"))
            .or_else(|| self.base_url.clone())
    }

    pub fn config(&self) -> Result<ServerConfig, ConfigError> {
        let mut builder = ServerConfig::builder()
            .required_scope(&self.required_scope)
            .scope_claim(&self.scope_claim)
            .cors(self.cors)
            .bind(self.bind)
            .key_ttl(Duration::from_secs(self.key_ttl_secs))
            .min_refresh_interval(Duration::from_secs(self.key_refresh_secs))
            .validation_timeout(Duration::from_secs(self.validation_timeout_secs));
        if let Some(url) = self.resolved_base_url() {
            builder = builder.base_url(url);
        }
        if let Some(tenant) = &self.tenant_id {
            builder = builder.tenant_id(tenant);
        }
        if let Some(client) = &self.client_id {
            builder = builder.client_id(client);
        }
        if let Some(host) = &self.authority_host {
            builder = builder.authority_host(host);
        }
        if let Some(uri) = &self.jwks_uri {
            builder = builder.jwks_uri(uri);
        }
        if let Some(scope) = &self.scope_supported {
            builder = builder.scope_supported(scope);
        }
        builder.build()
    }
}

/// JWKS-backed validator for the configured authority.
pub fn validator(config: &ServerConfig) -> Result<JwtValidator> {
    let mut builder = JwtValidator::from_jwks_url(&config.jwks_uri)
        .issuer(&config.issuer)
        .cache_policy(config.key_cache)
        .timeout(config.validation_timeout);
    for audience in &config.audiences {
        builder = builder.audience(audience);
    }
    builder.build()
}

pub fn authorizer(config: &ServerConfig) -> ScopeAuthorizer {
    ScopeAuthorizer::new(&config.required_scope).claim(&config.scope_claim)
}

/// The registry with every built-in capability.
pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    smcp_tools::register_all(&mut registry).context("failed to register capabilities")?;
    Ok(registry)
}

/// Assemble the application router around `authenticator`.
pub fn app<A>(config: &ServerConfig, authenticator: A) -> Result<Router>
where
    A: Authenticator<Claims = Grant>,
{
    let dispatcher = Dispatcher::new(Arc::new(registry()?))
        .server_info("smcp", env!("CARGO_PKG_VERSION"))
        .instructions(smcp_tools::INSTRUCTIONS);
    Ok(transport::router(config, authenticator, dispatcher))
}

/// Resolve configuration, bind and serve until Ctrl-C.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config().context("invalid configuration")?;
    tracing::info!(
        resource = %config.resource,
        issuer = %config.issuer,
        scope = %config.required_scope,
        cors = config.cors,
        "starting"
    );

    let validator = validator(&config)?;
    if !cli.no_warm {
        match validator.warm().await {
            Ok(keys) => tracing::info!(keys, "signing keys loaded"),
            Err(e) => tracing::warn!("could not prefetch signing keys: {e}"),
        }
    }
    let gate = BearerAuth::new(validator, authorizer(&config));
    let app = app(&config, gate)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    transport::serve(listener, app, transport::ctrl_c())
        .await
        .context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("smcp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn website_hostname_takes_precedence() {
        let cli = parse(&[
            "--website-hostname",
            "app.azurewebsites.net",
            "--base-url",
            "http://localhost:8080",
        ]);
        assert_eq!(
            cli.resolved_base_url().as_deref(),
            Some("https://app.azurewebsites.net")
        );
    }

    #[test]
    fn builds_config_from_flags() {
        let cli = parse(&[
            "--base-url",
            "https://example.test/",
            "--tenant-id",
            "tenant",
            "--client-id",
            "abc",
            "--key-refresh-secs",
            "30",
        ]);
        let config = cli.config().unwrap();
        assert_eq!(
            config.key_cache.min_refresh_interval,
            Duration::from_secs(30)
        );
        assert_eq!(config.resource, "https://example.test/mcp");
        assert_eq!(config.scopes_supported, vec!["api://abc/mcp:tools"]);
        assert_eq!(config.scope_claim, "scp");
    }

    #[test]
    fn cors_accepts_boolish_env_values() {
        for (raw, expected) in [("1", true), ("yes", true), ("off", false)] {
            // SAFETY: no other test reads or writes SMCP_CORS
            unsafe { std::env::set_var("SMCP_CORS", raw) };
            let cli = Cli::try_parse_from(["smcp"]);
            unsafe { std::env::remove_var("SMCP_CORS") };
            assert_eq!(cli.unwrap().cors, expected, "SMCP_CORS={raw}");
        }
        assert!(parse(&["--cors"]).cors);
    }

    #[test]
    fn missing_tenant_refuses_to_start() {
        let cli = parse(&["--base-url", "https://example.test", "--tenant-id", ""]);
        assert!(matches!(cli.config(), Err(ConfigError::MissingTenant)));
    }
}
