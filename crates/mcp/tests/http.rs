//! The assembled router, driven with `oneshot`.

use axum::{
    Router,
    body::{Body, to_bytes},
};
use http::{Request, StatusCode, header};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use smcp::{Capability, CapabilityError, Dispatcher, Registry, ServerConfig, transport};
use smcp_auth::{BearerAuth, ScopeAuthorizer, jwt::JwtValidator, keys::StaticKeys};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

const SECRET: &[u8] = b"integration-secret";

#[derive(Deserialize, JsonSchema)]
struct Word {
    word: String,
}

#[derive(Serialize, JsonSchema)]
struct Shout {
    shout: String,
}

fn config(cors: bool) -> ServerConfig {
    ServerConfig::builder()
        .base_url("https://example.test")
        .tenant_id("tenant")
        .authority_host("https://login.example.test")
        .cors(cors)
        .build()
        .unwrap()
}

fn app(config: &ServerConfig, hits: Arc<AtomicUsize>) -> Router {
    let mut builder = JwtValidator::with_source(StaticKeys::new().hmac("k1", SECRET))
        .issuer(config.issuer.clone());
    for audience in &config.audiences {
        builder = builder.audience(audience.clone());
    }
    let gate = BearerAuth::new(
        builder.build().unwrap(),
        ScopeAuthorizer::new(config.required_scope.clone()).claim(config.scope_claim.clone()),
    );

    let mut registry = Registry::new();
    registry
        .register(Capability::tool("shout", "Upper-case a word", move |w: Word| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CapabilityError>(Shout {
                    shout: w.word.to_uppercase(),
                })
            }
        }))
        .unwrap();

    transport::router(config, gate, Dispatcher::new(Arc::new(registry)))
}

fn token(config: &ServerConfig, scope: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("k1".into());
    jsonwebtoken::encode(
        &header,
        &json!({
            "iss": config.issuer,
            "aud": config.resource,
            "exp": now + exp_offset,
            "sub": "user-1",
            "scp": scope,
        }),
        &EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

fn shout(token: Option<&str>) -> Request<Body> {
    let mut req = Request::post("/mcp").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::from(
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "shout", "arguments": { "word": "hi" } },
        })
        .to_string(),
    ))
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn discovery_needs_no_credentials() {
    let config = config(false);
    let response = app(&config, Default::default())
        .oneshot(
            Request::get("/.well-known/oauth-protected-resource")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert_eq!(doc["resource"], "https://example.test/mcp");
    assert_eq!(
        doc["authorization_servers"][0],
        "https://login.example.test/tenant/v2.0"
    );
    assert_eq!(doc["resource_documentation"], "https://example.test/health");
}

#[tokio::test]
async fn health_reports_utc_time() {
    let config = config(false);
    let response = app(&config, Default::default())
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.starts_with("Secure MCP server running deployed: UTC: "));
}

#[tokio::test]
async fn missing_token_never_reaches_registry() {
    let config = config(false);
    let hits = Arc::new(AtomicUsize::new(0));
    let response = app(&config, hits.clone()).oneshot(shout(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(challenge.contains(
        "resource_metadata=\"https://example.test/.well-known/oauth-protected-resource\""
    ));
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["error"]["message"], "missing bearer token");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_scope_is_forbidden() {
    let config = config(false);
    let hits = Arc::new(AtomicUsize::new(0));
    let token = token(&config, "mcp:admin other:scope", 600);
    let response = app(&config, hits.clone())
        .oneshot(shout(Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        response.headers()[header::WWW_AUTHENTICATE]
            .to_str()
            .unwrap()
            .contains("insufficient_scope")
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let config = config(false);
    let token = token(&config, "mcp:tools", -1);
    let response = app(&config, Default::default())
        .oneshot(shout(Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["message"], "access token has expired");
}

#[tokio::test]
async fn authorized_call_is_dispatched() {
    let config = config(false);
    let hits = Arc::new(AtomicUsize::new(0));
    let token = token(&config, "mcp:tools other:scope", 600);
    let app = app(&config, hits.clone());

    let first = json_body(app.clone().oneshot(shout(Some(&token))).await.unwrap()).await;
    let second = json_body(app.oneshot(shout(Some(&token))).await.unwrap()).await;

    assert_eq!(first["result"]["structuredContent"]["shout"], "HI");
    assert_eq!(first, second);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cors_preflight_skips_auth_when_enabled() {
    let config = config(true);
    let preflight = || {
        Request::options("/mcp")
            .header(header::ORIGIN, "https://app.example.test")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let response = app(&config, Default::default())
        .oneshot(preflight())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app(&config, Default::default())
        .oneshot(shout(None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
