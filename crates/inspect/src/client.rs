//! Minimal JSON-RPC client for the capability path.

use crate::error::Error;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

pub const WELL_KNOWN_PATH: &str = ".well-known/oauth-protected-resource";

pub struct Client {
    http: reqwest::Client,
    base: Url,
    auth: Option<String>,
    next_id: AtomicU64,
}

impl Client {
    /// `base` is the server root; `/mcp`, `/health` and the discovery path
    /// are resolved against it.
    pub fn new(base: &str, auth: Option<String>) -> Result<Self, Error> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            auth,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub async fn metadata(&self) -> Result<Value, Error> {
        let response = self.http.get(self.base.join(WELL_KNOWN_PATH)?).send().await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn health(&self) -> Result<String, Error> {
        let response = self.http.get(self.base.join("health")?).send().await?;
        Ok(checked(response).await?.text().await?)
    }

    /// Send one request and return its `result`.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self
            .http
            .post(self.base.join("mcp")?)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }));
        if let Some(token) = &self.auth {
            request = request.bearer_auth(token);
        }
        tracing::debug!(method, id, "sending request");

        let response = request.send().await?;
        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(Error::Status {
                    status,
                    body: String::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = body.get("error") {
            return Err(Error::Rpc {
                code: error["code"].as_i64().unwrap_or_default(),
                message: error["message"].as_str().unwrap_or_default().to_string(),
            });
        }
        body.get("result").cloned().ok_or(Error::EmptyResponse)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status { status, body })
}
