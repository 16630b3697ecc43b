//! The protocol dispatcher.
//!
//! A request reaches [`Dispatcher::dispatch`] only with a [`Grant`], so the
//! authentication and authorization stages have already passed by
//! construction. The dispatcher parses the JSON-RPC envelope, routes it to a
//! registered capability, invokes the handler and shapes the reply. Every
//! failure becomes exactly one JSON-RPC error code and one HTTP status.

use futures::FutureExt;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use smcp_auth::Grant;
use std::{panic::AssertUnwindSafe, sync::Arc};
use thiserror::Error;

use crate::{
    capability::{Capability, CapabilityError, CapabilityKind},
    protocol::{
        CallToolResult, GetPromptResult, Implementation, InitializeParams, InitializeResult,
        JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, NamedParams, PromptInfo,
        PromptMessage, ReadResourceParams, ReadResourceResult, ResourceContents, ResourceInfo,
        SUPPORTED_PROTOCOL_VERSIONS, ToolInfo, error_codes,
    },
    registry::Registry,
};

/// Why a routed request failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("{kind} `{name}` not found")]
    CapabilityNotFound { kind: CapabilityKind, name: String },
    #[error("invalid input for `{name}`: {reason}")]
    InvalidInput { name: String, reason: String },
    #[error("`{name}` failed: {source:#}")]
    Handler {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::CapabilityNotFound { .. } => error_codes::NOT_FOUND,
            Self::InvalidInput { .. } => error_codes::INVALID_PARAMS,
            Self::Handler { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Handler { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Message returned to the caller. Handler failures stay opaque.
    pub fn public_message(&self) -> String {
        match self {
            Self::Handler { name, .. } => format!("`{name}` failed"),
            other => other.to_string(),
        }
    }

    fn to_rpc(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.public_message(),
            data: None,
        }
    }
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Reply {
        status: StatusCode,
        response: JsonRpcResponse,
    },
    /// A notification was accepted; there is no body.
    Accepted,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Reply { status, .. } => *status,
            Self::Accepted => StatusCode::ACCEPTED,
        }
    }

    fn ok(id: Value, result: Value) -> Self {
        Self::Reply {
            status: StatusCode::OK,
            response: JsonRpcResponse::success(id, result),
        }
    }

    fn err(id: Value, err: &DispatchError) -> Self {
        Self::Reply {
            status: err.status(),
            response: JsonRpcResponse::failure(id, err.to_rpc()),
        }
    }
}

/// Routes authorized JSON-RPC requests to the capability registry.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    info: Implementation,
    instructions: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            info: Implementation {
                name: env!("CARGO_PKG_NAME").into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: None,
        }
    }

    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = Implementation {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Handle one request body on behalf of `grant`.
    pub async fn dispatch(&self, grant: &Grant, body: &[u8]) -> Outcome {
        let message: Value = match serde_json::from_slice(body) {
            Ok(message) => message,
            Err(e) => return Outcome::err(Value::Null, &DispatchError::Parse(e.to_string())),
        };
        if message.is_array() {
            return Outcome::err(
                Value::Null,
                &DispatchError::InvalidRequest("batch requests are not supported".into()),
            );
        }
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => return Outcome::err(id, &DispatchError::InvalidRequest(e.to_string())),
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Outcome::err(
                id,
                &DispatchError::InvalidRequest(format!(
                    "unsupported jsonrpc version `{}`",
                    request.jsonrpc
                )),
            );
        }

        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "notification accepted");
            return Outcome::Accepted;
        };

        match self.handle(grant, &request.method, request.params).await {
            Ok(result) => Outcome::ok(id, result),
            Err(err) => {
                match &err {
                    DispatchError::Handler { .. } => tracing::error!(
                        method = %request.method,
                        subject = grant.subject().unwrap_or("-"),
                        "{err}"
                    ),
                    _ => tracing::debug!(method = %request.method, code = err.code(), "{err}"),
                }
                Outcome::err(id, &err)
            }
        }
    }

    async fn handle(
        &self,
        grant: &Grant,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        match method {
            "initialize" => {
                let params: InitializeParams = match params {
                    Some(p) => parse_params(method, p)?,
                    None => InitializeParams::default(),
                };
                Ok(encode(self.initialize(params)))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.registry.list(CapabilityKind::Tool).map(ToolInfo::from).collect::<Vec<_>>(),
            })),
            "prompts/list" => Ok(json!({
                "prompts": self.registry.list(CapabilityKind::Prompt).map(PromptInfo::from).collect::<Vec<_>>(),
            })),
            "resources/list" => Ok(json!({
                "resources": self.registry.list(CapabilityKind::Resource).map(ResourceInfo::from).collect::<Vec<_>>(),
            })),
            "tools/call" => {
                let params: NamedParams = parse_params(method, params.unwrap_or_default())?;
                let tool = self.route(CapabilityKind::Tool, &params.name)?;
                let output = invoke(grant, tool, arguments(params.arguments)).await?;
                Ok(encode(CallToolResult::success(output)))
            }
            "prompts/get" => {
                let params: NamedParams = parse_params(method, params.unwrap_or_default())?;
                let prompt = self.route(CapabilityKind::Prompt, &params.name)?;
                let output = invoke(grant, prompt, arguments(params.arguments)).await?;
                let messages: Vec<PromptMessage> =
                    serde_json::from_value(output).map_err(|e| DispatchError::Handler {
                        name: params.name.clone(),
                        source: e.into(),
                    })?;
                Ok(encode(GetPromptResult {
                    description: prompt.descriptor().description.clone(),
                    messages,
                }))
            }
            "resources/read" => {
                let params: ReadResourceParams = parse_params(method, params.unwrap_or_default())?;
                let resource = self.route(CapabilityKind::Resource, &params.uri)?;
                let output = invoke(grant, resource, Value::Null).await?;
                let text = match output {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                Ok(encode(ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri: params.uri,
                        mime_type: resource.descriptor().mime_type.clone(),
                        text,
                    }],
                }))
            }
            other => Err(DispatchError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        let protocol_version = params
            .protocol_version
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(&v.as_str()))
            .unwrap_or_else(|| SUPPORTED_PROTOCOL_VERSIONS[0].to_string());
        InitializeResult {
            protocol_version,
            capabilities: json!({
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
            }),
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        }
    }

    fn route(&self, kind: CapabilityKind, key: &str) -> Result<&Capability, DispatchError> {
        self.registry
            .lookup(kind, key)
            .ok_or_else(|| DispatchError::CapabilityNotFound {
                kind,
                name: key.to_string(),
            })
    }
}

/// Run a handler, turning its failures and panics into [`DispatchError`].
async fn invoke(grant: &Grant, capability: &Capability, input: Value) -> Result<Value, DispatchError> {
    let name = capability.descriptor().key().to_string();
    tracing::debug!(
        kind = %capability.kind(),
        name = %name,
        subject = grant.subject().unwrap_or("-"),
        "invoking capability"
    );
    match AssertUnwindSafe(capability.invoke(input)).catch_unwind().await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(CapabilityError::InvalidInput(reason))) => {
            Err(DispatchError::InvalidInput { name, reason })
        }
        Ok(Err(CapabilityError::Failed(source))) => Err(DispatchError::Handler { name, source }),
        Err(_) => Err(DispatchError::Handler {
            name,
            source: anyhow::anyhow!("handler panicked"),
        }),
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, DispatchError> {
    serde_json::from_value(params).map_err(|e| DispatchError::InvalidInput {
        name: method.to_string(),
        reason: e.to_string(),
    })
}

fn arguments(arguments: Option<Value>) -> Value {
    match arguments {
        None | Some(Value::Null) => json!({}),
        Some(arguments) => arguments,
    }
}

fn encode<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
