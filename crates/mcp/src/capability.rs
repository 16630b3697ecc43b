//! Invocable capabilities: tools, prompts and resources.
//!
//! A [`Capability`] pairs a [`Descriptor`] (what listing requests see) with a
//! type-erased async handler. The typed constructors derive the input and
//! output schemas with `schemars` and reject payloads that do not
//! deserialize into the declared input type.

use futures::{FutureExt, future::BoxFuture};
use schemars::JsonSchema;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, sync::Arc};
use thiserror::Error;

use crate::protocol::{PromptArgument, PromptMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tool,
    Prompt,
    Resource,
}

impl CapabilityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Prompt => "prompt",
            Self::Resource => "resource",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a capability handler.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The input does not conform to the declared schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Name and schemas of a registered capability.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    pub kind: CapabilityKind,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    /// Resource address; `None` for tools and prompts.
    pub uri: Option<String>,
    pub mime_type: Option<String>,
}

impl Descriptor {
    /// Registry key: the URI for resources, the name otherwise.
    pub fn key(&self) -> &str {
        match (&self.kind, &self.uri) {
            (CapabilityKind::Resource, Some(uri)) => uri,
            _ => &self.name,
        }
    }

    /// Prompt arguments, read from the top-level properties of the input
    /// schema.
    pub fn arguments(&self) -> Vec<PromptArgument> {
        let required: Vec<&str> = self.input_schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let Some(properties) = self.input_schema["properties"].as_object() else {
            return Vec::new();
        };
        properties
            .iter()
            .map(|(name, schema)| PromptArgument {
                name: name.clone(),
                description: schema["description"].as_str().map(String::from),
                required: required.contains(&name.as_str()),
            })
            .collect()
    }
}

type Handler = dyn Fn(Value) -> BoxFuture<'static, Result<Value, CapabilityError>> + Send + Sync;

/// A registered capability. Cheap to clone.
#[derive(Clone)]
pub struct Capability {
    descriptor: Descriptor,
    handler: Arc<Handler>,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl Capability {
    /// Build from a descriptor and an untyped handler.
    pub fn new<F, Fut>(descriptor: Descriptor, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CapabilityError>> + Send + 'static,
    {
        Self {
            descriptor,
            handler: Arc::new(move |input: Value| handler(input).boxed()),
        }
    }

    /// A tool taking `I` and returning `O`.
    pub fn tool<I, O, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, CapabilityError>> + Send + 'static,
    {
        let descriptor = Descriptor {
            kind: CapabilityKind::Tool,
            name: name.into(),
            description: description.into(),
            input_schema: schema::<I>(),
            output_schema: Some(schema::<O>()),
            uri: None,
            mime_type: None,
        };
        Self::new(descriptor, typed(handler, |output: O| {
            serde_json::to_value(output).map_err(|e| CapabilityError::Failed(e.into()))
        }))
    }

    /// A prompt template taking arguments `A`.
    pub fn prompt<A, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<PromptMessage>, CapabilityError>> + Send + 'static,
    {
        let descriptor = Descriptor {
            kind: CapabilityKind::Prompt,
            name: name.into(),
            description: description.into(),
            input_schema: schema::<A>(),
            output_schema: None,
            uri: None,
            mime_type: None,
        };
        Self::new(descriptor, typed(handler, |messages: Vec<PromptMessage>| {
            serde_json::to_value(messages).map_err(|e| CapabilityError::Failed(e.into()))
        }))
    }

    /// A read-only text resource at `uri`.
    pub fn resource<F, Fut>(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, CapabilityError>> + Send + 'static,
    {
        let descriptor = Descriptor {
            kind: CapabilityKind::Resource,
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object" }),
            output_schema: None,
            uri: Some(uri.into()),
            mime_type: Some(mime_type.into()),
        };
        Self::new(descriptor, move |_| {
            let text = handler();
            async move { text.await.map(Value::String) }
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> CapabilityKind {
        self.descriptor.kind
    }

    pub fn invoke(&self, input: Value) -> BoxFuture<'static, Result<Value, CapabilityError>> {
        (self.handler)(input)
    }
}

fn schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Adapt a typed handler to `Value -> Value`.
fn typed<I, O, F, Fut, E>(
    handler: F,
    encode: E,
) -> impl Fn(Value) -> BoxFuture<'static, Result<Value, CapabilityError>> + Send + Sync + 'static
where
    I: DeserializeOwned + Send + 'static,
    O: 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, CapabilityError>> + Send + 'static,
    E: Fn(O) -> Result<Value, CapabilityError> + Copy + Send + Sync + 'static,
{
    move |input: Value| match serde_json::from_value::<I>(input) {
        Ok(input) => {
            let fut = handler(input);
            async move { encode(fut.await?) }.boxed()
        }
        Err(e) => futures::future::ready(Err(CapabilityError::InvalidInput(e.to_string()))).boxed(),
    }
}
