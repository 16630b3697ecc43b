//! Prompt templates.

use schemars::JsonSchema;
use serde::Deserialize;
use smcp::{Capability, CapabilityError, protocol::PromptMessage};

/// Arguments for `summarize`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummarizeArgs {
    /// The text to summarize.
    pub text: String,
    /// Optional tone or format, e.g. "bullet points".
    #[serde(default)]
    pub style: Option<String>,
}

pub fn messages(args: &SummarizeArgs) -> Result<Vec<PromptMessage>, CapabilityError> {
    if args.text.trim().is_empty() {
        return Err(CapabilityError::InvalidInput("text must not be empty".into()));
    }
    let style = args
        .style
        .as_deref()
        .map(|s| format!(" Use this style: {s}."))
        .unwrap_or_default();
    Ok(vec![PromptMessage::user(format!(
        "Summarize the following text in a few sentences.{style}\n\n{}",
        args.text
    ))])
}

pub fn summarize() -> Capability {
    Capability::prompt(
        "summarize",
        "Summarize a piece of text",
        |args: SummarizeArgs| async move { messages(&args) },
    )
}
