//! The server documentation resource.

use smcp::{Capability, CapabilityError};

pub const URI: &str = "docs://server";

const DOCUMENTATION: &str = "\
# Secure MCP server

Every request to `/mcp` needs an `Authorization: Bearer` access token whose
`scp` claim contains `mcp:tools`. Discover the authorization server at
`/.well-known/oauth-protected-resource`.

## Tools

- `random-number` `{ min, max }`: random integer in the inclusive range.
- `current-date` `{ timezone? }`: current date and time, UTC by default.

## Prompts

- `summarize` `{ text, style? }`: ask the model for a short summary.
";

pub fn documentation() -> Capability {
    Capability::resource(
        URI,
        "server-documentation",
        "How to authenticate against and use this server",
        "text/markdown",
        || async { Ok::<_, CapabilityError>(DOCUMENTATION.to_string()) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_markdown() {
        let doc = documentation();
        assert_eq!(doc.descriptor().key(), URI);
        assert_eq!(doc.descriptor().mime_type.as_deref(), Some("text/markdown"));
        let text = doc.invoke(serde_json::Value::Null).await.unwrap();
        assert!(text.as_str().unwrap().starts_with("# Secure MCP server"));
    }
}
