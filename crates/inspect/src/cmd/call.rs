//! Command for calling a tool on an smcp server.

use crate::{client::Client, error::Error};
use serde_json::{Map, Value, json};

/// Parse `key=value` pairs into a JSON object.
///
/// Each value is first attempted as JSON. If parsing fails, it is
/// treated as a plain string.
pub fn parse_args(args: &[String]) -> Result<Map<String, Value>, Error> {
    let mut map = Map::new();
    for arg in args {
        let (key, raw_value) = arg
            .split_once('=')
            .ok_or_else(|| Error::InvalidArg(arg.clone()))?;

        let value = serde_json::from_str(raw_value)
            .unwrap_or_else(|_| Value::String(raw_value.to_string()));

        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Call a tool and return the `tools/call` result.
pub async fn call(client: &Client, name: String, args: &[String]) -> Result<Value, Error> {
    let arguments = parse_args(args)?;
    client
        .request("tools/call", json!({ "name": name, "arguments": arguments }))
        .await
}
