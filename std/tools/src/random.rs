//! The `random-number` tool.

use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use smcp::{Capability, CapabilityError};

/// Parameters for `random-number`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RandomRange {
    /// Smallest value that may be returned.
    #[serde(default)]
    pub min: i64,
    /// Largest value that may be returned.
    #[serde(default = "default_max")]
    pub max: i64,
}

fn default_max() -> i64 {
    100
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RandomNumber {
    pub value: i64,
}

pub fn pick(range: &RandomRange) -> Result<RandomNumber, CapabilityError> {
    if range.min > range.max {
        return Err(CapabilityError::InvalidInput(format!(
            "min ({}) must not exceed max ({})",
            range.min, range.max
        )));
    }
    let value = rand::thread_rng().gen_range(range.min..=range.max);
    tracing::debug!(min = range.min, max = range.max, value, "picked random number");
    Ok(RandomNumber { value })
}

pub fn random_number() -> Capability {
    Capability::tool(
        "random-number",
        "Generate a random integer between min and max, inclusive",
        |range: RandomRange| async move { pick(&range) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stays_in_range() {
        let range = RandomRange { min: 1, max: 10 };
        for _ in 0..200 {
            let n = pick(&range).unwrap().value;
            assert!((1..=10).contains(&n), "{n} out of range");
        }
    }

    #[test]
    fn single_value_range() {
        assert_eq!(pick(&RandomRange { min: 7, max: 7 }).unwrap().value, 7);
    }

    #[test]
    fn inverted_range_is_invalid_input() {
        let err = pick(&RandomRange { min: 10, max: 1 }).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn tool_reads_json_arguments() {
        let out = random_number()
            .invoke(json!({ "min": 1, "max": 10 }))
            .await
            .unwrap();
        let value = out["value"].as_i64().unwrap();
        assert!((1..=10).contains(&value));
    }
}
