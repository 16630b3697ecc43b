//! The `current-date` tool.

use chrono::{DateTime, Datelike, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use smcp::{Capability, CapabilityError};

/// Parameters for `current-date`.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CurrentDateParams {
    /// IANA timezone name (e.g. "Europe/Zurich"). Defaults to UTC.
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CurrentDate {
    pub timezone: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// RFC 3339 timestamp with offset.
    pub datetime: String,
    pub day_of_week: String,
    pub is_dst: bool,
}

fn parse_tz(name: &str) -> Result<Tz, CapabilityError> {
    name.parse::<Tz>()
        .map_err(|_| CapabilityError::InvalidInput(format!("unknown timezone `{name}`")))
}

pub fn describe(tz: Tz, dt: DateTime<Tz>) -> CurrentDate {
    let offset = dt.offset().fix().local_minus_utc();
    // standard time is the smaller of the January and July offsets, which
    // holds in both hemispheres
    let offset_in = |month| {
        Utc.with_ymd_and_hms(dt.year(), month, 1, 12, 0, 0)
            .single()
            .map(|d| d.with_timezone(&tz).offset().fix().local_minus_utc())
    };
    let standard = offset_in(1).zip(offset_in(7)).map(|(jan, jul)| jan.min(jul));

    CurrentDate {
        timezone: tz.to_string(),
        date: dt.format("%Y-%m-%d").to_string(),
        datetime: dt.to_rfc3339(),
        day_of_week: dt.format("%A").to_string(),
        is_dst: standard.is_some_and(|standard| offset > standard),
    }
}

pub fn now(params: &CurrentDateParams) -> Result<CurrentDate, CapabilityError> {
    let tz = match params.timezone.as_deref() {
        Some(name) if !name.trim().is_empty() => parse_tz(name.trim())?,
        _ => Tz::UTC,
    };
    Ok(describe(tz, Utc::now().with_timezone(&tz)))
}

pub fn current_date() -> Capability {
    Capability::tool(
        "current-date",
        "Get the current date and time, optionally in a specific timezone",
        |params: CurrentDateParams| async move { now(&params) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_utc() {
        let date = now(&CurrentDateParams::default()).unwrap();
        assert_eq!(date.timezone, "UTC");
        assert!(!date.is_dst);
        assert_eq!(date.date.len(), 10);
    }

    #[test]
    fn fixed_instant_in_zone() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        let dt = Utc
            .with_ymd_and_hms(2025, 7, 1, 20, 0, 0)
            .unwrap()
            .with_timezone(&tz);
        let date = describe(tz, dt);
        assert_eq!(date.date, "2025-07-02");
        assert_eq!(date.day_of_week, "Wednesday");
        assert!(!date.is_dst);
    }

    #[test]
    fn summer_time_is_detected() {
        let tz: Tz = "Europe/Zurich".parse().unwrap();
        let dt = Utc
            .with_ymd_and_hms(2025, 7, 1, 12, 0, 0)
            .unwrap()
            .with_timezone(&tz);
        assert!(describe(tz, dt).is_dst);
    }

    #[test]
    fn southern_hemisphere_seasons() {
        let tz: Tz = "Australia/Sydney".parse().unwrap();
        let winter = Utc
            .with_ymd_and_hms(2025, 7, 1, 0, 0, 0)
            .unwrap()
            .with_timezone(&tz);
        assert!(!describe(tz, winter).is_dst);

        let summer = Utc
            .with_ymd_and_hms(2025, 1, 15, 0, 0, 0)
            .unwrap()
            .with_timezone(&tz);
        assert!(describe(tz, summer).is_dst);
    }

    #[tokio::test]
    async fn unknown_timezone_is_invalid_input() {
        let err = current_date()
            .invoke(json!({ "timezone": "Mars/Olympus" }))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn repeated_calls_share_structure() {
        let tool = current_date();
        let a = tool.invoke(json!({})).await.unwrap();
        let b = tool.invoke(json!({})).await.unwrap();
        let keys = |v: &serde_json::Value| {
            v.as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&a), keys(&b));
        assert_eq!(a["timezone"], b["timezone"]);
    }
}
