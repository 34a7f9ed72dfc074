use crate::domain::event::ScheduledEvent;
use anyhow::{bail, ensure};
use serde::{Deserialize, Deserializer, Serialize};

/// Canonical fields handed to the enrichment model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRequest {
    pub country: String,
    pub event_name: String,
    pub actual: Option<f64>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
}

impl From<&ScheduledEvent> for EnrichmentRequest {
    fn from(event: &ScheduledEvent) -> Self {
        Self {
            country: event.country.to_string(),
            event_name: event.event_name.clone(),
            actual: event.actual,
            forecast: event.forecast,
            previous: event.previous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub summary: String,
    pub analysis: String,
    pub impact_on_commodities: String,
    pub gold_impact_score: u8,
    pub silver_impact_score: u8,
}

/// Raw model output. Every field is optional so an error marker or a partial
/// object decodes and is then rejected by validation instead of by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmEventAnalysis {
    /// `Some` whenever the key is present, even as `"error": null`.
    #[serde(
        default,
        deserialize_with = "present_key",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub impact_on_commodities: Option<String>,
    #[serde(default)]
    pub gold_impact_score: Option<i64>,
    #[serde(default)]
    pub silver_impact_score: Option<i64>,
}

impl LlmEventAnalysis {
    pub fn validate_and_into_analysis(self) -> anyhow::Result<EventAnalysis> {
        if let Some(marker) = self.error {
            bail!("model returned an error marker: {marker}");
        }

        let summary = required_text("summary", self.summary)?;
        let analysis = required_text("analysis", self.analysis)?;
        let impact_on_commodities =
            required_text("impact_on_commodities", self.impact_on_commodities)?;
        let gold_impact_score = score("gold_impact_score", self.gold_impact_score)?;
        let silver_impact_score = score("silver_impact_score", self.silver_impact_score)?;

        Ok(EventAnalysis {
            summary,
            analysis,
            impact_on_commodities,
            gold_impact_score,
            silver_impact_score,
        })
    }
}

fn present_key<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

fn required_text(field: &str, value: Option<String>) -> anyhow::Result<String> {
    let value = value.map(|s| s.trim().to_string()).unwrap_or_default();
    ensure!(!value.is_empty(), "{field} must be non-empty");
    Ok(value)
}

fn score(field: &str, value: Option<i64>) -> anyhow::Result<u8> {
    let Some(value) = value else {
        bail!("{field} is missing");
    };
    ensure!(
        (1..=10).contains(&value),
        "{field} must be between 1 and 10 (got {value})"
    );
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: serde_json::Value) -> anyhow::Result<EventAnalysis> {
        serde_json::from_value::<LlmEventAnalysis>(v)?.validate_and_into_analysis()
    }

    #[test]
    fn accepts_complete_object() {
        let analysis = decode(json!({
            "summary": "CPI measures inflation.",
            "analysis": "Actual above forecast.",
            "impact_on_commodities": "USD up, gold down.",
            "gold_impact_score": 8,
            "silver_impact_score": 6,
        }))
        .unwrap();
        assert_eq!(analysis.gold_impact_score, 8);
        assert_eq!(analysis.silver_impact_score, 6);
    }

    #[test]
    fn rejects_error_marker() {
        let err = decode(json!({"error": "quota exceeded"})).unwrap_err();
        assert!(err.to_string().contains("error marker"));
    }

    #[test]
    fn null_error_key_is_still_a_marker() {
        let err = decode(json!({
            "error": null,
            "summary": "s",
            "analysis": "a",
            "impact_on_commodities": "i",
            "gold_impact_score": 5,
            "silver_impact_score": 5,
        }))
        .unwrap_err();
        assert!(err.to_string().contains("error marker"));
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let res = decode(json!({
            "summary": "s",
            "analysis": "a",
            "impact_on_commodities": "i",
            "gold_impact_score": 11,
            "silver_impact_score": 5,
        }));
        assert!(res.is_err());
    }

    #[test]
    fn rejects_partial_object() {
        let res = decode(json!({
            "summary": "s",
            "gold_impact_score": 5,
            "silver_impact_score": 5,
        }));
        assert!(res.is_err());
    }

    #[test]
    fn rejects_fractional_scores_via_deserialize() {
        let res = serde_json::from_value::<LlmEventAnalysis>(json!({"gold_impact_score": 7.5}));
        assert!(res.is_err());
    }

    #[test]
    fn request_uses_camel_case_event_name() {
        let req = EnrichmentRequest {
            country: "US".to_string(),
            event_name: "CPI".to_string(),
            actual: Some(0.0),
            forecast: None,
            previous: Some(2.9),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["eventName"], "CPI");
        assert_eq!(v["actual"], 0.0);
        assert!(v["forecast"].is_null());
    }
}
