use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Impact {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            other => anyhow::bail!("unknown impact level: {other:?}"),
        }
    }
}

/// Upper-cased ISO-style country code as reported by the calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: &str) -> anyhow::Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        anyhow::ensure!(!code.is_empty(), "country code must be non-empty");
        anyhow::ensure!(
            code.chars().all(|c| c.is_ascii_alphanumeric()),
            "country code must be alphanumeric (got {code:?})"
        );
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub event_name: String,
    pub country: CountryCode,
    pub impact: Impact,
    pub scheduled_at: DateTime<Utc>,
    pub forecast: Option<f64>,
    pub previous: Option<f64>,
    /// Absent until the provider publishes the released value.
    pub actual: Option<f64>,
}

impl ScheduledEvent {
    /// Provider-independent identity: `{event_name}-{country}-{scheduled_at}`.
    pub fn identity(&self) -> String {
        format!(
            "{}-{}-{}",
            self.event_name.trim(),
            self.country,
            self.scheduled_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    pub fn is_released(&self) -> bool {
        self.actual.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreAlert,
    PostAnalysis,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreAlert => "pre_alert",
            Phase::PostAnalysis => "post_analysis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{phase}:{event identity}`; membership in the ledger is the only fact it carries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(phase: Phase, event: &ScheduledEvent) -> Self {
        Self(format!("{}:{}", phase, event.identity()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
