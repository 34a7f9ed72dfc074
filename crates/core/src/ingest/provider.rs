use crate::config::Settings;
use crate::domain::event::ScheduledEvent;
use crate::error::{truncate, TrackerError};
use crate::ingest::normalize::normalize_payload;
use crate::ingest::types::{profile_by_name, ProviderProfile};
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[async_trait::async_trait]
pub trait CalendarSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Events scheduled around `date` (UTC): at least that day, plus whatever
    /// neighbouring days the source covers. Fails with
    /// [`TrackerError::SourceUnavailable`] in the error chain.
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<ScheduledEvent>>;
}

#[derive(Debug, Clone)]
pub struct HttpCalendarSource {
    http: reqwest::Client,
    profile: ProviderProfile,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpCalendarSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let profile = profile_by_name(&settings.calendar_provider).with_context(|| {
            format!(
                "unsupported CALENDAR_PROVIDER {:?} (expected finnhub or fmp)",
                settings.calendar_provider
            )
        })?;
        let api_key = match profile.name {
            "fmp" => settings.require_fmp_api_key()?,
            _ => settings.require_finnhub_api_key()?,
        }
        .to_string();

        let base_url = std::env::var("CALENDAR_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| profile.base_url.to_string());

        let timeout_secs = std::env::var("CALENDAR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(
            profile,
            base_url,
            api_key,
            Duration::from_secs(timeout_secs),
            RetryPolicy::from_env("CALENDAR"),
        )
    }

    pub fn new(
        profile: ProviderProfile,
        base_url: String,
        api_key: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build calendar http client")?;

        Ok(Self {
            http,
            profile,
            base_url,
            api_key,
            retry,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.profile.path)
    }

    async fn fetch_once(&self, date: NaiveDate) -> Result<Vec<ScheduledEvent>> {
        let (from, to) = query_range(date);
        let res = self
            .http
            .get(self.url())
            .query(&[
                (self.profile.api_key_param, self.api_key.as_str()),
                (self.profile.from_param, from.as_str()),
                (self.profile.to_param, to.as_str()),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("calendar request failed: {}", e.without_url()))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read calendar response: {}", e.without_url()))?;

        if !status.is_success() {
            anyhow::bail!("calendar HTTP {status}: {}", truncate(&text, 300));
        }

        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("calendar response is not valid JSON: {}", truncate(&text, 300)))?;
        normalize_payload(&self.profile, &raw_json)
    }
}

#[async_trait::async_trait]
impl CalendarSource for HttpCalendarSource {
    fn provider_name(&self) -> &'static str {
        self.profile.name
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<ScheduledEvent>> {
        let events = self
            .retry
            .run("calendar_fetch", || self.fetch_once(date))
            .await
            .context(TrackerError::SourceUnavailable {
                provider: self.profile.name,
            })?;

        tracing::debug!(provider = self.profile.name, %date, events = events.len(), "calendar fetched");
        Ok(events)
    }
}

/// `date` padded by a day on each side, so events just past midnight are
/// known before it and events just before it survive the rollover refresh.
fn query_range(date: NaiveDate) -> (String, String) {
    let from = date.pred_opt().unwrap_or(date);
    let to = date.succ_opt().unwrap_or(date);
    (
        from.format("%Y-%m-%d").to_string(),
        to.format("%Y-%m-%d").to_string(),
    )
}
