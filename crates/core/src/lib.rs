pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod notify;
pub mod retry;
pub mod storage;
pub mod tracker;

pub mod config {
    use crate::domain::event::{CountryCode, Impact};
    use anyhow::Context;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_STATE_DIR: &str = "./state";
    const DEFAULT_IMPACTS: &str = "low,medium,high";
    const DEFAULT_COUNTRIES: &str = "US,EZ,CN,GB,JP,DE,FR,AU,CA,CH,IN";
    const DEFAULT_PRE_ALERT_MINUTES: i64 = 5;
    const DEFAULT_POST_WINDOW_MINUTES: i64 = 2;
    const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
    const DEFAULT_ERROR_BACKOFF_SECS: u64 = 300;
    const DEFAULT_LEDGER_RETENTION_HOURS: i64 = 48;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub finnhub_api_key: Option<String>,
        pub fmp_api_key: Option<String>,
        pub gemini_api_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub telegram_bot_token: Option<String>,
        pub telegram_chat_id: Option<String>,
        pub sentry_dsn: Option<String>,
        pub state_dir: PathBuf,
        pub calendar_provider: String,
        pub enrichment_provider: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                finnhub_api_key: non_empty_var("FINNHUB_API_KEY"),
                fmp_api_key: non_empty_var("FMP_API_KEY"),
                gemini_api_key: non_empty_var("GEMINI_API_KEY"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                state_dir: non_empty_var("CALWATCH_STATE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
                calendar_provider: non_empty_var("CALENDAR_PROVIDER")
                    .unwrap_or_else(|| "finnhub".to_string())
                    .to_ascii_lowercase(),
                enrichment_provider: non_empty_var("ENRICHMENT_PROVIDER")
                    .unwrap_or_else(|| "gemini".to_string())
                    .to_ascii_lowercase(),
            })
        }

        pub fn require_finnhub_api_key(&self) -> anyhow::Result<&str> {
            self.finnhub_api_key
                .as_deref()
                .context("FINNHUB_API_KEY is required")
        }

        pub fn require_fmp_api_key(&self) -> anyhow::Result<&str> {
            self.fmp_api_key.as_deref().context("FMP_API_KEY is required")
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_telegram_bot_token(&self) -> anyhow::Result<&str> {
            self.telegram_bot_token
                .as_deref()
                .context("TELEGRAM_BOT_TOKEN is required")
        }

        pub fn require_telegram_chat_id(&self) -> anyhow::Result<&str> {
            self.telegram_chat_id
                .as_deref()
                .context("TELEGRAM_CHAT_ID is required")
        }

        pub fn ledger_path(&self) -> PathBuf {
            self.state_dir.join("processed_events.json")
        }

        pub fn snapshot_path(&self) -> PathBuf {
            self.state_dir.join("schedule_snapshot.json")
        }
    }

    /// Static tracking behavior. Built once at startup and shared read-only by
    /// the classifier and the poll loop.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TrackerConfig {
        pub impact_filter: BTreeSet<Impact>,
        pub country_filter: BTreeSet<CountryCode>,
        pub pre_alert: chrono::Duration,
        pub post_window: chrono::Duration,
        pub poll_interval: Duration,
        pub error_backoff: Duration,
        pub ledger_retention: chrono::Duration,
    }

    impl Default for TrackerConfig {
        fn default() -> Self {
            Self {
                impact_filter: [Impact::Low, Impact::Medium, Impact::High]
                    .into_iter()
                    .collect(),
                country_filter: DEFAULT_COUNTRIES
                    .split(',')
                    .filter_map(|c| CountryCode::new(c).ok())
                    .collect(),
                pre_alert: chrono::Duration::minutes(DEFAULT_PRE_ALERT_MINUTES),
                post_window: chrono::Duration::minutes(DEFAULT_POST_WINDOW_MINUTES),
                poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
                error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
                ledger_retention: chrono::Duration::hours(DEFAULT_LEDGER_RETENTION_HOURS),
            }
        }
    }

    impl TrackerConfig {
        pub fn from_env() -> anyhow::Result<Self> {
            let impact_filter = parse_impacts(
                &non_empty_var("IMPACT_FILTER").unwrap_or_else(|| DEFAULT_IMPACTS.to_string()),
            )?;
            let country_filter = parse_countries(
                &non_empty_var("COUNTRY_FILTER").unwrap_or_else(|| DEFAULT_COUNTRIES.to_string()),
            )?;

            let pre_alert_minutes = parse_var("PRE_ALERT_MINUTES", DEFAULT_PRE_ALERT_MINUTES)?;
            let post_window_minutes =
                parse_var("POST_WINDOW_MINUTES", DEFAULT_POST_WINDOW_MINUTES)?;
            let poll_interval_secs = parse_var("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
            let error_backoff_secs = parse_var("ERROR_BACKOFF_SECS", DEFAULT_ERROR_BACKOFF_SECS)?;
            let retention_hours =
                parse_var("LEDGER_RETENTION_HOURS", DEFAULT_LEDGER_RETENTION_HOURS)?;

            let config = Self {
                impact_filter,
                country_filter,
                pre_alert: minutes_setting("PRE_ALERT_MINUTES", pre_alert_minutes)?,
                post_window: minutes_setting("POST_WINDOW_MINUTES", post_window_minutes)?,
                poll_interval: Duration::from_secs(poll_interval_secs),
                error_backoff: Duration::from_secs(error_backoff_secs),
                ledger_retention: hours_setting("LEDGER_RETENTION_HOURS", retention_hours)?,
            };
            config.validate()?;
            Ok(config)
        }

        pub fn validate(&self) -> anyhow::Result<()> {
            anyhow::ensure!(!self.impact_filter.is_empty(), "IMPACT_FILTER must be non-empty");
            anyhow::ensure!(!self.country_filter.is_empty(), "COUNTRY_FILTER must be non-empty");
            anyhow::ensure!(
                self.pre_alert > chrono::Duration::zero(),
                "PRE_ALERT_MINUTES must be > 0"
            );
            anyhow::ensure!(
                self.post_window > chrono::Duration::zero(),
                "POST_WINDOW_MINUTES must be > 0"
            );
            anyhow::ensure!(!self.poll_interval.is_zero(), "POLL_INTERVAL_SECS must be > 0");
            anyhow::ensure!(!self.error_backoff.is_zero(), "ERROR_BACKOFF_SECS must be > 0");
            anyhow::ensure!(
                self.ledger_retention <= chrono::Duration::days(MAX_SETTING_DAYS),
                "LEDGER_RETENTION_HOURS must be at most {} days",
                MAX_SETTING_DAYS
            );
            let windows = self
                .pre_alert
                .checked_add(&self.post_window)
                .context("PRE_ALERT_MINUTES + POST_WINDOW_MINUTES is out of range")?;
            anyhow::ensure!(
                self.ledger_retention > windows,
                "LEDGER_RETENTION_HOURS must exceed the combined pre-alert and post-release windows"
            );
            Ok(())
        }

        pub fn accepts(&self, impact: Impact, country: &CountryCode) -> bool {
            self.impact_filter.contains(&impact) && self.country_filter.contains(country)
        }
    }

    pub fn parse_impacts(s: &str) -> anyhow::Result<BTreeSet<Impact>> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<Impact>())
            .collect::<anyhow::Result<BTreeSet<_>>>()
            .context("invalid IMPACT_FILTER")
    }

    pub fn parse_countries(s: &str) -> anyhow::Result<BTreeSet<CountryCode>> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(CountryCode::new)
            .collect::<anyhow::Result<BTreeSet<_>>>()
            .context("invalid COUNTRY_FILTER")
    }

    /// Upper bound on any configured span, so date arithmetic on it stays in range.
    const MAX_SETTING_DAYS: i64 = 3650;

    fn minutes_setting(key: &str, minutes: i64) -> anyhow::Result<chrono::Duration> {
        chrono::Duration::try_minutes(minutes)
            .filter(|d| *d <= chrono::Duration::days(MAX_SETTING_DAYS))
            .with_context(|| format!("{key} is out of range (got {minutes})"))
    }

    fn hours_setting(key: &str, hours: i64) -> anyhow::Result<chrono::Duration> {
        chrono::Duration::try_hours(hours)
            .filter(|d| *d <= chrono::Duration::days(MAX_SETTING_DAYS))
            .with_context(|| format!("{key} is out of range (got {hours})"))
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match non_empty_var(key) {
            None => Ok(default),
            Some(s) => s
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} must be a number (got {s:?}): {e}")),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn default_config_is_valid() {
            let config = TrackerConfig::default();
            config.validate().unwrap();
            assert_eq!(config.country_filter.len(), 11);
            assert_eq!(config.pre_alert, chrono::Duration::minutes(5));
        }

        #[test]
        fn parses_filters() {
            let impacts = parse_impacts("high, Medium").unwrap();
            assert_eq!(impacts.len(), 2);
            assert!(parse_impacts("high,extreme").is_err());

            let countries = parse_countries("us,gb,,").unwrap();
            assert!(countries.contains(&CountryCode::new("US").unwrap()));
            assert_eq!(countries.len(), 2);
        }

        #[test]
        fn rejects_retention_shorter_than_windows() {
            let config = TrackerConfig {
                ledger_retention: chrono::Duration::minutes(3),
                ..TrackerConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn out_of_range_spans_are_errors() {
            let err = minutes_setting("PRE_ALERT_MINUTES", 99_999_999_999_999).unwrap_err();
            assert!(err.to_string().contains("PRE_ALERT_MINUTES"));
            assert!(minutes_setting("POST_WINDOW_MINUTES", i64::MIN).is_err());
            assert!(hours_setting("LEDGER_RETENTION_HOURS", 10_000_000).is_err());
            assert_eq!(
                hours_setting("LEDGER_RETENTION_HOURS", 48).unwrap(),
                chrono::Duration::hours(48)
            );

            let config = TrackerConfig {
                ledger_retention: chrono::Duration::days(MAX_SETTING_DAYS + 1),
                ..TrackerConfig::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn filter_requires_both_impact_and_country() {
            let config = TrackerConfig {
                impact_filter: [Impact::High].into_iter().collect(),
                ..TrackerConfig::default()
            };
            let us = CountryCode::new("US").unwrap();
            let br = CountryCode::new("BR").unwrap();
            assert!(config.accepts(Impact::High, &us));
            assert!(!config.accepts(Impact::Low, &us));
            assert!(!config.accepts(Impact::High, &br));
        }
    }
}
