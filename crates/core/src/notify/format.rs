//! Telegram (legacy Markdown) message bodies.

use crate::domain::analysis::EventAnalysis;
use crate::domain::event::ScheduledEvent;
use crate::error::truncate;
use chrono::{DateTime, Utc};

pub fn pre_alert_message(event: &ScheduledEvent, now: DateTime<Utc>) -> String {
    let minutes_left = (event.scheduled_at - now).num_seconds().max(0) / 60;
    let eta = if minutes_left == 0 {
        "less than a minute".to_string()
    } else {
        format!("approximately {minutes_left} minute{}", plural(minutes_left))
    };

    let mut out = format!(
        "⚠️ *Heads-Up Alert!* ⚠️\n\n\
*Event:* {} ({})\n\
*Impact:* {}\n\
*Releasing in:* {eta} ({} UTC)",
        escape_markdown(&event.event_name),
        escape_markdown(event.country.as_str()),
        event.impact,
        event.scheduled_at.format("%H:%M"),
    );
    if event.forecast.is_some() || event.previous.is_some() {
        out.push_str(&format!(
            "\n*Forecast:* {} | *Previous:* {}",
            value(event.forecast),
            value(event.previous)
        ));
    }
    out
}

pub fn post_analysis_message(event: &ScheduledEvent, analysis: &EventAnalysis) -> String {
    format!(
        "📈 *New Economic Data: {} ({})*\n\n\
*Actual:* {} | *Forecast:* {} | *Previous:* {}\n\n\
*Summary:* {}\n\n\
*Analysis:* {}\n\n\
*Impact on Commodities:* {}\n\n\
*Gold Impact Score:* {}/10\n\
*Silver Impact Score:* {}/10",
        escape_markdown(&event.event_name),
        escape_markdown(event.country.as_str()),
        value(event.actual),
        value(event.forecast),
        value(event.previous),
        escape_markdown(&analysis.summary),
        escape_markdown(&analysis.analysis),
        escape_markdown(&analysis.impact_on_commodities),
        analysis.gold_impact_score,
        analysis.silver_impact_score,
    )
}

/// Keeps an escaped error report under Telegram's 4096-char message cap.
const ERROR_DETAIL_CHARS: usize = 1800;

pub fn error_message(error: &str) -> String {
    format!(
        "🚨 *Calendar Watch Error* 🚨\n\nA poll cycle failed and will be retried after a backoff:\n{}",
        escape_markdown(truncate(error, ERROR_DETAIL_CHARS))
    )
}

pub fn ping_message() -> String {
    "✅ Calendar watch connectivity test: the notifier is working.".to_string()
}

/// Escapes the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn value(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
