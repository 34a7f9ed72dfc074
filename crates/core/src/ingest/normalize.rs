use crate::domain::event::{CountryCode, Impact, ScheduledEvent};
use crate::ingest::types::{FieldMap, ProviderProfile};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Maps a raw provider payload into canonical events, ordered by scheduled time.
///
/// A payload whose top-level shape does not match the profile is an error.
/// Individual entries that cannot be mapped are skipped.
pub fn normalize_payload(profile: &ProviderProfile, payload: &Value) -> Result<Vec<ScheduledEvent>> {
    let entries = match profile.list_key {
        Some(key) => payload
            .get(key)
            .with_context(|| format!("{} payload has no {key:?} key", profile.name))?,
        None => payload,
    };
    let Some(entries) = entries.as_array() else {
        bail!("{} payload entries are not a JSON array", profile.name);
    };

    let mut out: Vec<ScheduledEvent> = Vec::with_capacity(entries.len());
    let mut index_by_identity: HashMap<String, usize> = HashMap::new();
    let mut skipped: usize = 0;

    for entry in entries {
        let Some(event) = normalize_entry(profile, entry) else {
            skipped += 1;
            continue;
        };

        // Overlapping entries for the same release collapse into one; a
        // released value always wins over a pending one.
        let identity = event.identity();
        match index_by_identity.get(&identity) {
            Some(&idx) => {
                if event.actual.is_some() || out[idx].actual.is_none() {
                    out[idx] = event;
                }
            }
            None => {
                index_by_identity.insert(identity, out.len());
                out.push(event);
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(provider = profile.name, skipped, "skipped unmappable calendar entries");
    }

    out.sort_by_key(|e| e.scheduled_at);
    Ok(out)
}

fn normalize_entry(profile: &ProviderProfile, entry: &Value) -> Option<ScheduledEvent> {
    let fields: &FieldMap = &profile.fields;

    let event_name = text_field(entry, fields.event_name)?;
    let country = CountryCode::new(&text_field(entry, fields.country)?).ok()?;
    let impact = text_field(entry, fields.impact)?.parse::<Impact>().ok()?;
    let scheduled_at = parse_time(&text_field(entry, fields.time)?, profile.time_formats)?;

    Some(ScheduledEvent {
        event_name,
        country,
        impact,
        scheduled_at,
        forecast: number_field(entry, fields.forecast),
        previous: number_field(entry, fields.previous),
        actual: number_field(entry, fields.actual),
    })
}

fn first_present<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| entry.get(*k))
        .find(|v| !v.is_null())
}

fn text_field(entry: &Value, keys: &[&str]) -> Option<String> {
    let s = first_present(entry, keys)?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    Some(s.to_string())
}

/// `null`, absent and empty strings are "not published"; zero is a value.
pub fn number_field(entry: &Value, keys: &[&str]) -> Option<f64> {
    match first_present(entry, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%').trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    }
}

pub fn parse_time(s: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).trunc_subsecs(0));
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().trunc_subsecs(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FINNHUB, FMP};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn maps_finnhub_field_names() {
        let payload = json!({
            "economicCalendar": [
                {
                    "event": "CPI MoM",
                    "country": "US",
                    "impact": "high",
                    "time": "2026-10-15 12:30:00",
                    "estimate": 0.3,
                    "prev": 0.2,
                    "actual": null,
                    "unit": "%"
                }
            ]
        });

        let events = normalize_payload(&FINNHUB, &payload).unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.event_name, "CPI MoM");
        assert_eq!(e.impact, Impact::High);
        assert_eq!(e.scheduled_at, Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap());
        assert_eq!(e.forecast, Some(0.3));
        assert_eq!(e.previous, Some(0.2));
        assert_eq!(e.actual, None);
    }

    #[test]
    fn maps_fmp_field_names() {
        let payload = json!([
            {
                "event": "Unemployment Rate",
                "country": "gb",
                "impact": "Medium",
                "date": "2026-10-15 06:00:00",
                "estimate": "4.1",
                "previous": 4.2,
                "actual": 4.0
            }
        ]);

        let events = normalize_payload(&FMP, &payload).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].country.as_str(), "GB");
        assert_eq!(events[0].forecast, Some(4.1));
        assert_eq!(events[0].actual, Some(4.0));
    }

    #[test]
    fn zero_actual_is_not_pending() {
        let entry = json!({"actual": 0});
        assert_eq!(number_field(&entry, &["actual"]), Some(0.0));
        let entry = json!({"actual": null});
        assert_eq!(number_field(&entry, &["actual"]), None);
        let entry = json!({"actual": ""});
        assert_eq!(number_field(&entry, &["actual"]), None);
        let entry = json!({});
        assert_eq!(number_field(&entry, &["actual"]), None);
    }

    #[test]
    fn identity_is_provider_independent() {
        let finnhub = normalize_payload(
            &FINNHUB,
            &json!({"economicCalendar": [{
                "event": "CPI", "country": "US", "impact": "high",
                "time": "2026-10-15 12:30:00", "id": 991
            }]}),
        )
        .unwrap();
        let fmp = normalize_payload(
            &FMP,
            &json!([{
                "event": "CPI", "country": "US", "impact": "High",
                "date": "2026-10-15T12:30:00.000Z", "id": "abc"
            }]),
        )
        .unwrap();
        assert_eq!(finnhub[0].identity(), fmp[0].identity());
    }

    #[test]
    fn collapses_duplicates_preferring_released() {
        let payload = json!({"economicCalendar": [
            {"event": "CPI", "country": "US", "impact": "high", "time": "2026-10-15 12:30:00", "actual": 3.1},
            {"event": "CPI", "country": "US", "impact": "high", "time": "2026-10-15 12:30:00", "actual": null}
        ]});
        let events = normalize_payload(&FINNHUB, &payload).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actual, Some(3.1));
    }

    #[test]
    fn skips_unmappable_entries_and_sorts() {
        let payload = json!({"economicCalendar": [
            {"event": "GDP", "country": "JP", "impact": "low", "time": "2026-10-15 23:50:00"},
            {"event": "Holiday", "country": "US", "impact": "holiday", "time": "2026-10-15 00:00:00"},
            {"country": "US", "impact": "high", "time": "2026-10-15 12:00:00"},
            {"event": "PMI", "country": "DE", "impact": "medium", "time": "not a time"},
            {"event": "Retail Sales", "country": "US", "impact": "medium", "time": "2026-10-15 12:30:00"}
        ]});
        let events = normalize_payload(&FINNHUB, &payload).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["Retail Sales", "GDP"]);
    }

    #[test]
    fn rejects_wrong_top_level_shape() {
        assert!(normalize_payload(&FINNHUB, &json!([])).is_err());
        assert!(normalize_payload(&FINNHUB, &json!({"economicCalendar": {}})).is_err());
        assert!(normalize_payload(&FMP, &json!({"error": "limit"})).is_err());
    }
}
