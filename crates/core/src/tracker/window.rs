use crate::config::TrackerConfig;
use crate::domain::event::{Phase, ScheduledEvent};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Decides which phases of an event are due at a given instant.
///
/// Windows, relative to the scheduled time `T`:
/// - pre-alert: `0 < T - now <= pre_alert`
/// - post-analysis: `0 <= now - T < post_window`, and only once `actual` is known
///
/// The open/closed ends differ on purpose so an instant on a window edge
/// belongs to exactly one poll cycle.
#[derive(Debug, Clone)]
pub struct WindowClassifier {
    config: Arc<TrackerConfig>,
}

impl WindowClassifier {
    pub fn new(config: Arc<TrackerConfig>) -> Self {
        Self { config }
    }

    pub fn classify(&self, event: &ScheduledEvent, now: DateTime<Utc>) -> BTreeSet<Phase> {
        let mut due = BTreeSet::new();
        if !self.config.accepts(event.impact, &event.country) {
            return due;
        }

        let time_to_event = event.scheduled_at - now;
        if time_to_event > Duration::zero() && time_to_event <= self.config.pre_alert {
            due.insert(Phase::PreAlert);
        }

        let since_release = now - event.scheduled_at;
        if event.is_released()
            && since_release >= Duration::zero()
            && since_release < self.config.post_window
        {
            due.insert(Phase::PostAnalysis);
        }

        due
    }

    /// True while `now` lies in `[T - pre_alert, T + post_window]` for an event
    /// that passes the filters. Drives burst refreshes.
    pub fn in_active_window(&self, event: &ScheduledEvent, now: DateTime<Utc>) -> bool {
        if !self.config.accepts(event.impact, &event.country) {
            return false;
        }
        let offset = now - event.scheduled_at;
        offset >= -self.config.pre_alert && offset <= self.config.post_window
    }
}
