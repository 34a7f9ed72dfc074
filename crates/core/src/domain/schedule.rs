use crate::domain::event::ScheduledEvent;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The cached calendar for one UTC date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub fetched_for_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub events: Vec<ScheduledEvent>,
}

impl ScheduleSnapshot {
    pub fn new(fetched_for_date: NaiveDate, fetched_at: DateTime<Utc>, events: Vec<ScheduledEvent>) -> Self {
        Self {
            fetched_for_date,
            fetched_at,
            events,
        }
    }

    pub fn is_for(&self, date: NaiveDate) -> bool {
        self.fetched_for_date == date
    }
}
