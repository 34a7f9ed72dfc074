use crate::domain::schedule::ScheduleSnapshot;
use crate::storage::{read_json, write_json_atomic};
use std::path::Path;

/// Loads the last persisted snapshot; unreadable state is logged and ignored.
pub fn load_snapshot(path: &Path) -> Option<ScheduleSnapshot> {
    match read_json::<ScheduleSnapshot>(path) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "schedule snapshot unreadable; ignoring");
            None
        }
    }
}

pub fn save_snapshot(path: &Path, snapshot: &ScheduleSnapshot) -> anyhow::Result<()> {
    write_json_atomic(path, snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{CountryCode, Impact, ScheduledEvent};
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule_snapshot.json");
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap();
        let snapshot = ScheduleSnapshot::new(
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
            at,
            vec![ScheduledEvent {
                event_name: "CPI".to_string(),
                country: CountryCode::new("US").unwrap(),
                impact: Impact::High,
                scheduled_at: at,
                forecast: Some(3.0),
                previous: None,
                actual: Some(0.0),
            }],
        );

        save_snapshot(&path, &snapshot).unwrap();
        assert_eq!(load_snapshot(&path), Some(snapshot));
    }

    #[test]
    fn corrupt_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule_snapshot.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert_eq!(load_snapshot(&path), None);
    }
}
