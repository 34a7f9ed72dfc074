use crate::domain::schedule::ScheduleSnapshot;
use crate::ingest::provider::CalendarSource;
use crate::storage::snapshot::{load_snapshot, save_snapshot};
use crate::tracker::window::WindowClassifier;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No tracked event is inside its active window.
    Dormant,
    /// At least one tracked event is inside its active window.
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Fetched during this cycle.
    Fresh,
    /// No refresh was due.
    Reused,
    /// A refresh was due but failed; the last good snapshot is served and its
    /// release values may be behind the provider.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CurrentSchedule {
    pub snapshot: ScheduleSnapshot,
    pub status: SnapshotStatus,
    pub state: LoopState,
}

/// Owns the current snapshot. Refreshes once per UTC day, and on every cycle
/// while any tracked event is inside its active window.
#[derive(Debug, Default)]
pub struct ScheduleCache {
    snapshot: Option<ScheduleSnapshot>,
    path: Option<PathBuf>,
}

impl ScheduleCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn persistent(path: &Path) -> Self {
        let snapshot = load_snapshot(path);
        if let Some(s) = &snapshot {
            tracing::info!(
                fetched_for_date = %s.fetched_for_date,
                events = s.events.len(),
                "loaded persisted schedule snapshot"
            );
        }
        Self {
            snapshot,
            path: Some(path.to_path_buf()),
        }
    }

    pub fn state(&self, classifier: &WindowClassifier, now: DateTime<Utc>) -> LoopState {
        let active = self
            .snapshot
            .as_ref()
            .map(|s| s.events.iter().any(|e| classifier.in_active_window(e, now)))
            .unwrap_or(false);
        if active {
            LoopState::Active
        } else {
            LoopState::Dormant
        }
    }

    pub async fn get_current(
        &mut self,
        source: &dyn CalendarSource,
        classifier: &WindowClassifier,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CurrentSchedule> {
        let today = now.date_naive();
        let daily_due = !matches!(&self.snapshot, Some(s) if s.is_for(today));
        let burst_due = self.state(classifier, now) == LoopState::Active;

        let status = if daily_due || burst_due {
            let reason = if daily_due { "daily" } else { "burst" };
            match source.fetch(today).await {
                Ok(events) => {
                    tracing::debug!(reason, %today, events = events.len(), "schedule refreshed");
                    self.replace(ScheduleSnapshot::new(today, now, events));
                    SnapshotStatus::Fresh
                }
                Err(err) if self.snapshot.is_some() => {
                    tracing::warn!(
                        reason,
                        provider = source.provider_name(),
                        error = %format!("{err:#}"),
                        "schedule refresh failed; serving last good snapshot"
                    );
                    SnapshotStatus::Stale
                }
                Err(err) => {
                    return Err(err.context("no cached schedule to fall back on"));
                }
            }
        } else {
            SnapshotStatus::Reused
        };

        let state = self.state(classifier, now);
        let snapshot = self
            .snapshot
            .clone()
            .context("schedule snapshot missing after refresh")?;

        Ok(CurrentSchedule {
            snapshot,
            status,
            state,
        })
    }

    fn replace(&mut self, snapshot: ScheduleSnapshot) {
        if let Some(path) = &self.path {
            if let Err(err) = save_snapshot(path, &snapshot) {
                tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "failed to persist schedule snapshot");
            }
        }
        self.snapshot = Some(snapshot);
    }
}
