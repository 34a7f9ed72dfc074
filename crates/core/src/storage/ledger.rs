use crate::domain::event::ActionId;
use crate::storage::{read_json, write_json_atomic};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    /// action id -> scheduled time of the event it belongs to.
    actions: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Current(LedgerFile),
    /// Bare array of ids without timestamps.
    Legacy(Vec<String>),
}

/// Durable set of fired actions. Single writer; every `record` rewrites the
/// whole document.
#[derive(Debug, Clone)]
pub struct DedupLedger {
    path: PathBuf,
    retention: Duration,
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl DedupLedger {
    /// Loads the ledger, dropping entries older than the retention window.
    /// An unreadable file yields an empty ledger: currently-due actions fire
    /// again rather than never.
    pub fn load(path: &Path, now: DateTime<Utc>, retention: Duration) -> Self {
        let entries = match read_entries(path, now) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "dedup ledger unreadable; starting empty"
                );
                BTreeMap::new()
            }
        };

        let mut ledger = Self {
            path: path.to_path_buf(),
            retention,
            entries,
        };
        let pruned = ledger.prune(now);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned expired dedup ledger entries");
        }
        ledger
    }

    pub fn has(&self, id: &ActionId) -> bool {
        self.entries.contains_key(id.as_str())
    }

    /// Marks `id` as fired and persists the merged set before returning.
    pub fn record(
        &mut self,
        id: &ActionId,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.entries.insert(id.as_str().to_string(), scheduled_at);

        // Merge whatever is on disk so a write never drops ids recorded
        // outside this in-memory copy.
        match read_entries(&self.path, now) {
            Ok(on_disk) => {
                for (k, v) in on_disk {
                    self.entries.entry(k).or_insert(v);
                }
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "overwriting unreadable dedup ledger"
                );
            }
        }
        self.prune(now);

        let file = LedgerFile {
            actions: self.entries.clone(),
        };
        write_json_atomic(&self.path, &file)
    }

    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.entries.len();
        self.entries.retain(|_, scheduled_at| *scheduled_at >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_entries(path: &Path, now: DateTime<Utc>) -> anyhow::Result<BTreeMap<String, DateTime<Utc>>> {
    Ok(match read_json::<StoredLedger>(path)? {
        None => BTreeMap::new(),
        Some(StoredLedger::Current(file)) => file.actions,
        Some(StoredLedger::Legacy(ids)) => ids.into_iter().map(|id| (id, now)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{CountryCode, Impact, Phase, ScheduledEvent};
    use chrono::TimeZone;
    use std::fs;

    fn event(name: &str, at: DateTime<Utc>) -> ScheduledEvent {
        ScheduledEvent {
            event_name: name.to_string(),
            country: CountryCode::new("US").unwrap(),
            impact: Impact::High,
            scheduled_at: at,
            forecast: None,
            previous: None,
            actual: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 0).unwrap()
    }

    #[test]
    fn record_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_events.json");
        let cpi = event("CPI", t0());
        let id = ActionId::new(Phase::PreAlert, &cpi);

        let mut ledger = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(!ledger.has(&id));
        ledger.record(&id, cpi.scheduled_at, t0()).unwrap();

        let reloaded = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(reloaded.has(&id));
        assert!(!reloaded.has(&ActionId::new(Phase::PostAnalysis, &cpi)));
    }

    #[test]
    fn record_merges_ids_written_by_another_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_events.json");
        let a = event("CPI", t0());
        let b = event("NFP", t0());
        let id_a = ActionId::new(Phase::PreAlert, &a);
        let id_b = ActionId::new(Phase::PreAlert, &b);

        let mut first = DedupLedger::load(&path, t0(), Duration::hours(48));
        let mut second = DedupLedger::load(&path, t0(), Duration::hours(48));
        first.record(&id_a, t0(), t0()).unwrap();
        second.record(&id_b, t0(), t0()).unwrap();

        let reloaded = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(reloaded.has(&id_a));
        assert!(reloaded.has(&id_b));
    }

    #[test]
    fn corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_events.json");
        fs::write(&path, "\u{0}\u{1}garbage").unwrap();

        let mut ledger = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(ledger.is_empty());

        let id = ActionId::new(Phase::PreAlert, &event("CPI", t0()));
        ledger.record(&id, t0(), t0()).unwrap();
        assert!(DedupLedger::load(&path, t0(), Duration::hours(48)).has(&id));
    }

    #[test]
    fn prunes_entries_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_events.json");
        let old = event("Old", t0() - Duration::hours(49));
        let recent = event("Recent", t0() - Duration::hours(47));
        let old_id = ActionId::new(Phase::PreAlert, &old);
        let recent_id = ActionId::new(Phase::PreAlert, &recent);

        let mut ledger = DedupLedger::load(&path, old.scheduled_at, Duration::hours(48));
        ledger.record(&old_id, old.scheduled_at, old.scheduled_at).unwrap();
        ledger.record(&recent_id, recent.scheduled_at, recent.scheduled_at).unwrap();

        let reloaded = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(!reloaded.has(&old_id));
        assert!(reloaded.has(&recent_id));
    }

    #[test]
    fn accepts_legacy_id_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_events.json");
        let id = ActionId::new(Phase::PreAlert, &event("CPI", t0()));
        fs::write(&path, serde_json::to_string(&vec![id.as_str()]).unwrap()).unwrap();

        let ledger = DedupLedger::load(&path, t0(), Duration::hours(48));
        assert!(ledger.has(&id));
    }
}
