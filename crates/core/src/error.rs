use std::path::PathBuf;

/// Failure classes the poll loop reacts to differently. Collaborators attach
/// these as context so callers can `downcast_ref::<TrackerError>()`.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("calendar source unavailable (provider={provider})")]
    SourceUnavailable { provider: &'static str },

    #[error("enrichment failed (provider={provider})")]
    EnrichmentFailed { provider: &'static str },

    #[error("notification delivery failed (channel={channel})")]
    NotifyFailed { channel: &'static str },

    #[error("persisted state unreadable at {}: {detail}", path.display())]
    PersistenceCorrupt { path: PathBuf, detail: String },
}

/// Cuts `s` to at most `max` chars so response bodies stay short in error reports.
pub fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn is_source_unavailable(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TrackerError>(),
        Some(TrackerError::SourceUnavailable { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
