use crate::config::TrackerConfig;
use crate::domain::analysis::EnrichmentRequest;
use crate::domain::event::{ActionId, Phase, ScheduledEvent};
use crate::ingest::provider::CalendarSource;
use crate::llm::EnrichmentClient;
use crate::notify::format::{error_message, post_analysis_message, pre_alert_message};
use crate::notify::Notifier;
use crate::storage::ledger::DedupLedger;
use crate::tracker::cache::{LoopState, ScheduleCache, SnapshotStatus};
use crate::tracker::window::WindowClassifier;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FailedAction {
    pub id: ActionId,
    pub error: String,
}

/// What one cycle observed and did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub state: LoopState,
    pub snapshot: SnapshotStatus,
    pub events: usize,
    pub dispatched: Vec<ActionId>,
    pub already_recorded: usize,
    pub failed: Vec<FailedAction>,
}

/// Single-threaded control loop: refresh-or-reuse the schedule, classify every
/// event, dispatch each due and unrecorded action, then sleep.
///
/// Delivery policy: an action is recorded only after its notification was
/// delivered. A failed enrichment or delivery stays unrecorded and is retried
/// on later cycles until its window closes.
pub struct PollLoop {
    config: Arc<TrackerConfig>,
    classifier: WindowClassifier,
    cache: ScheduleCache,
    ledger_path: PathBuf,
    source: Box<dyn CalendarSource>,
    enricher: Box<dyn EnrichmentClient>,
    notifier: Box<dyn Notifier>,
}

impl PollLoop {
    pub fn new(
        config: Arc<TrackerConfig>,
        cache: ScheduleCache,
        ledger_path: PathBuf,
        source: Box<dyn CalendarSource>,
        enricher: Box<dyn EnrichmentClient>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            classifier: WindowClassifier::new(config.clone()),
            config,
            cache,
            ledger_path,
            source,
            enricher,
            notifier,
        }
    }

    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        let mut ledger = DedupLedger::load(&self.ledger_path, now, self.config.ledger_retention);
        let current = self
            .cache
            .get_current(self.source.as_ref(), &self.classifier, now)
            .await?;

        let mut report = CycleReport {
            state: current.state,
            snapshot: current.status,
            events: current.snapshot.events.len(),
            dispatched: Vec::new(),
            already_recorded: 0,
            failed: Vec::new(),
        };

        for event in &current.snapshot.events {
            for phase in self.classifier.classify(event, now) {
                let id = ActionId::new(phase, event);
                if ledger.has(&id) {
                    report.already_recorded += 1;
                    continue;
                }

                match self.dispatch(phase, event, now).await {
                    Ok(()) => {
                        ledger.record(&id, event.scheduled_at, now)?;
                        tracing::info!(action_id = %id, %phase, "action dispatched");
                        report.dispatched.push(id);
                    }
                    Err(err) => {
                        let error = format!("{err:#}");
                        tracing::warn!(
                            action_id = %id,
                            %phase,
                            error = %error,
                            "action failed; left unrecorded for retry"
                        );
                        report.failed.push(FailedAction { id, error });
                    }
                }
            }
        }

        tracing::debug!(
            state = ?report.state,
            snapshot = ?report.snapshot,
            events = report.events,
            dispatched = report.dispatched.len(),
            already_recorded = report.already_recorded,
            failed = report.failed.len(),
            ledger_len = ledger.len(),
            "poll cycle complete"
        );
        Ok(report)
    }

    async fn dispatch(&self, phase: Phase, event: &ScheduledEvent, now: DateTime<Utc>) -> anyhow::Result<()> {
        match phase {
            Phase::PreAlert => self.notifier.send(&pre_alert_message(event, now)).await,
            Phase::PostAnalysis => {
                let request = EnrichmentRequest::from(event);
                let analysis = self.enricher.analyze(&request).await?;
                self.notifier
                    .send(&post_analysis_message(event, &analysis))
                    .await
            }
        }
    }

    /// Logs a failed cycle and tells the chat about it. Delivery of the error
    /// report itself is best-effort.
    pub async fn report_failure(&self, err: &anyhow::Error) {
        let detail = format!("{err:#}");
        tracing::error!(error = %detail, "poll cycle failed; backing off");
        if let Err(notify_err) = self.notifier.send(&error_message(&detail)).await {
            tracing::warn!(
                channel = self.notifier.channel(),
                error = %format!("{notify_err:#}"),
                "failed to deliver error report"
            );
        }
    }

    /// Runs cycles until `shutdown` resolves. A failed cycle never ends the
    /// loop; it is reported and followed by the longer error backoff.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            provider = self.source.provider_name(),
            enrichment = self.enricher.provider().as_str(),
            channel = self.notifier.channel(),
            poll_interval = ?self.config.poll_interval,
            "poll loop started"
        );

        tokio::pin!(shutdown);
        loop {
            let sleep_for = match self.run_cycle(Utc::now()).await {
                Ok(_) => self.config.poll_interval,
                Err(err) => {
                    self.report_failure(&err).await;
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested; poll loop stopping");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }
    }
}
