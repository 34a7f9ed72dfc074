use anyhow::Context;
use calwatch_core::config::{Settings, TrackerConfig};
use calwatch_core::ingest::provider::HttpCalendarSource;
use calwatch_core::notify::telegram::TelegramNotifier;
use calwatch_core::notify::{LogNotifier, Notifier};
use calwatch_core::tracker::{PollLoop, ScheduleCache};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "calwatch_worker")]
struct Args {
    /// Run a single poll cycle and exit.
    #[arg(long)]
    once: bool,

    /// Log notifications instead of sending them.
    #[arg(long)]
    dry_run: bool,

    /// Send a connectivity test message through the notifier and exit.
    #[arg(long)]
    ping: bool,

    /// Directory for the dedup ledger and schedule snapshot. Overrides CALWATCH_STATE_DIR.
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(dir) = args.state_dir {
        settings.state_dir = dir;
    }

    let notifier: Box<dyn Notifier> = if args.dry_run {
        Box::new(LogNotifier)
    } else {
        Box::new(TelegramNotifier::from_settings(&settings)?)
    };

    if args.ping {
        notifier
            .send(&calwatch_core::notify::format::ping_message())
            .await
            .context("ping failed")?;
        tracing::info!(channel = notifier.channel(), "ping delivered");
        return Ok(());
    }

    let config = Arc::new(TrackerConfig::from_env()?);
    let source = HttpCalendarSource::from_settings(&settings)?;
    let enricher = calwatch_core::llm::client_from_settings(&settings)?;

    tracing::info!(
        state_dir = %settings.state_dir.display(),
        impacts = ?config.impact_filter,
        countries = config.country_filter.len(),
        pre_alert_minutes = config.pre_alert.num_minutes(),
        post_window_minutes = config.post_window.num_minutes(),
        dry_run = args.dry_run,
        "calwatch worker starting"
    );

    let mut poll = PollLoop::new(
        config,
        ScheduleCache::persistent(&settings.snapshot_path()),
        settings.ledger_path(),
        Box::new(source),
        enricher,
        notifier,
    );

    if args.once {
        return match poll.run_cycle(chrono::Utc::now()).await {
            Ok(report) => {
                tracing::info!(
                    state = ?report.state,
                    snapshot = ?report.snapshot,
                    events = report.events,
                    dispatched = report.dispatched.len(),
                    failed = report.failed.len(),
                    "single cycle complete"
                );
                Ok(())
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                poll.report_failure(&err).await;
                Err(err)
            }
        };
    }

    poll.run(shutdown_signal()).await;
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
