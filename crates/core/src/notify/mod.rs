pub mod format;
pub mod telegram;

/// Delivers a formatted text message to the fixed destination.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;

    async fn send(&self, text: &str) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn send(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(target: "notify", message = %text, "notification (dry-run)");
        Ok(())
    }
}
