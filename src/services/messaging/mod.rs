pub mod twilio;

use async_trait::async_trait;

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Used when no SMS credentials are configured. Messages only reach the log.
pub struct LogOnlyProvider;

#[async_trait]
impl MessagingProvider for LogOnlyProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to, body, "sms (not sent, messaging disabled)");
        Ok(())
    }
}
