use anyhow::Context;
use async_trait::async_trait;

use super::MessagingProvider;
use crate::config::AppConfig;

/// Booking notifications over Twilio's Messages API.
pub struct TwilioSmsProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioSmsProvider {
    /// `None` unless the account, token and sender number are all set.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if !config.messaging_configured() {
            return None;
        }
        Some(Self {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }

    fn form<'a>(&'a self, to: &'a str, body: &'a str) -> [(&'static str, &'a str); 3] {
        [("To", to), ("From", &self.from_number), ("Body", body)]
    }
}

#[async_trait]
impl MessagingProvider for TwilioSmsProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&self.form(to, body))
            .send()
            .await
            .with_context(|| format!("failed to reach Twilio for sms to {to}"))?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            anyhow::bail!("Twilio rejected sms to {to}: {status} {detail}");
        }

        tracing::debug!(to, "booking sms sent");
        Ok(())
    }
}
