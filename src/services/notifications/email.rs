use anyhow::Context;
use async_trait::async_trait;

use super::EmailProvider;

/// Transactional email over a Resend-style HTTP API.
pub struct HttpEmailProvider {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl HttpEmailProvider {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .context("failed to send email")?
            .error_for_status()
            .context("email API returned error")?;

        Ok(())
    }
}
