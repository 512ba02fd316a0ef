use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_path: Option<String>,
}

/// Outbound email delivery. Tests substitute a recording implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Delivers through an HTTP email API (JSON POST with bearer auth).
pub struct HttpMailer {
    endpoint: String,
    api_key: String,
    sender: String,
    client: Client,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: String, sender: String) -> Self {
        Self {
            endpoint,
            api_key,
            sender,
            client: Client::new(),
        }
    }
}

#[derive(Serialize)]
struct SendPayload<'a> {
    from: &'a str,
    to: &'a str,
    to_name: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let payload = SendPayload {
            from: &self.sender,
            to: &email.recipient_email,
            to_name: &email.recipient_name,
            subject: &email.subject,
            text: &email.body,
        };
        let res = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "email API error ({}): {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        Ok(())
    }
}
