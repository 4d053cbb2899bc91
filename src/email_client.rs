use async_trait::async_trait;
use serde::Serialize;

use crate::configuration::EmailClientSettings;
use crate::user::UserId;
use crate::validators::is_valid_email;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid e-mail address: {0}")]
    InvalidAddress(String),

    #[error("failed to send email: {0}")]
    SendFailed(String),

    #[error("email service returned error: {0}")]
    ServiceError(String),
}

/// Outbound delivery of verification links
#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_verification(
        &self,
        recipient: &str,
        user_id: UserId,
        token: &str,
    ) -> Result<(), EmailError>;
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, EmailError> {
        let email = is_valid_email(&s).map_err(|e| EmailError::InvalidAddress(e.to_string()))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "Html")]
    html: &'a str,
    #[serde(rename = "Text")]
    text: &'a str,
}

/// HTTP e-mail API client
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
    /// Public URL of this service, used to build links
    app_base_url: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SenderEmail,
        app_base_url: String,
        timeout: std::time::Duration,
    ) -> Result<Self, EmailError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            sender,
            app_base_url,
        })
    }

    pub fn from_settings(settings: &EmailClientSettings, app_base_url: &str) -> Result<Self, EmailError> {
        let sender = SenderEmail::parse(settings.sender_email.clone())?;
        Self::new(
            settings.base_url.clone(),
            sender,
            app_base_url.to_string(),
            settings.timeout(),
        )
    }

    pub fn verification_link(&self, user_id: UserId, token: &str) -> String {
        verification_link(&self.app_base_url, user_id, token)
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            html: html_content,
            text: text_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send email");
                EmailError::SendFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!(error = %e, "Email service returned error");
                EmailError::ServiceError(e.to_string())
            })?;

        Ok(())
    }
}

#[async_trait]
impl VerificationMailer for EmailClient {
    async fn send_verification(
        &self,
        recipient: &str,
        user_id: UserId,
        token: &str,
    ) -> Result<(), EmailError> {
        let link = self.verification_link(user_id, token);
        let html = format!(
            "<p>Welcome!</p><p>Click <a href=\"{}\">here</a> to verify your e-mail address.</p>",
            link
        );
        let text = format!("Welcome!\nVisit {} to verify your e-mail address.", link);

        self.send_email(recipient, "Verify your e-mail address", &html, &text)
            .await
    }
}

/// Link the user follows to hit `GET /v1/users/{id}/verify`
pub fn verification_link(app_base_url: &str, user_id: UserId, token: &str) -> String {
    format!(
        "{}/v1/users/{}/verify?token={}",
        app_base_url.trim_end_matches('/'),
        user_id,
        token
    )
}
