//! `SendGrid` email and Twilio SMS delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Address, EmailMessage, Notifier, NotifyError, SmsMessage};

/// Notifier backed by the `SendGrid` v3 and Twilio REST APIs.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    sendgrid_api_key: String,
    sendgrid_base: String,
    twilio_base: String,
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: MailAddress<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [MailAddress<'a>; 1],
}

#[derive(Debug, Serialize)]
struct MailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
}

impl<'a> From<&'a Address> for MailAddress<'a> {
    fn from(address: &'a Address) -> Self {
        Self {
            email: &address.email,
            name: &address.name,
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

impl HttpNotifier {
    /// Create a notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        sendgrid_api_key: impl Into<String>,
        sendgrid_base: impl Into<String>,
        twilio_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            sendgrid_api_key: sendgrid_api_key.into(),
            sendgrid_base: sendgrid_base.into().trim_end_matches('/').to_string(),
            twilio_base: twilio_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn check(
        service: &'static str,
        response: reqwest::Response,
    ) -> Result<(), NotifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            service,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let body = MailSend {
            personalizations: [Personalization {
                to: [(&message.to).into()],
            }],
            from: (&message.from).into(),
            subject: &message.subject,
            content: [Content {
                content_type: "text/html",
                value: &message.html,
            }],
        };

        tracing::debug!(to = %message.to.email, subject = %message.subject, "Sending email");

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.sendgrid_base))
            .bearer_auth(&self.sendgrid_api_key)
            .json(&body)
            .send()
            .await?;

        Self::check("sendgrid", response).await
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        let credentials = &message.credentials;
        let form = [
            ("To", message.to.as_str()),
            ("From", credentials.from_number.as_str()),
            ("Body", message.body.as_str()),
        ];

        tracing::debug!(to = %message.to, "Sending SMS");

        let response = self
            .client
            .post(format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.twilio_base, credentials.account_sid
            ))
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&form)
            .send()
            .await?;

        Self::check("twilio", response).await
    }
}
