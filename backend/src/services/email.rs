use serde_json::json;

use crate::config::Config;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const APP_NAME: &str = "Fridge Friends";

/// Notification collaborator. Sends transactional email through the Resend
/// HTTP API. Failures are logged and swallowed: the operation that triggered
/// a mail must succeed whether or not the mail goes out.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    sender: String,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        if config.resend_api_key.is_none() {
            log::warn!("RESEND_API_KEY is unset; outgoing email is disabled");
        }

        Self {
            client: reqwest::Client::new(),
            api_key: config.resend_api_key.clone(),
            sender: config.sender_email.clone(),
        }
    }

    pub async fn send_verification_email(&self, to: &str, name: &str, link: &str) {
        let subject = format!("Verify your email for {}", APP_NAME);
        let html = format!(
            "<p>Hi {},</p>\
             <p>Thanks for signing up for {}! Please verify your email address \
             by opening this link:</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>This link will expire in 24 hours. If you didn't create an \
             account, you can safely ignore this email.</p>",
            name, APP_NAME
        );

        self.send(to, &subject, &html).await;
    }

    pub async fn send_password_reset_email(&self, to: &str, name: &str, link: &str) {
        let subject = format!("Reset your password for {}", APP_NAME);
        let html = format!(
            "<p>Hi {},</p>\
             <p>We received a request to reset your password. Open this link \
             to choose a new one:</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>This link will expire in 1 hour. If you didn't request a \
             reset, you can safely ignore this email.</p>",
            name
        );

        self.send(to, &subject, &html).await;
    }

    pub async fn send_invitation_email(
        &self,
        to: &str,
        inviter_name: &str,
        household_name: &str,
        link: &str,
    ) {
        let subject = format!(
            "You've been invited to join {} on {}",
            household_name, APP_NAME
        );
        let html = format!(
            "<p>Hi there,</p>\
             <p><strong>{}</strong> has invited you to join the household \
             <strong>\"{}\"</strong> on {}. {} helps you track meals and \
             nutrition for your household.</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>This invitation will expire in 7 days. If you don't know {}, \
             you can safely ignore this email.</p>",
            inviter_name, household_name, APP_NAME, APP_NAME, inviter_name
        );

        self.send(to, &subject, &html).await;
    }

    async fn send(&self, to: &str, subject: &str, html: &str) {
        let Some(api_key) = &self.api_key else {
            log::info!("Email disabled; skipping '{}' to {}", subject, to);
            return;
        };

        let body = json!({
            "from": format!("{} <{}>", APP_NAME, self.sender),
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let result = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => log::debug!("Sent '{}' to {}", subject, to),
            Err(e) => log::error!("Failed to send '{}' to {}: {}", subject, to, e),
        }
    }
}
