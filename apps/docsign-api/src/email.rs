//! Outgoing email through the Resend HTTP API

use async_trait::async_trait;
use docsign_core::{CompletionError, CompletionNotice, Notifier};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email transport error: {0}")]
    Transport(String),

    #[error("email rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One rendered message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

impl Mailer {
    pub fn new(api_key: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send(&self, email: &Email) -> Result<(), MailError> {
        let Some(api_key) = &self.api_key else {
            info!(to = ?email.to, subject = %email.subject, "email disabled, not sending");
            return Ok(());
        };

        let body = serde_json::json!({
            "from": self.from,
            "to": email.to,
            "subject": email.subject,
            "html": email.html,
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(to = ?email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for Mailer {
    async fn send_completion(&self, notice: &CompletionNotice) -> Result<(), CompletionError> {
        let email = completion_email(notice);
        self.send(&email).await.map_err(|e| {
            warn!(envelope_id = %notice.envelope_id, error = %e, "completion email failed");
            CompletionError::Notify(e.to_string())
        })
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const BUTTON_STYLE: &str = "display:inline-block;background:#000;color:#fff;text-decoration:none;padding:10px 20px;border-radius:6px;font-size:14px;font-weight:500;";

/// Invitation carrying a recipient's personal signing link
pub fn invite_email(recipient_name: &str, recipient_email: &str, title: &str, signing_url: &str) -> Email {
    let html = format!(
        r#"<div style="font-family:system-ui,-apple-system,sans-serif;max-width:480px;margin:0 auto;padding:40px 24px;color:#111;">
    <h2 style="font-size:18px;font-weight:600;margin:0 0 8px;">You have a document to sign</h2>
    <p style="color:#555;margin:0 0 24px;">Hi {name}, <strong>{title}</strong> is ready for your signature.</p>
    <a href="{url}" style="{button}">Review &amp; Sign</a>
    <p style="color:#999;font-size:12px;margin:32px 0 0;">This link is unique to you. Do not share it.</p>
</div>"#,
        name = escape_html(recipient_name),
        title = escape_html(title),
        url = escape_html(signing_url),
        button = BUTTON_STYLE,
    );
    Email {
        to: vec![recipient_email.to_string()],
        subject: format!("Please sign: {}", title),
        html,
    }
}

/// Completion notice; the download button only appears when a signed PDF exists
pub fn completion_email(notice: &CompletionNotice) -> Email {
    let download_block = notice
        .download_url
        .as_deref()
        .map(|url| {
            format!(
                r#"<p style="margin:24px 0 0;"><a href="{}" style="{}">Download signed PDF</a></p>"#,
                escape_html(url),
                BUTTON_STYLE
            )
        })
        .unwrap_or_default();
    let greeting = if notice.owner_name.trim().is_empty() {
        "Hi".to_string()
    } else {
        format!("Hi {}", escape_html(&notice.owner_name))
    };
    let html = format!(
        r#"<div style="font-family:system-ui,-apple-system,sans-serif;max-width:480px;margin:0 auto;padding:40px 24px;color:#111;">
    <h2 style="font-size:18px;font-weight:600;margin:0 0 8px;">Document fully signed</h2>
    <p style="color:#555;margin:0;">{greeting}, all parties have signed <strong>{title}</strong>.</p>
    {download}
</div>"#,
        greeting = greeting,
        title = escape_html(&notice.title),
        download = download_block,
    );
    Email {
        to: notice.addresses(),
        subject: format!("Signed: {}", notice.title),
        html,
    }
}
