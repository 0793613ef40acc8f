// src/services/notifier.rs

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;

use crate::config::{Config, SmtpConfig};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// When set, the part is sent inline and the HTML body refers to it as `cid:<id>`.
    pub content_id: Option<String>,
}

/// A fully rendered message handed to a [`Notifier`].
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub subject: String,
    pub recipients: Vec<String>,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Message delivery capability. Implementations must be cheap to share.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}

/// Builds the notifier selected by configuration: SMTP when credentials are
/// present, otherwise a notifier that only logs.
pub fn from_config(config: &Config) -> Result<Arc<dyn Notifier>, TransportError> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpNotifier::new(smtp)?)),
        None => {
            tracing::warn!("SMTP is not configured; outgoing mail will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

pub struct SmtpNotifier {
    from: Mailbox,
    mailer: SmtpTransport,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| TransportError::Build(format!("Invalid from email: {}", e)))?;

        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| TransportError::Send(format!("SMTP relay error: {}", e)))?
            .credentials(creds)
            .build();

        Ok(Self { from, mailer })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone());

        for recipient in &email.recipients {
            let to = recipient.parse::<Mailbox>().map_err(|e| {
                TransportError::Build(format!("Invalid to email {}: {}", recipient, e))
            })?;
            builder = builder.to(to);
        }

        let (inline, attached): (Vec<&Attachment>, Vec<&Attachment>) = email
            .attachments
            .iter()
            .partition(|a| a.content_id.is_some());

        let body = match &email.html_body {
            Some(html) if inline.is_empty() => {
                MultiPart::alternative_plain_html(email.text_body.clone(), html.clone())
            }
            Some(html) => {
                let mut related = MultiPart::related().singlepart(SinglePart::html(html.clone()));
                for attachment in &inline {
                    related = related.singlepart(mime_part(attachment, true)?);
                }
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text_body.clone()))
                    .multipart(related)
            }
            None => MultiPart::alternative().singlepart(SinglePart::plain(email.text_body.clone())),
        };

        // Without an HTML body, inline parts go out as plain attachments.
        let files: Vec<&Attachment> = if email.html_body.is_some() {
            attached
        } else {
            email.attachments.iter().collect()
        };

        let body = if files.is_empty() {
            body
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in files {
                mixed = mixed.singlepart(mime_part(attachment, false)?);
            }
            mixed
        };

        builder
            .multipart(body)
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

fn mime_part(attachment: &Attachment, inline: bool) -> Result<SinglePart, TransportError> {
    let content_type = ContentType::parse(&attachment.content_type)
        .map_err(|e| TransportError::Build(e.to_string()))?;
    let part = match &attachment.content_id {
        Some(id) if inline => MailAttachment::new_inline(id.clone()),
        _ => MailAttachment::new(attachment.file_name.clone()),
    };
    Ok(part.body(attachment.bytes.clone(), content_type))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        let message = self.build_message(email)?;
        let mailer = self.mailer.clone();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?
            .map_err(|e| TransportError::Send(e.to_string()))?;

        Ok(())
    }
}

/// Development notifier: records the message in the log and reports success.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        tracing::info!(
            recipients = ?email.recipients,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Mail delivery skipped (no SMTP configured)"
        );
        tracing::debug!("{}", email.text_body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> SmtpNotifier {
        SmtpNotifier::new(&SmtpConfig {
            host: "localhost".to_string(),
            username: "mailer".to_string(),
            password: "secret".to_string(),
            from: "Quiz Master <noreply@quizmaster.com>".to_string(),
        })
        .unwrap()
    }

    fn email(html_body: Option<&str>) -> OutgoingEmail {
        OutgoingEmail {
            subject: "Report".to_string(),
            recipients: vec!["ada@example.com".to_string()],
            text_body: "Hello".to_string(),
            html_body: html_body.map(str::to_string),
            attachments: vec![Attachment {
                file_name: "performance.svg".to_string(),
                content_type: "image/svg+xml".to_string(),
                bytes: b"<svg/>".to_vec(),
                content_id: Some("performance-chart".to_string()),
            }],
        }
    }

    #[test]
    fn inline_image_is_related_to_the_html_part() {
        let message = notifier()
            .build_message(&email(Some(r#"<img src="cid:performance-chart">"#)))
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/related"));
        assert!(raw.contains("<performance-chart>"));
        assert!(!raw.contains("multipart/mixed"));
    }

    #[test]
    fn inline_image_without_html_is_attached() {
        let message = notifier().build_message(&email(None)).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("performance.svg"));
        assert!(!raw.contains("multipart/related"));
    }
}
