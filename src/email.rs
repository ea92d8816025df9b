//! Outbound email: welcome messages and password-reset links.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{EmailConfig, EmailTransportConfig};
use crate::users::repo_types::User;

/// Delivery collaborator. Errors are returned, never swallowed, so callers
/// can compensate.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()>;
    async fn send_password_reset(&self, user: &User, url: &str) -> anyhow::Result<()>;
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

pub struct LettreMailer {
    transport: Transport,
    from: Mailbox,
}

impl LettreMailer {
    pub fn new(cfg: &EmailConfig) -> anyhow::Result<Self> {
        let transport = match &cfg.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let smtp = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .context("create SMTP transport")?
                    .port(*port)
                    .credentials(Credentials::new(username.clone(), password.clone()))
                    .build();
                Transport::Smtp(smtp)
            }
            EmailTransportConfig::File { dir } => {
                let dir = Path::new(dir);
                std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
                tracing::warn!(dir = %dir.display(), "emails are written to disk, not sent");
                Transport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        let from = format!("{} <{}>", cfg.from_name, cfg.from_address)
            .parse::<Mailbox>()
            .context("parse sender address")?;

        Ok(Self { transport, from })
    }

    async fn send(&self, user: &User, subject: &str, html: String) -> anyhow::Result<()> {
        let to = format!("{} <{}>", user.name, user.email)
            .parse::<Mailbox>()
            .context("parse recipient address")?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("build email message")?;

        match &self.transport {
            Transport::Smtp(smtp) => {
                smtp.send(message).await.context("send SMTP email")?;
            }
            Transport::File(file) => {
                file.send(message).await.context("write email file")?;
            }
        }
        tracing::info!(user_id = %user.id, subject, "email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for LettreMailer {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()> {
        let html = welcome_body(first_name(&user.name), url);
        self.send(user, "Welcome to the Tourbook family!", html).await
    }

    async fn send_password_reset(&self, user: &User, url: &str) -> anyhow::Result<()> {
        let html = password_reset_body(first_name(&user.name), url);
        self.send(user, "Reset your password (valid for only 10 minutes)", html)
            .await
    }
}

fn first_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or(name)
}

fn welcome_body(first_name: &str, url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
  <p>Hi {first_name},</p>
  <p>Welcome to Tourbook, we're glad to have you!</p>
  <p>Upload a photo and complete your profile to get started:</p>
  <p><a href="{url}">My account</a></p>
</body>
</html>"#
    )
}

fn password_reset_body(first_name: &str, url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
  <p>Hi {first_name},</p>
  <p>Forgot your password? Submit a PATCH request with your new password and passwordConfirm to:</p>
  <p><a href="{url}">{url}</a></p>
  <p>This link is valid for 10 minutes. If you didn't forget your password, please ignore this email.</p>
</body>
</html>"#
    )
}
