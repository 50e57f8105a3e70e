use std::time::Duration;

use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::extension::ClientId;
use lettre::{
    Address, AsyncSendmailTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::bootstrap::config::{MailerAgent, MailerConfig, SmtpAuth, SmtpConfig};
use crate::bootstrap::error::KernelError;

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Sendmail(AsyncSendmailTransport<Tokio1Executor>),
}

/// Outgoing mail with a fixed sender.
pub struct Mailer {
    sender: Mailbox,
    transport: Transport,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let agent = match self.transport {
            Transport::Smtp(_) => "smtp",
            Transport::Sendmail(_) => "sendmail",
        };
        f.debug_struct("Mailer")
            .field("sender", &self.sender.to_string())
            .field("agent", &agent)
            .finish()
    }
}

impl Mailer {
    pub fn from_config(cfg: &MailerConfig) -> Result<Self, KernelError> {
        let address: Address = cfg
            .sender_email
            .parse()
            .context("mailer_sender_address")
            .map_err(KernelError::Mailer)?;
        let sender = Mailbox::new(Some(cfg.sender_name.clone()), address);

        let transport = match cfg.agent {
            MailerAgent::Sendmail => Transport::Sendmail(AsyncSendmailTransport::new()),
            MailerAgent::Smtp => {
                let smtp = cfg.smtp().ok_or_else(|| {
                    KernelError::ServiceNotConfigured("SMTP agent is not configured".into())
                })?;
                Transport::Smtp(smtp_transport(smtp)?)
            }
        };

        Ok(Self { sender, transport })
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    pub fn compose(&self, to: &str, subject: &str) -> Result<Email, KernelError> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient \"{to}\""))
            .map_err(KernelError::Mailer)?;
        Ok(Email {
            to,
            subject: subject.to_string(),
            text: None,
            html: None,
        })
    }

    pub async fn send(&self, email: Email) -> Result<(), KernelError> {
        let to = email.to.to_string();
        let message = email.build(self.sender.clone()).map_err(KernelError::Mailer)?;
        match &self.transport {
            Transport::Smtp(t) => {
                t.send(message).await.context("smtp_send").map_err(KernelError::Mailer)?;
            }
            Transport::Sendmail(t) => {
                t.send(message)
                    .await
                    .context("sendmail_send")
                    .map_err(KernelError::Mailer)?;
            }
        }
        tracing::info!(to = %to, "mail_sent");
        Ok(())
    }
}

fn smtp_transport(cfg: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, KernelError> {
    let mut builder = if cfg.tls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .context("smtp_starttls_relay")
            .map_err(KernelError::Mailer)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
    };
    builder = builder
        .port(cfg.port)
        .timeout(Some(Duration::from_secs(cfg.timeout)));

    if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        if let Some(auth) = cfg.auth {
            builder = builder.authentication(vec![match auth {
                SmtpAuth::Plain => Mechanism::Plain,
                SmtpAuth::Login => Mechanism::Login,
            }]);
        }
    }
    if let Some(name) = &cfg.server_name {
        builder = builder.hello_name(ClientId::Domain(name.clone()));
    }
    Ok(builder.build())
}

/// A message being composed. At least one of `text` or `html` should be set.
#[derive(Debug, Clone)]
pub struct Email {
    to: Mailbox,
    subject: String,
    text: Option<String>,
    html: Option<String>,
}

impl Email {
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn build(self, from: Mailbox) -> anyhow::Result<Message> {
        let builder = Message::builder().from(from).to(self.to).subject(self.subject);
        let message = match (self.text, self.html) {
            (Some(text), Some(html)) => {
                builder.multipart(MultiPart::alternative_plain_html(text, html))?
            }
            (None, Some(html)) => builder.singlepart(SinglePart::html(html))?,
            (text, None) => builder
                .header(ContentType::TEXT_PLAIN)
                .body(text.unwrap_or_default())?,
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(agent: MailerAgent, smtp: Option<SmtpConfig>) -> MailerConfig {
        MailerConfig {
            agent,
            sender_name: "Support".into(),
            sender_email: "support@example.com".into(),
            smtp,
        }
    }

    #[test]
    fn smtp_agent_requires_block() {
        let err = Mailer::from_config(&config(MailerAgent::Smtp, None)).unwrap_err();
        assert_eq!(err.to_string(), "SMTP agent is not configured");
    }

    #[tokio::test]
    async fn composes_multipart_message() {
        let mailer = Mailer::from_config(&config(MailerAgent::Sendmail, None)).unwrap();
        assert_eq!(mailer.sender().email.to_string(), "support@example.com");

        let email = mailer
            .compose("user@example.org", "Welcome")
            .unwrap()
            .text("hi")
            .html("<b>hi</b>");
        let raw = String::from_utf8(email.build(mailer.sender().clone()).unwrap().formatted()).unwrap();
        assert!(raw.contains("Subject: Welcome"));
        assert!(raw.contains("multipart/alternative"));

        assert!(mailer.compose("not an address", "x").is_err());
    }

    #[tokio::test]
    async fn smtp_transport_builds_without_connecting() {
        let smtp = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 2525,
            timeout: 5,
            tls: false,
            auth: Some(SmtpAuth::Login),
            username: Some("mailer".into()),
            password: Some("secret".into()),
            server_name: Some("app.example.com".into()),
        };
        let mailer = Mailer::from_config(&config(MailerAgent::Smtp, Some(smtp))).unwrap();
        assert!(format!("{mailer:?}").contains("smtp"));
    }
}
