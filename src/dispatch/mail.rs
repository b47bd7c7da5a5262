use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::SmtpTransportBuilder;
use lettre::{Message, SmtpTransport, Transport};

use crate::app::{Result, SluiceError};
use crate::config::SmtpSettings;
use crate::domain::{ConfigurationRecord, EnrichedMessage, OutgoingMail};

/// Sends a fully assembled mail. Implementations may block.
pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Performs the connect/authenticate handshake for one worker.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> MailSession;
}

/// A worker's mail capability, established once for its lifetime.
#[derive(Clone)]
pub enum MailSession {
    Ready(Arc<dyn MailTransport>),
    /// Every send short-circuits to the archive path.
    Unavailable(String),
}

impl MailSession {
    pub async fn send(&self, mail: OutgoingMail) -> Result<()> {
        match self {
            MailSession::Ready(transport) => {
                let transport = Arc::clone(transport);
                tokio::task::spawn_blocking(move || transport.send(&mail))
                    .await
                    .map_err(|e| SluiceError::Mail(format!("send task failed: {}", e)))?
            }
            MailSession::Unavailable(reason) => {
                Err(SluiceError::Mail(format!("mail session unavailable: {}", reason)))
            }
        }
    }
}

/// Headers identifying where a dispatched message came from, followed by
/// the message's tag headers.
pub fn service_headers(
    record: &ConfigurationRecord,
    message: &EnrichedMessage,
) -> Vec<(String, String)> {
    let mut headers = vec![
        ("X-Sluice-Id".to_string(), record.id.to_string()),
        ("X-Sluice-Plugin".to_string(), record.plugin.to_string()),
        ("X-Sluice-Source".to_string(), record.source.clone()),
    ];
    if let Some(ref url) = message.url {
        headers.push(("X-Sluice-Url".to_string(), url.clone()));
    }
    headers.extend(message.tags.iter().cloned());
    headers
}

fn mail_error(context: &str, e: impl std::fmt::Display) -> SluiceError {
    SluiceError::Mail(format!("{}: {}", context, e))
}

/// Build the MIME message: a plain body plus one attachment per grabbed
/// representation, named after `attachment_name`.
pub fn build_message(from: &Mailbox, attachment_name: &str, mail: &OutgoingMail) -> Result<Message> {
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| mail_error("invalid recipient", e))?;

    let mut builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(mail.subject.clone());

    for (name, value) in &mail.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| mail_error("invalid header name", e))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }
    if let Some(priority) = mail.priority {
        builder = builder.raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str("X-Priority"),
            priority.to_string(),
        ));
    }

    let has_attachments = mail.markup.is_some()
        || mail.screenshot.is_some()
        || mail.text.is_some()
        || !mail.images.is_empty();
    if !has_attachments {
        return builder
            .body(mail.body.clone())
            .map_err(|e| mail_error("failed to build mail", e));
    }

    let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));

    if let Some(ref markup) = mail.markup {
        multipart = multipart.singlepart(
            Attachment::new(format!("{}.html", attachment_name))
                .body(markup.clone(), ContentType::TEXT_HTML),
        );
    }
    if let Some(ref screenshot) = mail.screenshot {
        let png = ContentType::parse("image/png").map_err(|e| mail_error("content type", e))?;
        multipart = multipart.singlepart(
            Attachment::new(format!("{}.png", attachment_name)).body(screenshot.clone(), png),
        );
    }
    if let Some(ref text) = mail.text {
        multipart = multipart.singlepart(
            Attachment::new(format!("{}.txt", attachment_name))
                .body(text.clone(), ContentType::TEXT_PLAIN),
        );
    }
    for (n, image) in mail.images.iter().enumerate() {
        let content_type = ContentType::parse(&format!("image/{}", image.format))
            .map_err(|e| mail_error("content type", e))?;
        multipart = multipart.singlepart(
            Attachment::new(format!("{}_{}.{}", attachment_name, n, image.format))
                .body(image.data.clone(), content_type),
        );
    }

    builder
        .multipart(multipart)
        .map_err(|e| mail_error("failed to build mail", e))
}

/// SMTP delivery over an established lettre transport.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    attachment_name: String,
}

impl MailTransport for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(&self.from, &self.attachment_name, mail)?;
        self.transport
            .send(&message)
            .map_err(|e| mail_error("SMTP send failed", e))?;
        tracing::debug!("Mail sent to {}", mail.to);
        Ok(())
    }
}

/// Connects to the configured SMTP server.
///
/// With `use_ssl` the connection starts with implicit TLS and falls back to
/// STARTTLS when the handshake fails; otherwise it is plain.
#[derive(Clone)]
pub struct SmtpConnector {
    config: SmtpSettings,
    attachment_name: String,
}

impl SmtpConnector {
    pub fn new(config: SmtpSettings, attachment_name: impl Into<String>) -> Self {
        Self {
            config,
            attachment_name: attachment_name.into(),
        }
    }

    fn finish(&self, builder: SmtpTransportBuilder) -> SmtpTransport {
        let mut builder = builder
            .port(self.config.port)
            .timeout(Some(Duration::from_secs(self.config.timeout_secs)));

        if self.config.auth {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone().unwrap_or_default(),
                self.config.password.clone().unwrap_or_default(),
            ));
        }

        builder.build()
    }

    fn candidates(&self) -> Result<Vec<(&'static str, SmtpTransport)>> {
        let server = self.config.server.as_str();

        if !self.config.use_ssl {
            return Ok(vec![(
                "plain",
                self.finish(SmtpTransport::builder_dangerous(server)),
            )]);
        }

        let tls = SmtpTransport::relay(server).map_err(|e| mail_error("SMTP relay error", e))?;
        let starttls =
            SmtpTransport::starttls_relay(server).map_err(|e| mail_error("SMTP relay error", e))?;
        Ok(vec![
            ("tls", self.finish(tls)),
            ("starttls", self.finish(starttls)),
        ])
    }

    fn establish(&self) -> Result<SmtpTransport> {
        let mut last_error = String::from("no transport attempted");

        for (mode, transport) in self.candidates()? {
            match transport.test_connection() {
                Ok(true) => {
                    tracing::debug!("SMTP session established with {} ({})", self.config.server, mode);
                    return Ok(transport);
                }
                Ok(false) => last_error = format!("{} connection refused", mode),
                Err(e) => {
                    tracing::debug!("SMTP {} handshake with {} failed: {}", mode, self.config.server, e);
                    last_error = format!("{}: {}", mode, e);
                }
            }
        }

        Err(SluiceError::Mail(last_error))
    }
}

#[async_trait]
impl MailConnector for SmtpConnector {
    async fn connect(&self) -> MailSession {
        let from: Mailbox = match self.config.from.parse() {
            Ok(from) => from,
            Err(e) => return MailSession::Unavailable(format!("invalid sender address: {}", e)),
        };

        let connector = self.clone();
        let established = tokio::task::spawn_blocking(move || connector.establish()).await;

        match established {
            Ok(Ok(transport)) => MailSession::Ready(Arc::new(SmtpMailer {
                transport,
                from,
                attachment_name: self.attachment_name.clone(),
            })),
            Ok(Err(e)) => {
                tracing::warn!("SMTP server {} unavailable: {}", self.config.server, e);
                MailSession::Unavailable(e.to_string())
            }
            Err(e) => MailSession::Unavailable(format!("connect task failed: {}", e)),
        }
    }
}
