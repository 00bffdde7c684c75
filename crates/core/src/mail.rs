//! Outbound mail delivery collaborator.
//!
//! Access links are delivered out-of-band by email. Delivery sits behind
//! the [`MailSender`] trait so the service can run against a real SMTP
//! relay in production and a recording sender in tests.
//!
//! Delivery failures are reported, never rolled back: the identity and
//! grant created before the send stay valid so the operator can
//! retransmit the link through another channel.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use parking_lot::RwLock;

use crate::{SudoError, SudoResult};

/// Sends plain-text mail to a single recipient.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Delivers `body` to `to` with the given subject.
    ///
    /// # Errors
    ///
    /// [`SudoError::DeliveryFailure`] when the message cannot be built
    /// or the transport rejects it.
    async fn send(&self, to: &str, subject: &str, body: &str) -> SudoResult<()>;
}

#[async_trait]
impl<S: MailSender + ?Sized> MailSender for Arc<S> {
    async fn send(&self, to: &str, subject: &str, body: &str) -> SudoResult<()> {
        (**self).send(to, subject, body).await
    }
}

/// SMTP sender over [`lettre`]'s async tokio transport.
pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailSender {
    /// Connects to `host` over TLS with the given sender address.
    pub fn new(host: &str, from: impl Into<String>) -> SudoResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| SudoError::delivery_with_source("invalid SMTP relay", e))?
            .build();
        Ok(Self { transport, from: from.into() })
    }

    /// Connects to `host:port` with username/password authentication.
    pub fn with_credentials(
        host: &str,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        from: impl Into<String>,
    ) -> SudoResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| SudoError::delivery_with_source("invalid SMTP relay", e))?
            .port(port)
            .credentials(Credentials::new(username.into(), password.into()))
            .build();
        Ok(Self { transport, from: from.into() })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> SudoResult<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| SudoError::delivery_with_source("invalid from address", e))?,
            )
            .to(to.parse().map_err(|e| SudoError::delivery_with_source("invalid to address", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())
            .map_err(|e| SudoError::delivery_with_source("failed to build message", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SudoError::delivery_with_source("SMTP send failed", e))?;

        tracing::debug!(%to, "delivered mail");
        Ok(())
    }
}

/// A message captured by [`MemoryMailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Recording sender for tests. Optionally fails every send.
#[derive(Clone, Default)]
pub struct MemoryMailSender {
    sent: Arc<RwLock<Vec<OutboundMail>>>,
    fail: Arc<RwLock<bool>>,
}

impl MemoryMailSender {
    /// Creates a sender that records every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail with a delivery error.
    pub fn fail_sends(&self, fail: bool) {
        *self.fail.write() = fail;
    }

    /// Messages sent so far, in order.
    pub fn sent(&self) -> Vec<OutboundMail> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl MailSender for MemoryMailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> SudoResult<()> {
        if *self.fail.read() {
            return Err(SudoError::delivery("simulated delivery failure"));
        }
        self.sent.write().push(OutboundMail {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}

/// Composes the access-link email: subject and plain-text body with the
/// link and the lifetime in whole hours (rounded up). The token appears
/// only inside the link.
pub fn compose_access_email(
    recipient_name: &str,
    link: &str,
    ttl: std::time::Duration,
) -> (String, String) {
    let hours = ttl.as_secs().div_ceil(3600).max(1);
    let plural = if hours == 1 { "hour" } else { "hours" };

    let subject = "Your temporary administrative access".to_owned();
    let body = format!(
        "Hello {recipient_name},\n\n\
         Temporary administrative access has been created for you.\n\n\
         Sign in using this link:\n{link}\n\n\
         The link expires in {hours} {plural} and your account will be\n\
         removed automatically afterwards.\n\n\
         If you did not request this access, you can ignore this message."
    );

    (subject, body)
}
