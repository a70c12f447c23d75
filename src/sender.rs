use crate::config::EmailConfig;
use crate::types::{Channel, DeliveryResult, NewsletterDocument, Result, UserProfile};
use async_trait::async_trait;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Trait for a delivery transport. Transport failures are reported in the
/// returned value, never raised, so the orchestrator decides what to record.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, user: &UserProfile, newsletter: &NewsletterDocument) -> DeliveryResult;
}

/// SMTP email sender. When the SMTP credentials are incomplete the sender
/// runs in simulation mode: the send is logged and reported as successful
/// without opening a transport.
pub struct EmailSender {
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl EmailSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mailer = if config.is_configured() {
            let host = config.host.as_deref().unwrap_or_default();
            let creds = Credentials::new(
                config.username.clone().unwrap_or_default(),
                config.password.clone().unwrap_or_default(),
            );

            let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| {
                    crate::types::NewsletterError::Delivery(format!(
                        "failed to build SMTP transport: {}",
                        e
                    ))
                })?
                .port(config.port)
                .credentials(creds)
                .build();

            Some(transport)
        } else {
            warn!("SMTP configuration incomplete; email sends will be simulated");
            None
        };

        Ok(Self {
            mailer,
            from: config.from.clone(),
        })
    }

    fn build_message(
        &self,
        recipient: &str,
        newsletter: &NewsletterDocument,
    ) -> std::result::Result<Message, String> {
        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| format!("invalid from address: {}", e))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| format!("invalid recipient address: {}", e))?)
            .subject(newsletter.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                newsletter.text.clone(),
                newsletter.html.clone(),
            ))
            .map_err(|e| format!("failed to build email: {}", e))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, user: &UserProfile, newsletter: &NewsletterDocument) -> DeliveryResult {
        let Some(email) = user.email.as_deref() else {
            return DeliveryResult::failure(Channel::Email, "user has no email address");
        };

        let message = match self.build_message(email, newsletter) {
            Ok(message) => message,
            Err(detail) => return DeliveryResult::failure(Channel::Email, detail),
        };

        match &self.mailer {
            None => {
                info!(
                    "simulating email send to {} with subject '{}'",
                    email, newsletter.subject
                );
                DeliveryResult {
                    success: true,
                    channel: Channel::Email,
                    detail: "send simulated (SMTP not configured)".to_string(),
                    recipient: Some(email.to_string()),
                }
            }
            Some(mailer) => match mailer.send(message).await {
                Ok(_) => {
                    info!("email sent to {}", email);
                    DeliveryResult {
                        success: true,
                        channel: Channel::Email,
                        detail: "newsletter sent".to_string(),
                        recipient: Some(email.to_string()),
                    }
                }
                Err(e) => {
                    error!("email send to {} failed: {}", email, e);
                    DeliveryResult {
                        success: false,
                        channel: Channel::Email,
                        detail: format!("SMTP send failed: {}", e),
                        recipient: Some(email.to_string()),
                    }
                }
            },
        }
    }
}

/// Placeholder WhatsApp sender. Reports success without external effect; a
/// real transport can replace it behind the same trait.
#[derive(Debug, Default)]
pub struct WhatsAppSender;

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(&self, user: &UserProfile, newsletter: &NewsletterDocument) -> DeliveryResult {
        let Some(phone) = user.phone.as_deref() else {
            return DeliveryResult::failure(Channel::Whatsapp, "user has no phone number");
        };

        info!(
            "[stub] WhatsApp send to {} of '{}'",
            phone, newsletter.title
        );
        DeliveryResult {
            success: true,
            channel: Channel::Whatsapp,
            detail: "stub WhatsApp send succeeded".to_string(),
            recipient: Some(phone.to_string()),
        }
    }
}

/// Placeholder Telegram sender, same shape as the WhatsApp stub.
#[derive(Debug, Default)]
pub struct TelegramSender;

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, user: &UserProfile, newsletter: &NewsletterDocument) -> DeliveryResult {
        let Some(telegram_id) = user.telegram_id.as_deref() else {
            return DeliveryResult::failure(Channel::Telegram, "user has no Telegram id");
        };

        info!(
            "[stub] Telegram send to {} of '{}'",
            telegram_id, newsletter.title
        );
        DeliveryResult {
            success: true,
            channel: Channel::Telegram,
            detail: "stub Telegram send succeeded".to_string(),
            recipient: Some(telegram_id.to_string()),
        }
    }
}

/// Sender used by mock runs: succeeds deterministically on any channel
/// without touching a transport.
#[derive(Debug)]
pub struct MockSender {
    channel: Channel,
}

impl MockSender {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, user: &UserProfile, _newsletter: &NewsletterDocument) -> DeliveryResult {
        DeliveryResult {
            success: true,
            channel: self.channel,
            detail: "mock delivery".to_string(),
            recipient: Some(user.id.clone()),
        }
    }
}

/// Registry dispatching deliveries to the sender registered for a channel.
pub struct DeliveryAgent {
    senders: HashMap<Channel, Box<dyn ChannelSender>>,
}

impl DeliveryAgent {
    /// Build the live registry: real email transport plus the stub channels.
    pub fn new(email_config: &EmailConfig) -> Result<Self> {
        let mut agent = Self {
            senders: HashMap::new(),
        };
        agent.register(Box::new(EmailSender::new(email_config)?));
        agent.register(Box::new(WhatsAppSender));
        agent.register(Box::new(TelegramSender));
        Ok(agent)
    }

    /// Build a registry of mock senders for every channel.
    pub fn mock() -> Self {
        let mut agent = Self {
            senders: HashMap::new(),
        };
        for channel in [Channel::Email, Channel::Whatsapp, Channel::Telegram] {
            agent.register(Box::new(MockSender::new(channel)));
        }
        agent
    }

    pub fn register(&mut self, sender: Box<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    pub async fn deliver(
        &self,
        user: &UserProfile,
        newsletter: &NewsletterDocument,
        channel: Channel,
    ) -> DeliveryResult {
        match self.senders.get(&channel) {
            Some(sender) => sender.send(user, newsletter).await,
            // The orchestrator validates the channel before delivery; this
            // covers a registry built without that channel.
            None => DeliveryResult::failure(
                channel,
                format!("no sender registered for channel '{}'", channel),
            ),
        }
    }
}
