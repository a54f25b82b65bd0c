use std::sync::Arc;

use cob_gateways::GatewayError;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    client::{ChatApi, ATTACHMENT_ACTIONS_RESOURCE, CREATED_EVENT, MESSAGES_RESOURCE},
    commands::CommandRouter,
    reply::format_reply,
};

/// Notification body the platform POSTs to the bot URL.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub resource: String,
    pub event: String,
    pub data: WebhookData,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub person_id: Option<String>,
    #[serde(default)]
    pub person_email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IncomingEvent {
    TextMessage(TextMessage),
    CardSubmission(CardSubmission),
}

impl IncomingEvent {
    pub fn room_id(&self) -> &str {
        match self {
            Self::TextMessage(message) => &message.room_id,
            Self::CardSubmission(submission) => &submission.room_id,
        }
    }

    /// `(resource, event)` pair this event was delivered under.
    pub fn category(&self) -> (&'static str, &'static str) {
        match self {
            Self::TextMessage(_) => (MESSAGES_RESOURCE, CREATED_EVENT),
            Self::CardSubmission(_) => (ATTACHMENT_ACTIONS_RESOURCE, CREATED_EVENT),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub id: String,
    pub person_id: String,
    pub person_email: String,
    pub room_id: String,
    pub text: String,
}

/// Only a reference: the submitted fields are fetched separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardSubmission {
    pub attachment_action_id: String,
    pub room_id: String,
    pub person_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn new() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string() }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Replied { room_id: String },
    Ignored { reason: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("failed to fetch message {message_id}: {source}")]
    FetchMessage { message_id: String, source: GatewayError },
    #[error("failed to send reply to room {room_id}: {source}")]
    SendReply { room_id: String, source: GatewayError },
}

/// Turns webhook deliveries into routed replies.
pub struct EventPipeline {
    chat: Arc<dyn ChatApi>,
    router: Arc<CommandRouter>,
    bot_email: String,
}

impl EventPipeline {
    pub fn new(chat: Arc<dyn ChatApi>, router: Arc<CommandRouter>, bot_email: impl Into<String>) -> Self {
        Self { chat, router, bot_email: bot_email.into() }
    }

    pub async fn classify(&self, webhook: WebhookEvent) -> Result<Option<IncomingEvent>, DeliveryError> {
        match (webhook.resource.as_str(), webhook.event.as_str()) {
            (MESSAGES_RESOURCE, CREATED_EVENT) => {
                if webhook.data.person_email.as_deref().is_some_and(|email| self.is_bot(email)) {
                    return Ok(None);
                }
                let message = self.chat.fetch_message(&webhook.data.id).await.map_err(|source| {
                    DeliveryError::FetchMessage { message_id: webhook.data.id.clone(), source }
                })?;
                if self.is_bot(&message.person_email) {
                    return Ok(None);
                }
                Ok(Some(IncomingEvent::TextMessage(TextMessage {
                    id: message.id,
                    person_id: message.person_id,
                    person_email: message.person_email,
                    room_id: message.room_id,
                    text: message.text,
                })))
            }
            (ATTACHMENT_ACTIONS_RESOURCE, CREATED_EVENT) => {
                // No room, no reply target.
                let Some(room_id) = webhook.data.room_id.filter(|room| !room.trim().is_empty()) else {
                    warn!(
                        event_name = "ingress.webhook.no_room",
                        attachment_action_id = %webhook.data.id,
                        "card submission without a room dropped"
                    );
                    return Ok(None);
                };
                Ok(Some(IncomingEvent::CardSubmission(CardSubmission {
                    attachment_action_id: webhook.data.id,
                    room_id,
                    person_id: webhook.data.person_id.unwrap_or_default(),
                })))
            }
            _ => Ok(None),
        }
    }

    pub async fn handle(
        &self,
        webhook: WebhookEvent,
        ctx: &EventContext,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        info!(
            event_name = "ingress.webhook.received",
            correlation_id = %ctx.correlation_id,
            webhook_id = %webhook.id,
            resource = %webhook.resource,
            event = %webhook.event,
            "webhook delivery received"
        );

        let Some(event) = self.classify(webhook).await? else {
            debug!(
                event_name = "ingress.webhook.ignored",
                correlation_id = %ctx.correlation_id,
                "delivery ignored"
            );
            return Ok(DeliveryOutcome::Ignored { reason: "not addressed to the bot" });
        };

        let reply = self.router.dispatch(&event, ctx).await;
        let message = format_reply(reply, event.room_id());
        let room_id = message.room_id.clone();
        self.chat
            .send_message(&message)
            .await
            .map_err(|source| DeliveryError::SendReply { room_id: room_id.clone(), source })?;

        info!(
            event_name = "egress.reply.sent",
            correlation_id = %ctx.correlation_id,
            room_id = %room_id,
            has_card = !message.attachments.is_empty(),
            "reply sent"
        );
        Ok(DeliveryOutcome::Replied { room_id })
    }

    fn is_bot(&self, email: &str) -> bool {
        email.eq_ignore_ascii_case(&self.bot_email)
    }
}
