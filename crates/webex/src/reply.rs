use serde::Serialize;
use tracing::debug;

use crate::cards::CardPayload;

/// Fallback body for card messages; the platform rejects attachments sent
/// without any text.
pub const CARD_FALLBACK_TEXT: &str = "This message contains an interactive card.";

/// What a handler hands back to the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Sent as the markdown body.
    Markdown(String),
    Message(Box<Response>),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Markdown(text.into())
    }

    pub fn card(fallback: impl Into<String>, card: CardPayload) -> Self {
        Self::Message(Box::new(Response {
            markdown: Some(fallback.into()),
            attachment: Some(card),
            ..Response::default()
        }))
    }

    pub fn attachment(&self) -> Option<&CardPayload> {
        match self {
            Self::Markdown(_) => None,
            Self::Message(response) => response.attachment.as_ref(),
        }
    }

    /// Markdown body if present, otherwise the plain text.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Markdown(text) => Some(text),
            Self::Message(response) => response.markdown.as_deref().or(response.text.as_deref()),
        }
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Self::Markdown(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Self::Markdown(value.to_owned())
    }
}

impl From<Response> for Reply {
    fn from(value: Response) -> Self {
        Self::Message(Box::new(value))
    }
}

/// Structured reply. `room_id` overrides the room the event came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub text: Option<String>,
    pub markdown: Option<String>,
    pub files: Option<String>,
    pub room_id: Option<String>,
    pub attachment: Option<CardPayload>,
}

/// Body of `POST /messages`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<CardPayload>,
}

impl OutboundMessage {
    pub fn markdown(room_id: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            text: None,
            markdown: Some(markdown.into()),
            files: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

pub fn format_reply(reply: Reply, room_id: &str) -> OutboundMessage {
    let response = match reply {
        Reply::Markdown(markdown) => return OutboundMessage::markdown(room_id, markdown),
        Reply::Message(response) => *response,
    };

    let room_id = response.room_id.unwrap_or_else(|| room_id.to_owned());
    match response.attachment {
        Some(card) => {
            if response.files.is_some() {
                debug!(room_id = %room_id, "dropping file url from card reply");
            }
            let markdown = match (&response.text, response.markdown) {
                (None, None) => Some(CARD_FALLBACK_TEXT.to_owned()),
                (_, markdown) => markdown,
            };
            OutboundMessage {
                room_id,
                text: response.text,
                markdown,
                files: Vec::new(),
                attachments: vec![card],
            }
        }
        None => OutboundMessage {
            room_id,
            text: response.text,
            markdown: response.markdown,
            files: response.files.into_iter().collect(),
            attachments: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{format_reply, OutboundMessage, Reply, Response, CARD_FALLBACK_TEXT};
    use crate::cards::CardBuilder;

    #[test]
    fn bare_string_becomes_markdown_body() {
        let message = format_reply(Reply::from("hello **there**"), "room-1");

        assert_eq!(message, OutboundMessage::markdown("room-1", "hello **there**"));
        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({"roomId": "room-1", "markdown": "hello **there**"})
        );
    }

    #[test]
    fn structured_reply_maps_fields_and_honours_room_override() {
        let reply = Reply::from(Response {
            text: Some("Here's a fun little meme.".to_owned()),
            files: Some("https://media.example.com/meme.gif".to_owned()),
            room_id: Some("room-override".to_owned()),
            ..Response::default()
        });

        let message = format_reply(reply, "room-1");

        assert_eq!(message.room_id, "room-override");
        assert_eq!(message.text.as_deref(), Some("Here's a fun little meme."));
        assert_eq!(message.files, vec!["https://media.example.com/meme.gif".to_owned()]);
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn attachment_takes_precedence_over_files() {
        let card = CardBuilder::new("choose_operation").heading("Menu").build();
        let reply = Reply::from(Response {
            files: Some("https://media.example.com/ignored.png".to_owned()),
            attachment: Some(card.clone()),
            ..Response::default()
        });

        let message = format_reply(reply, "room-1");

        assert!(message.files.is_empty());
        assert_eq!(message.attachments, vec![card]);
        assert_eq!(message.markdown.as_deref(), Some(CARD_FALLBACK_TEXT));
        let value = serde_json::to_value(&message).expect("serialize");
        assert!(value.get("files").is_none());
        assert_eq!(value["attachments"][0]["contentType"], "application/vnd.microsoft.card.adaptive");
    }

    #[test]
    fn card_reply_keeps_its_own_fallback_text() {
        let card = CardBuilder::new("traffic_chart").build();
        let message = format_reply(Reply::card("Top destinations", card), "room-1");

        assert_eq!(message.markdown.as_deref(), Some("Top destinations"));
        assert_eq!(message.attachments.len(), 1);
    }
}
