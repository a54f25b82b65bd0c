use std::{fmt, sync::Arc};

use async_trait::async_trait;
use cob_core::ApplicationError;
use tracing::{info, warn};

use crate::{
    events::{EventContext, IncomingEvent, TextMessage},
    reply::Reply,
};

pub const HELP_TRIGGER: &str = "/help";
pub const HELP_TEXT: &str = "Get help.";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Leading command word, e.g. `/time`.
    Text(String),
    /// Every delivery of a `(resource, event)` pair. `event == "*"` matches any event.
    Event { resource: String, event: String },
}

impl Trigger {
    pub fn text(command: impl Into<String>) -> Self {
        Self::Text(command.into())
    }

    pub fn event(resource: impl Into<String>, event: impl Into<String>) -> Self {
        Self::Event { resource: resource.into(), event: event.into() }
    }

    fn matches_event(&self, resource: &str, event: &str) -> bool {
        match self {
            Self::Event { resource: wanted, event: wanted_event } => {
                wanted == resource && (wanted_event == "*" || wanted_event == event)
            }
            Self::Text(_) => false,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(command) => f.write_str(command),
            Self::Event { resource, event } => write!(f, "{resource}:{event}"),
        }
    }
}

/// What a handler receives: the event plus the text after the command word.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub event: IncomingEvent,
    pub arguments: String,
    pub correlation_id: String,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: &CommandRequest) -> Result<Reply, ApplicationError>;
}

pub struct Command {
    pub trigger: Trigger,
    pub help_text: String,
    handler: Arc<dyn CommandHandler>,
}

/// Registration table built at startup and read-only afterwards.
pub struct CommandRouter {
    bot_name: String,
    commands: Vec<Command>,
    greeting: Option<Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self { bot_name: bot_name.into(), commands: Vec::new(), greeting: None }
    }

    /// Registers `handler` for `trigger`, replacing any earlier registration.
    pub fn register<H>(&mut self, trigger: Trigger, help_text: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        let command = Command { trigger, help_text: help_text.into(), handler: Arc::new(handler) };
        match self.commands.iter_mut().find(|existing| existing.trigger == command.trigger) {
            Some(existing) => *existing = command,
            None => self.commands.push(command),
        }
    }

    pub fn unregister(&mut self, trigger: &Trigger) -> bool {
        let before = self.commands.len();
        self.commands.retain(|command| &command.trigger != trigger);
        self.commands.len() != before
    }

    /// Handler for an empty message (a bare mention of the bot).
    pub fn set_greeting<H>(&mut self, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.greeting = Some(Arc::new(handler));
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub async fn dispatch(&self, event: &IncomingEvent, ctx: &EventContext) -> Reply {
        let (handler, request, route) = match event {
            IncomingEvent::TextMessage(message) => {
                let text = strip_mention(&message.text, &self.bot_name);
                let routed = IncomingEvent::TextMessage(TextMessage {
                    text: text.to_owned(),
                    ..message.clone()
                });

                if text.is_empty() {
                    match &self.greeting {
                        Some(greeting) => (
                            Arc::clone(greeting),
                            self.request(routed, "", ctx),
                            "greeting".to_owned(),
                        ),
                        None => return self.help_reply(),
                    }
                } else {
                    let Some(command) = self.match_text(text) else {
                        info!(
                            event_name = "routing.command.unmatched",
                            correlation_id = %ctx.correlation_id,
                            "no command matched, answering with help"
                        );
                        return self.help_reply();
                    };
                    let Trigger::Text(word) = &command.trigger else {
                        return self.help_reply();
                    };
                    let arguments = text[word.len()..].trim();
                    (Arc::clone(&command.handler), self.request(routed, arguments, ctx), word.clone())
                }
            }
            IncomingEvent::CardSubmission(_) => {
                let (resource, kind) = event.category();
                let Some(command) =
                    self.commands.iter().find(|command| command.trigger.matches_event(resource, kind))
                else {
                    warn!(
                        event_name = "routing.event.unhandled",
                        correlation_id = %ctx.correlation_id,
                        resource,
                        "no handler registered for event"
                    );
                    return Reply::text(
                        ApplicationError::UnknownCommand(format!("{resource}:{kind}")).user_message(),
                    );
                };
                (
                    Arc::clone(&command.handler),
                    self.request(event.clone(), "", ctx),
                    command.trigger.to_string(),
                )
            }
        };

        info!(
            event_name = "routing.command.dispatched",
            correlation_id = %ctx.correlation_id,
            route = %route,
            "dispatching to handler"
        );
        match handler.handle(&request).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "routing.command.failed",
                    correlation_id = %ctx.correlation_id,
                    route = %route,
                    error = %error,
                    "handler failed"
                );
                Reply::text(error.user_message())
            }
        }
    }

    /// Markdown list of every registered text command with its help text.
    pub fn help_text(&self) -> String {
        let mut lines = vec![
            "Hello! I understand the following commands:".to_owned(),
            format!("* **{HELP_TRIGGER}**: {HELP_TEXT}"),
        ];
        for command in &self.commands {
            if let Trigger::Text(word) = &command.trigger {
                if word != HELP_TRIGGER {
                    lines.push(format!("* **{word}**: {}", command.help_text));
                }
            }
        }
        lines.join("\n")
    }

    fn help_reply(&self) -> Reply {
        Reply::text(self.help_text())
    }

    fn request(&self, event: IncomingEvent, arguments: &str, ctx: &EventContext) -> CommandRequest {
        CommandRequest {
            event,
            arguments: arguments.to_owned(),
            correlation_id: ctx.correlation_id.clone(),
        }
    }

    /// Longest registered command word that starts `text` on a token boundary.
    fn match_text(&self, text: &str) -> Option<&Command> {
        self.commands
            .iter()
            .filter(|command| match &command.trigger {
                Trigger::Text(word) => is_command_prefix(text, word),
                Trigger::Event { .. } => false,
            })
            .max_by_key(|command| match &command.trigger {
                Trigger::Text(word) => word.len(),
                Trigger::Event { .. } => 0,
            })
    }
}

fn is_command_prefix(text: &str, word: &str) -> bool {
    !word.is_empty()
        && text.starts_with(word)
        && text[word.len()..].chars().next().map_or(true, char::is_whitespace)
}

/// Drops a leading mention of the bot (case-insensitive) and surrounding whitespace.
pub fn strip_mention<'a>(text: &'a str, bot_name: &str) -> &'a str {
    let trimmed = text.trim();
    if bot_name.is_empty() {
        return trimmed;
    }
    match trimmed.get(..bot_name.len()) {
        Some(head) if head.eq_ignore_ascii_case(bot_name) => {
            let rest = &trimmed[bot_name.len()..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                trimmed
            }
        }
        _ => trimmed,
    }
}
