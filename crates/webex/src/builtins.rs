use std::sync::Arc;

use async_trait::async_trait;
use cob_core::ApplicationError;
use cob_gateways::{ClockGateway, ClockLookup, DnsPolicyGateway, TrafficGateway};

use crate::{
    actions::{operation_menu_reply, CardActionDispatcher, WorkflowSettings},
    client::{ChatApi, ATTACHMENT_ACTIONS_RESOURCE},
    commands::{CommandHandler, CommandRequest, CommandRouter, Trigger},
    events::IncomingEvent,
    reply::{Reply, Response},
};

pub const DEMO_TEXT: &str = "Here's a fun little meme.";
pub const DEMO_FILE_URL: &str =
    "https://sayingimages.com/wp-content/uploads/aaaaaalll-righty-then-alrighty-meme.jpg";
pub const TIME_HELP: &str = "Look up the current time for a given timezone. _Example: **/time EST**_";

pub struct ShowCardCommand;

#[async_trait]
impl CommandHandler for ShowCardCommand {
    async fn handle(&self, _request: &CommandRequest) -> Result<Reply, ApplicationError> {
        Ok(operation_menu_reply())
    }
}

pub struct DoSomethingCommand;

#[async_trait]
impl CommandHandler for DoSomethingCommand {
    async fn handle(&self, request: &CommandRequest) -> Result<Reply, ApplicationError> {
        let text = match &request.event {
            IncomingEvent::TextMessage(message) => message.text.as_str(),
            IncomingEvent::CardSubmission(_) => "",
        };
        Ok(Reply::text(format!("i did what you said - {text}")))
    }
}

pub struct DemoCommand;

#[async_trait]
impl CommandHandler for DemoCommand {
    async fn handle(&self, _request: &CommandRequest) -> Result<Reply, ApplicationError> {
        Ok(Reply::from(Response {
            text: Some(DEMO_TEXT.to_owned()),
            files: Some(DEMO_FILE_URL.to_owned()),
            ..Response::default()
        }))
    }
}

pub struct TimeCommand {
    clock: Arc<dyn ClockGateway>,
}

impl TimeCommand {
    pub fn new(clock: Arc<dyn ClockGateway>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl CommandHandler for TimeCommand {
    async fn handle(&self, request: &CommandRequest) -> Result<Reply, ApplicationError> {
        let timezone = request.arguments.trim();
        if timezone.is_empty() {
            return Ok(Reply::text("Tell me which timezone to look up. _Example: **/time EST**_"));
        }

        Ok(match self.clock.current_time(timezone).await? {
            ClockLookup::Reading(reading) => Reply::text(format!(
                "In {} it is currently {} on {}.",
                reading.zone_name, reading.time, reading.date
            )),
            ClockLookup::ServiceError(message) => Reply::text(format!("Error: {message}")),
        })
    }
}

pub struct GreetingCommand {
    chat: Arc<dyn ChatApi>,
}

impl GreetingCommand {
    pub fn new(chat: Arc<dyn ChatApi>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl CommandHandler for GreetingCommand {
    async fn handle(&self, request: &CommandRequest) -> Result<Reply, ApplicationError> {
        let IncomingEvent::TextMessage(message) = &request.event else {
            return Ok(Reply::text(greeting_text("there")));
        };
        let person = self.chat.get_person(&message.person_id).await?;
        Ok(Reply::from(Response {
            markdown: Some(greeting_text(person.greeting_name())),
            ..Response::default()
        }))
    }
}

fn greeting_text(name: &str) -> String {
    format!("Hello {name}, I'm a chat bot. See what I can do by asking for **/help**.")
}

/// Collaborators the stock command set needs.
pub struct RouterDependencies {
    pub chat: Arc<dyn ChatApi>,
    pub dns: Arc<dyn DnsPolicyGateway>,
    pub traffic: Arc<dyn TrafficGateway>,
    pub clock: Arc<dyn ClockGateway>,
    pub workflow: WorkflowSettings,
}

pub fn default_router(bot_name: &str, deps: RouterDependencies) -> CommandRouter {
    let mut router = CommandRouter::new(bot_name);
    router.set_greeting(GreetingCommand::new(Arc::clone(&deps.chat)));
    router.register(
        Trigger::event(ATTACHMENT_ACTIONS_RESOURCE, "*"),
        "Handle card submissions.",
        CardActionDispatcher::new(deps.chat, deps.dns, deps.traffic, deps.workflow),
    );
    router.register(Trigger::text("/showcard"), "show an adaptive card", ShowCardCommand);
    router.register(Trigger::text("/dosomething"), "help for do something", DoSomethingCommand);
    router.register(
        Trigger::text("/demo"),
        "Sample that creates a Teams message to be returned.",
        DemoCommand,
    );
    router.register(Trigger::text("/time"), TIME_HELP, TimeCommand::new(deps.clock));
    router
}
