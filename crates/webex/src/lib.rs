//! Webex Integration - webhook-driven bot interface
//!
//! This crate provides the chat side of cob:
//! - **Events** (`events`) - webhook payloads, loop prevention, the delivery pipeline
//! - **Commands** (`commands`) - trigger table, mention stripping, `/help` fallback
//! - **Card actions** (`actions`) - the `card_type` state machine behind card workflows
//! - **Cards** (`cards`) - typed Adaptive Card builders
//! - **Replies** (`reply`) - handler replies to `POST /messages` bodies
//! - **Client** (`client`) - REST client for messages, attachment actions, people, webhooks
//!
//! # Architecture
//!
//! ```text
//! Webhook → EventPipeline → CommandRouter → Handler → Gateways
//!                ↓                              ↓
//!           ChatApi::send_message ← format_reply ← Reply / Card
//! ```
//!
//! Nothing is kept between turns. A card workflow resumes from the hidden
//! `card_type` input of the card being submitted.

pub mod actions;
pub mod builtins;
pub mod cards;
pub mod client;
pub mod commands;
pub mod events;
pub mod reply;

pub use actions::{CardActionDispatcher, CardInputs, CardType, WorkflowSettings};
pub use builtins::{default_router, RouterDependencies};
pub use client::{register_webhooks, ChatApi, WebexClient};
pub use commands::{CommandHandler, CommandRequest, CommandRouter, Trigger};
pub use events::{DeliveryError, DeliveryOutcome, EventContext, EventPipeline, WebhookEvent};
pub use reply::{format_reply, OutboundMessage, Reply, Response};
