use async_trait::async_trait;
use cob_core::config::WebexConfig;
use cob_gateways::{decode_success, endpoint, transport_error, GatewayError};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{actions::CardInputs, reply::OutboundMessage};

pub const SERVICE: &str = "Webex";

pub const MESSAGES_RESOURCE: &str = "messages";
pub const ATTACHMENT_ACTIONS_RESOURCE: &str = "attachmentActions";
pub const CREATED_EVENT: &str = "created";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetails {
    pub id: String,
    pub room_id: String,
    #[serde(default)]
    pub person_id: String,
    #[serde(default)]
    pub person_email: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentAction {
    pub id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub person_id: String,
    #[serde(default)]
    pub inputs: CardInputs,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Person {
    /// First name, falling back to the first word of the display name.
    pub fn greeting_name(&self) -> &str {
        self.first_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.display_name.split_whitespace().next())
            .unwrap_or("there")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError>;
    async fn fetch_message(&self, message_id: &str) -> Result<MessageDetails, GatewayError>;
    async fn fetch_attachment_action(
        &self,
        action_id: &str,
    ) -> Result<AttachmentAction, GatewayError>;
    async fn get_person(&self, person_id: &str) -> Result<Person, GatewayError>;
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, GatewayError>;
    async fn create_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Webhook, GatewayError>;
    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), GatewayError>;
}

pub struct WebexClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl WebexClient {
    pub fn new(config: &WebexConfig, http: Client) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.bot_token.clone(),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        endpoint(SERVICE, &self.base_url, segments)
    }

    async fn get_json<T>(&self, segments: &[&str]) -> Result<T, GatewayError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url(segments)?)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;
        decode_success(SERVICE, response).await
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPage {
    #[serde(default)]
    items: Vec<Webhook>,
}

#[async_trait]
impl ChatApi for WebexClient {
    async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.url(&["messages"])?)
            .bearer_auth(self.token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected { service: SERVICE, status: status.as_u16() });
        }
        Ok(())
    }

    async fn fetch_message(&self, message_id: &str) -> Result<MessageDetails, GatewayError> {
        self.get_json(&["messages", message_id]).await
    }

    async fn fetch_attachment_action(
        &self,
        action_id: &str,
    ) -> Result<AttachmentAction, GatewayError> {
        self.get_json(&["attachment", "actions", action_id]).await
    }

    async fn get_person(&self, person_id: &str) -> Result<Person, GatewayError> {
        self.get_json(&["people", person_id]).await
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, GatewayError> {
        let page: WebhookPage = self.get_json(&["webhooks"]).await?;
        Ok(page.items)
    }

    async fn create_webhook(
        &self,
        registration: &WebhookRegistration,
    ) -> Result<Webhook, GatewayError> {
        let response = self
            .http
            .post(self.url(&["webhooks"])?)
            .bearer_auth(self.token.expose_secret())
            .json(registration)
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;
        decode_success(SERVICE, response).await
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .delete(self.url(&["webhooks", webhook_id])?)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected { service: SERVICE, status: status.as_u16() });
        }
        Ok(())
    }
}

/// Replaces every webhook named `app_name` with fresh `messages/created` and
/// `attachmentActions/created` registrations pointing at `target_url`.
pub async fn register_webhooks(
    chat: &dyn ChatApi,
    app_name: &str,
    target_url: &str,
) -> Result<Vec<Webhook>, GatewayError> {
    for stale in chat.list_webhooks().await?.into_iter().filter(|webhook| webhook.name == app_name) {
        if let Err(error) = chat.delete_webhook(&stale.id).await {
            warn!(
                event_name = "startup.webhook.delete_failed",
                webhook_id = %stale.id,
                error = %error,
                "could not delete stale webhook"
            );
        }
    }

    let mut created = Vec::with_capacity(2);
    for resource in [MESSAGES_RESOURCE, ATTACHMENT_ACTIONS_RESOURCE] {
        let webhook = chat
            .create_webhook(&WebhookRegistration {
                name: app_name.to_owned(),
                target_url: target_url.to_owned(),
                resource: resource.to_owned(),
                event: CREATED_EVENT.to_owned(),
            })
            .await?;
        info!(
            event_name = "startup.webhook.registered",
            webhook_id = %webhook.id,
            resource,
            target_url,
            "webhook registered"
        );
        created.push(webhook);
    }
    Ok(created)
}


#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode, Uri},
        routing::{get, post},
        Json, Router,
    };
    use cob_core::config::WebexConfig;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::{fakes::RecordingChatApi, register_webhooks, ChatApi, Person, Webhook, WebexClient};
    use crate::reply::OutboundMessage;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let address = listener.local_addr().expect("local address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    fn client(base_url: String) -> WebexClient {
        let config = WebexConfig {
            bot_token: "bot-token".to_owned().into(),
            bot_email: "cob@webex.bot".to_owned(),
            bot_url: "https://cob.example.com".to_owned(),
            bot_app_name: "cob".to_owned(),
            api_base_url: base_url,
        };
        let http = cob_gateways::http_client(Duration::from_secs(2)).expect("http client");
        WebexClient::new(&config, http)
    }

    #[tokio::test]
    async fn sends_messages_with_bearer_token() {
        let captured: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
        let sink = Arc::clone(&captured);
        let router = Router::new().route(
            "/messages",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let sink = Arc::clone(&sink);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_owned);
                    sink.lock().await.push((auth, body));
                    Json(json!({"id": "m-1"}))
                }
            }),
        );
        let client = client(serve(router).await);

        client
            .send_message(&OutboundMessage::markdown("room-1", "hi"))
            .await
            .expect("send message");

        let captured = captured.lock().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0.as_deref(), Some("Bearer bot-token"));
        assert_eq!(captured[0].1, json!({"roomId": "room-1", "markdown": "hi"}));
    }

    #[tokio::test]
    async fn fetches_attachment_action_inputs() {
        let router = Router::new().route(
            "/attachment/actions/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "id": id,
                    "type": "submit",
                    "roomId": "room-1",
                    "personId": "person-1",
                    "inputs": {"card_type": "choose_operation", "operation": "dns"}
                }))
            }),
        );
        let client = client(serve(router).await);

        let action = client.fetch_attachment_action("act-7").await.expect("fetch action");

        assert_eq!(action.id, "act-7");
        assert_eq!(action.room_id, "room-1");
        assert_eq!(action.inputs.get("card_type"), Some("choose_operation"));
        assert_eq!(action.inputs.get("operation"), Some("dns"));
    }

    #[tokio::test]
    async fn rejected_message_fetch_surfaces_status() {
        let router = Router::new()
            .route("/messages/{id}", get(|| async { StatusCode::FORBIDDEN }));
        let client = client(serve(router).await);

        let error = client.fetch_message("m-1").await.expect_err("must fail");
        assert_eq!(error, cob_gateways::GatewayError::Rejected { service: "Webex", status: 403 });
    }

    #[tokio::test]
    async fn webhook_supplied_ids_stay_a_single_path_segment() {
        let seen: Arc<Mutex<Vec<Uri>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let router = Router::new().fallback(move |uri: Uri| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(uri);
                StatusCode::NOT_FOUND
            }
        });
        let client = client(serve(router).await);

        let error = client.fetch_message("../people/me?").await.expect_err("must fail");
        assert_eq!(error, cob_gateways::GatewayError::Rejected { service: "Webex", status: 404 });
        let refused = client.delete_webhook("..").await.expect_err("must be refused");
        assert!(matches!(refused, cob_gateways::GatewayError::InvalidIdentifier { .. }));

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        let segments: Vec<_> = seen[0].path().trim_start_matches('/').split('/').collect();
        assert_eq!(segments.len(), 2, "unexpected path {}", seen[0].path());
        assert_eq!(segments[0], "messages");
        assert_eq!(seen[0].query(), None);
    }

    #[tokio::test]
    async fn registration_replaces_only_webhooks_named_after_the_app() {
        let chat = RecordingChatApi::default();
        chat.webhooks.lock().expect("webhooks lock").extend([
            Webhook {
                id: "old-1".to_owned(),
                name: "cob".to_owned(),
                target_url: "https://old.example.com".to_owned(),
                resource: "messages".to_owned(),
                event: "created".to_owned(),
            },
            Webhook {
                id: "other".to_owned(),
                name: "another-bot".to_owned(),
                target_url: "https://other.example.com".to_owned(),
                resource: "messages".to_owned(),
                event: "created".to_owned(),
            },
        ]);

        let created = register_webhooks(&chat, "cob", "https://cob.example.com")
            .await
            .expect("register");

        assert_eq!(*chat.deleted.lock().expect("deleted lock"), vec!["old-1".to_owned()]);
        let resources: Vec<_> = created.iter().map(|webhook| webhook.resource.as_str()).collect();
        assert_eq!(resources, vec!["messages", "attachmentActions"]);
        assert!(created.iter().all(|webhook| webhook.target_url == "https://cob.example.com"));
        let remaining = chat.list_webhooks().await.expect("list");
        assert!(remaining.iter().any(|webhook| webhook.id == "other"));
    }

    #[test]
    fn greeting_name_prefers_first_name() {
        let person = Person {
            id: "p".to_owned(),
            display_name: "Ada Lovelace".to_owned(),
            first_name: None,
        };
        assert_eq!(person.greeting_name(), "Ada");

        let person = Person { first_name: Some("Augusta".to_owned()), ..person };
        assert_eq!(person.greeting_name(), "Augusta");
    }
}
