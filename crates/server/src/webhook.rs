use std::{path::Path, sync::Arc};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use cob_webex::{DeliveryOutcome, EventContext, EventPipeline, WebhookEvent};
use tower_http::services::ServeDir;
use tracing::{debug, warn};

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct WebhookState {
    pipeline: Arc<EventPipeline>,
}

/// Webhook ingress on `/` and `/webhook`, `/health`, and rendered charts under `/media`.
pub fn router(pipeline: Arc<EventPipeline>, health_state: HealthState, media_dir: &Path) -> Router {
    Router::new()
        .route("/", post(receive_webhook))
        .route("/webhook", post(receive_webhook))
        .with_state(WebhookState { pipeline })
        .merge(health::router(health_state))
        .nest_service("/media", ServeDir::new(media_dir))
}

/// Acknowledges at once; the delivery runs to completion on its own task.
pub async fn receive_webhook(
    State(state): State<WebhookState>,
    Json(webhook): Json<WebhookEvent>,
) -> StatusCode {
    let ctx = EventContext::new();
    let pipeline = Arc::clone(&state.pipeline);

    tokio::spawn(async move {
        match pipeline.handle(webhook, &ctx).await {
            Ok(DeliveryOutcome::Replied { room_id }) => {
                debug!(correlation_id = %ctx.correlation_id, room_id = %room_id, "delivery completed");
            }
            Ok(DeliveryOutcome::Ignored { reason }) => {
                debug!(correlation_id = %ctx.correlation_id, reason, "delivery ignored");
            }
            Err(error) => {
                warn!(
                    event_name = "ingress.webhook.failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "webhook delivery failed"
                );
            }
        }
    });

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use cob_core::AppConfig;
    use cob_gateways::{
        AppendOutcome, ClockGateway, ClockLookup, DnsPolicyGateway, GatewayError, NamedResource,
        RenderedChart, TrafficGateway, TrafficTotal,
    };
    use cob_webex::{
        client::{AttachmentAction, MessageDetails, Person, Webhook, WebhookRegistration},
        ChatApi, OutboundMessage,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use super::router;
    use crate::{
        bootstrap::{assemble, Collaborators},
        health::HealthState,
    };

    #[derive(Clone, Default)]
    struct FakeChat {
        messages: Arc<Mutex<HashMap<String, MessageDetails>>>,
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
    }

    fn rejected() -> GatewayError {
        GatewayError::Rejected { service: "Webex", status: 404 }
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn send_message(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
            self.sent.lock().expect("sent lock").push(message.clone());
            Ok(())
        }

        async fn fetch_message(&self, message_id: &str) -> Result<MessageDetails, GatewayError> {
            self.messages.lock().expect("messages lock").get(message_id).cloned().ok_or_else(rejected)
        }

        async fn fetch_attachment_action(
            &self,
            _action_id: &str,
        ) -> Result<AttachmentAction, GatewayError> {
            Err(rejected())
        }

        async fn get_person(&self, _person_id: &str) -> Result<Person, GatewayError> {
            Err(rejected())
        }

        async fn list_webhooks(&self) -> Result<Vec<Webhook>, GatewayError> {
            Ok(Vec::new())
        }

        async fn create_webhook(
            &self,
            _registration: &WebhookRegistration,
        ) -> Result<Webhook, GatewayError> {
            Err(rejected())
        }

        async fn delete_webhook(&self, _webhook_id: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    struct Offline;

    #[async_trait]
    impl DnsPolicyGateway for Offline {
        async fn list_policy_lists(&self) -> Result<Vec<NamedResource>, GatewayError> {
            Ok(Vec::new())
        }

        async fn append_domain(
            &self,
            _domain: &str,
            _list_id: &str,
        ) -> Result<AppendOutcome, GatewayError> {
            Ok(AppendOutcome::Rejected(503))
        }
    }

    #[async_trait]
    impl TrafficGateway for Offline {
        async fn list_networks(&self) -> Result<Vec<NamedResource>, GatewayError> {
            Ok(Vec::new())
        }

        async fn top_traffic_destinations(
            &self,
            _network_id: &str,
            _window_secs: u64,
        ) -> Result<Vec<TrafficTotal>, GatewayError> {
            Ok(Vec::new())
        }

        async fn render_chart(&self, _totals: &[TrafficTotal]) -> Result<RenderedChart, GatewayError> {
            Err(GatewayError::Render("offline".to_owned()))
        }
    }

    #[async_trait]
    impl ClockGateway for Offline {
        async fn current_time(&self, _timezone: &str) -> Result<ClockLookup, GatewayError> {
            Ok(ClockLookup::ServiceError("offline".to_owned()))
        }
    }

    fn app(chat: &FakeChat, media_dir: &std::path::Path) -> Router {
        let mut config = AppConfig::default();
        config.webex.bot_email = "cob@webex.bot".to_owned();
        let application = assemble(
            config,
            Collaborators {
                chat: Arc::new(chat.clone()),
                dns: Arc::new(Offline),
                traffic: Arc::new(Offline),
                clock: Arc::new(Offline),
            },
        );
        router(application.pipeline, HealthState::new("cob"), media_dir)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn message_webhook_is_acknowledged_and_answered() {
        let chat = FakeChat::default();
        chat.messages.lock().expect("messages lock").insert(
            "m-1".to_owned(),
            MessageDetails {
                id: "m-1".to_owned(),
                room_id: "room-1".to_owned(),
                person_id: "p-1".to_owned(),
                person_email: "user@example.com".to_owned(),
                text: "/dosomething quickly".to_owned(),
            },
        );
        let media = tempfile::tempdir().expect("tempdir");

        let response = app(&chat, media.path())
            .oneshot(post_json(
                "/webhook",
                json!({
                    "id": "wh-1",
                    "name": "cob",
                    "resource": "messages",
                    "event": "created",
                    "data": {"id": "m-1", "roomId": "room-1", "personEmail": "user@example.com"}
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let mut sent = Vec::new();
        for _ in 0..50 {
            sent = chat.sent.lock().expect("sent lock").clone();
            if !sent.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].room_id, "room-1");
        assert_eq!(sent[0].markdown.as_deref(), Some("i did what you said - /dosomething quickly"));
    }

    #[tokio::test]
    async fn root_path_also_accepts_webhooks() {
        let chat = FakeChat::default();
        let media = tempfile::tempdir().expect("tempdir");

        let response = app(&chat, media.path())
            .oneshot(post_json(
                "/",
                json!({
                    "id": "wh-2",
                    "resource": "memberships",
                    "event": "created",
                    "data": {"id": "x"}
                }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_client_error() {
        let chat = FakeChat::default();
        let media = tempfile::tempdir().expect("tempdir");

        let response = app(&chat, media.path())
            .oneshot(post_json("/webhook", json!({"unexpected": true})))
            .await
            .expect("response");

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn rendered_charts_are_served_from_media_dir() {
        let chat = FakeChat::default();
        let media = tempfile::tempdir().expect("tempdir");
        std::fs::write(media.path().join("traffic-1.png"), b"\x89PNG\r\n\x1a\n").expect("write chart");

        let response = app(&chat, media.path())
            .oneshot(Request::builder().uri("/media/traffic-1.png").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn health_route_is_mounted() {
        let chat = FakeChat::default();
        let media = tempfile::tempdir().expect("tempdir");

        let response = app(&chat, media.path())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
