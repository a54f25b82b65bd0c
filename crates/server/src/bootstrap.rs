use std::{sync::Arc, time::Duration};

use cob_core::config::{AppConfig, ConfigError};
use cob_gateways::{
    http_client, ClockGateway, DnsPolicyGateway, GatewayError, MerakiClient, PieChartRenderer,
    TrafficGateway, UmbrellaClient, WorldClockClient,
};
use cob_webex::{
    default_router, ChatApi, EventPipeline, RouterDependencies, WebexClient, WorkflowSettings,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub chat: Arc<dyn ChatApi>,
    pub pipeline: Arc<EventPipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] GatewayError),
}

/// Upstream collaborators, swappable so tests can run without network access.
pub struct Collaborators {
    pub chat: Arc<dyn ChatApi>,
    pub dns: Arc<dyn DnsPolicyGateway>,
    pub traffic: Arc<dyn TrafficGateway>,
    pub clock: Arc<dyn ClockGateway>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        let http = http_client(Duration::from_secs(config.gateway.timeout_secs))
            .map_err(BootstrapError::HttpClient)?;
        let renderer = PieChartRenderer::new(&config.server.media_dir, config.media_base_url());

        Ok(Self {
            chat: Arc::new(WebexClient::new(&config.webex, http.clone())),
            dns: Arc::new(UmbrellaClient::new(&config.umbrella, http.clone())),
            traffic: Arc::new(MerakiClient::new(&config.meraki, http.clone(), renderer)),
            clock: Arc::new(WorldClockClient::new(http)),
        })
    }
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let collaborators = Collaborators::from_config(&config)?;
    Ok(assemble(config, collaborators))
}

pub fn assemble(config: AppConfig, collaborators: Collaborators) -> Application {
    let workflow = WorkflowSettings {
        traffic_window_secs: config.meraki.traffic_window_secs,
        network_override: config.demo.network_override.clone(),
    };
    if let Some(network_id) = &workflow.network_override {
        info!(
            event_name = "system.bootstrap.demo_override",
            correlation_id = "bootstrap",
            network_id = %network_id,
            "demo network override enabled"
        );
    }

    let router = default_router(
        &config.webex.bot_app_name,
        RouterDependencies {
            chat: Arc::clone(&collaborators.chat),
            dns: collaborators.dns,
            traffic: collaborators.traffic,
            clock: collaborators.clock,
            workflow,
        },
    );
    info!(
        event_name = "system.bootstrap.router_ready",
        correlation_id = "bootstrap",
        commands = router.command_count(),
        "command router assembled"
    );

    let pipeline = EventPipeline::new(
        Arc::clone(&collaborators.chat),
        Arc::new(router),
        config.webex.bot_email.clone(),
    );

    Application { config: Arc::new(config), chat: collaborators.chat, pipeline: Arc::new(pipeline) }
}
