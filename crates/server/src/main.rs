mod bootstrap;
mod health;
mod webhook;

use std::{path::PathBuf, sync::atomic::Ordering, sync::Arc};

use anyhow::Result;
use clap::Parser;
use cob_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use cob_webex::register_webhooks;

use crate::health::HealthState;

#[derive(Debug, Parser)]
#[command(
    name = "cob-server",
    about = "Webhook listener for the cob chat bot",
    after_help = "Examples:\n  cob-server\n  cob-server --config config/cob.toml --port 8080\n\nCredentials are read from the config file or environment only."
)]
struct Args {
    #[arg(long, help = "Path to a TOML config file (defaults to cob.toml or config/cob.toml)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Address to bind the webhook listener to")]
    host: Option<String>,
    #[arg(long, help = "Port to bind the webhook listener to")]
    port: Option<u16>,
    #[arg(long, help = "Log level: trace, debug, info, warn or error")]
    log_level: Option<String>,
    #[arg(long, help = "Chart this Meraki network regardless of the card selection (debugging)")]
    demo_network: Option<String>,
}

impl Args {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                bind_address: self.host,
                port: self.port,
                log_level: self.log_level,
                demo_network_override: self.demo_network,
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use cob_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    // Config errors surface here and end the process with a non-zero status.
    let config = AppConfig::load(args.load_options())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let health_state = HealthState::new(app.config.webex.bot_app_name.clone());

    spawn_webhook_registration(&app, &health_state);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let router =
        webhook::router(Arc::clone(&app.pipeline), health_state, &app.config.server.media_dir);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "cob-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "cob-server stopping"
    );

    Ok(())
}

/// Registration failures are logged; the listener keeps running either way.
fn spawn_webhook_registration(app: &bootstrap::Application, health_state: &HealthState) {
    let chat = Arc::clone(&app.chat);
    let app_name = app.config.webex.bot_app_name.clone();
    let target_url = app.config.webex.bot_url.clone();
    let registered = Arc::clone(&health_state.registered_webhooks);

    tokio::spawn(async move {
        match register_webhooks(chat.as_ref(), &app_name, &target_url).await {
            Ok(webhooks) => registered.store(webhooks.len(), Ordering::Relaxed),
            Err(error) => tracing::error!(
                event_name = "startup.webhook.failed",
                correlation_id = "bootstrap",
                error = %error,
                "webhook registration failed"
            ),
        }
    });
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "failed to listen for shutdown signal");
    }
}
