use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_WEBEX_API_BASE_URL: &str = "https://webexapis.com/v1";
pub const DEFAULT_UMBRELLA_BASE_URL: &str = "https://management.api.umbrella.com/v1";
pub const DEFAULT_MERAKI_BASE_URL: &str = "https://api.meraki.com/api/v1";

const MAX_GATEWAY_TIMEOUT_SECS: u64 = 60;
const MAX_TRAFFIC_WINDOW_SECS: u64 = 2_592_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub webex: WebexConfig,
    pub umbrella: UmbrellaConfig,
    pub meraki: MerakiConfig,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub demo: DemoConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WebexConfig {
    pub bot_token: SecretString,
    pub bot_email: String,
    /// Public URL the chat platform delivers webhooks to.
    pub bot_url: String,
    pub bot_app_name: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct UmbrellaConfig {
    pub management_key: SecretString,
    pub management_secret: SecretString,
    pub org_id: String,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct MerakiConfig {
    pub api_key: SecretString,
    pub org_id: String,
    pub base_url: String,
    pub traffic_window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub media_dir: PathBuf,
    /// Defaults to `{webex.bot_url}/media` when unset.
    pub media_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub timeout_secs: u64,
}

/// Demo-only switches. Nothing here is set in a production deployment.
#[derive(Clone, Debug, Default)]
pub struct DemoConfig {
    /// Substituted for the network the user picked on the traffic card.
    pub network_override: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Command-line flags. Secrets and upstream identities are not accepted here.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub demo_network_override: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webex: WebexConfig {
                bot_token: String::new().into(),
                bot_email: String::new(),
                bot_url: String::new(),
                bot_app_name: "cob".to_string(),
                api_base_url: DEFAULT_WEBEX_API_BASE_URL.to_string(),
            },
            umbrella: UmbrellaConfig {
                management_key: String::new().into(),
                management_secret: String::new().into(),
                org_id: String::new(),
                base_url: DEFAULT_UMBRELLA_BASE_URL.to_string(),
            },
            meraki: MerakiConfig {
                api_key: String::new().into(),
                org_id: String::new(),
                base_url: DEFAULT_MERAKI_BASE_URL.to_string(),
                traffic_window_secs: 7_200,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5000,
                media_dir: PathBuf::from("media"),
                media_base_url: None,
            },
            gateway: GatewayConfig { timeout_secs: 5 },
            demo: DemoConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cob.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Public base URL for rendered media, without a trailing slash.
    pub fn media_base_url(&self) -> String {
        match &self.server.media_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/media", self.webex.bot_url.trim_end_matches('/')),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(webex) = patch.webex {
            if let Some(bot_token) = webex.bot_token {
                self.webex.bot_token = secret_value(bot_token);
            }
            if let Some(bot_email) = webex.bot_email {
                self.webex.bot_email = bot_email;
            }
            if let Some(bot_url) = webex.bot_url {
                self.webex.bot_url = bot_url;
            }
            if let Some(bot_app_name) = webex.bot_app_name {
                self.webex.bot_app_name = bot_app_name;
            }
            if let Some(api_base_url) = webex.api_base_url {
                self.webex.api_base_url = api_base_url;
            }
        }

        if let Some(umbrella) = patch.umbrella {
            if let Some(management_key) = umbrella.management_key {
                self.umbrella.management_key = secret_value(management_key);
            }
            if let Some(management_secret) = umbrella.management_secret {
                self.umbrella.management_secret = secret_value(management_secret);
            }
            if let Some(org_id) = umbrella.org_id {
                self.umbrella.org_id = org_id;
            }
            if let Some(base_url) = umbrella.base_url {
                self.umbrella.base_url = base_url;
            }
        }

        if let Some(meraki) = patch.meraki {
            if let Some(api_key) = meraki.api_key {
                self.meraki.api_key = secret_value(api_key);
            }
            if let Some(org_id) = meraki.org_id {
                self.meraki.org_id = org_id;
            }
            if let Some(base_url) = meraki.base_url {
                self.meraki.base_url = base_url;
            }
            if let Some(traffic_window_secs) = meraki.traffic_window_secs {
                self.meraki.traffic_window_secs = traffic_window_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(media_dir) = server.media_dir {
                self.server.media_dir = media_dir;
            }
            if let Some(media_base_url) = server.media_base_url {
                self.server.media_base_url = Some(media_base_url);
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
        }

        if let Some(demo) = patch.demo {
            if let Some(network_override) = demo.network_override {
                self.demo.network_override = Some(network_override);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COB_BOT_TOKEN") {
            self.webex.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("COB_BOT_EMAIL") {
            self.webex.bot_email = value;
        }
        if let Some(value) = read_env("COB_BOT_URL") {
            self.webex.bot_url = value;
        }
        if let Some(value) = read_env("COB_BOT_APP_NAME") {
            self.webex.bot_app_name = value;
        }
        if let Some(value) = read_env("COB_WEBEX_API_BASE_URL") {
            self.webex.api_base_url = value;
        }

        if let Some(value) = read_env("UMBRELLA_MANAGEMENT_KEY") {
            self.umbrella.management_key = secret_value(value);
        }
        if let Some(value) = read_env("UMBRELLA_MANAGEMENT_SECRET") {
            self.umbrella.management_secret = secret_value(value);
        }
        if let Some(value) = read_env("UMBRELLA_ORG_ID") {
            self.umbrella.org_id = value;
        }
        if let Some(value) = read_env("UMBRELLA_BASE_URL") {
            self.umbrella.base_url = value;
        }

        if let Some(value) = read_env("MERAKI_API_KEY") {
            self.meraki.api_key = secret_value(value);
        }
        if let Some(value) = read_env("MERAKI_ORG_ID") {
            self.meraki.org_id = value;
        }
        if let Some(value) = read_env("MERAKI_BASE_URL") {
            self.meraki.base_url = value;
        }
        if let Some(value) = read_env("MERAKI_TRAFFIC_WINDOW_SECS") {
            self.meraki.traffic_window_secs = parse_u64("MERAKI_TRAFFIC_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("COB_SERVER_HOST") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("COB_SERVER_PORT") {
            self.server.port = parse_u16("COB_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COB_MEDIA_DIR") {
            self.server.media_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("COB_MEDIA_BASE_URL") {
            self.server.media_base_url = Some(value);
        }

        if let Some(value) = read_env("COB_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("COB_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COB_DEMO_NETWORK_ID") {
            self.demo.network_override = Some(value);
        }

        if let Some(value) = read_env("COB_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("COB_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(network_id) = overrides.demo_network_override {
            self.demo.network_override = Some(network_id);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_webex(&self.webex)?;
        validate_umbrella(&self.umbrella)?;
        validate_meraki(&self.meraki)?;
        validate_server(&self.server)?;
        validate_gateway(&self.gateway)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cob.toml"), PathBuf::from("config/cob.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn require(value: &str, key: &str, env_var: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required (set `{env_var}`)")));
    }
    Ok(())
}

fn require_http_url(value: &str, key: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn validate_webex(webex: &WebexConfig) -> Result<(), ConfigError> {
    require(webex.bot_token.expose_secret(), "webex.bot_token", "COB_BOT_TOKEN")?;
    require(&webex.bot_email, "webex.bot_email", "COB_BOT_EMAIL")?;
    if !webex.bot_email.contains('@') {
        return Err(ConfigError::Validation(
            "webex.bot_email must be the bot's email address".to_string(),
        ));
    }
    require(&webex.bot_url, "webex.bot_url", "COB_BOT_URL")?;
    require_http_url(&webex.bot_url, "webex.bot_url")?;
    require(&webex.bot_app_name, "webex.bot_app_name", "COB_BOT_APP_NAME")?;
    require_http_url(&webex.api_base_url, "webex.api_base_url")?;
    Ok(())
}

fn validate_umbrella(umbrella: &UmbrellaConfig) -> Result<(), ConfigError> {
    require(
        umbrella.management_key.expose_secret(),
        "umbrella.management_key",
        "UMBRELLA_MANAGEMENT_KEY",
    )?;
    require(
        umbrella.management_secret.expose_secret(),
        "umbrella.management_secret",
        "UMBRELLA_MANAGEMENT_SECRET",
    )?;
    require(&umbrella.org_id, "umbrella.org_id", "UMBRELLA_ORG_ID")?;
    require_http_url(&umbrella.base_url, "umbrella.base_url")?;
    Ok(())
}

fn validate_meraki(meraki: &MerakiConfig) -> Result<(), ConfigError> {
    require(meraki.api_key.expose_secret(), "meraki.api_key", "MERAKI_API_KEY")?;
    require(&meraki.org_id, "meraki.org_id", "MERAKI_ORG_ID")?;
    require_http_url(&meraki.base_url, "meraki.base_url")?;

    if meraki.traffic_window_secs == 0 || meraki.traffic_window_secs > MAX_TRAFFIC_WINDOW_SECS {
        return Err(ConfigError::Validation(format!(
            "meraki.traffic_window_secs must be in range 1..={MAX_TRAFFIC_WINDOW_SECS}"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if let Some(media_base_url) = &server.media_base_url {
        require_http_url(media_base_url, "server.media_base_url")?;
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.timeout_secs == 0 || gateway.timeout_secs > MAX_GATEWAY_TIMEOUT_SECS {
        return Err(ConfigError::Validation(format!(
            "gateway.timeout_secs must be in range 1..={MAX_GATEWAY_TIMEOUT_SECS}"
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    webex: Option<WebexPatch>,
    umbrella: Option<UmbrellaPatch>,
    meraki: Option<MerakiPatch>,
    server: Option<ServerPatch>,
    gateway: Option<GatewayPatch>,
    demo: Option<DemoPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WebexPatch {
    bot_token: Option<String>,
    bot_email: Option<String>,
    bot_url: Option<String>,
    bot_app_name: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UmbrellaPatch {
    management_key: Option<String>,
    management_secret: Option<String>,
    org_id: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MerakiPatch {
    api_key: Option<String>,
    org_id: Option<String>,
    base_url: Option<String>,
    traffic_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    media_dir: Option<PathBuf>,
    media_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DemoPatch {
    network_override: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
