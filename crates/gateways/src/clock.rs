use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;

use crate::{decode_success, endpoint, transport_error, GatewayError};

pub const SERVICE: &str = "World clock";
pub const DEFAULT_WORLD_CLOCK_BASE_URL: &str = "http://worldclockapi.com/api/json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockReading {
    pub zone_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockLookup {
    Reading(ClockReading),
    /// The service answered but refused the zone (e.g. an unknown abbreviation).
    ServiceError(String),
}

#[async_trait]
pub trait ClockGateway: Send + Sync {
    async fn current_time(&self, timezone: &str) -> Result<ClockLookup, GatewayError>;
}

pub struct WorldClockClient {
    http: Client,
    base_url: String,
}

impl WorldClockClient {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, DEFAULT_WORLD_CLOCK_BASE_URL)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into().trim_end_matches('/').to_owned() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorldClockResponse {
    current_date_time: Option<String>,
    time_zone_name: Option<String>,
    service_response: Option<String>,
}

#[async_trait]
impl ClockGateway for WorldClockClient {
    async fn current_time(&self, timezone: &str) -> Result<ClockLookup, GatewayError> {
        let url = match endpoint(SERVICE, &self.base_url, &[timezone, "now"]) {
            Ok(url) => url,
            Err(GatewayError::InvalidIdentifier { value, .. }) => {
                return Ok(ClockLookup::ServiceError(format!("`{value}` is not a time zone")));
            }
            Err(error) => return Err(error),
        };
        let response =
            self.http.get(url).send().await.map_err(|error| transport_error(SERVICE, error))?;
        let body: WorldClockResponse = decode_success(SERVICE, response).await?;
        interpret(body)
    }
}

fn interpret(body: WorldClockResponse) -> Result<ClockLookup, GatewayError> {
    if let Some(message) = body.service_response.filter(|message| !message.trim().is_empty()) {
        return Ok(ClockLookup::ServiceError(message));
    }

    let raw = body.current_date_time.ok_or_else(|| GatewayError::Decode {
        service: SERVICE,
        message: "missing currentDateTime".to_owned(),
    })?;
    // The service omits seconds: `2018-11-11T22:09-05:00`.
    let parsed = DateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M%:z").map_err(|error| {
        GatewayError::Decode { service: SERVICE, message: format!("bad timestamp `{raw}`: {error}") }
    })?;

    Ok(ClockLookup::Reading(ClockReading {
        zone_name: body.time_zone_name.unwrap_or_default(),
        date: parsed.format("%Y-%m-%d").to_string(),
        time: parsed.format("%H:%M").to_string(),
    }))
}
