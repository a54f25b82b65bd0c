//! External Data Gateways - adapters over the cloud management APIs
//!
//! - **DNS policy** (`umbrella`) - list destination lists, append a domain
//! - **Traffic analytics** (`meraki`) - list networks, rank top destinations
//! - **Charts** (`chart`) - PNG pie chart of the top destinations, written to the media dir
//! - **World clock** (`clock`) - current time lookup backing the `/time` command
//!
//! Every call goes through a `reqwest::Client` built by [`http_client`], which
//! carries the bounded per-request timeout. A timeout surfaces as
//! [`GatewayError::Unreachable`], never as a hang. Request URLs come from
//! [`endpoint`], so ids taken from cards or webhooks stay a single path segment.

use std::time::Duration;

use cob_core::ApplicationError;
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub mod chart;
pub mod clock;
pub mod meraki;
pub mod umbrella;

pub use chart::{ChartSlice, PieChartRenderer, RenderedChart};
pub use clock::{ClockGateway, ClockLookup, ClockReading, WorldClockClient};
pub use meraki::{MerakiClient, TrafficEntry, TrafficGateway, TrafficTotal};
pub use umbrella::{AppendOutcome, DnsPolicyGateway, UmbrellaClient};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{service} returned status {status}")]
    Rejected { service: &'static str, status: u16 },
    #[error("{service} is unreachable: {message}")]
    Unreachable { service: &'static str, message: String },
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: &'static str, message: String },
    #[error("`{value}` is not a valid {service} identifier")]
    InvalidIdentifier { service: &'static str, value: String },
    #[error("chart rendering failed: {0}")]
    Render(String),
}

impl GatewayError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Rejected { service, .. }
            | Self::Unreachable { service, .. }
            | Self::Decode { service, .. }
            | Self::InvalidIdentifier { service, .. } => service,
            Self::Render(_) => chart::SERVICE,
        }
    }
}

impl From<GatewayError> for ApplicationError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Rejected { service, status } => {
                Self::UpstreamRejected { service: service.to_owned(), status }
            }
            GatewayError::Unreachable { service, message }
            | GatewayError::Decode { service, message } => {
                Self::UpstreamUnreachable { service: service.to_owned(), message }
            }
            GatewayError::InvalidIdentifier { service, value } => {
                Self::MalformedCardSubmission(format!("`{value}` is not a valid {service} identifier"))
            }
            GatewayError::Render(message) => {
                Self::UpstreamUnreachable { service: chart::SERVICE.to_owned(), message }
            }
        }
    }
}

/// A `(name, id)` pair returned by an upstream listing call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedResource {
    pub name: String,
    pub id: String,
}

impl NamedResource {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self { name: name.into(), id: id.into() }
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|error| {
        GatewayError::Unreachable { service: "http", message: error.to_string() }
    })
}

/// Appends `segments` to `base`, one percent-encoded path segment each.
/// Blank and dot segments are refused.
pub fn endpoint(service: &'static str, base: &str, segments: &[&str]) -> Result<Url, GatewayError> {
    if let Some(segment) = segments.iter().find(|segment| matches!(segment.trim(), "" | "." | "..")) {
        return Err(GatewayError::InvalidIdentifier { service, value: (*segment).to_owned() });
    }

    let mut url = Url::parse(base).map_err(|error| GatewayError::Unreachable {
        service,
        message: format!("invalid base url `{base}`: {error}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| GatewayError::Unreachable {
            service,
            message: format!("base url `{base}` cannot carry a path"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub fn transport_error(service: &'static str, error: reqwest::Error) -> GatewayError {
    let message = if error.is_timeout() {
        "request timed out".to_owned()
    } else {
        error.to_string()
    };
    GatewayError::Unreachable { service, message }
}

pub async fn decode_success<T>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Rejected { service, status: status.as_u16() });
    }

    response
        .json::<T>()
        .await
        .map_err(|error| GatewayError::Decode { service, message: error.to_string() })
}
