use async_trait::async_trait;
use cob_core::config::UmbrellaConfig;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{decode_success, endpoint, transport_error, GatewayError, NamedResource};

pub const SERVICE: &str = "Umbrella";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    Success,
    Rejected(u16),
}

impl AppendOutcome {
    /// Only a plain 200 counts as accepted; any other status is a rejection.
    pub fn from_status(status: u16) -> Self {
        if status == 200 {
            Self::Success
        } else {
            Self::Rejected(status)
        }
    }
}

#[async_trait]
pub trait DnsPolicyGateway: Send + Sync {
    /// Destination lists in the order the API returns them.
    async fn list_policy_lists(&self) -> Result<Vec<NamedResource>, GatewayError>;

    async fn append_domain(
        &self,
        domain: &str,
        list_id: &str,
    ) -> Result<AppendOutcome, GatewayError>;
}

pub struct UmbrellaClient {
    http: Client,
    base_url: String,
    org_id: String,
    management_key: SecretString,
    management_secret: SecretString,
}

impl UmbrellaClient {
    pub fn new(config: &UmbrellaConfig, http: Client) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            org_id: config.org_id.clone(),
            management_key: config.management_key.clone(),
            management_secret: config.management_secret.clone(),
        }
    }

    fn destination_lists_url(&self, trailing: &[&str]) -> Result<Url, GatewayError> {
        let mut segments = vec!["organizations", self.org_id.as_str(), "destinationlists"];
        segments.extend_from_slice(trailing);
        endpoint(SERVICE, &self.base_url, &segments)
    }
}

#[derive(Debug, Serialize)]
struct DestinationPayload<'a> {
    destination: &'a str,
}

#[derive(Debug, Deserialize)]
struct DestinationListEnvelope {
    data: Vec<RawDestinationList>,
}

#[derive(Debug, Deserialize)]
struct RawDestinationList {
    name: String,
    id: Value,
}

#[async_trait]
impl DnsPolicyGateway for UmbrellaClient {
    async fn list_policy_lists(&self) -> Result<Vec<NamedResource>, GatewayError> {
        let response = self
            .http
            .get(self.destination_lists_url(&[])?)
            .basic_auth(
                self.management_key.expose_secret(),
                Some(self.management_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let body: Value = decode_success(SERVICE, response).await?;
        let lists = parse_policy_lists(body)?;
        debug!(count = lists.len(), "fetched umbrella destination lists");
        Ok(lists)
    }

    async fn append_domain(
        &self,
        domain: &str,
        list_id: &str,
    ) -> Result<AppendOutcome, GatewayError> {
        let url = self.destination_lists_url(&[list_id, "destinations"])?;
        let response = self
            .http
            .post(url)
            .basic_auth(
                self.management_key.expose_secret(),
                Some(self.management_secret.expose_secret()),
            )
            .json(&[DestinationPayload { destination: domain }])
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let outcome = AppendOutcome::from_status(response.status().as_u16());
        if let AppendOutcome::Rejected(status) = outcome {
            warn!(list_id, status, "umbrella rejected destination submission");
        }
        Ok(outcome)
    }
}

/// Reads `{"data": [{"name": ..., "id": ...}]}`, accepting string or numeric ids.
pub fn parse_policy_lists(body: Value) -> Result<Vec<NamedResource>, GatewayError> {
    let envelope: DestinationListEnvelope = serde_json::from_value(body)
        .map_err(|error| GatewayError::Decode { service: SERVICE, message: error.to_string() })?;

    envelope
        .data
        .into_iter()
        .map(|list| {
            let id = match list.id {
                Value::String(id) => id,
                Value::Number(id) => id.to_string(),
                other => {
                    return Err(GatewayError::Decode {
                        service: SERVICE,
                        message: format!("unsupported destination list id `{other}`"),
                    })
                }
            };
            Ok(NamedResource { name: list.name, id })
        })
        .collect()
}
