use std::collections::HashMap;

use async_trait::async_trait;
use cob_core::config::MerakiConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::{
    chart::{PieChartRenderer, RenderedChart},
    decode_success, endpoint, transport_error, GatewayError, NamedResource,
};

pub const SERVICE: &str = "Meraki";

/// Traffic categories kept when ranking destinations. Everything else
/// (non-web TCP, UDP, named applications) is dropped before aggregation.
pub const WEB_TRAFFIC_CATEGORIES: [&str; 2] = ["Miscellaneous web", "Miscellaneous secure web"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficEntry {
    pub destination: String,
    pub category: String,
    pub bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficTotal {
    pub destination: String,
    pub total_bytes: u64,
}

impl TrafficTotal {
    pub fn new(destination: impl Into<String>, total_bytes: u64) -> Self {
        Self { destination: destination.into(), total_bytes }
    }
}

#[async_trait]
pub trait TrafficGateway: Send + Sync {
    /// Networks in the order the API returns them.
    async fn list_networks(&self) -> Result<Vec<NamedResource>, GatewayError>;

    /// Web destinations ranked by total bytes, largest first.
    async fn top_traffic_destinations(
        &self,
        network_id: &str,
        window_secs: u64,
    ) -> Result<Vec<TrafficTotal>, GatewayError>;

    async fn render_chart(&self, totals: &[TrafficTotal]) -> Result<RenderedChart, GatewayError>;
}

pub struct MerakiClient {
    http: Client,
    base_url: String,
    org_id: String,
    api_key: SecretString,
    renderer: PieChartRenderer,
}

impl MerakiClient {
    pub fn new(config: &MerakiConfig, http: Client, renderer: PieChartRenderer) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            org_id: config.org_id.clone(),
            api_key: config.api_key.clone(),
            renderer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNetwork {
    id: String,
    name: String,
}

/// One row of the network traffic report. `sent`/`recv` are kilobytes.
#[derive(Debug, Deserialize)]
struct RawTrafficRecord {
    #[serde(default)]
    application: String,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    sent: f64,
    #[serde(default)]
    recv: f64,
}

impl From<RawTrafficRecord> for TrafficEntry {
    fn from(record: RawTrafficRecord) -> Self {
        let kilobytes = (record.sent + record.recv).max(0.0);
        Self {
            destination: record.destination.unwrap_or_default(),
            category: record.application,
            bytes: (kilobytes * 1024.0).round() as u64,
        }
    }
}

#[async_trait]
impl TrafficGateway for MerakiClient {
    async fn list_networks(&self) -> Result<Vec<NamedResource>, GatewayError> {
        let url =
            endpoint(SERVICE, &self.base_url, &["organizations", self.org_id.as_str(), "networks"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let networks: Vec<RawNetwork> = decode_success(SERVICE, response).await?;
        debug!(count = networks.len(), "fetched meraki networks");
        Ok(networks.into_iter().map(|network| NamedResource::new(network.name, network.id)).collect())
    }

    async fn top_traffic_destinations(
        &self,
        network_id: &str,
        window_secs: u64,
    ) -> Result<Vec<TrafficTotal>, GatewayError> {
        let url = endpoint(SERVICE, &self.base_url, &["networks", network_id, "traffic"])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .query(&[("timespan", window_secs)])
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;

        let records: Vec<RawTrafficRecord> = decode_success(SERVICE, response).await?;
        let record_count = records.len();
        let ranked = rank_destinations(records.into_iter().map(TrafficEntry::from));
        debug!(network_id, record_count, ranked = ranked.len(), "ranked meraki traffic");
        Ok(ranked)
    }

    async fn render_chart(&self, totals: &[TrafficTotal]) -> Result<RenderedChart, GatewayError> {
        self.renderer.render(totals).await
    }
}

/// Drops non-web and address-only destinations, sums bytes per destination,
/// and sorts descending. Equal totals fall back to destination name.
pub fn rank_destinations<I>(entries: I) -> Vec<TrafficTotal>
where
    I: IntoIterator<Item = TrafficEntry>,
{
    let mut totals: HashMap<String, u64> = HashMap::new();

    for entry in entries {
        if !entry.destination.chars().any(char::is_alphabetic) {
            continue;
        }
        if !WEB_TRAFFIC_CATEGORIES.contains(&entry.category.as_str()) {
            continue;
        }
        let total = totals.entry(entry.destination).or_default();
        *total = total.saturating_add(entry.bytes);
    }

    let mut ranked: Vec<TrafficTotal> = totals
        .into_iter()
        .map(|(destination, total_bytes)| TrafficTotal { destination, total_bytes })
        .collect();
    ranked.sort_by(|left, right| {
        right.total_bytes.cmp(&left.total_bytes).then_with(|| left.destination.cmp(&right.destination))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use axum::{extract::Query, routing::get, Json, Router};
    use cob_core::config::MerakiConfig;
    use serde_json::json;
    use std::collections::HashMap;

    use super::{rank_destinations, MerakiClient, TrafficEntry, TrafficGateway, TrafficTotal};
    use crate::{chart::PieChartRenderer, test_support, GatewayError, NamedResource};

    fn entry(destination: &str, category: &str, bytes: u64) -> TrafficEntry {
        TrafficEntry {
            destination: destination.to_owned(),
            category: category.to_owned(),
            bytes,
        }
    }

    #[test]
    fn address_only_destinations_are_filtered_out() {
        let ranked = rank_destinations(vec![
            entry("10.1.2.3", "Miscellaneous web", 10_000),
            entry("b.example.com", "Miscellaneous secure web", 50),
            entry("a.example.com", "Miscellaneous web", 100),
        ]);

        assert_eq!(
            ranked,
            vec![TrafficTotal::new("a.example.com", 100), TrafficTotal::new("b.example.com", 50)]
        );
    }

    #[test]
    fn non_web_categories_are_excluded_before_aggregation() {
        let ranked = rank_destinations(vec![
            entry("video.example.com", "Non-web TCP", 9_000),
            entry("video.example.com", "Miscellaneous web", 10),
            entry("dns.example.com", "UDP", 4_000),
        ]);

        assert_eq!(ranked, vec![TrafficTotal::new("video.example.com", 10)]);
    }

    #[test]
    fn repeated_destinations_are_summed_and_sorted_descending() {
        let ranked = rank_destinations(vec![
            entry("small.example.com", "Miscellaneous web", 5),
            entry("big.example.com", "Miscellaneous web", 40),
            entry("big.example.com", "Miscellaneous secure web", 60),
            entry("mid.example.com", "Miscellaneous secure web", 70),
        ]);

        let order: Vec<_> = ranked.iter().map(|total| total.destination.as_str()).collect();
        assert_eq!(order, vec!["big.example.com", "mid.example.com", "small.example.com"]);
        assert_eq!(ranked[0].total_bytes, 100);
    }

    fn client(base_url: String, media: &std::path::Path) -> MerakiClient {
        MerakiClient::new(
            &MerakiConfig {
                api_key: "meraki-key".to_owned().into(),
                org_id: "549236".to_owned(),
                base_url,
                traffic_window_secs: 7200,
            },
            test_support::client(),
            PieChartRenderer::new(media, "https://cob.example.com/media"),
        )
    }

    #[tokio::test]
    async fn submitted_network_id_cannot_leave_the_traffic_endpoint() {
        let (router, seen) = test_support::recording_upstream();
        let base_url = test_support::serve(router).await;
        let media = tempfile::tempdir().expect("tempdir");
        let client = client(base_url, media.path());

        client
            .top_traffic_destinations("../organizations/1/admins?", 60)
            .await
            .expect("traffic");

        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        let segments: Vec<_> = seen[0].path().trim_start_matches('/').split('/').collect();
        assert_eq!(segments.len(), 3, "unexpected path {}", seen[0].path());
        assert_eq!(segments[0], "networks");
        assert_eq!(segments[2], "traffic");
        assert_eq!(seen[0].query(), Some("timespan=60"));
    }

    #[tokio::test]
    async fn dot_segment_network_id_is_refused_before_any_request() {
        let (router, seen) = test_support::recording_upstream();
        let base_url = test_support::serve(router).await;
        let media = tempfile::tempdir().expect("tempdir");

        let error = client(base_url, media.path())
            .top_traffic_destinations("..", 60)
            .await
            .expect_err("must be refused");

        assert!(matches!(error, GatewayError::InvalidIdentifier { service: "Meraki", .. }));
        assert!(seen.lock().expect("seen lock").is_empty());
    }

    #[tokio::test]
    async fn client_fetches_networks_and_ranks_traffic() {
        let router = Router::new()
            .route(
                "/organizations/549236/networks",
                get(|| async {
                    Json(json!([
                        {"id": "N_2", "name": "Branch", "organizationId": "549236"},
                        {"id": "N_1", "name": "Austin HQ", "organizationId": "549236"}
                    ]))
                }),
            )
            .route(
                "/networks/N_1/traffic",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    assert_eq!(query.get("timespan").map(String::as_str), Some("7200"));
                    Json(json!([
                        {"application": "Miscellaneous web", "destination": "news.example.com", "sent": 1.0, "recv": 1.0},
                        {"application": "Miscellaneous secure web", "destination": "192.168.1.1", "sent": 50.0, "recv": 50.0},
                        {"application": "Miscellaneous secure web", "destination": null, "sent": 5.0, "recv": 5.0},
                        {"application": "Miscellaneous secure web", "destination": "mail.example.com", "sent": 2.0, "recv": 2.0}
                    ]))
                }),
            );
        let base_url = test_support::serve(router).await;
        let media = tempfile::tempdir().expect("tempdir");
        let client = client(base_url, media.path());

        let networks = client.list_networks().await.expect("networks");
        assert_eq!(
            networks,
            vec![NamedResource::new("Branch", "N_2"), NamedResource::new("Austin HQ", "N_1")]
        );

        let ranked = client.top_traffic_destinations("N_1", 7200).await.expect("traffic");
        assert_eq!(
            ranked,
            vec![
                TrafficTotal::new("mail.example.com", 4096),
                TrafficTotal::new("news.example.com", 2048)
            ]
        );
    }
}
