use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use cob_core::ApplicationError;
use cob_gateways::{chart::CHART_TOP_N, AppendOutcome, DnsPolicyGateway, TrafficGateway};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    cards::{
        build_captioned_image_card, build_form_card, build_menu_card, CardPayload, ChoiceField,
        ChoiceOption, TextField, CARD_TYPE_FIELD,
    },
    client::ChatApi,
    commands::{CommandHandler, CommandRequest},
    events::{CardSubmission, IncomingEvent},
    reply::Reply,
};

pub const DESTINATION_ADDED: &str = "Destination added successfully!";
pub const DESTINATION_FAILED: &str = "Error occurred during destination submission.";
pub const NO_TRAFFIC_CAPTION: &str = "No web traffic in this window.";

pub const OPERATION_FIELD: &str = "operation";
pub const DOMAIN_FIELD: &str = "domain";
pub const DESTINATION_LIST_FIELD: &str = "destination_list";
pub const NETWORK_FIELD: &str = "network";

/// Workflow step that produced a card, carried in its hidden `card_type` input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardType {
    ChooseOperation,
    DnsPolicyEntry,
    TrafficChooseNetwork,
    TrafficChart,
}

impl CardType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChooseOperation => "choose_operation",
            Self::DnsPolicyEntry => "dns_policy_entry",
            Self::TrafficChooseNetwork => "traffic_choose_network",
            Self::TrafficChart => "traffic_chart",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "choose_operation" => Some(Self::ChooseOperation),
            "dns_policy_entry" => Some(Self::DnsPolicyEntry),
            "traffic_choose_network" => Some(Self::TrafficChooseNetwork),
            "traffic_chart" => Some(Self::TrafficChart),
            _ => None,
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Traffic,
    Dns,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traffic => "traffic",
            Self::Dns => "dns",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "traffic" => Some(Self::Traffic),
            "dns" => Some(Self::Dns),
            _ => None,
        }
    }
}

/// Field values of a submitted card, as returned by the attachment-action fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CardInputs(BTreeMap<String, Value>);

impl CardInputs {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(key, value)| (key.into(), Value::String(value.into()))).collect())
    }

    /// Trimmed string value of `name`; blank values read as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn require(&self, name: &str) -> Result<&str, ApplicationError> {
        self.get(name).ok_or_else(|| {
            ApplicationError::MalformedCardSubmission(format!("missing required field `{name}`"))
        })
    }

    pub fn card_type(&self) -> Result<CardType, ApplicationError> {
        let raw = self.require(CARD_TYPE_FIELD)?;
        CardType::parse(raw).ok_or_else(|| {
            ApplicationError::MalformedCardSubmission(format!("unknown card type `{raw}`"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub traffic_window_secs: u64,
    /// Fixed network id used instead of the submitted one. Demo setups only.
    pub network_override: Option<String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { traffic_window_secs: 7200, network_override: None }
    }
}

/// Entry card of every workflow.
pub fn operation_menu_card() -> CardPayload {
    build_menu_card(
        "Cob Operations",
        "What would you like to do?",
        &ChoiceField::new(
            OPERATION_FIELD,
            "Operation",
            "Choose an operation...",
            vec![
                ChoiceOption::new("View Meraki Traffic", Operation::Traffic.as_str()),
                ChoiceOption::new("Add Umbrella Domain Policy", Operation::Dns.as_str()),
            ],
        ),
        CardType::ChooseOperation.as_str(),
    )
}

pub fn operation_menu_reply() -> Reply {
    Reply::card("Choose an operation from the card below.", operation_menu_card())
}

pub struct CardActionDispatcher {
    chat: Arc<dyn ChatApi>,
    dns: Arc<dyn DnsPolicyGateway>,
    traffic: Arc<dyn TrafficGateway>,
    settings: WorkflowSettings,
}

impl CardActionDispatcher {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        dns: Arc<dyn DnsPolicyGateway>,
        traffic: Arc<dyn TrafficGateway>,
        settings: WorkflowSettings,
    ) -> Self {
        Self { chat, dns, traffic, settings }
    }

    /// Fetches the submitted fields and runs the step they name.
    pub async fn submit(
        &self,
        submission: &CardSubmission,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let action = self.chat.fetch_attachment_action(&submission.attachment_action_id).await?;
        self.advance(&action.inputs, correlation_id).await
    }

    pub async fn advance(
        &self,
        inputs: &CardInputs,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let card_type = inputs.card_type()?;
        info!(
            event_name = "workflow.card.dispatched",
            correlation_id,
            card_type = %card_type,
            "card submission dispatched"
        );

        match card_type {
            CardType::ChooseOperation => {
                let raw = inputs.require(OPERATION_FIELD)?;
                match Operation::parse(raw) {
                    Some(Operation::Dns) => self.dns_policy_form().await,
                    Some(Operation::Traffic) => self.network_menu().await,
                    None => Err(ApplicationError::MalformedCardSubmission(format!(
                        "unknown operation `{raw}`"
                    ))),
                }
            }
            CardType::DnsPolicyEntry => {
                let domain = inputs.require(DOMAIN_FIELD)?;
                let list_id = inputs.require(DESTINATION_LIST_FIELD)?;
                self.append_destination(domain, list_id, correlation_id).await
            }
            CardType::TrafficChooseNetwork => {
                let network_id = self.resolve_network(inputs)?;
                self.traffic_chart(&network_id).await
            }
            CardType::TrafficChart => Ok(operation_menu_reply()),
        }
    }

    async fn dns_policy_form(&self) -> Result<Reply, ApplicationError> {
        let lists = self.dns.list_policy_lists().await?;
        let card = build_form_card(
            "Add Umbrella Domain Policy",
            "Enter a domain and pick the destination list it belongs on.",
            &[TextField::new(DOMAIN_FIELD, "Domain", "example.com")],
            &[ChoiceField::new(
                DESTINATION_LIST_FIELD,
                "Destination List",
                "Choose a destination list...",
                lists.into_iter().map(ChoiceOption::from).collect(),
            )],
            CardType::DnsPolicyEntry.as_str(),
        );
        Ok(Reply::card("Fill in the card below to add a destination.", card))
    }

    async fn network_menu(&self) -> Result<Reply, ApplicationError> {
        let networks = self.traffic.list_networks().await?;
        let card = build_menu_card(
            "View Meraki Traffic",
            "Select a network to chart its top web destinations.",
            &ChoiceField::new(
                NETWORK_FIELD,
                "Network",
                "Choose a network...",
                networks.into_iter().map(ChoiceOption::from).collect(),
            ),
            CardType::TrafficChooseNetwork.as_str(),
        );
        Ok(Reply::card("Choose a network from the card below.", card))
    }

    async fn append_destination(
        &self,
        domain: &str,
        list_id: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        let outcome = self.dns.append_domain(domain, list_id).await?;
        info!(
            event_name = "workflow.dns.appended",
            correlation_id,
            list_id,
            accepted = outcome == AppendOutcome::Success,
            "destination submitted"
        );
        Ok(match outcome {
            AppendOutcome::Success => Reply::text(DESTINATION_ADDED),
            AppendOutcome::Rejected(_) => Reply::text(DESTINATION_FAILED),
        })
    }

    fn resolve_network(&self, inputs: &CardInputs) -> Result<String, ApplicationError> {
        if let Some(network_id) = &self.settings.network_override {
            debug!(network_id = %network_id, "demo network override in effect");
            return Ok(network_id.clone());
        }
        inputs.require(NETWORK_FIELD).map(str::to_owned)
    }

    async fn traffic_chart(&self, network_id: &str) -> Result<Reply, ApplicationError> {
        let totals = self
            .traffic
            .top_traffic_destinations(network_id, self.settings.traffic_window_secs)
            .await?;
        let top = &totals[..totals.len().min(CHART_TOP_N)];
        let chart = self.traffic.render_chart(top).await?;

        let captions: Vec<String> = if chart.legend.is_empty() {
            vec![NO_TRAFFIC_CAPTION.to_owned()]
        } else {
            chart.legend.iter().map(ToString::to_string).collect()
        };
        let card = build_captioned_image_card(
            "Top Web Destinations",
            &chart.url,
            &captions,
            CardType::TrafficChart.as_str(),
        );
        let fallback = match chart.legend.first() {
            Some(leader) => format!(
                "Top web destination on network {network_id}: **{}**",
                leader.destination
            ),
            None => format!("No web traffic recorded on network {network_id}."),
        };
        Ok(Reply::card(fallback, card))
    }
}

#[async_trait]
impl CommandHandler for CardActionDispatcher {
    async fn handle(&self, request: &CommandRequest) -> Result<Reply, ApplicationError> {
        match &request.event {
            IncomingEvent::CardSubmission(submission) => {
                self.submit(submission, &request.correlation_id).await
            }
            IncomingEvent::TextMessage(_) => Err(ApplicationError::MalformedCardSubmission(
                "expected a card submission".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::{path::PathBuf, sync::Mutex};

    use async_trait::async_trait;
    use cob_gateways::{
        AppendOutcome, DnsPolicyGateway, GatewayError, NamedResource, RenderedChart,
        TrafficGateway, TrafficTotal,
    };

    pub struct FakeDnsGateway {
        pub lists: Vec<NamedResource>,
        pub outcome: Result<AppendOutcome, GatewayError>,
        pub appended: Mutex<Vec<(String, String)>>,
    }

    impl FakeDnsGateway {
        pub fn new(lists: Vec<NamedResource>, outcome: Result<AppendOutcome, GatewayError>) -> Self {
            Self { lists, outcome, appended: Mutex::default() }
        }
    }

    #[async_trait]
    impl DnsPolicyGateway for FakeDnsGateway {
        async fn list_policy_lists(&self) -> Result<Vec<NamedResource>, GatewayError> {
            Ok(self.lists.clone())
        }

        async fn append_domain(
            &self,
            domain: &str,
            list_id: &str,
        ) -> Result<AppendOutcome, GatewayError> {
            self.appended
                .lock()
                .expect("appended lock")
                .push((domain.to_owned(), list_id.to_owned()));
            self.outcome.clone()
        }
    }

    pub struct FakeTrafficGateway {
        pub networks: Vec<NamedResource>,
        pub totals: Vec<TrafficTotal>,
        pub requested: Mutex<Vec<(String, u64)>>,
        pub charted: Mutex<Vec<Vec<TrafficTotal>>>,
    }

    impl FakeTrafficGateway {
        pub fn new(networks: Vec<NamedResource>, totals: Vec<TrafficTotal>) -> Self {
            Self { networks, totals, requested: Mutex::default(), charted: Mutex::default() }
        }
    }

    #[async_trait]
    impl TrafficGateway for FakeTrafficGateway {
        async fn list_networks(&self) -> Result<Vec<NamedResource>, GatewayError> {
            Ok(self.networks.clone())
        }

        async fn top_traffic_destinations(
            &self,
            network_id: &str,
            window_secs: u64,
        ) -> Result<Vec<TrafficTotal>, GatewayError> {
            self.requested.lock().expect("requested lock").push((network_id.to_owned(), window_secs));
            Ok(self.totals.clone())
        }

        async fn render_chart(&self, totals: &[TrafficTotal]) -> Result<RenderedChart, GatewayError> {
            self.charted.lock().expect("charted lock").push(totals.to_vec());
            Ok(RenderedChart {
                path: PathBuf::from("media/traffic-test.png"),
                url: "https://cob.example.com/media/traffic-test.png".to_owned(),
                legend: cob_gateways::chart::chart_legend(totals),
            })
        }
    }
}
