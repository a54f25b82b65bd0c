use cob_gateways::NamedResource;
use serde::Serialize;

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
pub const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
pub const ADAPTIVE_CARD_VERSION: &str = "1.2";

/// Name of the hidden input every card carries so the next submission can be
/// routed back to the workflow step that produced it.
pub const CARD_TYPE_FIELD: &str = "card_type";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub content_type: String,
    pub content: AdaptiveCard,
}

impl CardPayload {
    /// The `card_type` value embedded in this card, if any.
    pub fn discriminator(&self) -> Option<&str> {
        self.content.body.iter().find_map(CardElement::discriminator)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdaptiveCard {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub body: Vec<CardElement>,
    pub actions: Vec<CardAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardElement {
    ColumnSet { columns: Vec<Column> },
    TextBlock(TextBlock),
    #[serde(rename = "Input.Text")]
    TextInput(TextInput),
    #[serde(rename = "Input.ChoiceSet")]
    ChoiceInput(ChoiceInput),
    Image(Image),
}

impl CardElement {
    fn discriminator(&self) -> Option<&str> {
        match self {
            Self::ColumnSet { columns } => columns
                .iter()
                .flat_map(|column| column.items.iter())
                .find_map(CardElement::discriminator),
            Self::TextInput(input) if input.id == CARD_TYPE_FIELD => input.value.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Column,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Column {
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    pub width: u8,
    pub items: Vec<CardElement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TextWeight {
    Bolder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TextSize {
    Medium,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<TextWeight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<TextSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subtle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
}

impl TextBlock {
    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), weight: None, size: None, is_subtle: None, wrap: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub title: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CardAction {
    #[serde(rename = "Action.Submit")]
    Submit { title: String },
}

/// A `(label, value)` entry of a selection menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

impl From<NamedResource> for ChoiceOption {
    fn from(resource: NamedResource) -> Self {
        Self { label: resource.name, value: resource.id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChoiceField {
    pub id: String,
    pub label: String,
    pub placeholder: String,
    pub options: Vec<ChoiceOption>,
}

impl ChoiceField {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        placeholder: impl Into<String>,
        options: Vec<ChoiceOption>,
    ) -> Self {
        Self { id: id.into(), label: label.into(), placeholder: placeholder.into(), options }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextField {
    pub id: String,
    pub label: String,
    pub placeholder: String,
}

impl TextField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self { id: id.into(), label: label.into(), placeholder: placeholder.into() }
    }
}

/// Lays items out in the single wide column used by every card the bot sends
/// and appends the hidden `card_type` input on `build`.
pub struct CardBuilder {
    discriminator: String,
    items: Vec<CardElement>,
    actions: Vec<CardAction>,
}

impl CardBuilder {
    pub fn new(discriminator: impl Into<String>) -> Self {
        Self { discriminator: discriminator.into(), items: Vec::new(), actions: Vec::new() }
    }

    pub fn heading(mut self, text: impl Into<String>) -> Self {
        self.items.push(CardElement::TextBlock(TextBlock {
            weight: Some(TextWeight::Bolder),
            size: Some(TextSize::Medium),
            ..TextBlock::plain(text)
        }));
        self
    }

    pub fn subtitle(mut self, text: impl Into<String>) -> Self {
        self.items.push(CardElement::TextBlock(TextBlock {
            is_subtle: Some(true),
            wrap: Some(true),
            ..TextBlock::plain(text)
        }));
        self
    }

    pub fn label(mut self, text: impl Into<String>) -> Self {
        self.items.push(CardElement::TextBlock(TextBlock {
            wrap: Some(true),
            ..TextBlock::plain(text)
        }));
        self
    }

    pub fn text_field(self, field: &TextField) -> Self {
        let mut builder = self.label(field.label.clone());
        builder.items.push(CardElement::TextInput(TextInput {
            id: field.id.clone(),
            placeholder: Some(field.placeholder.clone()),
            value: None,
            is_visible: None,
        }));
        builder
    }

    pub fn choice_field(self, field: &ChoiceField) -> Self {
        let mut builder = self.label(field.label.clone());
        builder.items.push(CardElement::ChoiceInput(ChoiceInput {
            id: field.id.clone(),
            placeholder: Some(field.placeholder.clone()),
            choices: field
                .options
                .iter()
                .map(|option| Choice { title: option.label.clone(), value: option.value.clone() })
                .collect(),
        }));
        builder
    }

    pub fn image(mut self, url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        self.items.push(CardElement::Image(Image { url: url.into(), alt_text: Some(alt_text.into()) }));
        self
    }

    pub fn submit(mut self, title: impl Into<String>) -> Self {
        self.actions.push(CardAction::Submit { title: title.into() });
        self
    }

    pub fn build(mut self) -> CardPayload {
        self.items.push(CardElement::TextInput(TextInput {
            id: CARD_TYPE_FIELD.to_owned(),
            placeholder: None,
            value: Some(self.discriminator),
            is_visible: Some(false),
        }));

        CardPayload {
            content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_owned(),
            content: AdaptiveCard {
                schema: ADAPTIVE_CARD_SCHEMA.to_owned(),
                kind: "AdaptiveCard".to_owned(),
                version: ADAPTIVE_CARD_VERSION.to_owned(),
                body: vec![CardElement::ColumnSet {
                    columns: vec![Column { kind: ColumnKind::Column, width: 2, items: self.items }],
                }],
                actions: self.actions,
            },
        }
    }
}

/// A single-choice menu. An empty `field.options` still yields a valid card.
pub fn build_menu_card(
    title: &str,
    subtitle: &str,
    field: &ChoiceField,
    discriminator: &str,
) -> CardPayload {
    CardBuilder::new(discriminator)
        .heading(title)
        .subtitle(subtitle)
        .choice_field(field)
        .submit("Submit")
        .build()
}

pub fn build_form_card(
    title: &str,
    subtitle: &str,
    text_fields: &[TextField],
    choice_fields: &[ChoiceField],
    discriminator: &str,
) -> CardPayload {
    let builder = CardBuilder::new(discriminator).heading(title).subtitle(subtitle);
    let builder = text_fields.iter().fold(builder, CardBuilder::text_field);
    choice_fields.iter().fold(builder, CardBuilder::choice_field).submit("Submit").build()
}

pub fn build_image_card(title: &str, image_url: &str, discriminator: &str) -> CardPayload {
    build_captioned_image_card(title, image_url, &[], discriminator)
}

/// An image followed by one text line per caption, e.g. a chart legend.
pub fn build_captioned_image_card(
    title: &str,
    image_url: &str,
    captions: &[String],
    discriminator: &str,
) -> CardPayload {
    let builder = CardBuilder::new(discriminator).heading(title).image(image_url, title);
    captions
        .iter()
        .fold(builder, |builder, caption| builder.label(caption.clone()))
        .submit("Back to menu")
        .build()
}
