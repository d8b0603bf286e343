//! Board content as it comes out of the store.
//!
//! Lists, labels and cards are mirrored from Trello by an external importer.
//! Cards carry a few JSON blob columns (members, labels, checklists,
//! attachments); those are decoded once at the repository boundary into the
//! owned collections below, and decode failures are kept on the card as
//! [`DataIssue`]s instead of disappearing.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub const TRELLO_URL: &str = "https://trello.com";

/// Tenant root. One board per site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Board {
    pub id: String,
    pub subdomain: String,
    pub name: String,
    pub desc: String,
    /// Owning Trello member.
    pub user_id: String,
}

/// Maps a custom host name to a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainMapping {
    pub domain: String,
    pub board_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct List {
    pub id: String,
    pub board_id: String,
    pub name: String,
    pub slug: String,
    pub pos: f64,
    pub visible: bool,
    /// Cards of this list are standalone pages served at `/{card-slug}/`.
    pub pages_list: bool,
}

impl Default for List {
    fn default() -> Self {
        Self {
            id: String::new(),
            board_id: String::new(),
            name: String::new(),
            slug: String::new(),
            pos: 0.0,
            visible: true,
            pages_list: false,
        }
    }
}

impl List {
    pub fn href(&self) -> String {
        format!("/{}/", self.slug)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub board_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(deserialize_with = "null_as_default")]
    pub color: String,
}

impl Label {
    /// Unnamed Trello labels are plain colour swatches.
    pub fn name_or_spaces(&self) -> &str {
        if self.name.is_empty() {
            "       "
        } else {
            &self.name
        }
    }

    pub fn slug_or_id(&self) -> &str {
        if self.slug.is_empty() {
            &self.id
        } else {
            &self.slug
        }
    }

    pub fn href(&self) -> String {
        format!("/tag/{}/", self.slug_or_id())
    }
}

/// Heading of a listing page: the list or label whose cards are shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregator {
    List { name: String, slug: String },
    Label { name: String, slug: String, color: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorKind {
    List,
    Label,
}

impl Aggregator {
    pub fn kind(&self) -> AggregatorKind {
        match self {
            Aggregator::List { .. } => AggregatorKind::List,
            Aggregator::Label { .. } => AggregatorKind::Label,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Aggregator::List { name, .. } | Aggregator::Label { name, .. } => name,
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Aggregator::List { slug, .. } | Aggregator::Label { slug, .. } => slug,
        }
    }

    /// Only labels have a colour.
    pub fn color(&self) -> Option<&str> {
        match self {
            Aggregator::List { .. } => None,
            Aggregator::Label { color, .. } => Some(color),
        }
    }

    pub fn is_label(&self) -> bool {
        self.kind() == AggregatorKind::Label
    }

    /// Path of the first page of this aggregator.
    pub fn href(&self) -> String {
        match self {
            Aggregator::List { slug, .. } => format!("/{slug}/"),
            Aggregator::Label { slug, .. } => format!("/tag/{slug}/"),
        }
    }
}

impl From<&List> for Aggregator {
    fn from(list: &List) -> Self {
        Aggregator::List {
            name: list.name.clone(),
            slug: list.slug.clone(),
        }
    }
}

impl From<&Label> for Aggregator {
    fn from(label: &Label) -> Self {
        Aggregator::Label {
            name: label.name.clone(),
            slug: label.slug_or_id().to_string(),
            color: label.color.clone(),
        }
    }
}

/// A card member as stored in the card's users blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "id", default, deserialize_with = "null_as_default")]
    pub username: String,
}

impl Author {
    pub fn profile_url(&self) -> String {
        format!("{TRELLO_URL}/{}", self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Checklist {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub check_items: Vec<CheckItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckItem {
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

impl CheckItem {
    pub fn complete(&self) -> bool {
        self.state == "complete"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attachment {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub edge_color: String,
}

/// A JSON blob column that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIssue {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Card {
    pub id: String,
    pub short_link: String,
    pub list_id: String,
    pub list_slug: String,
    /// Set when the card lives in the board's pages list.
    pub is_page: bool,
    pub name: String,
    pub slug: String,
    pub desc: String,
    pub due: Option<DateTime<Utc>>,
    pub pos: f64,
    pub cover: String,
    pub visible: bool,
    pub label_ids: Vec<String>,
    pub users: Vec<Author>,
    pub labels: Vec<Label>,
    pub checklists: Vec<Checklist>,
    pub attachments: Vec<Attachment>,
    #[serde(skip)]
    pub issues: Vec<DataIssue>,
}

impl Default for Card {
    fn default() -> Self {
        Self {
            id: String::new(),
            short_link: String::new(),
            list_id: String::new(),
            list_slug: String::new(),
            is_page: false,
            name: String::new(),
            slug: String::new(),
            desc: String::new(),
            due: None,
            pos: 0.0,
            cover: String::new(),
            visible: true,
            label_ids: Vec::new(),
            users: Vec::new(),
            labels: Vec::new(),
            checklists: Vec::new(),
            attachments: Vec::new(),
            issues: Vec::new(),
        }
    }
}

impl Card {
    /// Canonical site path of the card.
    pub fn href(&self) -> String {
        if self.is_page {
            format!("/{}/", self.slug)
        } else {
            format!("/{}/{}/", self.list_slug, self.slug)
        }
    }

    pub fn trello_url(&self) -> String {
        let key = if self.short_link.is_empty() {
            &self.id
        } else {
            &self.short_link
        };
        format!("{TRELLO_URL}/c/{key}")
    }

    /// Publication date: the due date when set, otherwise the creation time
    /// encoded in the Trello id.
    pub fn date(&self) -> DateTime<Utc> {
        self.due
            .or_else(|| id_timestamp(&self.id))
            .unwrap_or_else(Utc::now)
    }

    pub fn has_cover(&self) -> bool {
        !self.cover.is_empty()
    }

    /// Plain-text start of the description, `None` when there is nothing to show.
    pub fn excerpt(&self, limit: usize) -> Option<String> {
        if limit == 0 {
            return None;
        }
        let trimmed = self.desc.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(snippet(trimmed, limit))
    }

    /// Decodes the JSON blob columns of a stored card row.
    pub fn decode_blobs(&mut self, blobs: CardBlobs) {
        self.users = decode_collection("users", &self.id, blobs.users, &mut self.issues);
        self.labels = decode_collection("labels", &self.id, blobs.labels, &mut self.issues);
        self.checklists =
            decode_collection("checklists", &self.id, blobs.checklists, &mut self.issues);
        self.attachments =
            decode_collection("attachments", &self.id, blobs.attachments, &mut self.issues);
    }
}

/// Raw blob columns of a card row.
#[derive(Debug, Clone, Default)]
pub struct CardBlobs {
    pub users: Option<Value>,
    pub labels: Option<Value>,
    pub checklists: Option<Value>,
    pub attachments: Option<Value>,
}

/// Trello writes `null` for unset fields; read it as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn decode_collection<T: DeserializeOwned>(
    field: &'static str,
    card_id: &str,
    raw: Option<Value>,
    issues: &mut Vec<DataIssue>,
) -> Vec<T> {
    let value = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::String(text)) if text.trim().is_empty() => return Vec::new(),
        // Some importers store the blob as JSON text inside a JSON string.
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(inner) => inner,
            Err(err) => {
                record_issue(field, card_id, err.to_string(), issues);
                return Vec::new();
            }
        },
        Some(value) => value,
    };
    match serde_json::from_value(value) {
        Ok(items) => items,
        Err(err) => {
            record_issue(field, card_id, err.to_string(), issues);
            Vec::new()
        }
    }
}

fn record_issue(field: &'static str, card_id: &str, message: String, issues: &mut Vec<DataIssue>) {
    warn!(card = %card_id, field, error = %message, "malformed card JSON column");
    issues.push(DataIssue { field, message });
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub card_id: String,
    pub author_name: String,
    pub author_url: String,
    pub body: String,
    pub source_display: String,
    pub source_url: String,
}

impl Comment {
    pub fn date(&self) -> DateTime<Utc> {
        id_timestamp(&self.id).unwrap_or_else(Utc::now)
    }
}

/// A navigation entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub text: String,
    pub url: String,
}

/// Trello ids start with eight hex digits of Unix time.
pub fn id_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let prefix = id.get(..8)?;
    let secs = i64::from_str_radix(prefix, 16).ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

pub fn pretty_date(date: &DateTime<Utc>) -> String {
    date.format("%-d %b %Y").to_string()
}

pub fn iso_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for (idx, ch) in text.chars().enumerate() {
        if idx >= max_chars {
            out.push('…');
            break;
        }
        out.push(ch);
    }
    out
}
