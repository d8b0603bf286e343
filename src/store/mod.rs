//! Read access to mirrored board content.
//!
//! Listing queries share one shape: a header row for the list or label, then
//! the matching visible cards for the requested [`Window`]. Every lookup is
//! scoped to the requesting board.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Aggregator, Board, Card, Comment, List};
use crate::pagination::Window;
use crate::tenant::TenantKey;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{Fixture, MemoryStore};
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Maximum number of hits returned by [`ContentStore::search`].
pub const SEARCH_LIMIT: usize = 30;
/// Identifiers shorter than this are Trello short links, longer ones are ids.
pub const SHORT_LINK_MAX_LEN: usize = 15;

#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Decode(String),
    #[error("content unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One row of a listing or detail query.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingRow {
    Header(Aggregator),
    Card(Card),
}

/// A card reference from a permalink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardKey {
    Id(String),
    ShortLink(String),
}

impl CardKey {
    pub fn parse(identifier: &str) -> Self {
        if identifier.chars().count() < SHORT_LINK_MAX_LEN {
            CardKey::ShortLink(identifier.to_string())
        } else {
            CardKey::Id(identifier.to_string())
        }
    }

    pub fn value(&self) -> &str {
        match self {
            CardKey::Id(value) | CardKey::ShortLink(value) => value,
        }
    }

    pub fn matches(&self, card: &Card) -> bool {
        match self {
            CardKey::Id(id) => &card.id == id,
            CardKey::ShortLink(link) => &card.short_link == link,
        }
    }
}

/// Where a card permalink points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permalink {
    /// `None` for standalone pages.
    pub list_slug: Option<String>,
    pub card_segment: String,
}

impl Permalink {
    /// Applies the redirect rules to a located card. Cards in hidden lists
    /// have no public path; hidden cards resolve to their name so the
    /// resulting miss lands on a search for it.
    pub fn resolve(
        card_slug: &str,
        card_name: &str,
        card_visible: bool,
        list_slug: &str,
        list_visible: bool,
        pages_list: bool,
    ) -> Option<Self> {
        if !list_visible && !pages_list {
            return None;
        }
        let card_segment = if card_visible { card_slug } else { card_name };
        Some(Self {
            list_slug: (!pages_list).then(|| list_slug.to_string()),
            card_segment: card_segment.to_string(),
        })
    }

    pub fn path(&self) -> String {
        let card = percent_encoding::utf8_percent_encode(&self.card_segment, PATH_SEGMENT);
        match &self.list_slug {
            Some(list) => {
                let list = percent_encoding::utf8_percent_encode(list, PATH_SEGMENT);
                format!("/{list}/{card}/")
            }
            None => format!("/{card}/"),
        }
    }
}

/// Characters escaped inside one site path segment.
pub const PATH_SEGMENT: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Where the site's content comes from.
#[derive(Debug, Clone)]
pub enum StoreSource {
    /// A JSON fixture file served from memory.
    Fixtures(PathBuf),
    #[cfg(feature = "postgres")]
    Postgres {
        url: String,
        max_connections: u32,
    },
}

impl StoreSource {
    pub async fn open(&self) -> StoreResult<Arc<dyn ContentStore>> {
        match self {
            StoreSource::Fixtures(path) => Ok(Arc::new(MemoryStore::from_json_file(path)?)),
            #[cfg(feature = "postgres")]
            StoreSource::Postgres {
                url,
                max_connections,
            } => Ok(Arc::new(PgStore::connect(url, *max_connections).await?)),
        }
    }
}

/// Data the site reads. Implementations must apply the visibility rules:
/// hidden lists and cards never show up in listings or search.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn board_by_key(&self, key: &TenantKey) -> StoreResult<Option<Board>>;

    /// Visible lists for navigation, pages list excluded, by position.
    async fn visible_lists(&self, board_id: &str) -> StoreResult<Vec<List>>;

    /// Raw merged preferences document for a tenant identifier.
    async fn preferences(&self, tenant: &str) -> StoreResult<Option<String>>;

    /// Home listing: newest first, no header row.
    async fn index_cards(&self, board_id: &str, window: Window) -> StoreResult<Vec<Card>>;

    /// List header plus that list's cards by position.
    async fn list_listing(
        &self,
        board_id: &str,
        list_slug: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>>;

    /// Label header plus cards carrying it; `label_key` is a slug or an id.
    async fn label_listing(
        &self,
        board_id: &str,
        label_key: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>>;

    /// List header plus the single matching card, labels resolved.
    async fn card_detail(
        &self,
        board_id: &str,
        list_slug: &str,
        card_slug: &str,
    ) -> StoreResult<Vec<ListingRow>>;

    /// Standalone page card from the board's pages list.
    async fn page_at(&self, board_id: &str, slug: &str) -> StoreResult<Option<Card>>;

    async fn card_comments(&self, card_id: &str) -> StoreResult<Vec<Comment>>;

    async fn card_permalink(&self, board_id: &str, key: &CardKey)
    -> StoreResult<Option<Permalink>>;

    async fn list_slug_by_id(&self, board_id: &str, list_id: &str) -> StoreResult<Option<String>>;

    /// First `limit` characters of a card's raw description.
    async fn card_description(
        &self,
        board_id: &str,
        key: &CardKey,
        limit: usize,
    ) -> StoreResult<Option<String>>;

    /// Ranked free-text search, at most [`SEARCH_LIMIT`] cards.
    async fn search(&self, board_id: &str, query: &str) -> StoreResult<Vec<Card>>;
}
