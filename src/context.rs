//! Everything one request needs to render a page.
//!
//! A [`RequestContext`] is built at the start of a request from the host
//! header and dropped with the response. Handlers fill in the content part
//! (aggregator, cards or card) before rendering.

use crate::models::{Aggregator, Board, Card, Comment, Link, List};
use crate::pagination::{FIRST_PAGE, Page, PageRequest};
use crate::preferences::Preferences;
use crate::store::{ContentStore, StoreResult};
use crate::tenant::{TenantKey, resolve_board};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: TenantKey,
    pub board: Board,
    /// Visible lists for navigation.
    pub lists: Vec<List>,
    pub prefs: Preferences,
    /// Scheme and host the request came in on, without a trailing slash.
    pub base_url: String,
    pub page: u32,
    pub has_next: bool,
    pub has_prev: bool,
    pub aggregator: Option<Aggregator>,
    pub cards: Vec<Card>,
    pub card: Option<Card>,
    pub comments: Vec<Comment>,
}

impl RequestContext {
    /// Resolves the tenant and loads navigation and preferences.
    /// `Ok(None)` means no board serves this host.
    pub async fn load(
        store: &dyn ContentStore,
        host: &str,
        base_domain: &str,
        base_url: String,
    ) -> StoreResult<Option<Self>> {
        let Some((tenant, board)) = resolve_board(store, host, base_domain).await? else {
            return Ok(None);
        };
        let lists = store.visible_lists(&board.id).await?;
        let prefs = store
            .preferences(tenant.identifier())
            .await?
            .map(|raw| Preferences::from_json(&raw))
            .unwrap_or_default();
        Ok(Some(Self::new(tenant, board, lists, prefs, base_url)))
    }

    pub fn new(
        tenant: TenantKey,
        board: Board,
        lists: Vec<List>,
        prefs: Preferences,
        base_url: String,
    ) -> Self {
        Self {
            tenant,
            board,
            lists,
            prefs,
            base_url,
            page: FIRST_PAGE,
            has_next: false,
            has_prev: false,
            aggregator: None,
            cards: Vec::new(),
            card: None,
            comments: Vec::new(),
        }
    }

    pub fn nav_items(&self) -> Vec<Link> {
        self.prefs.nav_items(&self.lists)
    }

    /// Page request sized by the tenant's posts-per-page preference.
    pub fn page_request(&self, number: u32) -> PageRequest {
        PageRequest::new(number, self.prefs.posts_per_page())
    }

    pub fn apply_page(&mut self, page: Page<Card>) {
        self.page = page.number;
        self.has_next = page.has_next;
        self.has_prev = page.has_prev;
        self.cards = page.items;
    }

    pub fn next_page(&self) -> u32 {
        self.page + 1
    }

    pub fn prev_page(&self) -> u32 {
        self.page.saturating_sub(1).max(FIRST_PAGE)
    }

    /// Absolute URL for a site path.
    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
