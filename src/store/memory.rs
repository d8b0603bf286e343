//! In-memory content store loaded from a JSON fixture.
//!
//! Serves local previews (`serve --fixtures`) and backs the HTTP tests. It
//! follows the same visibility and board-scoping rules as the SQL queries.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CardKey, ContentStore, ListingRow, Permalink, SEARCH_LIMIT, StoreError, StoreResult,
};
use crate::models::{Aggregator, Board, Card, Comment, DomainMapping, Label, List};
use crate::pagination::Window;
use crate::tenant::TenantKey;

/// Snapshot of every table the site reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub boards: Vec<Board>,
    pub domains: Vec<DomainMapping>,
    pub lists: Vec<List>,
    pub labels: Vec<Label>,
    pub cards: Vec<Card>,
    pub comments: Vec<Comment>,
    /// Merged preferences documents keyed by tenant identifier.
    pub preferences: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Fixture,
}

impl MemoryStore {
    pub fn new(data: Fixture) -> Self {
        Self { data }
    }

    pub fn from_json_str(raw: &str) -> StoreResult<Self> {
        let data = serde_json::from_str(raw)
            .map_err(|err| StoreError::Unavailable(format!("invalid fixture JSON: {err}")))?;
        Ok(Self::new(data))
    }

    pub fn from_json_file(path: &Path) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::Unavailable(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    fn list(&self, board_id: &str, list_id: &str) -> Option<&List> {
        self.data
            .lists
            .iter()
            .find(|list| list.id == list_id && list.board_id == board_id)
    }

    fn public_list(&self, board_id: &str, slug: &str) -> Option<&List> {
        self.data.lists.iter().find(|list| {
            list.board_id == board_id && list.slug == slug && list.visible && !list.pages_list
        })
    }

    fn board_label(&self, board_id: &str, key: &str) -> Option<&Label> {
        self.data
            .labels
            .iter()
            .find(|label| label.board_id == board_id && (label.slug == key || label.id == key))
    }

    /// Card as the site shows it: list slug filled in, label ids resolved.
    fn hydrate(&self, card: &Card, list: &List) -> Card {
        let mut card = card.clone();
        card.list_slug = list.slug.clone();
        card.is_page = list.pages_list;
        if card.labels.is_empty() {
            card.labels = card
                .label_ids
                .iter()
                .filter_map(|id| {
                    self.data
                        .labels
                        .iter()
                        .find(|label| &label.id == id && label.board_id == list.board_id)
                })
                .cloned()
                .collect();
        }
        card
    }

    /// Visible cards of visible, non-page lists on the board.
    fn published_cards<'a>(
        &'a self,
        board_id: &'a str,
    ) -> impl Iterator<Item = (&'a Card, &'a List)> {
        self.data.cards.iter().filter_map(move |card| {
            let list = self.list(board_id, &card.list_id)?;
            (card.visible && list.visible && !list.pages_list).then_some((card, list))
        })
    }

    fn find_card(&self, board_id: &str, key: &CardKey) -> Option<(&Card, &List)> {
        self.data.cards.iter().find_map(|card| {
            if !key.matches(card) {
                return None;
            }
            self.list(board_id, &card.list_id).map(|list| (card, list))
        })
    }
}

fn by_position(a: &Card, b: &Card) -> Ordering {
    a.pos.partial_cmp(&b.pos).unwrap_or(Ordering::Equal)
}

/// Newest first: due date descending with undated cards last, then id descending.
fn by_recency(a: &Card, b: &Card) -> Ordering {
    match (a.due, b.due) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.id.cmp(&a.id))
}

fn apply_window<T>(items: Vec<T>, window: Window) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(window.offset).unwrap_or(0))
        .take(usize::try_from(window.limit).unwrap_or(0))
        .collect()
}

fn search_terms(query: &str) -> Vec<String> {
    query
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Every term must occur; title hits weigh double. Zero means no match.
fn relevance(card: &Card, terms: &[String]) -> usize {
    let name = card.name.to_lowercase();
    let desc = card.desc.to_lowercase();
    let mut score = 0;
    for term in terms {
        let hits = name.matches(term.as_str()).count() * 2 + desc.matches(term.as_str()).count();
        if hits == 0 {
            return 0;
        }
        score += hits;
    }
    score
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn board_by_key(&self, key: &TenantKey) -> StoreResult<Option<Board>> {
        let board_id = match key {
            TenantKey::Subdomain(subdomain) => {
                return Ok(self
                    .data
                    .boards
                    .iter()
                    .find(|board| &board.subdomain == subdomain)
                    .cloned());
            }
            TenantKey::Domain(domain) => self
                .data
                .domains
                .iter()
                .find(|mapping| &mapping.domain == domain)
                .map(|mapping| mapping.board_id.as_str()),
        };
        Ok(board_id.and_then(|id| self.data.boards.iter().find(|board| board.id == id).cloned()))
    }

    async fn visible_lists(&self, board_id: &str) -> StoreResult<Vec<List>> {
        let mut lists: Vec<List> = self
            .data
            .lists
            .iter()
            .filter(|list| list.board_id == board_id && list.visible && !list.pages_list)
            .cloned()
            .collect();
        lists.sort_by(|a, b| a.pos.partial_cmp(&b.pos).unwrap_or(Ordering::Equal));
        Ok(lists)
    }

    async fn preferences(&self, tenant: &str) -> StoreResult<Option<String>> {
        Ok(self.data.preferences.get(tenant).map(Value::to_string))
    }

    async fn index_cards(&self, board_id: &str, window: Window) -> StoreResult<Vec<Card>> {
        let mut cards: Vec<Card> = self
            .published_cards(board_id)
            .map(|(card, list)| self.hydrate(card, list))
            .collect();
        cards.sort_by(by_recency);
        Ok(apply_window(cards, window))
    }

    async fn list_listing(
        &self,
        board_id: &str,
        list_slug: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>> {
        let Some(list) = self.public_list(board_id, list_slug) else {
            return Ok(Vec::new());
        };
        let mut cards: Vec<Card> = self
            .published_cards(board_id)
            .filter(|(_, owner)| owner.id == list.id)
            .map(|(card, owner)| self.hydrate(card, owner))
            .collect();
        cards.sort_by(by_position);

        let mut rows = vec![ListingRow::Header(Aggregator::from(list))];
        rows.extend(apply_window(cards, window).into_iter().map(ListingRow::Card));
        Ok(rows)
    }

    async fn label_listing(
        &self,
        board_id: &str,
        label_key: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>> {
        let Some(label) = self.board_label(board_id, label_key) else {
            return Ok(Vec::new());
        };
        let mut cards: Vec<Card> = self
            .published_cards(board_id)
            .filter(|(card, _)| card.label_ids.contains(&label.id))
            .map(|(card, list)| self.hydrate(card, list))
            .collect();
        cards.sort_by(by_position);

        let mut rows = vec![ListingRow::Header(Aggregator::from(label))];
        rows.extend(apply_window(cards, window).into_iter().map(ListingRow::Card));
        Ok(rows)
    }

    async fn card_detail(
        &self,
        board_id: &str,
        list_slug: &str,
        card_slug: &str,
    ) -> StoreResult<Vec<ListingRow>> {
        let Some(list) = self.public_list(board_id, list_slug) else {
            return Ok(Vec::new());
        };
        let mut rows = vec![ListingRow::Header(Aggregator::from(list))];
        if let Some((card, owner)) = self
            .published_cards(board_id)
            .find(|(card, owner)| owner.id == list.id && card.slug == card_slug)
        {
            rows.push(ListingRow::Card(self.hydrate(card, owner)));
        }
        Ok(rows)
    }

    async fn page_at(&self, board_id: &str, slug: &str) -> StoreResult<Option<Card>> {
        let page = self.data.cards.iter().find_map(|card| {
            let list = self.list(board_id, &card.list_id)?;
            (list.pages_list && card.visible && card.slug == slug).then(|| self.hydrate(card, list))
        });
        Ok(page)
    }

    async fn card_comments(&self, card_id: &str) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .data
            .comments
            .iter()
            .filter(|comment| comment.card_id == card_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(comments)
    }

    async fn card_permalink(
        &self,
        board_id: &str,
        key: &CardKey,
    ) -> StoreResult<Option<Permalink>> {
        Ok(self.find_card(board_id, key).and_then(|(card, list)| {
            Permalink::resolve(
                &card.slug,
                &card.name,
                card.visible,
                &list.slug,
                list.visible,
                list.pages_list,
            )
        }))
    }

    async fn list_slug_by_id(&self, board_id: &str, list_id: &str) -> StoreResult<Option<String>> {
        Ok(self.list(board_id, list_id).map(|list| list.slug.clone()))
    }

    async fn card_description(
        &self,
        board_id: &str,
        key: &CardKey,
        limit: usize,
    ) -> StoreResult<Option<String>> {
        Ok(self
            .find_card(board_id, key)
            .map(|(card, _)| card.desc.chars().take(limit).collect()))
    }

    async fn search(&self, board_id: &str, query: &str) -> StoreResult<Vec<Card>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(usize, Card)> = self
            .published_cards(board_id)
            .filter_map(|(card, list)| {
                let score = relevance(card, &terms);
                (score > 0).then(|| (score, self.hydrate(card, list)))
            })
            .collect();
        hits.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .cmp(left_score)
                .then_with(|| by_position(left, right))
        });
        Ok(hits
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(|(_, card)| card)
            .collect())
    }
}

/// The demo board used across the crate's tests.
#[cfg(test)]
pub(crate) fn sample_fixture() -> Fixture {
    serde_json::from_str(include_str!("../../fixtures/demo.json")).expect("demo fixture parses")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageRequest;

    const ACME: &str = "5f00000100000000000000b1";
    const OTHER: &str = "5f00000100000000000000b2";

    fn store() -> MemoryStore {
        MemoryStore::new(sample_fixture())
    }

    #[tokio::test]
    async fn boards_resolve_by_subdomain_and_domain() {
        let store = store();
        let by_sub = store
            .board_by_key(&TenantKey::Subdomain("acme".into()))
            .await
            .unwrap()
            .expect("acme");
        assert_eq!(by_sub.id, ACME);
        let by_domain = store
            .board_by_key(&TenantKey::Domain("www.acme.org".into()))
            .await
            .unwrap()
            .expect("mapped domain");
        assert_eq!(by_domain.id, ACME);
        assert!(store
            .board_by_key(&TenantKey::Domain("nobody.example.net".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn navigation_skips_hidden_and_page_lists() {
        let lists = store().visible_lists(ACME).await.unwrap();
        let slugs: Vec<_> = lists.iter().map(|list| list.slug.as_str()).collect();
        assert_eq!(slugs, vec!["design", "code"]);
    }

    #[tokio::test]
    async fn list_listing_has_header_and_visible_cards() {
        let rows = store()
            .list_listing(ACME, "design", PageRequest::first(7).window())
            .await
            .unwrap();
        assert!(matches!(
            &rows[0],
            ListingRow::Header(Aggregator::List { slug, .. }) if slug == "design"
        ));
        assert_eq!(rows.len(), 3, "secret-draft stays hidden");

        let hidden = store()
            .list_listing(ACME, "drafts", PageRequest::first(7).window())
            .await
            .unwrap();
        assert!(hidden.is_empty());
    }

    #[tokio::test]
    async fn lookups_are_scoped_to_the_board() {
        let store = store();
        let window = PageRequest::first(7).window();
        assert!(store.list_listing(ACME, "secret", window).await.unwrap().is_empty());
        assert!(store.label_listing(ACME, "private", window).await.unwrap().is_empty());
        assert_eq!(store.card_detail(ACME, "secret", "plans").await.unwrap().len(), 0);
        let key = CardKey::parse("Sec00001");
        assert!(store.card_permalink(ACME, &key).await.unwrap().is_none());
        assert!(store.card_permalink(OTHER, &key).await.unwrap().is_some());
        let hits = store.search(ACME, "secret plans").await.unwrap();
        assert!(hits.iter().all(|card| card.slug != "plans"));
    }

    #[tokio::test]
    async fn label_listing_accepts_slug_or_id() {
        let store = store();
        let window = PageRequest::first(7).window();
        let by_slug = store.label_listing(ACME, "rust", window).await.unwrap();
        assert_eq!(by_slug.len(), 3);
        let by_id = store
            .label_listing(ACME, "5f0000010000000000000c02", window)
            .await
            .unwrap();
        assert_eq!(by_id.len(), 2);
        assert!(matches!(&by_id[0], ListingRow::Header(agg) if agg.color() == Some("green")));
    }

    #[tokio::test]
    async fn index_orders_by_due_then_id() {
        let cards = store()
            .index_cards(ACME, PageRequest::first(7).window())
            .await
            .unwrap();
        let slugs: Vec<_> = cards.iter().map(|card| card.slug.as_str()).collect();
        assert_eq!(slugs, vec!["next-steps", "missing-slug-guide", "my-card"]);
        assert_eq!(cards[0].labels.len(), 2);
    }

    #[tokio::test]
    async fn permalinks_and_descriptions() {
        let store = store();
        let card = store
            .card_permalink(ACME, &CardKey::parse("Ab12Cd34"))
            .await
            .unwrap()
            .expect("known card");
        assert_eq!(card.path(), "/design/my-card/");
        let page = store
            .card_permalink(ACME, &CardKey::parse("Abt00001"))
            .await
            .unwrap()
            .expect("page card");
        assert_eq!(page.path(), "/about/");
        assert!(store
            .card_permalink(ACME, &CardKey::parse("Drf00001"))
            .await
            .unwrap()
            .is_none());

        let desc = store
            .card_description(ACME, &CardKey::parse("5f1a2b3c0000000000000002"), 5)
            .await
            .unwrap();
        assert_eq!(desc.as_deref(), Some("Where"));
    }

    #[tokio::test]
    async fn pages_and_comments() {
        let store = store();
        let about = store.page_at(ACME, "about").await.unwrap().expect("about page");
        assert!(about.is_page);
        assert_eq!(about.href(), "/about/");
        assert!(store.page_at(ACME, "my-card").await.unwrap().is_none());
        let comments = store
            .card_comments("5f1a2b3c0000000000000001")
            .await
            .unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author_name, "Carol");
    }

    #[tokio::test]
    async fn search_ranks_visible_cards() {
        let hits = store().search(ACME, "missing slug").await.unwrap();
        assert_eq!(hits[0].slug, "missing-slug-guide");
        assert!(store().search(ACME, "  ").await.unwrap().is_empty());
    }

    #[test]
    fn bad_fixture_is_unavailable() {
        let err = MemoryStore::from_json_str("{").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
