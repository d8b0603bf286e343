//! Postgres content store.
//!
//! Listing queries return a header row (`sort = 0`) describing the list or
//! label, followed by the card rows of the requested window. Both halves of
//! the UNION share one column layout so a single decoder handles every row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use super::{
    CardKey, ContentStore, ListingRow, Permalink, SEARCH_LIMIT, StoreError, StoreResult,
};
use crate::models::{Aggregator, Board, Card, CardBlobs, Comment, List};
use crate::pagination::Window;
use crate::tenant::TenantKey;

/// Card columns, in the order every listing query selects them.
const CARD_COLUMNS: &str = r#"
    'card' AS kind,
    1 AS sort,
    cards.id,
    cards.list_id,
    coalesce(cards."shortLink", '') AS short_link,
    cards.name,
    cards.slug,
    coalesce(cards."desc", '') AS "desc",
    cards.due::timestamptz AS due,
    cards.pos::float8 AS pos,
    coalesce(cards.cover, '') AS cover,
    cards.visible,
    lists.slug AS list_slug,
    lists."pagesList" AS is_page,
    coalesce(cards.labels, '{}')::text[] AS label_ids,
    array_to_json(array(
        SELECT row_to_json(l) FROM labels AS l
        WHERE l.id = ANY(cards.labels) AND l.board_id = lists.board_id
    )) AS labels,
    cards.users::json AS users,
    cards.checklists::json AS checklists,
    cards.attachments::json AS attachments,
    '' AS color"#;

/// Placeholder columns for a list header row.
const LIST_HEADER: &str = r#"
    'list' AS kind, 0 AS sort, id, '' AS list_id, '' AS short_link, name, slug,
    '' AS "desc", NULL::timestamptz AS due, 0::float8 AS pos, '' AS cover,
    true AS visible, slug AS list_slug, false AS is_page, '{}'::text[] AS label_ids,
    NULL::json AS labels, NULL::json AS users, NULL::json AS checklists,
    NULL::json AS attachments, '' AS color"#;

/// Placeholder columns for a label header row. Unnamed labels are keyed by id.
const LABEL_HEADER: &str = r#"
    'label' AS kind, 0 AS sort, id, '' AS list_id, '' AS short_link, name,
    coalesce(nullif(slug, ''), id) AS slug,
    '' AS "desc", NULL::timestamptz AS due, 0::float8 AS pos, '' AS cover,
    true AS visible, '' AS list_slug, false AS is_page, '{}'::text[] AS label_ids,
    NULL::json AS labels, NULL::json AS users, NULL::json AS checklists,
    NULL::json AS attachments, coalesce(color, '') AS color"#;

const PUBLISHED: &str =
    r#"lists.board_id = $1 AND lists.visible AND NOT lists."pagesList" AND cards.visible"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn listing(
        &self,
        sql: &str,
        board_id: &str,
        key: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>> {
        let rows = sqlx::query(sql)
            .bind(board_id)
            .bind(key)
            .bind(window.offset)
            .bind(window.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(listing_row).collect()
    }
}

fn card_key_column(key: &CardKey) -> &'static str {
    match key {
        CardKey::Id(_) => "cards.id",
        CardKey::ShortLink(_) => r#"cards."shortLink""#,
    }
}

fn listing_row(row: &PgRow) -> StoreResult<ListingRow> {
    let kind: String = row.try_get("kind")?;
    match kind.as_str() {
        "list" => Ok(ListingRow::Header(Aggregator::List {
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
        })),
        "label" => Ok(ListingRow::Header(Aggregator::Label {
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            color: row.try_get("color")?,
        })),
        "card" => Ok(ListingRow::Card(card_row(row)?)),
        other => Err(StoreError::Decode(format!("unexpected listing row kind {other:?}"))),
    }
}

fn card_row(row: &PgRow) -> StoreResult<Card> {
    let mut card = Card {
        id: row.try_get("id")?,
        short_link: row.try_get("short_link")?,
        list_id: row.try_get("list_id")?,
        list_slug: row.try_get("list_slug")?,
        is_page: row.try_get("is_page")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        desc: row.try_get("desc")?,
        due: row.try_get::<Option<DateTime<Utc>>, _>("due")?,
        pos: row.try_get("pos")?,
        cover: row.try_get("cover")?,
        visible: row.try_get("visible")?,
        label_ids: row.try_get("label_ids")?,
        ..Card::default()
    };
    card.decode_blobs(CardBlobs {
        users: row.try_get::<Option<Value>, _>("users")?,
        labels: row.try_get::<Option<Value>, _>("labels")?,
        checklists: row.try_get::<Option<Value>, _>("checklists")?,
        attachments: row.try_get::<Option<Value>, _>("attachments")?,
    });
    Ok(card)
}

#[async_trait]
impl ContentStore for PgStore {
    async fn board_by_key(&self, key: &TenantKey) -> StoreResult<Option<Board>> {
        let sql = match key {
            TenantKey::Subdomain(_) => {
                r#"SELECT id, subdomain, name, coalesce("desc", '') AS "desc",
                          coalesce(user_id, '') AS user_id
                   FROM boards WHERE subdomain = $1"#
            }
            TenantKey::Domain(_) => {
                r#"SELECT boards.id, boards.subdomain, boards.name,
                          coalesce(boards."desc", '') AS "desc",
                          coalesce(boards.user_id, '') AS user_id
                   FROM boards
                   INNER JOIN custom_domains ON custom_domains.board_id = boards.id
                   WHERE custom_domains.domain = $1"#
            }
        };
        let row = sqlx::query(sql)
            .bind(key.identifier())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> StoreResult<Board> {
            Ok(Board {
                id: row.try_get("id")?,
                subdomain: row.try_get("subdomain")?,
                name: row.try_get("name")?,
                desc: row.try_get("desc")?,
                user_id: row.try_get("user_id")?,
            })
        })
        .transpose()
    }

    async fn visible_lists(&self, board_id: &str) -> StoreResult<Vec<List>> {
        let rows = sqlx::query(
            r#"SELECT id, board_id, name, slug, pos::float8 AS pos, visible,
                      "pagesList" AS pages_list
               FROM lists
               WHERE board_id = $1 AND visible AND NOT "pagesList"
               ORDER BY pos"#,
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> StoreResult<List> {
                Ok(List {
                    id: row.try_get("id")?,
                    board_id: row.try_get("board_id")?,
                    name: row.try_get("name")?,
                    slug: row.try_get("slug")?,
                    pos: row.try_get("pos")?,
                    visible: row.try_get("visible")?,
                    pages_list: row.try_get("pages_list")?,
                })
            })
            .collect()
    }

    async fn preferences(&self, tenant: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT preferences($1)::text AS prefs")
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("prefs")?),
            None => Ok(None),
        }
    }

    async fn index_cards(&self, board_id: &str, window: Window) -> StoreResult<Vec<Card>> {
        let sql = format!(
            "SELECT {CARD_COLUMNS}
             FROM cards INNER JOIN lists ON lists.id = cards.list_id
             WHERE {PUBLISHED}
             ORDER BY cards.due DESC NULLS LAST, cards.id DESC
             OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(board_id)
            .bind(window.offset)
            .bind(window.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(card_row).collect()
    }

    async fn list_listing(
        &self,
        board_id: &str,
        list_slug: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>> {
        let sql = format!(
            r#"(
                SELECT {LIST_HEADER}
                FROM lists
                WHERE board_id = $1 AND slug = $2 AND visible AND NOT "pagesList"
             ) UNION ALL (
                SELECT {CARD_COLUMNS}
                FROM cards INNER JOIN lists ON lists.id = cards.list_id
                WHERE {PUBLISHED} AND lists.slug = $2
                ORDER BY cards.pos
                OFFSET $3 LIMIT $4
             )
             ORDER BY sort, pos"#
        );
        self.listing(&sql, board_id, list_slug, window).await
    }

    async fn label_listing(
        &self,
        board_id: &str,
        label_key: &str,
        window: Window,
    ) -> StoreResult<Vec<ListingRow>> {
        let sql = format!(
            r#"(
                SELECT {LABEL_HEADER}
                FROM labels
                WHERE board_id = $1 AND (slug = $2 OR id = $2)
                LIMIT 1
             ) UNION ALL (
                SELECT {CARD_COLUMNS}
                FROM cards
                INNER JOIN lists ON lists.id = cards.list_id
                INNER JOIN labels AS tag ON tag.id = ANY(cards.labels)
                WHERE {PUBLISHED}
                  AND tag.board_id = $1 AND (tag.slug = $2 OR tag.id = $2)
                ORDER BY cards.pos
                OFFSET $3 LIMIT $4
             )
             ORDER BY sort, pos"#
        );
        self.listing(&sql, board_id, label_key, window).await
    }

    async fn card_detail(
        &self,
        board_id: &str,
        list_slug: &str,
        card_slug: &str,
    ) -> StoreResult<Vec<ListingRow>> {
        let sql = format!(
            r#"(
                SELECT {LIST_HEADER}
                FROM lists
                WHERE board_id = $1 AND slug = $2 AND visible AND NOT "pagesList"
             ) UNION ALL (
                SELECT {CARD_COLUMNS}
                FROM cards INNER JOIN lists ON lists.id = cards.list_id
                WHERE {PUBLISHED} AND lists.slug = $2 AND cards.slug = $3
                LIMIT 1
             )
             ORDER BY sort"#
        );
        let rows = sqlx::query(&sql)
            .bind(board_id)
            .bind(list_slug)
            .bind(card_slug)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(listing_row).collect()
    }

    async fn page_at(&self, board_id: &str, slug: &str) -> StoreResult<Option<Card>> {
        let sql = format!(
            r#"SELECT {CARD_COLUMNS}
               FROM cards INNER JOIN lists ON lists.id = cards.list_id
               WHERE lists.board_id = $1 AND lists."pagesList"
                 AND cards.visible AND cards.slug = $2
               LIMIT 1"#
        );
        let row = sqlx::query(&sql)
            .bind(board_id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(card_row).transpose()
    }

    async fn card_comments(&self, card_id: &str) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(
            r#"SELECT id, card_id,
                      coalesce(author_name, '') AS author_name,
                      coalesce(author_url, '') AS author_url,
                      coalesce(body, '') AS body,
                      coalesce(source_display, '') AS source_display,
                      coalesce(source_url, '') AS source_url
               FROM comments
               WHERE card_id = $1
               ORDER BY id"#,
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> StoreResult<Comment> {
                Ok(Comment {
                    id: row.try_get("id")?,
                    card_id: row.try_get("card_id")?,
                    author_name: row.try_get("author_name")?,
                    author_url: row.try_get("author_url")?,
                    body: row.try_get("body")?,
                    source_display: row.try_get("source_display")?,
                    source_url: row.try_get("source_url")?,
                })
            })
            .collect()
    }

    async fn card_permalink(
        &self,
        board_id: &str,
        key: &CardKey,
    ) -> StoreResult<Option<Permalink>> {
        let sql = format!(
            r#"SELECT cards.slug, cards.name, cards.visible,
                      lists.slug AS list_slug, lists.visible AS list_visible,
                      lists."pagesList" AS pages_list
               FROM cards INNER JOIN lists ON lists.id = cards.list_id
               WHERE lists.board_id = $1 AND {} = $2
               LIMIT 1"#,
            card_key_column(key)
        );
        let row = sqlx::query(&sql)
            .bind(board_id)
            .bind(key.value())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let card_slug: String = row.try_get("slug")?;
        let card_name: String = row.try_get("name")?;
        let list_slug: String = row.try_get("list_slug")?;
        Ok(Permalink::resolve(
            &card_slug,
            &card_name,
            row.try_get("visible")?,
            &list_slug,
            row.try_get("list_visible")?,
            row.try_get("pages_list")?,
        ))
    }

    async fn list_slug_by_id(&self, board_id: &str, list_id: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT slug FROM lists WHERE board_id = $1 AND id = $2")
            .bind(board_id)
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("slug")).transpose()?)
    }

    async fn card_description(
        &self,
        board_id: &str,
        key: &CardKey,
        limit: usize,
    ) -> StoreResult<Option<String>> {
        let sql = format!(
            r#"SELECT left(coalesce(cards."desc", ''), $3) AS excerpt
               FROM cards INNER JOIN lists ON lists.id = cards.list_id
               WHERE lists.board_id = $1 AND {} = $2
               LIMIT 1"#,
            card_key_column(key)
        );
        let row = sqlx::query(&sql)
            .bind(board_id)
            .bind(key.value())
            .bind(i32::try_from(limit).unwrap_or(i32::MAX))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.try_get("excerpt")).transpose()?)
    }

    async fn search(&self, board_id: &str, query: &str) -> StoreResult<Vec<Card>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"SELECT {CARD_COLUMNS}
               FROM cards INNER JOIN lists ON lists.id = cards.list_id
               WHERE {PUBLISHED}
                 AND to_tsvector('simple', cards.name || ' ' || coalesce(cards."desc", ''))
                     @@ plainto_tsquery('simple', $2)
               ORDER BY ts_rank(
                   to_tsvector('simple', cards.name || ' ' || coalesce(cards."desc", '')),
                   plainto_tsquery('simple', $2)
               ) DESC
               LIMIT {SEARCH_LIMIT}"#
        );
        let rows = sqlx::query(&sql)
            .bind(board_id)
            .bind(query)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(card_row).collect()
    }
}
