//! Serve Trello boards as websites.
//!
//! Each board is one site, picked by the request host: lists become
//! categories, cards become posts and labels become tags. Content is read
//! from a synced Postgres mirror of the board or from a JSON fixture.

pub mod context;
pub mod markdown;
pub mod models;
pub mod pageviews;
pub mod pagination;
pub mod preferences;
pub mod store;
pub mod tenant;

#[cfg(feature = "web")]
pub mod web;

pub use context::RequestContext;
pub use models::{Aggregator, Board, Card, Comment, Label, List};
pub use pageviews::PageViews;
pub use preferences::Preferences;
pub use store::{ContentStore, MemoryStore, StoreError, StoreSource};
pub use tenant::TenantKey;
