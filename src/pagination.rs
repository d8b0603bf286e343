//! Page-shaped results from raw listing rows.
//!
//! Listing queries fetch one card more than the page size; the extra row only
//! tells us whether a next page exists and is never shown.

use std::fmt;

use tracing::warn;

use crate::models::{Aggregator, Card};
use crate::store::ListingRow;

pub const FIRST_PAGE: u32 = 1;

/// OFFSET/LIMIT pair handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub size: usize,
}

impl PageRequest {
    pub fn new(number: u32, size: usize) -> Self {
        Self {
            number: number.max(FIRST_PAGE),
            size: size.max(1),
        }
    }

    pub fn first(size: usize) -> Self {
        Self::new(FIRST_PAGE, size)
    }

    /// `OFFSET = size * (page - 1)`, `LIMIT = size + 1`.
    pub fn window(&self) -> Window {
        let size = self.size as i64;
        Window {
            offset: size.saturating_mul(i64::from(self.number - 1)),
            limit: size + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNumberError {
    raw: String,
}

impl fmt::Display for PageNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not a page number", self.raw)
    }
}

impl std::error::Error for PageNumberError {}

/// Strict parse: positive integers only.
pub fn parse_page_number(raw: &str) -> Result<u32, PageNumberError> {
    match raw.trim().parse::<u32>() {
        Ok(number) if number >= FIRST_PAGE => Ok(number),
        _ => Err(PageNumberError {
            raw: raw.to_string(),
        }),
    }
}

/// Page number from an optional path segment; anything unusable is page 1.
pub fn page_or_first(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return FIRST_PAGE;
    };
    parse_page_number(raw).unwrap_or_else(|err| {
        warn!(error = %err, "bad page number, serving the first page");
        FIRST_PAGE
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Trims a fetched window (up to `size + 1` items) to one page.
    pub fn from_window(mut items: Vec<T>, request: PageRequest) -> Self {
        let has_next = items.len() > request.size;
        items.truncate(request.size);
        Self {
            items,
            number: request.number,
            has_next,
            has_prev: request.number > FIRST_PAGE,
        }
    }

    pub fn next_number(&self) -> u32 {
        self.number + 1
    }

    pub fn prev_number(&self) -> u32 {
        self.number.saturating_sub(1).max(FIRST_PAGE)
    }
}

/// A list or label page: the heading row plus the fetched cards.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub aggregator: Aggregator,
    pub cards: Vec<Card>,
}

impl Listing {
    /// Row 0 must be the header; `None` means the list or label was not found.
    pub fn from_rows(rows: Vec<ListingRow>) -> Option<Self> {
        let mut rows = rows.into_iter();
        let aggregator = match rows.next()? {
            ListingRow::Header(aggregator) => aggregator,
            ListingRow::Card(card) => {
                warn!(card = %card.id, "listing rows did not start with a header");
                return None;
            }
        };
        let cards = rows
            .filter_map(|row| match row {
                ListingRow::Card(card) => Some(card),
                ListingRow::Header(_) => None,
            })
            .collect();
        Some(Self { aggregator, cards })
    }

    pub fn paginate(self, request: PageRequest) -> (Aggregator, Page<Card>) {
        (self.aggregator, Page::from_window(self.cards, request))
    }
}

/// A card with the list it was reached through.
#[derive(Debug, Clone, PartialEq)]
pub struct CardDetail {
    pub aggregator: Aggregator,
    pub card: Card,
}

impl CardDetail {
    /// Needs both the list header and the card; fewer rows is not-found.
    pub fn from_rows(rows: Vec<ListingRow>) -> Option<Self> {
        if rows.len() < 2 {
            return None;
        }
        let listing = Listing::from_rows(rows)?;
        let card = listing.cards.into_iter().next()?;
        Some(Self {
            aggregator: listing.aggregator,
            card,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    /// Simulates the store: OFFSET/LIMIT over `total` items.
    fn fetch(total: &[usize], window: Window) -> Vec<usize> {
        total
            .iter()
            .copied()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .collect()
    }

    #[test]
    fn window_fetches_one_extra() {
        let request = PageRequest::new(3, 7);
        assert_eq!(request.window(), Window { offset: 14, limit: 8 });
        assert_eq!(PageRequest::new(0, 0).window(), Window { offset: 0, limit: 2 });
    }

    #[test]
    fn pages_cover_every_item_exactly_once() {
        for size in 1..=6usize {
            for total in 1..=25usize {
                let items = numbered(total);
                let mut seen = Vec::new();
                let mut pages = 0;
                let mut number = FIRST_PAGE;
                loop {
                    let request = PageRequest::new(number, size);
                    let page = Page::from_window(fetch(&items, request.window()), request);
                    pages += 1;
                    assert_eq!(page.has_prev, number > 1);
                    let beyond = items.len() > seen.len() + page.items.len();
                    assert_eq!(page.has_next, beyond, "size {size} total {total} page {number}");
                    if page.has_next {
                        assert_eq!(page.items.len(), size);
                    }
                    seen.extend(page.items.iter().copied());
                    if !page.has_next {
                        break;
                    }
                    number = page.next_number();
                }
                assert_eq!(pages, total.div_ceil(size), "size {size} total {total}");
                assert_eq!(seen, items);
            }
        }
    }

    #[test]
    fn page_numbers_parse_leniently() {
        assert_eq!(parse_page_number("3"), Ok(3));
        assert!(parse_page_number("0").is_err());
        assert!(parse_page_number("-2").is_err());
        assert!(parse_page_number("two").is_err());
        assert_eq!(page_or_first(None), 1);
        assert_eq!(page_or_first(Some("abc")), 1);
        assert_eq!(page_or_first(Some("-1")), 1);
        assert_eq!(page_or_first(Some("4")), 4);
    }

    fn header() -> ListingRow {
        ListingRow::Header(Aggregator::List {
            name: "Design".into(),
            slug: "design".into(),
        })
    }

    fn card(id: &str) -> ListingRow {
        ListingRow::Card(Card {
            id: id.into(),
            ..Card::default()
        })
    }

    #[test]
    fn listing_splits_header_and_trims() {
        let rows = vec![header(), card("a"), card("b"), card("c")];
        let (aggregator, page) = Listing::from_rows(rows)
            .expect("header present")
            .paginate(PageRequest::new(2, 2));
        assert_eq!(aggregator.name(), "Design");
        assert_eq!(page.items.len(), 2);
        assert!(page.has_next);
        assert!(page.has_prev);
        assert_eq!(page.prev_number(), 1);
    }

    #[test]
    fn listing_without_header_is_not_found() {
        assert!(Listing::from_rows(Vec::new()).is_none());
        assert!(Listing::from_rows(vec![card("a")]).is_none());
        let empty = Listing::from_rows(vec![header()]).expect("empty list still found");
        assert!(empty.cards.is_empty());
    }

    #[test]
    fn card_detail_needs_two_rows() {
        assert!(CardDetail::from_rows(vec![header()]).is_none());
        let detail = CardDetail::from_rows(vec![header(), card("a")]).expect("found");
        assert_eq!(detail.card.id, "a");
    }
}
