use crate::context::RequestContext;
use crate::markdown::render_markdown;
use crate::models::{
    Aggregator, AggregatorKind, Attachment, Author, Card, Comment, Label, Link, TRELLO_URL,
    iso_date, pretty_date,
};
use crate::pageviews::PageViews;
use crate::pagination::{CardDetail, FIRST_PAGE, Listing, Page, page_or_first};
use crate::store::{CardKey, ContentStore, PATH_SEGMENT, StoreError, StoreSource};
use askama::Template;
use axum::{
    Router, async_trait,
    extract::{FromRequestParts, State},
    http::{HeaderValue, Method, StatusCode, Uri, header, request::Parts},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

type SharedState = Arc<AppState>;

pub const DEFAULT_DESC_LIMIT: usize = 200;
const GENERIC_FAILURE: &str = "An unknown error has occurred, we are sorry.";

pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub base_domain: String,
    pub page_views: PageViews,
}

#[derive(Clone, Debug)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_domain: String,
    pub source: StoreSource,
    pub pageviews_path: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            base_domain: "localhost".to_string(),
            source: StoreSource::Fixtures(PathBuf::from("fixtures/demo.json")),
            pageviews_path: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Store(StoreError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Store(err) => write!(f, "content store error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<StoreError> for WebError {
    fn from(value: StoreError) -> Self {
        WebError::Store(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let store = config.source.open().await?;
    let page_views = match &config.pageviews_path {
        Some(path) => PageViews::persistent(path),
        None => PageViews::ephemeral(),
    };
    let state = Arc::new(AppState {
        store,
        base_domain: config.base_domain.clone(),
        page_views,
    });
    let router = build_router(state);
    info!(
        %config.addr,
        base_domain = %config.base_domain,
        pageviews = ?config.pageviews_path,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

/// Request failures. Missing content normally never reaches the client as
/// this type: the site handler turns it into the search fallback page.
#[derive(Debug)]
pub enum SiteError {
    TenantNotFound,
    NotFound,
    Store(StoreError),
    Render(askama::Error),
}

impl fmt::Display for SiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteError::TenantNotFound => write!(f, "no board serves this host"),
            SiteError::NotFound => write!(f, "content not found"),
            SiteError::Store(err) => write!(f, "store error: {err}"),
            SiteError::Render(err) => write!(f, "template error: {err}"),
        }
    }
}

impl std::error::Error for SiteError {}

impl From<StoreError> for SiteError {
    fn from(value: StoreError) -> Self {
        SiteError::Store(value)
    }
}

impl From<askama::Error> for SiteError {
    fn from(value: askama::Error) -> Self {
        SiteError::Render(value)
    }
}

impl IntoResponse for SiteError {
    fn into_response(self) -> Response {
        match self {
            SiteError::TenantNotFound => {
                (StatusCode::NOT_FOUND, "There is no site at this address.").into_response()
            }
            SiteError::NotFound => (StatusCode::NOT_FOUND, "Not found.").into_response(),
            SiteError::Store(err) => {
                error!(error = %err, "content store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE).into_response()
            }
            SiteError::Render(err) => {
                error!(error = %err, "template rendering failure");
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE).into_response()
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<SharedState> for RequestContext {
    type Rejection = SiteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let host = request_host(parts);
        let base_url = format!("{}://{}", request_scheme(parts), host);
        match RequestContext::load(state.store.as_ref(), &host, &state.base_domain, base_url)
            .await?
        {
            Some(ctx) => Ok(ctx),
            None => {
                info!(%host, "no board for host");
                Err(SiteError::TenantNotFound)
            }
        }
    }
}

fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_default()
}

fn request_scheme(parts: &Parts) -> &'static str {
    let forwarded = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok());
    match forwarded {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/feed.xml", get(feed_xml))
        .route("/opensearch.xml", get(opensearch_xml))
        .route("/favicon.ico", get(favicon))
        .route("/robots.txt", get(robots_txt))
        .fallback(site)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Content routes, matched by hand so list slugs can sit at the root
/// next to the fixed prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SitePath {
    Index { page: Option<String> },
    Search,
    CardPermalink(String),
    CardDescription(String),
    ListPermalink(String),
    Label { label: String, page: Option<String> },
    ListOrPage(String),
    List { list: String, page: Option<String> },
    Card { list: String, card: String },
    Unknown,
}

impl SitePath {
    fn parse(path: &str) -> Self {
        let decoded = path_segments(path);
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();
        match segments.as_slice() {
            [] => SitePath::Index { page: None },
            ["p", page] => SitePath::Index {
                page: Some(page.to_string()),
            },
            ["search"] => SitePath::Search,
            ["c", key, "desc"] => SitePath::CardDescription(key.to_string()),
            ["c", key] => SitePath::CardPermalink(key.to_string()),
            ["l", id] => SitePath::ListPermalink(id.to_string()),
            ["tag", label] => SitePath::Label {
                label: label.to_string(),
                page: None,
            },
            ["tag", label, "p", page] => SitePath::Label {
                label: label.to_string(),
                page: Some(page.to_string()),
            },
            [slug] => SitePath::ListOrPage(slug.to_string()),
            [list, "p", page] => SitePath::List {
                list: list.to_string(),
                page: Some(page.to_string()),
            },
            [list, card] => SitePath::Card {
                list: list.to_string(),
                card: card.to_string(),
            },
            _ => SitePath::Unknown,
        }
    }

    /// Paths served as-is, without trailing slash canonicalization.
    fn is_exact(&self) -> bool {
        matches!(self, SitePath::CardDescription(_))
    }
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect()
}

/// Search terms for a missed path: segments and hyphenated words become
/// separate terms.
fn search_query_from_path(path: &str) -> String {
    path_segments(path).join(" ").replace('-', " ")
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(err) => {
            warn!(%location, error = %err, "unusable redirect target");
            SiteError::NotFound.into_response()
        }
    }
}

/// Target is rebuilt from the decoded segments, so empty segments collapse
/// and the location is always a path on this host.
fn slash_redirect(uri: &Uri) -> Response {
    let path = segments_path(&path_segments(uri.path()));
    let location = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    redirect(StatusCode::MOVED_PERMANENTLY, &location)
}

fn segments_path(segments: &[String]) -> String {
    let mut path = String::from("/");
    for segment in segments {
        path.extend(utf8_percent_encode(segment, PATH_SEGMENT));
        path.push('/');
    }
    path
}

fn trello_card_url(identifier: &str) -> String {
    format!(
        "{TRELLO_URL}/c/{}",
        utf8_percent_encode(identifier, NON_ALPHANUMERIC)
    )
}

async fn site(
    State(state): State<SharedState>,
    method: Method,
    mut ctx: RequestContext,
    uri: Uri,
) -> Result<Response, SiteError> {
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let path = uri.path();
    let route = SitePath::parse(path);
    if !path.ends_with('/') && !route.is_exact() {
        return Ok(slash_redirect(&uri));
    }
    let outcome = match route {
        SitePath::Index { page } => index(&state, &mut ctx, page.as_deref()).await,
        SitePath::Search => {
            let query = query_param(&uri, "query").unwrap_or_default();
            search(&state, &ctx, query).await
        }
        SitePath::CardPermalink(key) => card_permalink(&state, &ctx, &key).await,
        SitePath::CardDescription(key) => {
            let limit = query_param(&uri, "limit");
            card_description(&state, &ctx, &key, limit.as_deref()).await
        }
        SitePath::ListPermalink(id) => list_permalink(&state, &ctx, &id).await,
        SitePath::Label { label, page } => {
            label_page(&state, &mut ctx, &label, page.as_deref()).await
        }
        SitePath::ListOrPage(slug) => list_or_page(&state, &mut ctx, &slug).await,
        SitePath::List { list, page } => {
            list_page(&state, &mut ctx, &list, page.as_deref()).await
        }
        SitePath::Card { list, card } => card_page(&state, &mut ctx, &list, &card).await,
        SitePath::Unknown => Err(SiteError::NotFound),
    };
    match outcome {
        Err(SiteError::NotFound) => not_found(&state, &ctx, path).await,
        other => other,
    }
}

async fn index(
    state: &AppState,
    ctx: &mut RequestContext,
    page: Option<&str>,
) -> Result<Response, SiteError> {
    let request = ctx.page_request(page_or_first(page));
    let cards = state
        .store
        .index_cards(&ctx.board.id, request.window())
        .await?;
    ctx.apply_page(Page::from_window(cards, request));
    render_listing(state, ctx)
}

async fn list_page(
    state: &AppState,
    ctx: &mut RequestContext,
    slug: &str,
    page: Option<&str>,
) -> Result<Response, SiteError> {
    let request = ctx.page_request(page_or_first(page));
    let rows = state
        .store
        .list_listing(&ctx.board.id, slug, request.window())
        .await?;
    let listing = Listing::from_rows(rows).ok_or(SiteError::NotFound)?;
    let (aggregator, page) = listing.paginate(request);
    ctx.aggregator = Some(aggregator);
    ctx.apply_page(page);
    render_listing(state, ctx)
}

async fn label_page(
    state: &AppState,
    ctx: &mut RequestContext,
    label: &str,
    page: Option<&str>,
) -> Result<Response, SiteError> {
    let request = ctx.page_request(page_or_first(page));
    let rows = state
        .store
        .label_listing(&ctx.board.id, label, request.window())
        .await?;
    let listing = Listing::from_rows(rows).ok_or(SiteError::NotFound)?;
    let (aggregator, page) = listing.paginate(request);
    ctx.aggregator = Some(aggregator);
    ctx.apply_page(page);
    render_listing(state, ctx)
}

/// Standalone pages win over lists sharing their slug.
async fn list_or_page(
    state: &AppState,
    ctx: &mut RequestContext,
    slug: &str,
) -> Result<Response, SiteError> {
    if let Some(page) = state.store.page_at(&ctx.board.id, slug).await? {
        ctx.card = Some(page);
        return render_card(state, ctx).await;
    }
    list_page(state, ctx, slug, None).await
}

async fn card_page(
    state: &AppState,
    ctx: &mut RequestContext,
    list: &str,
    card: &str,
) -> Result<Response, SiteError> {
    let rows = state.store.card_detail(&ctx.board.id, list, card).await?;
    let detail = CardDetail::from_rows(rows).ok_or(SiteError::NotFound)?;
    ctx.aggregator = Some(detail.aggregator);
    ctx.card = Some(detail.card);
    render_card(state, ctx).await
}

async fn card_permalink(
    state: &AppState,
    ctx: &RequestContext,
    identifier: &str,
) -> Result<Response, SiteError> {
    let key = CardKey::parse(identifier);
    let location = match state.store.card_permalink(&ctx.board.id, &key).await? {
        Some(permalink) => permalink.path(),
        None => trello_card_url(identifier),
    };
    Ok(redirect(StatusCode::FOUND, &location))
}

async fn list_permalink(
    state: &AppState,
    ctx: &RequestContext,
    list_id: &str,
) -> Result<Response, SiteError> {
    let slug = state
        .store
        .list_slug_by_id(&ctx.board.id, list_id)
        .await?
        .ok_or(SiteError::NotFound)?;
    let location = segments_path(&[slug]);
    Ok(redirect(StatusCode::FOUND, &location))
}

async fn card_description(
    state: &AppState,
    ctx: &RequestContext,
    identifier: &str,
    limit: Option<&str>,
) -> Result<Response, SiteError> {
    let limit = limit
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_DESC_LIMIT);
    let key = CardKey::parse(identifier);
    let desc = state
        .store
        .card_description(&ctx.board.id, &key, limit)
        .await?
        .ok_or(SiteError::NotFound)?;
    Ok((
        [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())],
        desc,
    )
        .into_response())
}

async fn search(
    state: &AppState,
    ctx: &RequestContext,
    query: String,
) -> Result<Response, SiteError> {
    let cards = state.store.search(&ctx.board.id, &query).await?;
    let excerpt_limit = ctx.prefs.excerpt_limit();
    let template = SearchTemplate {
        layout: Layout::new(
            ctx,
            &state.base_domain,
            "/search/",
            format!("Search | {}", ctx.board.name),
            &query,
        ),
        typed: !query.is_empty(),
        results: cards
            .iter()
            .map(|card| CardSummary::new(card, excerpt_limit))
            .collect(),
        query: query.clone(),
    };
    let response = render_page(&template, StatusCode::OK)?;
    state.page_views.record(&ctx.board.id);
    Ok(response)
}

/// The 404 page is a search for the words of the missed path.
async fn not_found(
    state: &AppState,
    ctx: &RequestContext,
    path: &str,
) -> Result<Response, SiteError> {
    let query = search_query_from_path(path);
    info!(%path, %query, "content not found, serving search fallback");
    let cards = state.store.search(&ctx.board.id, &query).await?;
    let excerpt_limit = ctx.prefs.excerpt_limit();
    let template = NotFoundTemplate {
        layout: Layout::new(
            ctx,
            &state.base_domain,
            path,
            format!("Not found | {}", ctx.board.name),
            &query,
        ),
        typed: true,
        results: cards
            .iter()
            .map(|card| CardSummary::new(card, excerpt_limit))
            .collect(),
        query: query.clone(),
    };
    render_page(&template, StatusCode::NOT_FOUND)
}

fn render_listing(state: &AppState, ctx: &RequestContext) -> Result<Response, SiteError> {
    let base = ctx
        .aggregator
        .as_ref()
        .map(Aggregator::href)
        .unwrap_or_else(|| "/".to_string());
    let title = match &ctx.aggregator {
        Some(aggregator) => format!("{} | {}", aggregator.name(), ctx.board.name),
        None => ctx.board.name.clone(),
    };
    let path = page_href(&base, ctx.page);
    let excerpt_limit = ctx.prefs.excerpt_limit();
    let template = ListTemplate {
        layout: Layout::new(ctx, &state.base_domain, &path, title, ""),
        heading: ctx.aggregator.as_ref().map(Heading::from),
        cards: ctx
            .cards
            .iter()
            .map(|card| CardSummary::new(card, excerpt_limit))
            .collect(),
        pager: Pager {
            number: ctx.page,
            prev_href: ctx.has_prev.then(|| page_href(&base, ctx.prev_page())),
            next_href: ctx.has_next.then(|| page_href(&base, ctx.next_page())),
        },
    };
    let response = render_page(&template, StatusCode::OK)?;
    state.page_views.record(&ctx.board.id);
    Ok(response)
}

async fn render_card(state: &AppState, ctx: &mut RequestContext) -> Result<Response, SiteError> {
    let Some(card_id) = ctx.card.as_ref().map(|card| card.id.clone()) else {
        return Err(SiteError::NotFound);
    };
    let show_comments = ctx.prefs.comments.display;
    if show_comments {
        ctx.comments = state.store.card_comments(&card_id).await?;
    }
    let ctx: &RequestContext = ctx;
    let Some(card) = ctx.card.as_ref() else {
        return Err(SiteError::NotFound);
    };
    let view = CardView::new(card);
    let template = CardTemplate {
        layout: Layout::new(
            ctx,
            &state.base_domain,
            &card.href(),
            format!("{} | {}", card.name, ctx.board.name),
            "",
        ),
        heading: ctx.aggregator.as_ref().map(Heading::from),
        comments: ctx.comments.iter().map(CommentView::new).collect(),
        show_comments,
        comment_box: ctx.prefs.comments.comment_box,
        card: view,
    };
    let response = render_page(&template, StatusCode::OK)?;
    state.page_views.record(&ctx.board.id);
    Ok(response)
}

fn render_page<T: Template>(template: &T, status: StatusCode) -> Result<Response, SiteError> {
    let html = template.render()?;
    Ok((status, Html(html)).into_response())
}

fn page_href(base: &str, number: u32) -> String {
    if number <= FIRST_PAGE {
        base.to_string()
    } else {
        format!("{base}p/{number}/")
    }
}

async fn feed_xml(
    State(state): State<SharedState>,
    mut ctx: RequestContext,
) -> Result<Response, SiteError> {
    let request = ctx.page_request(FIRST_PAGE);
    let cards = state
        .store
        .index_cards(&ctx.board.id, request.window())
        .await?;
    ctx.apply_page(Page::from_window(cards, request));
    Ok((
        [(header::CONTENT_TYPE, "application/rss+xml; charset=utf-8")],
        render_feed(&ctx),
    )
        .into_response())
}

fn render_feed(ctx: &RequestContext) -> String {
    let mut body = String::with_capacity(2048);
    body.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    body.push_str(r#"<rss version="2.0"><channel>"#);
    push_element(&mut body, "title", &ctx.board.name);
    push_element(&mut body, "link", &ctx.base_url);
    push_element(&mut body, "description", &ctx.board.desc);
    if !ctx.board.user_id.is_empty() {
        push_element(&mut body, "managingEditor", &ctx.board.user_id);
    }
    if let Some(latest) = ctx.cards.first() {
        push_element(&mut body, "lastBuildDate", &latest.date().to_rfc2822());
    }
    for card in &ctx.cards {
        body.push_str("<item>");
        push_element(&mut body, "title", &card.name);
        push_element(&mut body, "link", &ctx.absolute(&format!("/c/{}/", card.id)));
        body.push_str(r#"<guid isPermaLink="false">"#);
        body.push_str(&xml_escape(&card.id));
        body.push_str("</guid>");
        push_element(&mut body, "description", &render_markdown(&card.desc));
        push_element(&mut body, "pubDate", &card.date().to_rfc2822());
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}

fn push_element(body: &mut String, name: &str, text: &str) {
    body.push('<');
    body.push_str(name);
    body.push('>');
    body.push_str(&xml_escape(text));
    body.push_str("</");
    body.push_str(name);
    body.push('>');
}

async fn opensearch_xml(ctx: RequestContext) -> impl IntoResponse {
    let mut body = String::with_capacity(512);
    body.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    body.push_str(r#"<OpenSearchDescription xmlns="http://a9.com/-/spec/opensearch/1.1/">"#);
    push_element(&mut body, "ShortName", &ctx.board.name);
    push_element(&mut body, "Description", &format!("Search {}", ctx.board.name));
    push_element(&mut body, "InputEncoding", "UTF-8");
    body.push_str(r#"<Image width="16" height="16" type="image/x-icon">"#);
    body.push_str(&xml_escape(ctx.prefs.favicon_url()));
    body.push_str("</Image>");
    body.push_str(r#"<Url type="text/html" method="get" template=""#);
    body.push_str(&xml_escape(&ctx.absolute("/search/?query={searchTerms}")));
    body.push_str(r#""/>"#);
    body.push_str("</OpenSearchDescription>");
    (
        [(
            header::CONTENT_TYPE,
            "application/opensearchdescription+xml; charset=utf-8",
        )],
        body,
    )
}

async fn favicon(ctx: RequestContext) -> Response {
    redirect(StatusCode::MOVED_PERMANENTLY, ctx.prefs.favicon_url())
}

async fn robots_txt(
    State(state): State<SharedState>,
    ctx: RequestContext,
) -> Result<Response, SiteError> {
    not_found(&state, &ctx, "/robots.txt").await
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Shared page chrome for every HTML template.
struct Layout<'a> {
    title: String,
    board_name: &'a str,
    board_desc_html: String,
    header_text: &'a str,
    header_image: Option<&'a str>,
    nav: Vec<Link>,
    active: String,
    css: Vec<&'a str>,
    js: Vec<&'a str>,
    aside_html: String,
    favicon: &'a str,
    canonical: String,
    webmention: Option<String>,
    query: String,
}

impl<'a> Layout<'a> {
    fn new(
        ctx: &'a RequestContext,
        base_domain: &str,
        path: &str,
        title: String,
        query: &str,
    ) -> Self {
        let prefs = &ctx.prefs;
        let header_text = if prefs.header.text.is_empty() {
            ctx.board.name.as_str()
        } else {
            prefs.header.text.as_str()
        };
        Self {
            title,
            board_name: &ctx.board.name,
            board_desc_html: render_markdown(&ctx.board.desc),
            header_text,
            header_image: prefs
                .has_header_image()
                .then_some(prefs.header.image.as_str()),
            nav: ctx.nav_items(),
            active: ctx
                .aggregator
                .as_ref()
                .map(Aggregator::href)
                .unwrap_or_else(|| path.to_string()),
            css: prefs.css_includes(),
            js: prefs.js_includes(),
            aside_html: prefs.aside_html(),
            favicon: prefs.favicon_url(),
            canonical: ctx.absolute(path),
            webmention: prefs
                .comments
                .webmentions
                .then(|| format!("https://{base_domain}/webmention")),
            query: query.to_string(),
        }
    }
}

/// Listing heading; views branch on the aggregator kind.
struct Heading {
    kind: &'static str,
    name: String,
    color: String,
    href: String,
}

impl From<&Aggregator> for Heading {
    fn from(aggregator: &Aggregator) -> Self {
        let kind = match aggregator.kind() {
            AggregatorKind::List => "list",
            AggregatorKind::Label => "label",
        };
        Self {
            kind,
            name: aggregator.name().to_string(),
            color: aggregator.color().unwrap_or_default().to_string(),
            href: aggregator.href(),
        }
    }
}

struct Pager {
    number: u32,
    prev_href: Option<String>,
    next_href: Option<String>,
}

struct LabelView {
    name: String,
    color: String,
    href: String,
}

impl From<&Label> for LabelView {
    fn from(label: &Label) -> Self {
        Self {
            name: label.name_or_spaces().to_string(),
            color: label.color.clone(),
            href: label.href(),
        }
    }
}

struct CardSummary {
    name: String,
    href: String,
    date_pretty: String,
    date_iso: String,
    cover: Option<String>,
    excerpt: Option<String>,
    labels: Vec<LabelView>,
}

impl CardSummary {
    fn new(card: &Card, excerpt_limit: usize) -> Self {
        let date = card.date();
        Self {
            name: card.name.clone(),
            href: card.href(),
            date_pretty: pretty_date(&date),
            date_iso: iso_date(&date),
            cover: card.has_cover().then(|| card.cover.clone()),
            excerpt: card.excerpt(excerpt_limit),
            labels: card.labels.iter().map(LabelView::from).collect(),
        }
    }
}

struct AuthorLink {
    name: String,
    url: String,
}

impl From<&Author> for AuthorLink {
    fn from(author: &Author) -> Self {
        Self {
            name: author.username.clone(),
            url: author.profile_url(),
        }
    }
}

/// One author, two joined with "&", or the first "et al.".
struct AuthorLine {
    first: AuthorLink,
    second: Option<AuthorLink>,
    et_al: bool,
}

impl AuthorLine {
    fn from_users(users: &[Author]) -> Option<Self> {
        let first = users.first()?;
        Some(Self {
            first: AuthorLink::from(first),
            second: (users.len() == 2).then(|| AuthorLink::from(&users[1])),
            et_al: users.len() > 2,
        })
    }
}

struct CheckItemView {
    complete: bool,
    name_html: String,
}

struct ChecklistView {
    name: String,
    items: Vec<CheckItemView>,
}

struct CardView {
    name: String,
    href: String,
    trello_url: String,
    date_pretty: String,
    date_iso: String,
    cover: Option<String>,
    desc_html: String,
    author: Option<AuthorLine>,
    labels: Vec<LabelView>,
    checklists: Vec<ChecklistView>,
    attachments: Vec<Attachment>,
}

impl CardView {
    fn new(card: &Card) -> Self {
        for issue in &card.issues {
            warn!(
                card = %card.id,
                field = issue.field,
                problem = %issue.message,
                "rendering card with unreadable data"
            );
        }
        let date = card.date();
        Self {
            name: card.name.clone(),
            href: card.href(),
            trello_url: card.trello_url(),
            date_pretty: pretty_date(&date),
            date_iso: iso_date(&date),
            cover: card.has_cover().then(|| card.cover.clone()),
            desc_html: render_markdown(&card.desc),
            author: AuthorLine::from_users(&card.users),
            labels: card.labels.iter().map(LabelView::from).collect(),
            checklists: card
                .checklists
                .iter()
                .map(|checklist| ChecklistView {
                    name: checklist.name.clone(),
                    items: checklist
                        .check_items
                        .iter()
                        .map(|item| CheckItemView {
                            complete: item.complete(),
                            name_html: render_markdown(&item.name),
                        })
                        .collect(),
                })
                .collect(),
            attachments: card.attachments.clone(),
        }
    }
}

struct CommentView {
    author_name: String,
    author_url: String,
    body_html: String,
    source_display: String,
    source_url: String,
    date_pretty: String,
    date_iso: String,
}

impl CommentView {
    fn new(comment: &Comment) -> Self {
        let date = comment.date();
        Self {
            author_name: comment.author_name.clone(),
            author_url: comment.author_url.clone(),
            body_html: render_markdown(&comment.body),
            source_display: if comment.source_display.is_empty() {
                comment.source_url.clone()
            } else {
                comment.source_display.clone()
            },
            source_url: comment.source_url.clone(),
            date_pretty: pretty_date(&date),
            date_iso: iso_date(&date),
        }
    }
}

#[derive(Template)]
#[template(path = "list.html")]
struct ListTemplate<'a> {
    layout: Layout<'a>,
    heading: Option<Heading>,
    cards: Vec<CardSummary>,
    pager: Pager,
}

#[derive(Template)]
#[template(path = "card.html")]
struct CardTemplate<'a> {
    layout: Layout<'a>,
    heading: Option<Heading>,
    card: CardView,
    comments: Vec<CommentView>,
    show_comments: bool,
    comment_box: bool,
}

#[derive(Template)]
#[template(path = "search.html")]
struct SearchTemplate<'a> {
    layout: Layout<'a>,
    query: String,
    typed: bool,
    results: Vec<CardSummary>,
}

#[derive(Template)]
#[template(path = "404.html")]
struct NotFoundTemplate<'a> {
    layout: Layout<'a>,
    query: String,
    typed: bool,
    results: Vec<CardSummary>,
}
