use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use alloy::primitives::{Address, utils::format_ether};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    error::friendly_error_message,
    handlers::AppState,
    models::GuestbookEntry,
    services::{FeeQuote, FeedStatus, MessageDraft, MessageKind},
    utils::display::{EntryView, is_highlighted, marquee_text, short_address},
};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: error.into() }))
}

fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

async fn entry_view(state: &AppState, entry: &GuestbookEntry) -> EntryView {
    let name = state.cached_name(entry.guest).await;
    EntryView::new(entry, &state.config.chain, &state.config.contract_address, name)
}

/// Fails with 503 until the first successful load.
async fn ensure_loaded(state: &AppState) -> Result<(), (StatusCode, Json<ApiError>)> {
    let status = state.feed.status().await;
    if status.initialized {
        return Ok(());
    }
    Err(api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        status
            .last_error
            .unwrap_or_else(|| "Loading guestbook entries".to_string()),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PinnedView {
    pub entry: EntryView,
    pub sponsor: Address,
    /// Price paid, in wei.
    pub amount: String,
    pub sponsored_at: u64,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub pinned: Option<PinnedView>,
    pub entries: Vec<EntryView>,
    pub total: usize,
    pub offset: usize,
}

/// Guestbook entries, sponsored entry first, then newest first.
pub async fn list_entries(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> ApiResult<EntriesResponse> {
    ensure_loaded(&state).await?;

    let view = state.feed.view().await;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);

    let pinned = match view.pinned {
        // Only shown on the first page
        Some(pinned) if offset == 0 => Some(PinnedView {
            entry: entry_view(&state, &pinned.entry).await,
            sponsor: pinned.sponsorship.sponsor,
            amount: pinned.sponsorship.amount.to_string(),
            sponsored_at: pinned.sponsorship.timestamp,
        }),
        _ => None,
    };

    let mut entries = Vec::new();
    for entry in view.entries.iter().skip(offset).take(limit) {
        entries.push(entry_view(&state, entry).await);
    }

    Ok(Json(EntriesResponse {
        pinned,
        entries,
        total: state.feed.len().await,
        offset,
    }))
}

pub async fn latest_entry(State(state): State<AppState>) -> ApiResult<EntryView> {
    ensure_loaded(&state).await?;
    match state.feed.latest_entry().await {
        Some(entry) => Ok(Json(entry_view(&state, &entry).await)),
        None => Err(api_error(StatusCode::NOT_FOUND, "No signatures yet. Be the first to sign!")),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub chain: &'static str,
    pub chain_id: u64,
    pub contract_address: Address,
    pub required_sponsor_bid: String,
    #[serde(flatten)]
    pub feed: FeedStatus,
}

pub async fn feed_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let feed = state.feed.status().await;
    let required = state.feed.required_bid(unix_now()).await;
    Json(StatusResponse {
        chain: state.config.chain.name,
        chain_id: state.config.chain.chain_id,
        contract_address: state.config.contract_address,
        required_sponsor_bid: required.to_string(),
        feed,
    })
}

#[derive(Debug, Serialize)]
pub struct MarqueeResponse {
    pub text: String,
    pub highlighted: bool,
}

pub async fn marquee(State(state): State<AppState>) -> Json<MarqueeResponse> {
    let highlighted = is_highlighted(state.feed.latest_changed_at().await, Instant::now());
    let total = state.feed.len().await;
    let text = match state.feed.latest_entry().await {
        Some(entry) => {
            let name = state
                .cached_name(entry.guest)
                .await
                .unwrap_or_else(|| short_address(&entry.guest));
            marquee_text(total, Some((&entry, &name)), highlighted)
        }
        None => marquee_text(total, None, false),
    };
    Json(MarqueeResponse { text, highlighted })
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub message: String,
    #[serde(default)]
    pub mint_nft: bool,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub function: &'static str,
    pub message: String,
    pub mint_nft: bool,
    pub message_fee_wei: String,
    pub mint_fee_wei: String,
    pub total_wei: String,
    pub total_eth: String,
    /// Value to attach to the transaction.
    pub value_wei: String,
    pub paused: Option<bool>,
}

impl QuoteResponse {
    fn new(draft: &MessageDraft, quote: FeeQuote, paused: Option<bool>) -> Self {
        Self {
            function: match draft.kind {
                MessageKind::Gm => "signGuestbookGm",
                MessageKind::Custom(_) => "signGuestbookCustom",
            },
            message: draft.text().to_string(),
            mint_nft: draft.mint_nft,
            message_fee_wei: quote.message_fee.to_string(),
            mint_fee_wei: quote.mint_fee.to_string(),
            total_wei: quote.total.to_string(),
            total_eth: format_ether(quote.total),
            value_wei: quote.value.to_string(),
            paused,
        }
    }
}

/// Validates a message and prices it, without sending anything.
pub async fn quote(State(state): State<AppState>, Json(req): Json<QuoteRequest>) -> ApiResult<QuoteResponse> {
    let draft = MessageDraft::compose(&req.message, req.mint_nft)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, friendly_error_message(&e.to_string())))?;
    let paused = state.feed.is_paused().await;
    Ok(Json(QuoteResponse::new(&draft, draft.quote(), paused)))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// False when the cache was fresh enough to skip the fetch.
    pub refreshed: bool,
    pub new_entries: usize,
    pub total: usize,
}

/// Manual refetch, e.g. right after a client's own transaction confirmed.
pub async fn refresh_entries(State(state): State<AppState>) -> ApiResult<RefreshResponse> {
    tracing::info!("Manual refetch triggered");
    match state.feed.refresh_if_stale(state.source.as_ref()).await {
        Ok(update) => Ok(Json(RefreshResponse {
            refreshed: update.is_some(),
            new_entries: update.map(|u| u.new_entries.len()).unwrap_or(0),
            total: state.feed.len().await,
        })),
        Err(e) => Err(api_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config,
        chains::BASE_SEPOLIA,
        create_router,
        models::entries::fixtures::{entry, sponsorship},
        services::{GuestbookFeed, source::stub::MemorySource},
    };
    use axum::{Router, body::Body, http::Request};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(source: Arc<MemorySource>, feed: Arc<GuestbookFeed>) -> Router {
        create_router(AppState {
            config: Config::for_chain(BASE_SEPOLIA),
            feed,
            source,
            names: None,
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn loaded() -> (Arc<MemorySource>, Arc<GuestbookFeed>) {
        let source = Arc::new(MemorySource::with_latest(1100));
        source.push_entry(entry(1, 100));
        source.push_entry(entry(2, 200));
        let feed = Arc::new(GuestbookFeed::new(1000));
        feed.refresh(source.as_ref()).await.unwrap();
        (source, feed)
    }

    #[tokio::test]
    async fn test_entries_unavailable_before_first_load() {
        let source = Arc::new(MemorySource::with_latest(1100));
        let feed = Arc::new(GuestbookFeed::new(1000));
        let (status, body) = get_json(app(source, feed), "/api/entries").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Loading guestbook entries");
    }

    #[tokio::test]
    async fn test_list_entries_newest_first() {
        let (source, feed) = loaded().await;
        let (status, body) = get_json(app(source, feed), "/api/entries").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert!(body["pinned"].is_null());
        assert_eq!(body["entries"][0]["guest_id"], "2");
        assert_eq!(body["entries"][1]["guest_id"], "1");
        assert!(
            body["entries"][0]["links"]["block"]
                .as_str()
                .unwrap()
                .starts_with("https://sepolia.basescan.org/block/")
        );
    }

    #[tokio::test]
    async fn test_list_entries_with_pinned_and_paging() {
        let source = Arc::new(MemorySource::with_latest(1100));
        source.push_entry(entry(1, 100));
        source.push_entry(entry(2, 200));
        source.push_entry(entry(3, 300));
        let mut sponsored = sponsorship(1, 1_000_000, 400);
        sponsored.block_number = 1050;
        source.push_sponsorship(sponsored);
        let feed = Arc::new(GuestbookFeed::new(1000));
        feed.refresh(source.as_ref()).await.unwrap();

        let (_, body) = get_json(app(source.clone(), feed.clone()), "/api/entries?limit=1").await;
        assert_eq!(body["pinned"]["entry"]["guest_id"], "1");
        assert_eq!(body["pinned"]["amount"], "1000000");
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert_eq!(body["entries"][0]["guest_id"], "3");

        let (_, body) = get_json(app(source, feed), "/api/entries?offset=1").await;
        assert!(body["pinned"].is_null());
        assert_eq!(body["entries"][0]["guest_id"], "2");
    }

    #[tokio::test]
    async fn test_latest_entry() {
        let (source, feed) = loaded().await;
        let (status, body) = get_json(app(source, feed), "/api/entries/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["guest_id"], "2");
        assert_eq!(body["message"], "message 2");
    }

    #[tokio::test]
    async fn test_marquee_after_load_is_not_highlighted() {
        let (source, feed) = loaded().await;
        let (_, body) = get_json(app(source, feed), "/api/marquee").await;
        assert_eq!(body["highlighted"], false);
        assert!(body["text"].as_str().unwrap().contains("2 VISITORS HAVE SIGNED"));
    }

    #[tokio::test]
    async fn test_quote_endpoint() {
        let (source, feed) = loaded().await;
        let (status, body) = post_json(
            app(source.clone(), feed.clone()),
            "/api/quote",
            serde_json::json!({ "message": "hello <b>base</b>", "mint_nft": true }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["function"], "signGuestbookCustom");
        assert_eq!(body["message"], "hello base");
        assert_eq!(body["total_wei"], "2220000000000000");
        assert_eq!(body["value_wei"], "1110000000000000");
        assert!(body["total_eth"].as_str().unwrap().starts_with("0.00222"));

        let (status, body) = post_json(app(source, feed), "/api/quote", serde_json::json!({ "message": "   " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message cannot be empty");
    }

    #[tokio::test]
    async fn test_status_and_refresh() {
        let (source, feed) = loaded().await;
        let (status, body) = get_json(app(source.clone(), feed.clone()), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chain"], "base-sepolia");
        assert_eq!(body["initialized"], true);
        assert_eq!(body["total_entries"], 2);

        // Just refreshed, so the manual refetch is served from cache
        let (status, body) = post_json(app(source, feed), "/api/refresh", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refreshed"], false);
    }
}
