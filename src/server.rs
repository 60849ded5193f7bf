use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::catalog::{Catalog, NomineeKey};
use crate::config::Config;
use crate::ranking::{gaps, rank, ranking_table, GapRecord, RankingRow};
use crate::store::{
    HistoryQuery, SubscriberCredentials, SubscriptionError, SubscriptionStore, VoteObservation,
    VoteStore,
};

#[derive(Clone)]
struct ApiState {
    config: Config,
    catalog: Arc<Catalog>,
    db_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(error: SubscriptionError) -> Self {
        match error {
            SubscriptionError::Validation(e) => Self::bad_request(e.to_string()),
            SubscriptionError::Storage(e) => Self::internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Deserialize, Default)]
struct HistoryParams {
    award_id: Option<String>,
    nominee_id: Option<String>,
    /// RFC 3339 lower bound on the observation timestamp.
    since: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct GapsParams {
    award_id: String,
    nominee_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SubscriptionKeys {
    #[serde(default)]
    p256dh: String,
    #[serde(default)]
    auth: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscribeRequest {
    endpoint: String,
    #[serde(default)]
    keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Deserialize)]
struct UnsubscribeRequest {
    endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PreferencesRequest {
    endpoint: String,
    #[serde(default)]
    nominees: Vec<NomineeKey>,
    /// Defaults to the configured minimum when omitted.
    summary_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PreferencesParams {
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct AwardEntry {
    award_id: String,
    award_name: String,
    nominees: Vec<crate::catalog::Nominee>,
}

#[derive(Debug, Serialize)]
struct CategoriesResponse {
    awards: Vec<AwardEntry>,
}

#[derive(Debug, Serialize)]
struct RankingResponse {
    award_id: String,
    award_name: String,
    rows: Vec<RankingRow>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    observations: Vec<VoteObservation>,
}

#[derive(Debug, Serialize)]
struct GapsResponse {
    award_id: String,
    record: GapRecord,
}

#[derive(Debug, Serialize)]
struct SubscribeResponse {
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct PreferencesResponse {
    endpoint: String,
    nominees: Vec<NomineeKey>,
    summary_interval_secs: u64,
}

pub async fn run_server(config: Config, catalog: Catalog, bind: SocketAddr) -> Result<()> {
    let state = ApiState {
        db_path: config.resolved_db_path(),
        catalog: Arc::new(catalog),
        config,
    };
    let cors = build_cors(&state.config.server.cors_origins);

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/categories", get(categories))
        .route("/v1/ranking/:award_id", get(ranking))
        .route("/v1/gaps", get(ranking_gaps))
        .route("/v1/history", get(history))
        .route("/v1/subscribe", post(subscribe))
        .route("/v1/unsubscribe", post(unsubscribe))
        .route("/v1/preferences", get(show_preferences).post(set_preferences))
        .route("/v1/config", get(show_config))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config)
}

async fn categories(State(state): State<ApiState>) -> Json<ApiResponse<CategoriesResponse>> {
    let awards = state
        .catalog
        .awards
        .iter()
        .map(|(award_id, award)| AwardEntry {
            award_id: award_id.clone(),
            award_name: award.award_name.clone(),
            nominees: award.nominees.clone(),
        })
        .collect();
    ok(CategoriesResponse { awards })
}

async fn ranking(
    State(state): State<ApiState>,
    Path(award_id): Path<String>,
) -> ApiResult<RankingResponse> {
    let Some(award) = state.catalog.award(&award_id) else {
        return Err(ApiError::not_found(format!("unknown award: {award_id}")));
    };
    let store = open_votes(&state)?;
    let latest = store
        .latest_for_award(&award_id)
        .map_err(ApiError::internal)?;
    let rows = ranking_table(&state.catalog, &award_id, &latest);

    Ok(ok(RankingResponse {
        award_id,
        award_name: award.award_name.clone(),
        rows,
    }))
}

async fn ranking_gaps(
    State(state): State<ApiState>,
    Query(params): Query<GapsParams>,
) -> ApiResult<GapsResponse> {
    if !state.catalog.awards.contains_key(&params.award_id) {
        return Err(ApiError::not_found(format!(
            "unknown award: {}",
            params.award_id
        )));
    }
    let store = open_votes(&state)?;
    let latest = store
        .latest_for_award(&params.award_id)
        .map_err(ApiError::internal)?;
    let ranked = rank(&latest);
    let Some(record) = gaps(&ranked, &params.nominee_id) else {
        return Err(ApiError::not_found(format!(
            "no votes recorded for nominee {} in award {}",
            params.nominee_id, params.award_id
        )));
    };

    Ok(ok(GapsResponse {
        award_id: params.award_id,
        record,
    }))
}

async fn history(
    State(state): State<ApiState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<HistoryResponse> {
    let since = parse_since(params.since.as_deref())?;
    let store = open_votes(&state)?;
    let observations = store
        .query_history(&HistoryQuery {
            award_id: params.award_id,
            nominee_id: params.nominee_id,
            since,
            limit: params.limit,
        })
        .map_err(ApiError::internal)?;

    Ok(ok(HistoryResponse { observations }))
}

async fn subscribe(
    State(state): State<ApiState>,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<SubscribeResponse> {
    let store = open_subscriptions(&state)?;
    store.subscribe(&SubscriberCredentials {
        endpoint: request.endpoint.clone(),
        p256dh: request.keys.p256dh,
        auth: request.keys.auth,
    })?;

    Ok(ok(SubscribeResponse {
        endpoint: request.endpoint,
    }))
}

async fn unsubscribe(
    State(state): State<ApiState>,
    Json(request): Json<UnsubscribeRequest>,
) -> ApiResult<SubscribeResponse> {
    let store = open_subscriptions(&state)?;
    store
        .unsubscribe(&request.endpoint)
        .map_err(ApiError::internal)?;

    Ok(ok(SubscribeResponse {
        endpoint: request.endpoint,
    }))
}

async fn set_preferences(
    State(state): State<ApiState>,
    Json(request): Json<PreferencesRequest>,
) -> ApiResult<PreferencesResponse> {
    for key in &request.nominees {
        if !state.catalog.contains(key) {
            return Err(ApiError::bad_request(format!(
                "unknown nominee in filter: {key}"
            )));
        }
    }
    let min_interval = state.config.notify.min_summary_interval_secs;
    let summary_interval_secs = request.summary_interval_secs.unwrap_or(min_interval);
    let store = open_subscriptions(&state)?;
    store.set_preferences(
        &request.endpoint,
        &request.nominees,
        summary_interval_secs,
        min_interval,
    )?;

    Ok(ok(PreferencesResponse {
        endpoint: request.endpoint,
        nominees: request.nominees,
        summary_interval_secs,
    }))
}

async fn show_preferences(
    State(state): State<ApiState>,
    Query(params): Query<PreferencesParams>,
) -> ApiResult<PreferencesResponse> {
    let store = open_subscriptions(&state)?;
    let Some(preference) = store
        .get_preferences(&params.endpoint)
        .map_err(ApiError::internal)?
    else {
        return Err(ApiError::not_found(format!(
            "no preferences stored for endpoint {}",
            params.endpoint
        )));
    };

    Ok(ok(PreferencesResponse {
        endpoint: params.endpoint,
        nominees: preference.nominee_filter,
        summary_interval_secs: preference.summary_interval_secs,
    }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn open_votes(state: &ApiState) -> std::result::Result<VoteStore, ApiError> {
    VoteStore::open(&state.db_path).map_err(ApiError::internal)
}

fn open_subscriptions(state: &ApiState) -> std::result::Result<SubscriptionStore, ApiError> {
    SubscriptionStore::open(&state.db_path).map_err(ApiError::internal)
}

fn parse_since(raw: Option<&str>) -> std::result::Result<Option<DateTime<Utc>>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| ApiError::bad_request(format!("`since` is not an RFC 3339 timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::parse_since;

    #[test]
    fn parses_rfc3339_since_bound() {
        let parsed = parse_since(Some("2026-01-15T08:30:00Z")).expect("valid timestamp");
        assert_eq!(
            parsed.map(|dt| dt.to_rfc3339()),
            Some("2026-01-15T08:30:00+00:00".to_string())
        );
        assert!(parse_since(None).expect("absent is fine").is_none());
        assert!(parse_since(Some("yesterday")).is_err());
    }
}
