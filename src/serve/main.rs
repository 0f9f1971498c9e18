//! Address lookup server.
//!
//! Provides an HTTP API over the address cascade: stateless option lookups,
//! per-session cascades with select/reset/search actions, and reference
//! number lookups.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use kepco_addr::config::DefaultSelection;
use kepco_addr::{
    AddressLevel, AddressResolver, AddressSelection, CascadeView, Config, KepcoClient,
    LookupError, OptionList, ResolvedAddress, SelectionError,
};

mod session;
use session::{Session, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "serve")]
#[command(about = "KEPCO address lookup server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minutes a session may sit idle before it is dropped
    #[arg(long, default_value = "30")]
    session_ttl: u32,
}

/// Application state shared across handlers
struct AppState {
    resolver: AddressResolver,
    sessions: SessionStore,
    defaults: DefaultSelection,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("KEPCO Address Lookup Server");
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!("Address service at {}", config.service.base_url);
    if config.reference_lookup.url.is_none() {
        warn!("Reference number lookup disabled; set KEPCO_ESB_SEARCH_URL to enable it");
    }

    let client = KepcoClient::from_config(&config).context("Failed to create address client")?;

    let state = Arc::new(AppState {
        resolver: AddressResolver::new(client),
        sessions: SessionStore::new(Duration::minutes(i64::from(args.session_ttl))),
        defaults: config.cascade.defaults.clone(),
    });

    // Periodically drop idle sessions
    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(StdDuration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = purge_state.sessions.purge_expired(Utc::now()).await;
            if purged > 0 {
                info!("Purged {} idle sessions", purged);
            }
        }
    });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/provinces", get(provinces_handler))
        .route("/v1/options", get(options_handler))
        .route("/v1/sessions", post(create_session_handler))
        .route(
            "/v1/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/v1/sessions/{id}/select", post(select_handler))
        .route("/v1/sessions/{id}/reset", post(reset_handler))
        .route("/v1/sessions/{id}/search", post(search_handler))
        .route("/v1/esb", post(esb_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        reference_lookup: state.resolver.client().has_reference_lookup(),
        sessions: state.sessions.len().await,
        cached_option_lists: state.resolver.len().await,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    reference_lookup: bool,
    sessions: usize,
    cached_option_lists: usize,
}

/// Province list
async fn provinces_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OptionsResponse>, ApiError> {
    let options = state.resolver.provinces().await.map_err(lookup_error)?;
    Ok(Json(OptionsResponse {
        level: AddressLevel::Province,
        options,
    }))
}

/// Options for one level given its ancestors as query parameters
async fn options_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OptionsQueryParams>,
) -> Result<Json<OptionsResponse>, ApiError> {
    let level: AddressLevel = params
        .level
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    let selection = params.selection().map_err(selection_error)?;

    // Ancestors are checked against their parent lists so arbitrary input
    // never reaches the upstream or the shared cache
    let options = state
        .resolver
        .checked_options_for(level, &selection)
        .await
        .map_err(lookup_error)?;

    Ok(Json(OptionsResponse { level, options }))
}

/// Start a new cascade, preselecting configured defaults
async fn create_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (id, handle) = state.sessions.create().await;
    let mut session = handle.lock().await;

    let outcome = if state.defaults.is_empty() {
        session.cascade.refresh(&state.resolver).await
    } else {
        session
            .cascade
            .apply_defaults(&state.resolver, &state.defaults)
            .await
            .map(|_| ())
    };
    if let Err(e) = outcome {
        warn!("Session {} started with a failed fetch: {}", id, e);
    }

    Ok((StatusCode::CREATED, Json(SessionResponse::new(id, &session))))
}

async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    session.touch();
    Ok(Json(SessionResponse::new(id, &session)))
}

async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if state.sessions.remove(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Choose a value at one level and fetch what the new selection needs
async fn select_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    session.touch();

    // Values are only accepted against a loaded option list
    let clears = body.value.trim().is_empty() || body.value.trim() == body.level.placeholder();
    if !clears && session.cascade.options(body.level).is_none() {
        return Err((
            StatusCode::CONFLICT,
            format!("{} options are not loaded; reset or retry", body.level),
        ));
    }

    session
        .cascade
        .select(body.level, &body.value)
        .map_err(selection_error)?;

    // A failed fetch is reported on its level in the view
    if let Err(e) = session.cascade.refresh(&state.resolver).await {
        warn!("Session {}: {}", id, e);
    }

    Ok(Json(SessionResponse::new(id, &session)))
}

async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    session.touch();

    session.cascade.reset();
    if let Err(e) = session.cascade.refresh(&state.resolver).await {
        warn!("Session {}: {}", id, e);
    }

    Ok(Json(SessionResponse::new(id, &session)))
}

/// Submit a completed selection
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SearchResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let mut session = handle.lock().await;
    session.touch();

    let resolved = session.cascade.resolved().ok_or_else(|| {
        (
            StatusCode::CONFLICT,
            "every address level must be selected before searching".to_string(),
        )
    })?;

    info!("Session {} resolved an address", id);
    Ok(Json(SearchResponse {
        resolved,
        resolved_at: Utc::now(),
    }))
}

/// Reference (computation) number lookup
async fn esb_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EsbRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.esb_no.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "esb_no must not be empty".to_string(),
        ));
    }

    let response = state
        .resolver
        .lookup_by_reference_number(&body.esb_no)
        .await
        .map_err(lookup_error)?;

    Ok(Json(response.into_value()))
}

async fn find_session(
    state: &AppState,
    id: &Uuid,
) -> Result<session::SessionHandle, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown session {}", id)))
}

fn lookup_error(e: LookupError) -> ApiError {
    let status = match &e {
        LookupError::Upstream { .. }
        | LookupError::UpstreamStatus { .. }
        | LookupError::Serialization(_) => StatusCode::BAD_GATEWAY,
        LookupError::EmptyResult(_) => StatusCode::NOT_FOUND,
        LookupError::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
        LookupError::IncompleteAncestors(_) => StatusCode::BAD_REQUEST,
        LookupError::InvalidSelection(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LookupError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Lookup failed: {}", e);
    }
    (status, e.to_string())
}

fn selection_error(e: SelectionError) -> ApiError {
    (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
}

#[derive(Deserialize)]
struct OptionsQueryParams {
    /// Level to list (e.g. "district" or "addr_gu")
    level: String,
    addr_do: Option<String>,
    addr_si: Option<String>,
    addr_gu: Option<String>,
    addr_lidong: Option<String>,
    addr_li: Option<String>,
}

impl OptionsQueryParams {
    /// Ancestors as a selection; stops at the first missing or blank parameter
    fn selection(&self) -> Result<AddressSelection, SelectionError> {
        AddressSelection::from_values(
            [
                &self.addr_do,
                &self.addr_si,
                &self.addr_gu,
                &self.addr_lidong,
                &self.addr_li,
            ]
            .map(|value| value.as_deref().map(str::trim).filter(|v| !v.is_empty())),
        )
    }
}

#[derive(Deserialize)]
struct SelectRequest {
    level: AddressLevel,
    value: String,
}

#[derive(Deserialize)]
struct EsbRequest {
    esb_no: String,
}

#[derive(Serialize)]
struct OptionsResponse {
    level: AddressLevel,
    options: OptionList,
}

#[derive(Serialize)]
struct SessionResponse {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    view: CascadeView,
}

impl SessionResponse {
    fn new(id: Uuid, session: &Session) -> Self {
        Self {
            id,
            created_at: session.created_at,
            view: session.cascade.view(),
        }
    }
}

#[derive(Serialize)]
struct SearchResponse {
    resolved: ResolvedAddress,
    resolved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(addr_do: Option<&str>, addr_si: Option<&str>) -> OptionsQueryParams {
        OptionsQueryParams {
            level: "district".to_string(),
            addr_do: addr_do.map(str::to_string),
            addr_si: addr_si.map(str::to_string),
            addr_gu: None,
            addr_lidong: None,
            addr_li: None,
        }
    }

    #[test]
    fn test_blank_query_values_count_as_missing() {
        let selection = params(Some(""), None).selection().unwrap();
        assert!(selection.is_empty());

        let selection = params(Some("  "), Some("강릉시")).selection().unwrap();
        assert!(selection.is_empty());
    }

    #[test]
    fn test_query_values_are_trimmed() {
        let selection = params(Some(" 강원특별자치도 "), Some("강릉시\t"))
            .selection()
            .unwrap();
        assert_eq!(selection.get(AddressLevel::Province), Some("강원특별자치도"));
        assert_eq!(selection.get(AddressLevel::City), Some("강릉시"));
    }

    #[test]
    fn test_session_ttl_rejects_negative_minutes() {
        assert!(Args::try_parse_from(["serve", "--session-ttl", "-5"]).is_err());
        let args = Args::try_parse_from(["serve", "--session-ttl", "4294967295"]).unwrap();
        let ttl = Duration::minutes(i64::from(args.session_ttl));
        assert!(ttl > Duration::days(365));
    }

    #[test]
    fn test_invalid_selection_maps_to_unprocessable() {
        let err = LookupError::from(SelectionError::NotAnOption {
            level: AddressLevel::Province,
            value: "garbage".to_string(),
        });
        assert_eq!(lookup_error(err).0, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
