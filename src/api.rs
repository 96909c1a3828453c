use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use tower_http::cors::CorsLayer;

use crate::scoring::{
    self, evaluate_calibration, CalibrationResult, CreatorDaily, CreatorDayInputs,
    MaturedPrediction, ScoreComponents, ScoringConfig, SentinelReport,
};
use crate::signals::{cache, BreakerState, BreakerStatus, SignalHub, SourceMetrics};

/// Tells consumers whether a snapshot came from a live merge, the cache
/// fallback, or is the explicit empty degradation.
const ORIGIN_HEADER: &str = "x-signals-origin";

/// Sentinel sweeps posted over HTTP are chunked at this size.
const SENTINEL_BATCH: usize = 500;

#[derive(Clone)]
pub struct AppState {
    hub: Arc<SignalHub>,
    scoring: Arc<RwLock<ScoringConfig>>,
}

impl AppState {
    pub fn new(hub: Arc<SignalHub>, scoring: ScoringConfig) -> Self {
        Self {
            hub,
            scoring: Arc::new(RwLock::new(scoring)),
        }
    }

    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signals", get(get_signals))
        .route("/debug/breakers", get(debug_breakers))
        .route("/debug/telemetry", get(debug_telemetry))
        .route("/admin/reset-breaker/{source}", post(admin_reset_breaker))
        .route("/admin/clear-cache", post(admin_clear_cache))
        .route("/admin/reload-scoring", post(admin_reload_scoring))
        .route("/admin/validate-records", post(admin_validate_records))
        .route("/score", post(score_components))
        .route("/score/day", post(score_day))
        .route("/calibration", post(calibration))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceHealth {
    breaker: BreakerStatus,
    telemetry: Option<SourceMetrics>,
}

#[derive(serde::Serialize)]
struct HealthResp {
    status: &'static str,
    sources: BTreeMap<String, SourceHealth>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    let breakers = state.hub.breaker().states();
    let mut telemetry = state.hub.telemetry().all_metrics();

    let any_closed = breakers.is_empty()
        || breakers
            .values()
            .any(|s| s.state != BreakerState::Open);
    let sources = breakers
        .into_iter()
        .map(|(name, breaker)| {
            let telemetry = telemetry.remove(&name);
            (name, SourceHealth { breaker, telemetry })
        })
        .collect();

    Json(HealthResp {
        status: if any_closed { "ok" } else { "degraded" },
        sources,
    })
}

async fn get_signals(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let snapshot = state.hub.aggregate().await;
    let etag = format!("\"{}\"", cache::compute_etag(&snapshot.items));

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if if_none_match.split(',').any(|t| t.trim() == etag) {
            return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
        }
    }

    let origin = if snapshot.served_from_cache {
        "cache"
    } else if snapshot.items.is_empty() {
        "empty"
    } else {
        "live"
    };

    (
        [
            (header::ETAG.as_str(), etag),
            (ORIGIN_HEADER, origin.to_string()),
        ],
        Json(snapshot),
    )
        .into_response()
}

async fn debug_breakers(State(state): State<AppState>) -> Json<BTreeMap<String, BreakerStatus>> {
    Json(state.hub.breaker().states())
}

async fn debug_telemetry(State(state): State<AppState>) -> Json<BTreeMap<String, SourceMetrics>> {
    Json(state.hub.telemetry().all_metrics())
}

async fn admin_reset_breaker(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Response {
    if state.hub.breaker().reset(&source) {
        (StatusCode::OK, "reset".to_string()).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            format!("unknown source '{source}'"),
        )
            .into_response()
    }
}

async fn admin_clear_cache(State(state): State<AppState>) -> String {
    state.hub.cache().clear();
    "cleared".to_string()
}

async fn admin_reload_scoring(State(state): State<AppState>) -> String {
    match crate::config::load_config_default() {
        Ok(cfg) => match state.scoring.write() {
            Ok(mut s) => {
                *s = cfg.scoring;
                "reloaded".to_string()
            }
            Err(_) => "failed: lock poisoned".to_string(),
        },
        Err(e) => format!("failed: {e:#}"),
    }
}

async fn admin_validate_records(
    State(_state): State<AppState>,
    Json(records): Json<Vec<CreatorDaily>>,
) -> Json<SentinelReport> {
    Json(scoring::validate_in_batches(&records, SENTINEL_BATCH).await)
}

#[derive(serde::Serialize)]
struct ScoreResp {
    score: f64,
}

async fn score_components(
    State(state): State<AppState>,
    Json(components): Json<ScoreComponents>,
) -> Response {
    let weights = state.scoring.read().expect("scoring rwlock poisoned").weights;
    match scoring::compute_score(&components, &weights) {
        Ok(score) => Json(ScoreResp { score }).into_response(),
        Err(violation) => {
            counter!("scoring_rejections_total").increment(1);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(violation)).into_response()
        }
    }
}

async fn score_day(
    State(state): State<AppState>,
    Json(inputs): Json<CreatorDayInputs>,
) -> Response {
    let cfg = state.scoring.read().expect("scoring rwlock poisoned").clone();
    match scoring::score_creator_day(&inputs, &cfg) {
        Ok(record) => Json(record).into_response(),
        Err(violation) => {
            counter!("scoring_rejections_total").increment(1);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(violation)).into_response()
        }
    }
}

async fn calibration(
    Json(predictions): Json<Vec<MaturedPrediction>>,
) -> Json<CalibrationResult> {
    Json(evaluate_calibration(&predictions))
}
