use axum::{
    extract::{Query, State},
    http::{self, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::pipeline::{self, MetricData};
use crate::tableau::TableauClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: TableauClient,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct JwtResponse {
    pub jwt: String,
}

/// One Pulse metric the frontend embeds
#[derive(Debug, Serialize)]
pub struct EmbeddedMetric {
    pub id: String,
    pub src: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub metrics: Vec<EmbeddedMetric>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDataQuery {
    metric_id: Option<String>,
}

pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let mut cors = CorsLayer::new()
        .allow_methods(vec![http::Method::GET])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(false);
    if let Some(origin) = &state.config.cors_origin {
        cors = cors.allow_origin(origin.parse::<http::HeaderValue>()?);
    } else {
        cors = cors.allow_origin(Any);
    }

    // The browser dev proxy forwards `/api/*` untouched.
    let routes = Router::new()
        .route("/tableauJwt", get(tableau_jwt))
        .route("/tableauSettings", get(tableau_settings))
        .route("/getMetricData", get(get_metric_data));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(routes.clone())
        .nest("/api", routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );
    Ok(app)
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "pulse-dashboard-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// EMBEDDING
// =============================================================================

/// Fresh assertion for the Pulse embedding components
async fn tableau_jwt(State(state): State<AppState>) -> Result<Json<JwtResponse>, BridgeError> {
    let jwt = state.client.signer().mint()?;
    Ok(Json(JwtResponse { jwt }))
}

async fn tableau_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let config = &state.config;
    let base = config.endpoints.base_url.as_str().trim_end_matches('/');
    let site = &config.identity.site_name;

    let metrics = config
        .metric_ids
        .iter()
        .map(|id| EmbeddedMetric {
            id: id.clone(),
            src: format!("{}/pulse/site/{}/metrics/{}", base, site, id),
            key: format!("tableau-metric-{}", id),
        })
        .collect();

    Json(SettingsResponse { metrics })
}

// =============================================================================
// METRIC DATA
// =============================================================================

async fn get_metric_data(
    State(state): State<AppState>,
    Query(q): Query<MetricDataQuery>,
) -> Result<Json<MetricData>, axum::response::Response> {
    let metric_id = match q.metric_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            warn!("getMetricData called without a metricId");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "metricId is required".to_string(),
                }),
            )
                .into_response());
        }
    };

    info!("Fetching data for metric {}", metric_id);
    let data = pipeline::get_metric_data(&state.client, &metric_id)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(data))
}
