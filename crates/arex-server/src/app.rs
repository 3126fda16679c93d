//! HTTP app: a landing page and the telemetry endpoint.

use arex_core::metrics::ExporterMetrics;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use std::time::Instant;

/// State shared by the HTTP handlers. The registry holds the self-metrics
/// and one cached collector per enabled resource kind.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub metrics: ExporterMetrics,
    pub telemetry_path: String,
}

/// Builds the exporter's router. The telemetry path comes from the flags and
/// must not collide with the landing page on `/`.
pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route(&state.telemetry_path, get(serve_metrics))
        .with_state(state)
}

async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>AWS Resource Exporter</title></head>\n<body>\n\
         <h1>AWS Resource Exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n</html>\n",
        state.telemetry_path
    ))
}

/// Serves everything the registry currently holds. Never touches the
/// network: resource samples come from the cache through the registered
/// collectors.
async fn serve_metrics(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::with_capacity(4096);
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => {
            state.metrics.record_scrape(started.elapsed(), true);
            ([(header::CONTENT_TYPE, encoder.format_type())], buffer).into_response()
        }
        Err(error) => {
            state.metrics.record_scrape(started.elapsed(), false);
            tracing::error!(error = %error, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {error}"),
            )
                .into_response()
        }
    }
}
