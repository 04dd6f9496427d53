use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use cut_planner::normalize::{RawRow, SkippedRow};
use cut_planner::packer::PlaceAlgorithm;
use cut_planner::plan::{PlanConfig, Planner};
use cut_planner::report::{self, PlanRow, UnplaceableRow};
use cut_planner::split::SplitStrategy;
use cut_planner::types::{DEFAULT_BAR_LENGTH, Len};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Deserialize)]
struct PlanRequest {
    rows: Vec<RawRow>,
    #[serde(default)]
    split_strategy: SplitStrategy,
    capacity: Option<Len>,
    #[serde(default)]
    algorithm: PlaceAlgorithm,
    /// Optional wall-clock budget; past it remaining buckets are packed
    /// greedily instead of searched.
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct PlanResponse {
    rows: Vec<PlanRow>,
    skipped: Vec<SkippedRow>,
    unplaceable: Vec<UnplaceableRow>,
    bar_count: usize,
    total_pieces: u64,
    total_waste: f64,
    waste_percent: f64,
}

async fn plan(Json(req): Json<PlanRequest>) -> Result<Json<PlanResponse>, (StatusCode, String)> {
    tracing::info!(
        rows = req.rows.len(),
        strategy = ?req.split_strategy,
        "POST /plan"
    );

    let capacity = req.capacity.unwrap_or(DEFAULT_BAR_LENGTH);
    if capacity.is_zero() {
        return Err((
            StatusCode::BAD_REQUEST,
            "capacity must be positive".to_string(),
        ));
    }

    let config = PlanConfig {
        split_strategy: req.split_strategy,
        capacity,
        algorithm: req.algorithm,
        deadline: req
            .timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms)),
        ..PlanConfig::default()
    };
    let plan = Planner::new(config).plan(&req.rows);

    let response = PlanResponse {
        rows: report::plan_rows(&plan),
        unplaceable: report::unplaceable_rows(&plan.unplaceable),
        bar_count: plan.bar_count(),
        total_pieces: plan.total_pieces(),
        total_waste: plan.total_waste(),
        waste_percent: plan.waste_percent(),
        skipped: plan.skipped,
    };

    Ok(Json(response))
}

#[tokio::main]
async fn main() {
    let _sentry = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
        .expect("failed to open development.log");

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");

    let app = Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/plan", post(plan))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    eprintln!("Listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}
