//! Server start-up for the stdio MCP transport and the HTTP dashboard.
//!
//! The HTTP server also carries MCP over Streamable HTTP at `/mcp`.
//!
//! Both entry points share [`open_warehouse`], which loads the world, builds the
//! [`Warehouse`], and indexes the configured storage area once.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::ServiceExt;
use serde::Deserialize;
use std::sync::Arc;

use crate::tools::StockpileTools;
use stockpile::config::StockpileConfig;
use stockpile::error::StockpileError;
use stockpile::scan::ScanRegion;
use stockpile::service::Warehouse;
use stockpile::world::sim::SimulatedWorld;

/// Shared setup: load the world fixture, build the warehouse, and run the first scan.
pub async fn open_warehouse(config: StockpileConfig) -> Result<Arc<Warehouse>> {
    let fixture = config.resolved_fixture_path();
    let world = SimulatedWorld::load(&fixture)?;
    tracing::info!(fixture = %fixture.display(), "world loaded");

    let config = Arc::new(config);
    let warehouse = Arc::new(Warehouse::new(Arc::clone(&config), Box::new(world.agent()))?);

    if config.world.storage_corners.is_empty() {
        tracing::warn!("no storage corners configured, index starts empty until a reload with a region");
    } else {
        let report = warehouse
            .request_reload(None)
            .await
            .context("initial storage scan failed")?;
        tracing::info!(
            containers = report.containers_indexed,
            skipped = report.skipped.len(),
            "initial storage scan complete"
        );
    }

    Ok(warehouse)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: StockpileConfig) -> Result<()> {
    tracing::info!("starting Stockpile MCP server on stdio");

    let warehouse = open_warehouse(config).await?;

    let tools = StockpileTools::new(warehouse);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the HTTP dashboard API, with MCP mounted at `/mcp`.
pub async fn serve_http(config: StockpileConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting Stockpile dashboard on HTTP");

    let warehouse = open_warehouse(config).await?;

    let tools_state = Arc::clone(&warehouse);
    let mcp = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(StockpileTools::new(Arc::clone(&tools_state))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );
    let router = dashboard_router(warehouse).nest_service("/mcp", mcp);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "dashboard at http://{bind_addr}/storage, MCP at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down dashboard");
        })
        .await?;

    Ok(())
}

pub fn dashboard_router(warehouse: Arc<Warehouse>) -> Router {
    Router::new()
        .route("/storage", get(storage))
        .route("/search", get(search))
        .route("/withdraw", post(withdraw))
        .route("/deposit", post(deposit))
        .route("/reload", post(reload))
        .with_state(warehouse)
}

struct ApiError(StockpileError);

impl From<StockpileError> for ApiError {
    fn from(e: StockpileError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StockpileError::Busy => StatusCode::CONFLICT,
            StockpileError::InvalidRegion(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct WithdrawBody {
    name: String,
    amount: u32,
}

#[derive(Deserialize, Default)]
struct ReloadBody {
    corner_a: Option<[i32; 3]>,
    corner_b: Option<[i32; 3]>,
}

async fn storage(State(warehouse): State<Arc<Warehouse>>) -> ApiResult {
    Ok(Json(warehouse.request_listing()?).into_response())
}

async fn search(
    State(warehouse): State<Arc<Warehouse>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult {
    Ok(Json(warehouse.request_search(&query.q)?).into_response())
}

async fn withdraw(
    State(warehouse): State<Arc<Warehouse>>,
    Json(body): Json<WithdrawBody>,
) -> ApiResult {
    let response = warehouse.request_withdraw(&body.name, body.amount).await?;
    Ok(Json(response).into_response())
}

async fn deposit(State(warehouse): State<Arc<Warehouse>>) -> ApiResult {
    Ok(Json(warehouse.request_deposit_all().await?).into_response())
}

async fn reload(
    State(warehouse): State<Arc<Warehouse>>,
    body: Bytes,
) -> ApiResult {
    // An empty body scans the configured storage area.
    let body: ReloadBody = if body.is_empty() {
        ReloadBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                let error = serde_json::json!({ "error": format!("invalid reload body: {e}") });
                return Ok((StatusCode::BAD_REQUEST, Json(error)).into_response());
            }
        }
    };
    let region = match (body.corner_a, body.corner_b) {
        (Some(a), Some(b)) => Some(ScanRegion::from_corners(a.into(), b.into())),
        (None, None) => None,
        _ => {
            return Err(StockpileError::InvalidRegion(
                "give both corner_a and corner_b, or neither".into(),
            )
            .into())
        }
    };
    Ok(Json(warehouse.request_reload(region).await?).into_response())
}
