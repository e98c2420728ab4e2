//! Read-only HTTP status surface for the coordinator.

pub mod types;

pub use types::*;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use card_table::{GameState, Pile, Table};
use tower_http::cors::CorsLayer;

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/table", get(get_table_summary))
        .route("/api/table/:slot", get(get_pile))
        .route("/api/viewers", get(list_viewers))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the status API until the listener fails.
pub async fn serve(addr: &str, state: AppState) -> Result<(), String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind status API on {}: {}", addr, e))?;
    tracing::info!("Status API listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| format!("status API stopped: {}", e))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/state
///
/// The full snapshot, exactly what viewers receive.
pub async fn get_state(State(state): State<AppState>) -> Json<GameState> {
    Json(state.snapshot().await)
}

/// GET /api/table
pub async fn get_table_summary(State(state): State<AppState>) -> Json<TableSummaryResponse> {
    let snapshot = state.snapshot().await;
    Json(TableSummaryResponse {
        piles: snapshot
            .table
            .piles()
            .map(|(slot, pile)| pile_response(slot, pile))
            .collect(),
        pile_names: snapshot.pile_names.iter().cloned().collect(),
        default_pile_counter: snapshot.default_pile_counter,
        host_still_present: snapshot.host_still_present,
    })
}

/// GET /api/table/{slot}
pub async fn get_pile(
    State(state): State<AppState>,
    Path(slot): Path<i32>,
) -> Result<Json<PileResponse>, StatusCode> {
    let slot = Table::slot_index(slot).ok_or(StatusCode::BAD_REQUEST)?;
    let session = state.session.lock().await;
    let pile = session
        .dispatcher
        .state()
        .pile(slot)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(pile_response(slot, pile)))
}

/// GET /api/viewers
pub async fn list_viewers(State(state): State<AppState>) -> Json<ViewersResponse> {
    let session = state.session.lock().await;
    let viewers: Vec<ViewerInfo> = session
        .viewers
        .viewers()
        .map(|viewer| ViewerInfo {
            id: viewer.id.to_string(),
            addr: viewer.addr.clone(),
        })
        .collect();
    Json(ViewersResponse {
        count: viewers.len(),
        viewers,
    })
}

fn pile_response(slot: usize, pile: &Pile) -> PileResponse {
    PileResponse {
        slot,
        name: pile.name().to_string(),
        owner: pile.owner().to_string(),
        size: pile.len(),
        face_up: pile.iter().filter(|c| c.is_face_up()).count(),
    }
}
