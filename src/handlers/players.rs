use crate::error::AppError;
use crate::state::AppState;
use chrono::Utc;
use ntex::web::{self, HttpResponse};
use std::sync::Arc;

pub async fn by_rank(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<u32>,
) -> Result<HttpResponse, AppError> {
    let rank = path.into_inner();
    let snapshot = state.cache.fresh_or_stale(Utc::now()).await?;
    let player = snapshot
        .by_rank(rank)
        .ok_or_else(|| AppError::NotFound(format!("No cached player at rank {}", rank)))?;
    Ok(HttpResponse::Ok().json(player))
}

pub async fn by_name(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
) -> Result<HttpResponse, AppError> {
    let name = path.into_inner();
    let snapshot = state.cache.fresh_or_stale(Utc::now()).await?;
    let player = snapshot
        .by_username(&name)
        .ok_or_else(|| AppError::NotFound(format!("No cached player named {}", name)))?;
    Ok(HttpResponse::Ok().json(player))
}

pub async fn cache_status(state: web::types::State<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(&state.cache.status(Utc::now()))
}
