use crate::error::AppError;
use crate::handlers::require_admin;
use crate::models::store::*;
use crate::services::store as service;
use crate::state::AppState;
use crate::validation;
use chrono::Utc;
use ntex::web::{self, HttpRequest, HttpResponse};
use std::sync::Arc;

pub async fn get_store(
    state: web::types::State<Arc<AppState>>,
    query: web::types::Query<StoreQuery>,
) -> Result<HttpResponse, AppError> {
    let user = match query.user.as_deref() {
        Some(id) => Some(validation::validate_user_id(id)?),
        None => None,
    };
    let view = service::store_view(&state.db, &state.config, &state.cooldowns, user, Utc::now());
    Ok(HttpResponse::Ok().json(&view))
}

pub async fn force_refresh(
    req: HttpRequest,
    state: web::types::State<Arc<AppState>>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, &req)?;
    let event = state
        .monitor
        .force_refresh(Utc::now())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok().json(&event))
}

pub async fn update_announcements(
    req: HttpRequest,
    state: web::types::State<Arc<AppState>>,
    body: web::types::Json<AnnouncementUpdate>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, &req)?;
    let settings = state.announcer.update(body.into_inner())?;
    Ok(HttpResponse::Ok().json(&settings))
}
