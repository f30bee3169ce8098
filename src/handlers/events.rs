use crate::error::AppError;
use crate::handlers::require_admin;
use crate::models::event::CreateEventRequest;
use crate::state::AppState;
use chrono::Utc;
use ntex::web::{self, HttpRequest, HttpResponse};
use std::sync::Arc;

pub async fn active_events(state: web::types::State<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(&state.events.active_events(Utc::now()))
}

pub async fn create_event(
    req: HttpRequest,
    state: web::types::State<Arc<AppState>>,
    body: web::types::Json<CreateEventRequest>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, &req)?;
    let event = state
        .events
        .create_event(&state.config, body.into_inner(), Utc::now())?;
    Ok(HttpResponse::Ok().json(&event))
}

pub async fn end_event(
    req: HttpRequest,
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
) -> Result<HttpResponse, AppError> {
    require_admin(&state, &req)?;
    let event = state.events.end_event(&path.into_inner(), Utc::now())?;
    Ok(HttpResponse::Ok().json(&event))
}
