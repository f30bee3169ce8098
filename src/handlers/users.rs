use crate::error::AppError;
use crate::models::card::*;
use crate::models::event::EventPurchaseRequest;
use crate::models::store::{EmergencyRequest, PurchaseRequest};
use crate::services::{collection, store};
use crate::state::AppState;
use crate::validation;
use chrono::Utc;
use ntex::web::{self, HttpResponse};
use std::sync::Arc;

fn user_id(path: web::types::Path<String>) -> Result<String, AppError> {
    Ok(validation::validate_user_id(&path.into_inner())?.to_string())
}

pub async fn get_profile(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    Ok(HttpResponse::Ok().json(&collection::profile(&state.db, &user_id)))
}

pub async fn list_cards(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    Ok(HttpResponse::Ok().json(&collection::list_cards(&state.db, &user_id)))
}

pub async fn open_crates(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<OpenRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = collection::open_crates(&state, &user_id, body.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn buy_crates(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<PurchaseRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = store::purchase(
        &state.db,
        &state.config,
        &state.cooldowns,
        &user_id,
        body.into_inner(),
        Utc::now(),
    )?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn emergency_purchase(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<EmergencyRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = store::emergency_purchase(
        &state.db,
        &state.config,
        &state.cooldowns,
        &user_id,
        body.quantity,
        Utc::now(),
    )?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn sell_cards(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<SellRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = collection::sell_cards(&state.db, &user_id, body.into_inner())?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn set_favorite(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<FavoriteRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let card = collection::set_favorite(&state.db, &user_id, body.into_inner())?;
    Ok(HttpResponse::Ok().json(&card))
}

pub async fn claim_daily(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = collection::claim_daily(&state.db, &user_id, Utc::now())?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn buy_event_item(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<EventPurchaseRequest>,
) -> Result<HttpResponse, AppError> {
    let user_id = user_id(path)?;
    let result = state
        .events
        .purchase_item(&state.db, &user_id, body.into_inner(), Utc::now())?;
    Ok(HttpResponse::Ok().json(&result))
}
