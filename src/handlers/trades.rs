use crate::error::AppError;
use crate::models::trade::*;
use crate::state::AppState;
use chrono::Utc;
use ntex::web::{self, HttpResponse};
use std::sync::Arc;

pub async fn start_trade(
    state: web::types::State<Arc<AppState>>,
    body: web::types::Json<StartTradeRequest>,
) -> Result<HttpResponse, AppError> {
    let trade = state.trades.start(&state.db, body.into_inner(), Utc::now())?;
    Ok(HttpResponse::Ok().json(&trade))
}

pub async fn view_trade(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    query: web::types::Query<TradeQuery>,
) -> Result<HttpResponse, AppError> {
    let view = state
        .trades
        .view(&state.db, &path.into_inner(), &query.user, Utc::now())?;
    Ok(HttpResponse::Ok().json(&view))
}

pub async fn accept_trade(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<TradeActionRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = state
        .trades
        .accept(&state.db, &path.into_inner(), &body.user, Utc::now())?;
    Ok(HttpResponse::Ok().json(&outcome))
}

pub async fn cancel_trade(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<String>,
    body: web::types::Json<TradeActionRequest>,
) -> Result<HttpResponse, AppError> {
    let trade = state
        .trades
        .cancel(&path.into_inner(), &body.user, Utc::now())?;
    Ok(HttpResponse::Ok().json(&trade))
}
