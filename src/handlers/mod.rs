pub mod events;
pub mod players;
pub mod store;
pub mod trades;
pub mod users;

use crate::error::AppError;
use crate::state::AppState;
use ntex::web::HttpRequest;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

pub fn require_admin(state: &AppState, req: &HttpRequest) -> Result<(), AppError> {
    let token = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if state.is_admin(token) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
