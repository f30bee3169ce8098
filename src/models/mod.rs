pub mod card;
pub mod event;
pub mod player;
pub mod store;
pub mod trade;
pub mod user;
