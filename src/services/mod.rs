pub mod announce;
pub mod collection;
pub mod cooldown;
pub mod draw;
pub mod events;
pub mod leaderboard;
pub mod monitor;
pub mod pricing;
pub mod store;
pub mod trade;
pub mod upstream;
