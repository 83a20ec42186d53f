pub mod config;
pub mod dispatch;
pub mod engine;
pub mod models;
pub mod responses;
pub mod routes;
pub mod state;
pub mod worker;
pub mod workflows;

pub use state::AppState;
