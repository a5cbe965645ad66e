//! Application wiring for the development relay

pub mod state;

pub use state::AppState;
