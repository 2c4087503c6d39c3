pub mod engine;
pub mod error;
pub mod models;
pub mod pending;
pub mod reconcile;
pub mod remote;
pub mod state;
pub mod store;
pub mod wire;
