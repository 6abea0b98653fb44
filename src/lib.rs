//! Neighbourhood message board: a JSON CRUD API over a small message store.

pub mod config;
pub mod error;
pub mod handlers;
pub mod memory_store;
pub mod message_database;
mod schema;
pub mod sqlite_store;

pub use handlers::configure;
