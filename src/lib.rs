//! Image ingestion API and the queue-driven converter that downscales every
//! uploaded image.

pub mod app;
pub mod common;
pub mod config;
pub mod docs;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod modules;
pub mod routes;
pub mod state;
pub mod testing;
pub mod workers;

pub use error::{AppError, Result};
