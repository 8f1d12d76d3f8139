//! Sluice HTTP API.
//!
//! Public ingestion endpoints, the operator surface behind a bearer
//! token, and service self-health endpoints. Handlers stay thin: they
//! validate, translate HTTP into domain calls, and map domain errors to
//! the structured error body.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;
pub mod storage;

pub use config::Config;
pub use error::ApiError;
pub use server::{create_router, start_server};
pub use state::AppState;
pub use storage::{ApiStore, PostgresApiStore};
