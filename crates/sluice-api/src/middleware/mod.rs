//! Request middleware for the operator surface.

pub mod auth;

pub use auth::admin_auth;
