pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::ApiError;
