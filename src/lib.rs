//! NuGet Cache Proxy - A caching reverse proxy for the NuGet flat-container API
//!
//! Serves package artifacts from a size-bounded local disk cache, fetching
//! and storing them from an upstream registry on a miss.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod upstream;

pub use api::AppState;
pub use config::Config;
