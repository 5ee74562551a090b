//! Axum middleware things
//!

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

pub fn corslayer() -> CorsLayer {
    CorsLayer::new()
        // the form posts, the api reads and deletes
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any)
}
