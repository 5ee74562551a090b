pub mod api;
pub mod cli;
pub mod entity;
pub mod form;
pub mod logging;
pub mod media;
pub mod middleware;
pub mod migration;
pub mod openapi;
pub mod order;
pub mod storage;
#[cfg(test)]
mod tests;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use order_intake_shared::error::OrderError;
use sea_orm::DatabaseConnection;
use std::{borrow::Cow, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tower::{BoxError, ServiceBuilder};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::error;

use crate::{
    cli::{db_path_default, CliOpts},
    logging::logging_layer,
    media::MediaStore,
    order::{create_order, list_orders, order_form},
};

/// Largest request body the order form accepts unless configured otherwise.
pub const UPLOAD_LIMIT_BYTES: usize = 100 * 1024 * 1024;

pub type SharedState = Arc<RwLock<AppState>>;

pub struct AppState {
    pub conn: DatabaseConnection,
    pub media: MediaStore,
    /// Request body cap for `POST /order`, in bytes.
    pub upload_limit: usize,
}

impl AppState {
    pub async fn new(cli: &CliOpts) -> Result<Self, OrderError> {
        let db_path = cli.db_path.clone().unwrap_or(db_path_default().into());
        let conn = storage::new(&db_path).await?;
        Ok(Self {
            conn,
            media: MediaStore::new(&cli.media_root),
            upload_limit: cli.upload_limit,
        })
    }

    #[cfg(test)]
    pub async fn test(media_root: &std::path::Path) -> Self {
        let conn = storage::start_db(None, None)
            .await
            .expect("Failed to start test DB");
        Self {
            conn,
            media: MediaStore::new(media_root),
            upload_limit: UPLOAD_LIMIT_BYTES,
        }
    }
}

pub async fn build_app<T>(shared_state: &SharedState) -> Router<T> {
    let (media_service, upload_limit) = {
        let state = shared_state.read().await;
        (ServeDir::new(state.media.root()), state.upload_limit)
    };

    let router = Router::new()
        .route("/", get(list_orders))
        .route(
            "/order",
            get(order_form)
                .post(create_order)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/orders", get(api::get_orders))
        .route(
            "/api/v1/order/{id}",
            get(api::get_order).delete(api::delete_order),
        )
        .merge(openapi::api_route())
        .nest_service("/media", media_service);

    router
        // Add middleware to all routes
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(middleware::corslayer())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    |response: &Response<Body>| {
                        if response.status() == StatusCode::OK {
                            "private, no-transform max-age=0".parse().ok()
                        } else {
                            None
                        }
                    },
                ))
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .concurrency_limit(1024)
                .timeout(Duration::from_secs(10))
                .layer(logging_layer()),
        )
        .with_state(shared_state.clone())
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        let msg = "service is overloaded, try again later";
        error!("{}", msg);
        return (StatusCode::SERVICE_UNAVAILABLE, Cow::from(msg));
    }

    let msg = format!("Unhandled internal error: {error}");
    error!("{}", msg);
    (StatusCode::INTERNAL_SERVER_ERROR, Cow::from(msg))
}
