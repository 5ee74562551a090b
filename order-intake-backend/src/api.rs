//! JSON views of the stored orders
//!

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::entity::{attached_file, order};
use crate::order::{orders_with_files, WebError};
use crate::SharedState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub attached_files: Vec<attached_file::Model>,
}

impl From<(order::Model, Vec<attached_file::Model>)> for OrderDetail {
    fn from((order, attached_files): (order::Model, Vec<attached_file::Model>)) -> Self {
        Self {
            order,
            attached_files,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Every order with its attached files", body = Vec<OrderDetail>),
    )
)]
pub async fn get_orders(State(state): State<SharedState>) -> Result<Json<Vec<OrderDetail>>, WebError> {
    let orders = orders_with_files(&state.read().await.conn)
        .await
        .inspect_err(|err| error!("Failed to list orders: {:?}", err))?;
    Ok(Json(orders.into_iter().map(OrderDetail::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/order/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "The order with its attached files", body = OrderDetail),
        (status = 404, description = "No such order"),
    )
)]
pub async fn get_order(
    Path(id): Path<i32>,
    State(state): State<SharedState>,
) -> Result<Json<OrderDetail>, WebError> {
    let conn = &state.read().await.conn;
    let order = order::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| WebError::not_found(format!("Order {} not found", id)))?;
    let attached_files = order.attached_files(conn).await?;
    Ok(Json(OrderDetail {
        order,
        attached_files,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/order/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order, its attached files and their stored copies deleted"),
        (status = 404, description = "No such order"),
    )
)]
pub async fn delete_order(
    Path(id): Path<i32>,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, WebError> {
    let state = state.read().await;
    match crate::order::delete_order(&state.conn, &state.media, id).await? {
        Some(files) => {
            debug!("Deleted order {} with {} files", id, files.len());
            Ok((StatusCode::OK, "Order deleted successfully".to_string()))
        }
        None => Err(WebError::not_found(format!("Order {} not found", id))),
    }
}
