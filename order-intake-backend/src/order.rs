use axum::extract::{Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use chrono::{DateTime, Local};
use order_intake_shared::error::OrderError;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryOrder, TransactionTrait,
};
use tracing::{debug, error, info, warn};

use crate::entity::{attached_file, order};
use crate::form::{escape_html, read_submission, FieldErrors, OrderForm, OrderSubmission, UploadedFile};
use crate::media::{MediaStore, ORDER_UPLOAD_TO};
use crate::SharedState;

pub type OrderWithFiles = (order::Model, Vec<attached_file::Model>);

pub struct WebError {
    status: StatusCode,
    message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: String) -> Self {
        WebError { status, message }
    }

    pub fn not_found(message: String) -> Self {
        WebError {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        let mut response = axum::response::Response::new(body.to_string().into());
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

impl From<DbErr> for WebError {
    fn from(err: DbErr) -> Self {
        WebError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Database error: {:?}", err),
        }
    }
}

impl From<OrderError> for WebError {
    fn from(err: OrderError) -> Self {
        let status = match err {
            OrderError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        WebError {
            status,
            message: err.to_string(),
        }
    }
}

/// All orders with their files, fetched in one joined query.
pub async fn orders_with_files<C>(db: &C) -> Result<Vec<OrderWithFiles>, DbErr>
where
    C: ConnectionTrait,
{
    order::Entity::find()
        .find_with_related(attached_file::Entity)
        .order_by_asc(order::Column::Id)
        .order_by_asc(attached_file::Column::Id)
        .all(db)
        .await
}

/// Builds the listing page body.
pub fn render_report(now: DateTime<Local>, orders: &[OrderWithFiles]) -> String {
    let report: String = orders
        .iter()
        .map(|(order, files)| {
            let names = files
                .iter()
                .map(|f| escape_html(&f.to_string()))
                .collect::<Vec<_>>()
                .join(",");
            format!("<p>order {} files are[{}]</p>", order.id, names)
        })
        .collect();

    format!(
        "<html><body>It is now {}.<p> {} </p></body></html>",
        now.format("%Y-%m-%d %H:%M:%S%.6f"),
        report
    )
}

/// Persists a validated submission: the order, then one stored file and row per upload.
///
/// Runs in a transaction. If anything fails the rows are rolled back and files
/// already written for this submission are removed again.
pub async fn save_submission(
    conn: &DatabaseConnection,
    media: &MediaStore,
    submission: &OrderSubmission,
) -> Result<OrderWithFiles, OrderError> {
    let txn = conn.begin().await?;

    let new_order = order::ActiveModel {
        email: Set(submission.form.email.clone()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .inspect_err(|err| error!("Failed to insert order: {:?}", err))?;

    let mut stored = Vec::with_capacity(submission.files.len());
    let attached = attach_files(&txn, media, new_order.id, &submission.files, &mut stored).await;
    let outcome = match attached {
        Ok(files) => txn.commit().await.map(|_| files).map_err(OrderError::from),
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                error!("Failed to roll back order insert: {:?}", rollback_err);
            }
            Err(err)
        }
    };

    match outcome {
        Ok(files) => {
            info!(
                order_id = new_order.id,
                files = files.len(),
                "Created order"
            );
            Ok((new_order, files))
        }
        Err(err) => {
            error!("Failed to save order submission: {}", err);
            for name in &stored {
                if let Err(cleanup_err) = media.delete(name).await {
                    warn!("Failed to remove orphaned upload {}: {}", name, cleanup_err);
                }
            }
            Err(err)
        }
    }
}

async fn attach_files<C>(
    db: &C,
    media: &MediaStore,
    order_id: i32,
    uploads: &[UploadedFile],
    stored: &mut Vec<String>,
) -> Result<Vec<attached_file::Model>, OrderError>
where
    C: ConnectionTrait,
{
    let mut files = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let name = media
            .save(ORDER_UPLOAD_TO, &upload.filename, &upload.data)
            .await?;
        stored.push(name.clone());

        let file = attached_file::ActiveModel {
            order_id: Set(order_id),
            attached_file: Set(name),
            ..Default::default()
        }
        .insert(db)
        .await?;
        debug!(
            "Attached {} to order {} as {:?}",
            file.attached_file, order_id, upload.content_type
        );
        files.push(file);
    }
    Ok(files)
}

/// Deletes an order, its attached file rows (by cascade) and their stored files.
///
/// Returns `None` when there was no such order.
pub async fn delete_order(
    conn: &DatabaseConnection,
    media: &MediaStore,
    id: i32,
) -> Result<Option<Vec<attached_file::Model>>, OrderError> {
    let Some(target) = order::Entity::find_by_id(id).one(conn).await? else {
        debug!("Order {} not found for deletion", id);
        return Ok(None);
    };

    let files = target.attached_files(conn).await?;
    let res = target.delete(conn).await?;
    debug!(
        res = format!("{:?}", res),
        id = id.to_string(),
        "Deleted order"
    );

    for file in &files {
        if let Err(err) = media.delete(&file.attached_file).await {
            warn!("Failed to remove stored file {}: {}", file.attached_file, err);
        }
    }
    Ok(Some(files))
}

/// GET / - every order and the files attached to it.
pub async fn list_orders(State(state): State<SharedState>) -> Result<Html<String>, WebError> {
    let orders = orders_with_files(&state.read().await.conn)
        .await
        .inspect_err(|err| error!("Failed to list orders: {:?}", err))?;
    debug!("Listing {} orders", orders.len());
    Ok(Html(render_report(Local::now(), &orders)))
}

/// GET /order - a blank form.
pub async fn order_form() -> Html<String> {
    Html(OrderForm::default().render(&FieldErrors::new()))
}

/// POST /order - create the order and its attachments, or show the form again.
pub async fn create_order(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let submission = read_submission(multipart).await?;

    if let Err(errors) = submission.form.clean() {
        debug!("Order form rejected: {:?}", errors);
        return Ok((StatusCode::OK, Html(submission.form.render(&errors))).into_response());
    }

    let state = state.read().await;
    save_submission(&state.conn, &state.media, &submission).await?;

    Ok(Redirect::to("/").into_response())
}
