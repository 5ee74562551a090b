use crate::api::OrderDetail;
use crate::entity::{attached_file, order};
use crate::{build_app, AppState, SharedState, UPLOAD_LIMIT_BYTES};
use axum::http::header::{CACHE_CONTROL, LOCATION};
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::*;
use sea_orm::{EntityTrait, PaginatorTrait};
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

struct TestContext {
    server: TestServer,
    state: SharedState,
    // dropped last, removes uploads
    media: TempDir,
}

impl TestContext {
    async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&self.state.read().await.conn)
            .await
            .expect("Failed to count orders")
    }

    async fn attached_file_count(&self) -> u64 {
        attached_file::Entity::find()
            .count(&self.state.read().await.conn)
            .await
            .expect("Failed to count attached files")
    }
}

async fn setup_test_server() -> TestContext {
    setup_test_server_with_upload_limit(UPLOAD_LIMIT_BYTES).await
}

async fn setup_test_server_with_upload_limit(upload_limit: usize) -> TestContext {
    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                "order_intake_backend=debug,tower_http=debug",
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
    let media = tempfile::tempdir().expect("Failed to create media dir");
    let mut appstate = AppState::test(media.path()).await;
    appstate.upload_limit = upload_limit;
    let state = Arc::new(RwLock::new(appstate));
    let app: axum::Router = build_app(&state).await;

    let config = TestServerConfig {
        save_cookies: false,
        expect_success_by_default: false,
        restrict_requests_with_http_schema: false,
        default_content_type: None,
        default_scheme: Some("http".into()),
        ..Default::default()
    };

    TestContext {
        server: TestServer::new_with_config(app, config).unwrap(),
        state,
        media,
    }
}

fn text_part(name: &str, body: &[u8]) -> Part {
    Part::bytes(body.to_vec())
        .file_name(name)
        .mime_type("text/plain")
}

#[tokio::test]
async fn test_failing_setup_server() {
    // I sure hope this path isn't writeable!
    let path = std::path::PathBuf::from(format!(
        "/asdfasdf{}/asd{}fsadfdf",
        rand::random::<u32>(),
        rand::random::<u32>()
    ));
    crate::storage::start_db(Some(&path), None)
        .await
        .expect_err("Should fail to open DB");
}

#[tokio::test]
async fn test_order_form_get() {
    let ctx = setup_test_server().await;

    let res = ctx.server.get("/order").await;
    res.assert_status_ok();
    let body = res.text();
    assert!(body.contains("<form action=\"/order\" method=\"post\""));
    assert!(body.contains("name=\"email\""));
    assert!(body.contains("type=\"file\" name=\"attachments\" multiple"));
    assert!(!body.contains("errorlist"));
}

#[tokio::test]
async fn test_create_order_with_files() {
    let ctx = setup_test_server().await;

    let form = MultipartForm::new()
        .add_text("email", "buyer@example.com")
        .add_part("attachments", text_part("first.txt", b"first file"))
        .add_part("attachments", text_part("second.txt", b"second file"))
        .add_part("attachments", text_part("third.txt", b"third file"));

    info!("submitting order with three files");
    let res = ctx.server.post("/order").multipart(form).await;
    res.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(res.header(LOCATION), "/");

    assert_eq!(ctx.order_count().await, 1);
    assert_eq!(ctx.attached_file_count().await, 3);

    let res = ctx.server.get("/api/v1/orders").await;
    res.assert_status_ok();
    let orders: Vec<OrderDetail> = res.json();
    assert_eq!(orders.len(), 1);
    let detail = &orders[0];
    assert_eq!(detail.order.email, "buyer@example.com");
    let names: Vec<&str> = detail
        .attached_files
        .iter()
        .map(|f| f.attached_file.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["order/first.txt", "order/second.txt", "order/third.txt"]
    );

    // stored copies are served back
    let res = ctx.server.get("/media/order/second.txt").await;
    res.assert_status_ok();
    assert_eq!(res.as_bytes().as_ref(), b"second file");
    assert!(ctx.media.path().join("order/third.txt").exists());
}

#[tokio::test]
async fn test_create_order_without_files() {
    let ctx = setup_test_server().await;

    let form = MultipartForm::new()
        .add_text("email", "nofiles@example.com")
        // what a browser sends for an untouched file input
        .add_part(
            "attachments",
            Part::bytes(Vec::new())
                .file_name("")
                .mime_type("application/octet-stream"),
        );
    let res = ctx.server.post("/order").multipart(form).await;
    res.assert_status(StatusCode::SEE_OTHER);

    assert_eq!(ctx.order_count().await, 1);
    assert_eq!(ctx.attached_file_count().await, 0);
}

#[tokio::test]
async fn test_create_order_invalid_email() {
    let ctx = setup_test_server().await;

    let form = MultipartForm::new()
        .add_text("email", "definitely not an email")
        .add_part("attachments", text_part("ignored.txt", b"never stored"));
    let res = ctx.server.post("/order").multipart(form).await;
    res.assert_status_ok();
    let body = res.text();
    assert!(body.contains("Enter a valid email address."));
    assert!(body.contains("value=\"definitely not an email\""));

    let res = ctx
        .server
        .post("/order")
        .multipart(MultipartForm::new().add_text("email", ""))
        .await;
    res.assert_status_ok();
    assert!(res.text().contains("This field is required."));

    assert_eq!(ctx.order_count().await, 0);
    assert_eq!(ctx.attached_file_count().await, 0);
    assert!(!ctx.media.path().join("order").exists());
}

#[tokio::test]
async fn test_create_order_not_multipart() {
    let ctx = setup_test_server().await;

    let res = ctx
        .server
        .post("/order")
        .text("email=buyer@example.com")
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(ctx.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_over_upload_limit() {
    let ctx = setup_test_server_with_upload_limit(1024).await;

    let form = MultipartForm::new()
        .add_text("email", "big@example.com")
        .add_part("attachments", text_part("big.bin", &[b'x'; 4096]));
    let res = ctx.server.post("/order").multipart(form).await;
    assert!(
        res.status_code().is_client_error(),
        "expected a 4xx, got {}",
        res.status_code()
    );

    assert_eq!(ctx.order_count().await, 0);
    assert_eq!(ctx.attached_file_count().await, 0);
    assert!(!ctx.media.path().join("order").exists());

    // a submission under the cap still goes through
    let form = MultipartForm::new()
        .add_text("email", "small@example.com")
        .add_part("attachments", text_part("small.txt", b"tiny"));
    ctx.server
        .post("/order")
        .multipart(form)
        .await
        .assert_status(StatusCode::SEE_OTHER);
    assert_eq!(ctx.order_count().await, 1);
}

#[tokio::test]
async fn test_list_orders() {
    let ctx = setup_test_server().await;

    let res = ctx.server.get("/").await;
    res.assert_status_ok();
    let body = res.text();
    assert!(body.starts_with("<html><body>It is now "));
    assert!(!body.contains("<p>order "));

    ctx.server
        .post("/order")
        .multipart(MultipartForm::new().add_text("email", "empty@example.com"))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    ctx.server
        .post("/order")
        .multipart(
            MultipartForm::new()
                .add_text("email", "full@example.com")
                .add_part("attachments", text_part("a.txt", b"a"))
                .add_part("attachments", text_part("b.txt", b"b")),
        )
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let res = ctx.server.get("/").await;
    res.assert_status_ok();
    assert_eq!(
        res.header(CACHE_CONTROL),
        "private, no-transform max-age=0"
    );
    let body = res.text();
    assert!(body.contains("<p>order 1 files are[]</p>"));
    assert!(body.contains("<p>order 2 files are[id:1\tname:order/a.txt,id:2\tname:order/b.txt]</p>"));
}

#[tokio::test]
async fn test_duplicate_filenames_kept_apart() {
    let ctx = setup_test_server().await;

    for body in [&b"one"[..], &b"two"[..]] {
        ctx.server
            .post("/order")
            .multipart(
                MultipartForm::new()
                    .add_text("email", "repeat@example.com")
                    .add_part("attachments", text_part("same.txt", body)),
            )
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }

    let orders: Vec<OrderDetail> = ctx.server.get("/api/v1/orders").await.json();
    assert_eq!(orders.len(), 2);
    let first = &orders[0].attached_files[0].attached_file;
    let second = &orders[1].attached_files[0].attached_file;
    assert_eq!(first, "order/same.txt");
    assert_ne!(first, second);

    let res = ctx.server.get(&format!("/media/{}", second)).await;
    res.assert_status_ok();
    assert_eq!(res.as_bytes().as_ref(), b"two");
}

#[tokio::test]
async fn test_api_get_order() {
    let ctx = setup_test_server().await;

    ctx.server
        .post("/order")
        .multipart(
            MultipartForm::new()
                .add_text("email", "api@example.com")
                .add_part("attachments", text_part("doc.txt", b"doc")),
        )
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let res = ctx.server.get("/api/v1/order/1").await;
    res.assert_status_ok();
    let detail: OrderDetail = res.json();
    assert_eq!(detail.order.id, 1);
    assert_eq!(detail.order.email, "api@example.com");
    assert_eq!(detail.attached_files.len(), 1);
    assert_eq!(detail.attached_files[0].order_id, 1);

    let res = ctx.server.get("/api/v1/order/999").await;
    res.assert_status(StatusCode::NOT_FOUND);
    let err: serde_json::Value = res.json();
    assert_eq!(err["error"], "Order 999 not found");
}

#[tokio::test]
async fn test_api_delete_order_cascades() {
    let ctx = setup_test_server().await;

    for email in ["stays@example.com", "goes@example.com"] {
        ctx.server
            .post("/order")
            .multipart(
                MultipartForm::new()
                    .add_text("email", email)
                    .add_part("attachments", text_part(&format!("{email}.txt"), b"x"))
                    .add_part("attachments", text_part("extra.txt", b"y")),
            )
            .await
            .assert_status(StatusCode::SEE_OTHER);
    }
    assert_eq!(ctx.attached_file_count().await, 4);

    let doomed: OrderDetail = ctx.server.get("/api/v1/order/2").await.json();

    let res = ctx.server.delete("/api/v1/order/2").await;
    res.assert_status_ok();

    assert_eq!(ctx.order_count().await, 1);
    assert_eq!(ctx.attached_file_count().await, 2);
    for file in &doomed.attached_files {
        assert!(!ctx.media.path().join(&file.attached_file).exists());
    }

    ctx.server
        .get("/api/v1/order/2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    ctx.server
        .delete("/api/v1/order/2")
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let body = ctx.server.get("/").await.text();
    assert!(body.contains("<p>order 1 files are["));
    assert!(!body.contains("<p>order 2 "));
}

#[tokio::test]
async fn test_openapi_document() {
    let ctx = setup_test_server().await;

    let res = ctx.server.get("/api/v1/openapi.json").await;
    res.assert_status_ok();
    let doc: serde_json::Value = res.json();
    assert!(doc["paths"]["/api/v1/orders"]["get"].is_object());
    assert!(doc["paths"]["/api/v1/order/{id}"]["delete"].is_object());
    assert!(doc["components"]["schemas"]["Order"].is_object());
    assert!(doc["components"]["schemas"]["AttachedFile"].is_object());
}

#[tokio::test]
async fn test_handle_error() {
    use super::*;
    use axum::response::IntoResponse;
    let err = tower::timeout::error::Elapsed::new();
    let res = handle_error(Box::new(err)).await.into_response();
    let expected = (StatusCode::REQUEST_TIMEOUT, "request timed out").into_response();

    assert_eq!(res.status(), expected.status());

    let err = tower::load_shed::error::Overloaded::new();
    let res = handle_error(Box::new(err)).await.into_response();
    let expected = (
        StatusCode::SERVICE_UNAVAILABLE,
        "service is overloaded, try again later",
    )
        .into_response();

    assert_eq!(res.status(), expected.status());

    let err = std::io::Error::other("something odd");
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
