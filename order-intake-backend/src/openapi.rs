use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(description = "Order intake API", license(name = "MIT or Apache2", identifier="MIT Apache2.0"), title = "Order Intake", version = env!("CARGO_PKG_VERSION")),
    paths(
        crate::api::get_orders,
        crate::api::get_order,
        crate::api::delete_order,
    ),
    components(schemas(
        crate::api::OrderDetail,
        crate::entity::order::Model,
        crate::entity::attached_file::Model,
    ))
)]
pub struct ApiDoc;

pub(crate) fn api_route<T: Clone + Sync + Send + 'static>() -> Router<T> {
    let doc = ApiDoc::openapi();
    Router::new().merge(SwaggerUi::new("/api/v1/swagger-ui").url("/api/v1/openapi.json", doc))
}
