use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{orderdtos::*, ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::usermodel::UserRole,
    AppState,
};

pub fn orders_handler() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:order_id", get(get_order))
        .route("/:order_id/events", get(get_order_events))
        .route("/:order_id/accept", patch(accept_order))
        .route("/:order_id/reject", patch(reject_order))
        .route("/:order_id/deliver", patch(deliver_order))
        .route("/:order_id/cancel", patch(cancel_order))
        .route("/:order_id/complete", patch(complete_order))
        .route("/:order_id/revisions", post(request_revision).get(get_revisions))
        .route("/:order_id/revisions/purchase", post(purchase_revisions))
        .route("/:order_id/review", post(create_review))
        .route(
            "/:order_id/deliverables",
            post(add_deliverable).get(list_deliverables),
        )
        .route(
            "/:order_id/deliverables/:deliverable_id",
            patch(update_deliverable),
        )
}

pub async fn place_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateOrderDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    if auth.user.role != UserRole::Client {
        return Err(HttpError::forbidden("Only clients can place orders"));
    }

    let placed = app_state.order_service.place_order(&auth.user, body).await?;

    Ok(Json(ApiResponse::success("Order placed successfully", placed)))
}

pub async fn list_orders(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<OrderQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let orders = app_state
        .order_service
        .list_orders(auth.user.id, params.status)
        .await?;

    Ok(Json(ApiResponse::success("Orders retrieved successfully", orders)))
}

pub async fn get_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state
        .order_service
        .get_order_detail(&auth.user, order_id)
        .await?;

    Ok(Json(ApiResponse::success("Order retrieved successfully", order)))
}

pub async fn get_order_events(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let timeline = app_state
        .order_service
        .get_order_timeline(&auth.user, order_id)
        .await?;

    Ok(Json(ApiResponse::success("Order timeline retrieved successfully", timeline)))
}

pub async fn accept_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state
        .order_service
        .accept_order(auth.user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Order accepted",
        OrderDto::from_order(order),
    )))
}

pub async fn reject_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state
        .order_service
        .reject_order(auth.user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Order rejected and payment refunded",
        OrderDto::from_order(order),
    )))
}

pub async fn deliver_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
    body: Option<Json<DeliverOrderDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let delivered = app_state
        .order_service
        .deliver_order(auth.user.id, order_id, body.message)
        .await?;

    Ok(Json(ApiResponse::success("Order delivered", delivered)))
}

pub async fn cancel_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state
        .order_service
        .cancel_order(auth.user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Order cancelled and payment refunded",
        OrderDto::from_order(order),
    )))
}

pub async fn complete_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let order = app_state
        .order_service
        .complete_order(auth.user.id, order_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Order completed and payment released",
        OrderDto::from_order(order),
    )))
}

pub async fn request_revision(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<RevisionRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = app_state
        .order_service
        .request_revision(auth.user.id, order_id, body.revision_text)
        .await?;

    Ok(Json(ApiResponse::success("Revision requested", requested)))
}

pub async fn purchase_revisions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<PurchaseRevisionsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let purchased = app_state
        .order_service
        .purchase_revisions(auth.user.id, order_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Revisions purchased", purchased)))
}

pub async fn get_revisions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let history = app_state
        .order_service
        .get_revision_history(&auth.user, order_id)
        .await?;

    Ok(Json(ApiResponse::success("Revisions retrieved successfully", history)))
}

pub async fn create_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CreateReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let review = app_state
        .order_service
        .create_review(auth.user.id, order_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Review submitted", review)))
}

pub async fn add_deliverable(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
    Json(body): Json<CreateDeliverableDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let deliverable = app_state
        .milestone_service
        .add_deliverable(auth.user.id, order_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Deliverable added", deliverable)))
}

pub async fn list_deliverables(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let plan = app_state
        .milestone_service
        .list_deliverables(&auth.user, order_id)
        .await?;

    Ok(Json(ApiResponse::success("Deliverables retrieved successfully", plan)))
}

pub async fn update_deliverable(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((order_id, deliverable_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateDeliverableDto>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .milestone_service
        .update_deliverable_status(auth.user.id, order_id, deliverable_id, body.status)
        .await?;

    Ok(Json(ApiResponse::success("Deliverable updated", updated)))
}
