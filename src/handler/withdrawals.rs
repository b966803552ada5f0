use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{withdrawaldtos::*, ApiResponse, Response},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn withdrawals_handler() -> Router {
    Router::new()
        .route("/", post(request_withdrawal).get(list_withdrawals))
        .route("/summary", get(get_summary))
        .route("/methods", post(add_method).get(list_methods))
        .route("/methods/:method_id", delete(delete_method))
        .route("/:withdrawal_id", get(get_withdrawal))
        .route("/:withdrawal_id/cancel", patch(cancel_withdrawal))
}

pub async fn add_method(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateWithdrawalMethodDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let method = app_state
        .withdrawal_service
        .add_method(auth.user.id, body)
        .await?;

    Ok(Json(ApiResponse::success("Withdrawal method added", method)))
}

pub async fn list_methods(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let methods = app_state.withdrawal_service.list_methods(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Withdrawal methods retrieved successfully", methods)))
}

pub async fn delete_method(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(method_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .withdrawal_service
        .delete_method(auth.user.id, method_id)
        .await?;

    Ok(Json(Response {
        status: "success",
        message: "Withdrawal method deleted".to_string(),
    }))
}

pub async fn request_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateWithdrawalDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let withdrawal = app_state
        .withdrawal_service
        .request_withdrawal(auth.user.id, body)
        .await?;

    Ok(Json(ApiResponse::success("Withdrawal requested", withdrawal)))
}

pub async fn list_withdrawals(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<WithdrawalQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawals = app_state
        .withdrawal_service
        .list_withdrawals(auth.user.id, params.status)
        .await?;

    Ok(Json(ApiResponse::success("Withdrawals retrieved successfully", withdrawals)))
}

pub async fn get_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawal = app_state
        .withdrawal_service
        .get_withdrawal(auth.user.id, withdrawal_id)
        .await?;

    Ok(Json(ApiResponse::success("Withdrawal retrieved successfully", withdrawal)))
}

pub async fn get_summary(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state.withdrawal_service.get_summary(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Wallet summary retrieved successfully", summary)))
}

pub async fn cancel_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawal = app_state
        .withdrawal_service
        .cancel_withdrawal(auth.user.id, withdrawal_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Withdrawal cancelled and funds returned",
        withdrawal,
    )))
}
