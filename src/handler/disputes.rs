use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{disputedtos::*, ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn disputes_handler() -> Router {
    Router::new()
        .route("/", post(open_dispute).get(list_disputes))
        .route("/:dispute_id", get(get_dispute))
        .route("/:dispute_id/evidence", post(add_evidence))
        .route("/:dispute_id/freelancer-response", post(freelancer_response))
}

pub async fn open_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<OpenDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let dispute = app_state
        .dispute_service
        .open_dispute(auth.user.id, body.order_id, body.reason)
        .await?;

    Ok(Json(ApiResponse::success("Dispute opened", dispute)))
}

pub async fn list_disputes(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DisputeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let disputes = app_state
        .dispute_service
        .list_disputes(&auth.user, params.status)
        .await?;

    Ok(Json(ApiResponse::success("Disputes retrieved successfully", disputes)))
}

pub async fn get_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(dispute_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let detail = app_state
        .dispute_service
        .get_dispute_detail(&auth.user, dispute_id)
        .await?;

    Ok(Json(ApiResponse::success("Dispute retrieved successfully", detail)))
}

pub async fn add_evidence(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<AddEvidenceDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let evidence = app_state
        .dispute_service
        .add_evidence(&auth.user, dispute_id, body.description, body.file_url)
        .await?;

    Ok(Json(ApiResponse::success("Evidence added", evidence)))
}

pub async fn freelancer_response(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<FreelancerResponseDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let dispute = app_state
        .dispute_service
        .freelancer_response(auth.user.id, dispute_id, body.response)
        .await?;

    Ok(Json(ApiResponse::success("Response recorded", dispute)))
}
