use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{patch, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        disputedtos::{AdminNotesDto, AssignDisputeDto, ResolveDisputeDto},
        withdrawaldtos::FailWithdrawalDto,
        ApiResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/disputes/:dispute_id/assign", patch(assign_dispute))
        .route("/disputes/:dispute_id/notes", put(update_notes))
        .route("/disputes/:dispute_id/resolve", post(resolve_dispute))
        .route("/withdrawals/:withdrawal_id/process", patch(process_withdrawal))
        .route("/withdrawals/:withdrawal_id/complete", patch(complete_withdrawal))
        .route("/withdrawals/:withdrawal_id/fail", patch(fail_withdrawal))
}

pub async fn assign_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(dispute_id): Path<Uuid>,
    body: Option<Json<AssignDisputeDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let dispute = app_state
        .dispute_service
        .assign_dispute(auth.user.id, dispute_id, body.admin_id)
        .await?;

    Ok(Json(ApiResponse::success("Dispute assigned", dispute)))
}

pub async fn update_notes(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<AdminNotesDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let dispute = app_state
        .dispute_service
        .update_notes(dispute_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success("Admin notes updated", dispute)))
}

pub async fn resolve_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(dispute_id): Path<Uuid>,
    Json(body): Json<ResolveDisputeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let resolved = app_state
        .dispute_service
        .resolve_dispute(auth.user.id, dispute_id, body)
        .await?;

    Ok(Json(ApiResponse::success("Dispute resolved", resolved)))
}

pub async fn process_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawal = app_state
        .withdrawal_service
        .start_processing(withdrawal_id)
        .await?;

    Ok(Json(ApiResponse::success("Withdrawal is processing", withdrawal)))
}

pub async fn complete_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawal = app_state.withdrawal_service.complete(withdrawal_id).await?;

    Ok(Json(ApiResponse::success("Withdrawal completed", withdrawal)))
}

pub async fn fail_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(withdrawal_id): Path<Uuid>,
    Json(body): Json<FailWithdrawalDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let withdrawal = app_state
        .withdrawal_service
        .fail(withdrawal_id, body.notes)
        .await?;

    Ok(Json(ApiResponse::success(
        "Withdrawal marked as failed and funds returned",
        withdrawal,
    )))
}
