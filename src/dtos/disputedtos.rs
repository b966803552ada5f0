use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::Validate;

use super::orderdtos::{validate_non_negative_amount, OrderDto};
use crate::utils::money::serialize_cents;
use crate::models::{
    disputemodel::{Dispute, DisputeEvidence, DisputeResolution, DisputeStatus, ResolutionType},
    ordermodel::{Deliverable, OrderEvent, Revision},
};

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct OpenDisputeDto {
    pub order_id: Uuid,

    #[validate(length(min = 10, max = 5000, message = "Reason must be between 10 and 5000 characters"))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisputeQueryDto {
    pub status: Option<DisputeStatus>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct AddEvidenceDto {
    #[validate(length(min = 1, max = 2000, message = "Description is required"))]
    pub description: String,

    #[validate(url(message = "File URL is invalid"))]
    pub file_url: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct FreelancerResponseDto {
    #[validate(length(min = 1, max = 5000, message = "Response must be between 1 and 5000 characters"))]
    pub response: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignDisputeDto {
    /// Defaults to the calling admin.
    pub admin_id: Option<Uuid>,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct AdminNotesDto {
    #[validate(length(min = 1, max = 10000, message = "Notes must not be empty"))]
    pub notes: String,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDisputeDto {
    pub resolution_type: ResolutionType,

    #[validate(length(max = 5000))]
    pub message: Option<String>,

    #[validate(custom = "validate_non_negative_amount")]
    pub client_amount: Option<BigDecimal>,

    #[validate(custom = "validate_non_negative_amount")]
    pub freelancer_amount: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct DisputeDetailDto {
    pub dispute: Dispute,
    pub order: Option<OrderDto>,
    pub revisions: Vec<Revision>,
    pub deliverables: Vec<Deliverable>,
    pub evidence: Vec<DisputeEvidence>,
    pub timeline: Vec<OrderEvent>,
    pub resolution: Option<DisputeResolution>,
}

#[derive(Debug, Serialize)]
pub struct DisputeResolvedDto {
    pub dispute: Dispute,
    pub resolution: DisputeResolution,
    #[serde(serialize_with = "serialize_cents")]
    pub platform_remainder: BigDecimal,
}
