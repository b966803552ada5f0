use serde::Serialize;

use crate::{
    models::ordermodel::{Order, PackageTier},
    service::error::ServiceError,
};

/// Most extra revisions a client can buy in one purchase.
pub const MAX_REVISION_PURCHASE: i32 = 10;

/// Revisions included with a package tier. `None` means unlimited.
pub fn included_revisions(tier: Option<PackageTier>) -> Option<i32> {
    match tier {
        Some(PackageTier::Basic) => Some(1),
        Some(PackageTier::Standard) => Some(3),
        Some(PackageTier::Premium) => None,
        None => Some(1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevisionQuota {
    pub revisions_unlimited: bool,
    pub revisions_allowed: Option<i32>,
    pub revisions_used: i32,
    pub revisions_remaining: Option<i32>,
}

impl RevisionQuota {
    pub fn new(included_limit: Option<i32>, extra_purchased: i32, used: i32) -> Self {
        match included_limit {
            None => RevisionQuota {
                revisions_unlimited: true,
                revisions_allowed: None,
                revisions_used: used,
                revisions_remaining: None,
            },
            Some(limit) => {
                let allowed = limit + extra_purchased;
                RevisionQuota {
                    revisions_unlimited: false,
                    revisions_allowed: Some(allowed),
                    revisions_used: used,
                    revisions_remaining: Some((allowed - used).max(0)),
                }
            }
        }
    }

    pub fn for_order(order: &Order) -> Self {
        Self::new(
            order.included_revision_limit,
            order.extra_revisions_purchased,
            order.revision_count,
        )
    }

    pub fn can_request(&self) -> bool {
        match self.revisions_allowed {
            None => true,
            Some(allowed) => self.revisions_used < allowed,
        }
    }

    pub fn ensure_available(&self) -> Result<(), ServiceError> {
        if self.can_request() {
            return Ok(());
        }
        Err(ServiceError::RevisionLimitReached {
            allowed: self.revisions_allowed.unwrap_or(0),
            used: self.revisions_used,
        })
    }
}
