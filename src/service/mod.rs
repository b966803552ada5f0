pub mod audit_service;
pub mod background_jobs;
pub mod dispute_service;
pub mod error;
pub mod escrow_service;
pub mod milestone_service;
pub mod order_service;
pub mod order_state;
pub mod revision_policy;
pub mod withdrawal_service;

#[cfg(test)]
mod postgres_tests;
