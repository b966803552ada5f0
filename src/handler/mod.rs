pub mod admin;
pub mod auth;
pub mod disputes;
pub mod orders;
pub mod withdrawals;
