pub mod disputemodel;
pub mod ordermodel;
pub mod usermodel;
pub mod withdrawalmodel;
