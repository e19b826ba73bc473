//! Chain storage queries.

pub mod era;
pub mod session;
pub mod staking;
