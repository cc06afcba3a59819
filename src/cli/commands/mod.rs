//! CLI command implementations.

pub mod activity;
pub mod analyze;
pub mod auto_resolve;
pub mod escalations;
pub mod init;
pub mod observe;
pub mod outcome;
pub mod status;
pub mod task;
