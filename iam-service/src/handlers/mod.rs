//! HTTP handlers for the IAM service.

pub mod me;
pub mod metrics;
pub mod permission;

pub use me::get_me;
pub use permission::{check_permission, create_relation_tuple, delete_relation_tuple};
