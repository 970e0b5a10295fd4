pub mod identity;
pub mod tenant;

pub use identity::{ExternalProfile, Identity};
pub use tenant::Tenant;
