//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod audit_repo;
pub mod delivery_repo;
pub mod event_repo;
pub mod subscription_repo;

pub use audit_repo::AuditLogRepo;
pub use delivery_repo::DeliveryRepo;
pub use event_repo::EventRepo;
pub use subscription_repo::SubscriptionRepo;
