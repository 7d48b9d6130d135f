//! Business logic services for the Field Lifecycle Management Service

pub mod cache;
pub mod field;
pub mod field_data;
pub mod lifecycle;
pub mod monitoring;
pub mod notification;

pub use cache::CacheService;
pub use field::FieldService;
pub use field_data::FieldDataService;
pub use lifecycle::LifecycleService;
pub use monitoring::MonitoringService;
pub use notification::NotificationService;
