//! HTTP handlers for the Field Lifecycle Management Service

pub mod detection;
pub mod field;
pub mod health;
pub mod lifecycle;
pub mod notification;

pub use detection::*;
pub use field::*;
pub use health::*;
pub use lifecycle::*;
pub use notification::*;

use crate::services::{CacheService, LifecycleService};
use crate::AppState;

/// Build the lifecycle service from shared application state
pub(crate) fn lifecycle_service(state: &AppState) -> LifecycleService {
    let cache = CacheService::new(state.db.clone(), state.config.monitoring.cache_ttl_hours);
    LifecycleService::new(state.db.clone(), cache, state.config.lifecycle.clone())
}
