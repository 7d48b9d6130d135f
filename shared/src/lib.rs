//! Shared types and domain logic for the Field Lifecycle Management Service
//!
//! This crate contains the domain models, the lifecycle tunables, and the pure
//! detection algorithms shared between the backend and its test suites.

pub mod config;
pub mod detection;
pub mod models;
pub mod types;
pub mod validation;

pub use config::*;
pub use detection::*;
pub use models::*;
pub use types::*;
pub use validation::*;
