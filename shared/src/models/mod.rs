//! Domain models for the Field Lifecycle Management Service

mod candidate;
mod data_point;
mod event;
mod field;

pub use candidate::*;
pub use data_point::*;
pub use event::*;
pub use field::*;
