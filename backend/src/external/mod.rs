//! External service integrations

pub mod satellite;
