//! Core data model

pub mod diagnosis;
pub mod intervention;
pub mod telemetry;
