//! Data Transfer Objects (DTOs)
//!
//! DTOs are returned by the caller-facing read API.

mod health_dto;
mod session_dto;

pub use health_dto::HealthStatistics;
pub use session_dto::{SessionHealthDto, SessionSnapshot, ValidationReport};
