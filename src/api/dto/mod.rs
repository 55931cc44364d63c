//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types that are already wire-shaped ([`crate::domain::User`],
//! [`crate::domain::EmergencySession`], ...) are returned as-is; the types
//! here cover request bodies and composite responses.

pub mod auth_dto;
pub mod common_dto;
pub mod emergency_dto;
pub mod location_dto;
pub mod user_dto;
pub mod voice_dto;

pub use auth_dto::*;
pub use common_dto::*;
pub use emergency_dto::*;
pub use location_dto::*;
pub use user_dto::*;
pub use voice_dto::*;
