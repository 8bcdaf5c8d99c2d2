//! Domain layer
//!
//! Pure identifier types shared by the auth core, storage and API layers.

pub mod id;

pub use id::{RefreshTokenId, ResetTokenId, TaskId, TenantId, UserId};
