//! # RustLite Storage
//!
//! The shadow/copy-on-write page manager: [`ShadowManager`] (component C)
//! tracks original-to-shadow page mappings per transaction, and
//! [`CowManager`] (component D) layers read/modify/commit/rollback
//! semantics on top, writing before/after images to the WAL boundary the
//! core defines.

pub mod cow;
pub mod shadow;

pub use cow::CowManager;
pub use shadow::ShadowManager;
