//! Box lifecycle services: the generic box, its two backends and readiness
//! polling.
//!
//! Each module imports only from `crate::domain` and
//! `crate::application`.

pub mod cloud;
pub mod lifecycle;
pub mod local;
pub mod readiness;


pub use cloud::CloudBackend;
pub use lifecycle::{BoxBackend, BoxSpec, ThrowBox};
pub use local::{LocalBackend, ProvisionLock};
