//! Command implementations

pub mod config;
pub mod pubkey;
pub mod run;
pub mod templates;
pub mod version;
