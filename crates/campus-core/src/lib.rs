//! `campus-core`: configuration and the error type shared by every Campus crate.

pub mod config;
pub mod error;

pub use config::CampusConfig;
pub use error::{CampusError, Result};
