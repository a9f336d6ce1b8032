//! `skylock-core`: shared configuration, errors and domain types.
//!
//! Everything here is storage- and runtime-agnostic: the lease table lives in
//! `skylock-store` and the coordinator in `skylock-scheduler`.

pub mod config;
pub mod error;
pub mod types;

pub use config::SkylockConfig;
pub use error::{Result, SkylockError};
pub use types::{HolderId, Lease, LockConfiguration, Schedule};
