//! `skylock-store`: the lease table and its atomic primitives.
//!
//! # Overview
//!
//! A lease is one row per task name in a shared table. Every primitive is a
//! single conditional write evaluated against the database clock inside one
//! transaction, so instances with drifting clocks still agree on who holds a
//! lease.
//!
//! | Primitive     | Writes when                                           |
//! |---------------|-------------------------------------------------------|
//! | `try_acquire` | row absent, or `lock_until <= now`                    |
//! | `extend`      | `locked_by` matches and `lock_until > now`            |
//! | `release`     | `locked_by` matches; clamped to `locked_at + min_hold` |

pub mod clock;
pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use clock::{DbClock, ManualClock};
pub use error::{Result, StoreError};
pub use sqlite::{SqliteLeaseStore, StoreOptions};
pub use store::LeaseStore;
pub use types::{AcquireOutcome, ExtendOutcome, ReleaseOutcome};
