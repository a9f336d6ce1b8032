//! `skylock-scheduler`: run a task on exactly one instance per tick.
//!
//! # Overview
//!
//! Every instance runs its own [`engine::SchedulerEngine`]. On each tick the
//! engine calls [`coordinator::LeaseCoordinator::run_guarded`], which only runs
//! the task's [`work::Work`] if this instance wins the task's lease in the
//! shared store. Instances never talk to each other directly.
//!
//! # Run states
//!
//! ```text
//! Idle -> Acquiring -> Skipped
//!                   -> Running -> Releasing -> Idle
//! ```
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                            |
//! |------------|------------------------------------------------------|
//! | `Interval` | Fixed delay of N seconds between ticks               |
//! | `Aligned`  | Wall-clock multiples of N seconds, same on every node |
//! | `Daily`    | Fire at HH:MM UTC every day                          |

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod guard;
pub mod schedule;
pub mod types;
pub mod work;

pub use coordinator::LeaseCoordinator;
pub use engine::{ScheduledTask, SchedulerEngine};
pub use error::{GuardError, Result, SchedulerError};
pub use guard::LeaseGuard;
pub use types::{OutcomeKind, RunOutcome, RunState, SkipReason, TickReport};
pub use work::Work;
