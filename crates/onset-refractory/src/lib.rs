//! Refractory (cooldown) policies for confirmed onsets.
//!
//! A confirmed onset puts its entity into a refractory period during which
//! new candidates are rejected. Two policies are provided:
//! - [`RefractoryTracker`]: fixed duration after each confirmation
//! - [`PriceStateMachine`]: waits for price to peak and decay
//!
//! [`SharedRefractoryStore`] is the time-based rule behind a `DashMap` for
//! multi-threaded callers.

pub mod config;
pub mod error;
pub mod policy;
pub mod shared;
pub mod state_machine;
pub mod time_based;

pub use config::{RefractoryConfig, RefractoryMode, StateMachineConfig};
pub use error::{RefractoryError, RefractoryResult};
pub use policy::{build_policy, Admission, RefractoryPolicy};
pub use shared::SharedRefractoryStore;
pub use state_machine::{PhaseState, PriceStateMachine};
pub use time_based::RefractoryTracker;
