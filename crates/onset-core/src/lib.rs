//! Core domain types for the surge onset detection engine.
//!
//! This crate provides the types shared by every stage of the engine:
//! - `FeatureRow`, `FeatureSchema`, `FeatureBatch`: the input side
//! - `CandidateEvent`, `ConfirmedEvent`, `RejectedEvent`: events sharing an `EventHeader`
//! - `OnsetEvent`: tagged union used for serialized records
//! - `EntityId`: key of all per-entity state

pub mod entity;
pub mod error;
pub mod event;
pub mod feature;

pub use entity::{secs_to_ms, ts_to_utc, EntityId, TimestampMs};
pub use error::{CoreError, Result, SchemaError};
pub use event::{
    Axis, AxisSet, CandidateEvent, CandidateEvidence, ConfirmedEvent, ConfirmedEvidence,
    EventHeader, OnsetEvent, RefractoryInfo, RefractoryPhase, RejectedEvent,
};
pub use feature::{FeatureBatch, FeatureField, FeatureRow, FeatureSchema, RowDecoder};
