//! Detection events.
//!
//! Three event kinds share a common [`EventHeader`]:
//! - `CandidateEvent`: a row passed the score gate (transient)
//! - `ConfirmedEvent`: a candidate persisted over its confirm window (the alert)
//! - `RejectedEvent`: a candidate was blocked by the refractory period
//!
//! Confirmed and rejected events serialize to the alert record format
//! consumed by downstream sinks.

use crate::entity::{EntityId, TimestampMs};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Fields common to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub ts: TimestampMs,
    pub entity_id: EntityId,
}

impl EventHeader {
    pub fn new(ts: TimestampMs, entity_id: EntityId) -> Self {
        Self { ts, entity_id }
    }
}

/// Independent dimension of surge evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Price,
    Volume,
    Friction,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Self::Price, Self::Volume, Self::Friction];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Volume => "volume",
            Self::Friction => "friction",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of satisfied axes. Serializes as a list of axis names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AxisSet {
    pub price: bool,
    pub volume: bool,
    pub friction: bool,
}

impl AxisSet {
    pub fn new(price: bool, volume: bool, friction: bool) -> Self {
        Self {
            price,
            volume,
            friction,
        }
    }

    pub fn contains(&self, axis: Axis) -> bool {
        match axis {
            Axis::Price => self.price,
            Axis::Volume => self.volume,
            Axis::Friction => self.friction,
        }
    }

    pub fn len(&self) -> usize {
        [self.price, self.volume, self.friction]
            .iter()
            .filter(|b| **b)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Satisfied axes other than price.
    pub fn non_price_count(&self) -> usize {
        usize::from(self.volume) + usize::from(self.friction)
    }

    pub fn iter(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.into_iter().filter(|a| self.contains(*a))
    }

    /// Fraction of the three axes satisfied.
    pub fn strength(&self) -> f64 {
        self.len() as f64 / 3.0
    }
}

/// `price+volume` style label, `none` when empty.
impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        for (i, axis) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{axis}")?;
        }
        Ok(())
    }
}

impl Serialize for AxisSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for axis in self.iter() {
            seq.serialize_element(&axis)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AxisSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let axes = Vec::<Axis>::deserialize(deserializer)?;
        let mut set = AxisSet::default();
        for axis in axes {
            match axis {
                Axis::Price => set.price = true,
                Axis::Volume => set.volume = true,
                Axis::Friction => set.friction = true,
            }
        }
        Ok(set)
    }
}

/// Snapshot of the row that produced a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvidence {
    pub ret_1s: f64,
    pub accel_1s: f64,
    pub z_vol_1s: f64,
    pub ticks_per_sec: f64,
    pub spread: Option<f64>,
    pub microprice_slope: Option<f64>,
    pub price: Option<f64>,
}

/// A row that passed the score gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub score: f64,
    pub evidence: CandidateEvidence,
}

impl CandidateEvent {
    pub fn ts(&self) -> TimestampMs {
        self.header.ts
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.header.entity_id
    }
}

/// Evidence attached to a confirmed onset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedEvidence {
    pub axes: AxisSet,
    pub onset_strength: f64,
    pub ret_1s: Option<f64>,
    pub z_vol_1s: Option<f64>,
    pub spread: Option<f64>,
    pub microprice_slope: Option<f64>,
    pub delta_ret: Option<f64>,
    pub delta_zvol: Option<f64>,
    pub delta_spread: Option<f64>,
}

/// A confirmed onset: the alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedEvent {
    /// `ts` is the confirmation instant.
    #[serde(flatten)]
    pub header: EventHeader,
    /// Timestamp of the candidate this confirmation came from.
    pub confirmed_from: TimestampMs,
    pub evidence: ConfirmedEvidence,
    /// Price at the confirming row, for the price-driven refractory.
    #[serde(skip)]
    pub price: Option<f64>,
}

impl ConfirmedEvent {
    pub fn ts(&self) -> TimestampMs {
        self.header.ts
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.header.entity_id
    }

    /// Time-to-alert: latency from candidate to confirmation.
    pub fn tta_ms(&self) -> i64 {
        self.header.ts - self.confirmed_from
    }
}

/// Phase of the price-driven refractory state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefractoryPhase {
    #[default]
    Idle,
    Onset,
    Peak,
    Decay,
}

impl fmt::Display for RefractoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Onset => write!(f, "ONSET"),
            Self::Peak => write!(f, "PEAK"),
            Self::Decay => write!(f, "DECAY"),
        }
    }
}

/// Why a candidate was refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefractoryInfo {
    /// Seconds until the entity can admit again (lower bound for the state machine).
    pub remaining_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<RefractoryPhase>,
}

/// A candidate blocked by the refractory period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub rejected_at: TimestampMs,
    pub original_score: f64,
    pub refractory_info: RefractoryInfo,
}

impl RejectedEvent {
    /// Build a rejection record for `candidate`.
    pub fn for_candidate(candidate: &CandidateEvent, refractory_info: RefractoryInfo) -> Self {
        Self {
            header: candidate.header.clone(),
            rejected_at: candidate.ts(),
            original_score: candidate.score,
            refractory_info,
        }
    }

    pub fn ts(&self) -> TimestampMs {
        self.header.ts
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.header.entity_id
    }
}

/// Any detection event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum OnsetEvent {
    #[serde(rename = "onset_candidate")]
    Candidate(CandidateEvent),
    #[serde(rename = "onset_confirmed")]
    Confirmed(ConfirmedEvent),
    #[serde(rename = "onset_rejected_refractory")]
    Rejected(RejectedEvent),
}

impl OnsetEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            Self::Candidate(e) => &e.header,
            Self::Confirmed(e) => &e.header,
            Self::Rejected(e) => &e.header,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Candidate(_) => "onset_candidate",
            Self::Confirmed(_) => "onset_confirmed",
            Self::Rejected(_) => "onset_rejected_refractory",
        }
    }
}

impl From<CandidateEvent> for OnsetEvent {
    fn from(e: CandidateEvent) -> Self {
        Self::Candidate(e)
    }
}

impl From<ConfirmedEvent> for OnsetEvent {
    fn from(e: ConfirmedEvent) -> Self {
        Self::Confirmed(e)
    }
}

impl From<RejectedEvent> for OnsetEvent {
    fn from(e: RejectedEvent) -> Self {
        Self::Rejected(e)
    }
}
