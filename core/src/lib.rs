#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the bunch-crossing overlay engine.
//!
//! This crate defines the event model that every system operates on. A physics
//! [`Event`] owns an ordered, name-keyed set of [`Collection`] values, each of
//! which stores a closed set of hit kinds described by [`CollectionData`].
//! Background events use the very same model; systems move elements out of
//! background collections and into the physics event while preserving the
//! invariants documented on each type.

mod event;
mod hits;
mod parameters;

use serde::{Deserialize, Serialize};

pub use event::{Collection, CollectionData, CollectionFlags, Event, EventError, EventKey};
pub use hits::{
    CalorimeterHit, GenericRecord, McContribution, McParticle, PackedHit, PackedPixel, TrackerHit,
};
pub use parameters::Parameters;

/// Name of the event parameter holding the number of background events merged.
pub const PARAM_OVERLAY_EVENT_COUNT: &str = "Overlay.nEvents";
/// Name of the event parameter listing the run numbers of merged background events.
pub const PARAM_OVERLAY_RUN_NUMBERS: &str = "Overlay.runNumbers";
/// Name of the event parameter listing the event numbers of merged background events.
pub const PARAM_OVERLAY_EVENT_NUMBERS: &str = "Overlay.eventNumbers";
/// Name of the event parameter holding the cumulative job-wide overlay total.
pub const PARAM_OVERLAY_TOTAL: &str = "Overlay.totalEvents";

/// Handle into the owning event's Monte-Carlo particle table.
///
/// Hits never hold pointers to particles. The handle indexes the particle
/// collection of the event that owns the hit; dropping provenance is
/// expressed by clearing the surrounding `Option`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(u32);

impl ParticleId {
    /// Creates a particle handle from its index in the particle table.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric index of the handle.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Coalescing key addressing a single physical sensor cell.
///
/// The first cell identifier occupies the high 32 bits, the second the low 32
/// bits. Two calorimeter hits with the same key in one collection describe the
/// same cell and must be coalesced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey(u64);

impl CellKey {
    /// Combines two 32-bit cell identifiers into one key.
    #[must_use]
    pub const fn combine(id0: u32, id1: u32) -> Self {
        Self(((id0 as u64) << 32) | id1 as u64)
    }

    /// Retrieves the packed 64-bit representation.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Splits the key back into its two cell identifiers.
    #[must_use]
    pub const fn split(&self) -> (u32, u32) {
        ((self.0 >> 32) as u32, self.0 as u32)
    }
}

/// Closed vocabulary of collection element kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    /// Monte-Carlo truth particles.
    McParticle,
    /// Simulated tracker hits carrying a single time.
    TrackerHit,
    /// Simulated calorimeter hits carrying per-particle contributions.
    CalorimeterHit,
    /// Detector-specific bit-packed pixel records.
    PackedHit,
    /// Any other record type, merged by plain appending.
    Other,
}

impl CollectionKind {
    /// Canonical type name used when reporting on collections of this kind.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::McParticle => "MCParticle",
            Self::TrackerHit => "SimTrackerHit",
            Self::CalorimeterHit => "SimCalorimeterHit",
            Self::PackedHit => "LCGenericObject",
            Self::Other => "Other",
        }
    }

    /// Reports whether collections of this kind are gated by time windows.
    #[must_use]
    pub const fn is_timed(self) -> bool {
        matches!(self, Self::TrackerHit | Self::CalorimeterHit)
    }
}
