#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Type-dispatched merging of background collections into physics collections.
//!
//! The [`HitMerger`] owns the per-event [`CoalescingIndex`]. Every physics
//! event starts with [`HitMerger::begin_event`], continues with cropping of the
//! physics collections and then with any number of merges. Elements are moved
//! out of the source collection; nothing is ever cloned across events.

mod crop;
mod factory;
mod index;
mod pixels;
mod remap;

use bx_overlay_core::{
    CalorimeterHit, CellKey, Collection, CollectionData, McContribution, McParticle, TrackerHit,
};
use bx_overlay_system_time_window::WindowSpec;
use tracing::{debug, error, warn};

pub use crop::{CollectionCropper, CropOutcome};
pub use factory::CollectionFactory;
pub use index::CoalescingIndex;
pub use pixels::PixelMap;
pub use remap::ParticleRemap;

/// Squared distance in mm² above which two hits on one cell are reported as
/// disagreeing in position.
pub const DEFAULT_POSITION_TOLERANCE_SQ_MM2: f64 = 10.0;

/// Admissibility gate applied to timed hits during a merge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gate {
    /// Every hit is admitted and positions are left untouched.
    Open,
    /// Hits are admitted through the collection's window.
    Window(WindowSpec),
}

impl Gate {
    fn admits(&self, time: f64, position: [f64; 3], offset: f64) -> bool {
        match self {
            Self::Open => true,
            Self::Window(spec) => spec.window.admits(time, position, offset),
        }
    }

    fn drift_coupled(&self) -> bool {
        matches!(self, Self::Window(spec) if spec.drift_coupled)
    }
}

/// Timing context of a single merge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// Time offset of the background crossing relative to the physics crossing in ns.
    pub offset: f64,
    /// Gate applied to timed hits.
    pub gate: Gate,
    /// Translation of particle handles carried by moved hits.
    pub remap: ParticleRemap,
}

impl Timing {
    /// Untimed merge: no offset, open gate.
    #[must_use]
    pub const fn untimed(remap: ParticleRemap) -> Self {
        Self {
            offset: 0.0,
            gate: Gate::Open,
            remap,
        }
    }

    /// Merge of a crossing at `offset` gated by `spec`.
    #[must_use]
    pub const fn windowed(offset: f64, spec: WindowSpec, remap: ParticleRemap) -> Self {
        Self {
            offset,
            gate: Gate::Window(spec),
            remap,
        }
    }

    fn shifts_drift(&self) -> bool {
        self.gate.drift_coupled() && self.offset.abs() >= f64::EPSILON
    }
}

/// Counters of a single hit merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Elements moved into the destination as new entries.
    pub moved: usize,
    /// Source hits whose contributions were appended to an existing cell.
    pub coalesced: usize,
    /// Source elements rejected by the gate.
    pub rejected: usize,
    /// Contributions appended to the destination.
    pub contributions: usize,
    /// Coalesced hits whose position disagreed with the destination hit.
    pub position_mismatches: usize,
}

/// Result of [`HitMerger::merge`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MergeOutcome {
    /// Particles were moved; later hit merges must use `remap`.
    Particles {
        /// Number of particles moved.
        moved: usize,
        /// Translation into the destination particle table.
        remap: ParticleRemap,
    },
    /// Tracker or calorimeter hits were merged.
    Hits(MergeStats),
    /// Packed pixel records were accumulated.
    Pixels {
        /// Destination records after repacking.
        records: usize,
        /// Distinct destination pixels after repacking.
        pixels: usize,
    },
    /// Records without a dedicated rule were appended.
    Appended {
        /// Number of records moved.
        moved: usize,
    },
    /// Source and destination types differ; nothing was merged.
    KindMismatch,
}

impl MergeOutcome {
    /// Number of source elements now owned by the destination.
    #[must_use]
    pub fn transferred(&self) -> usize {
        match self {
            Self::Particles { moved, .. } | Self::Appended { moved } => *moved,
            Self::Hits(stats) => stats.moved + stats.coalesced,
            Self::Pixels { .. } | Self::KindMismatch => 0,
        }
    }
}

/// Merge engine owning the per-event coalescing index.
#[derive(Debug)]
pub struct HitMerger {
    index: CoalescingIndex,
    cropper: CollectionCropper,
    drift_velocity: f64,
    position_tolerance_sq: f64,
}

impl HitMerger {
    /// Creates a merger shifting drift-coupled hits by `drift_velocity` mm/ns.
    #[must_use]
    pub fn new(drift_velocity: f64) -> Self {
        Self {
            index: CoalescingIndex::new(),
            cropper: CollectionCropper,
            drift_velocity,
            position_tolerance_sq: DEFAULT_POSITION_TOLERANCE_SQ_MM2,
        }
    }

    /// Overrides the squared position tolerance in mm².
    #[must_use]
    pub fn with_position_tolerance_sq(mut self, tolerance: f64) -> Self {
        self.position_tolerance_sq = tolerance;
        self
    }

    /// Drops the coalescing index of the previous physics event.
    pub fn begin_event(&mut self) {
        self.index.clear();
    }

    /// Read-only view of the coalescing index.
    #[must_use]
    pub fn index(&self) -> &CoalescingIndex {
        &self.index
    }

    /// Crops the physics collection `name` and seeds the index with its survivors.
    pub fn crop(
        &mut self,
        name: &str,
        collection: &mut Collection,
        spec: &WindowSpec,
    ) -> CropOutcome {
        self.cropper
            .crop(name, collection, &spec.window, &mut self.index)
    }

    /// Moves the admissible elements of `source` into `destination`, the
    /// collection called `destination_name` in the physics event.
    pub fn merge(
        &mut self,
        destination_name: &str,
        source: &mut Collection,
        destination: &mut Collection,
        timing: &Timing,
    ) -> MergeOutcome {
        if !source.data().same_type(destination.data()) {
            warn!(
                collection = destination_name,
                source_type = source.type_name(),
                destination_type = destination.type_name(),
                "collection types differ, skipping merge"
            );
            return MergeOutcome::KindMismatch;
        }

        let outcome = match (source.data_mut(), destination.data_mut()) {
            (CollectionData::McParticles(from), CollectionData::McParticles(into)) => {
                merge_particles(from, into, timing.offset)
            }
            (CollectionData::TrackerHits(from), CollectionData::TrackerHits(into)) => {
                MergeOutcome::Hits(self.merge_tracker_hits(from, into, timing))
            }
            (CollectionData::CalorimeterHits(from), CollectionData::CalorimeterHits(into)) => {
                let added = self.merge_calorimeter_hits(destination_name, from, into, timing);
                MergeOutcome::Hits(added)
            }
            (CollectionData::PackedHits(from), CollectionData::PackedHits(into)) => {
                let (records, pixels) = pixels::accumulate_packed(from, into);
                MergeOutcome::Pixels { records, pixels }
            }
            (
                CollectionData::Other { records: from, .. },
                CollectionData::Other { records: into, .. },
            ) => {
                let moved = from.len();
                into.append(from);
                MergeOutcome::Appended { moved }
            }
            _ => MergeOutcome::KindMismatch,
        };

        debug!(
            collection = destination_name,
            offset_ns = timing.offset,
            destination_len = destination.len(),
            outcome = ?outcome,
            "merged collection"
        );
        outcome
    }

    fn merge_tracker_hits(
        &self,
        from: &mut Vec<TrackerHit>,
        into: &mut Vec<TrackerHit>,
        timing: &Timing,
    ) -> MergeStats {
        let shift_drift = timing.shifts_drift();
        let drift = timing.offset * self.drift_velocity;
        let (admitted, rejected): (Vec<TrackerHit>, Vec<TrackerHit>) = from
            .drain(..)
            .partition(|hit| timing.gate.admits(hit.time, hit.position, timing.offset));

        let stats = MergeStats {
            moved: admitted.len(),
            rejected: rejected.len(),
            ..MergeStats::default()
        };
        *from = rejected;

        into.extend(admitted.into_iter().map(|mut hit| {
            hit.time += timing.offset;
            if shift_drift {
                if hit.position[2] <= 0.0 {
                    hit.position[2] -= drift;
                } else {
                    hit.position[2] += drift;
                }
            }
            hit.particle = timing.remap.apply(hit.particle);
            hit
        }));
        stats
    }

    fn merge_calorimeter_hits(
        &mut self,
        destination_name: &str,
        from: &mut Vec<CalorimeterHit>,
        into: &mut Vec<CalorimeterHit>,
        timing: &Timing,
    ) -> MergeStats {
        self.index.ensure_indexed(destination_name, into);
        let mut stats = MergeStats::default();

        for hit in from.drain(..) {
            let position = hit.position;
            let contributions: Vec<McContribution> = hit
                .contributions
                .into_iter()
                .filter(|contribution| {
                    timing.gate.admits(contribution.time, position, timing.offset)
                })
                .map(|mut contribution| {
                    contribution.time += timing.offset;
                    contribution.particle = timing.remap.apply(contribution.particle);
                    contribution
                })
                .collect();

            if contributions.is_empty() {
                stats.rejected += 1;
                continue;
            }
            stats.contributions += contributions.len();

            let key = CellKey::combine(hit.cell_id0, hit.cell_id1);
            match self.index.lookup(destination_name, key) {
                Some(slot) => {
                    let existing = &mut into[slot];
                    let distance_sq = squared_distance(existing.position, position);
                    if distance_sq > self.position_tolerance_sq {
                        stats.position_mismatches += 1;
                        error!(
                            collection = destination_name,
                            cell_id0 = hit.cell_id0,
                            cell_id1 = hit.cell_id1,
                            existing = ?existing.position,
                            incoming = ?position,
                            distance_sq,
                            "hits on the same cell do not match in position"
                        );
                    }
                    existing.contributions.extend(contributions);
                    stats.coalesced += 1;
                }
                None => {
                    let _ = self.index.register(destination_name, key, into.len());
                    into.push(CalorimeterHit {
                        cell_id0: hit.cell_id0,
                        cell_id1: hit.cell_id1,
                        position,
                        contributions,
                    });
                    stats.moved += 1;
                }
            }
        }
        stats
    }
}

fn merge_particles(
    from: &mut Vec<McParticle>,
    into: &mut Vec<McParticle>,
    offset: f64,
) -> MergeOutcome {
    let moved = from.len();
    let remap = ParticleRemap::Shift {
        base: u32::try_from(into.len()).unwrap_or(u32::MAX),
        count: u32::try_from(moved).unwrap_or(u32::MAX),
    };
    into.extend(from.drain(..).map(|mut particle| {
        particle.time += offset;
        particle.overlay = true;
        remap.apply_all(&mut particle.parents);
        remap.apply_all(&mut particle.daughters);
        particle
    }));
    MergeOutcome::Particles { moved, remap }
}

fn squared_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
