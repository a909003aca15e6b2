use std::collections::{hash_map::Entry, HashMap};

use bx_overlay_core::{CalorimeterHit, Collection, CollectionData, TrackerHit};
use bx_overlay_system_time_window::TimeWindow;
use tracing::debug;

use crate::CoalescingIndex;

/// Summary of a single crop pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropOutcome {
    /// Elements kept unmodified.
    pub kept: usize,
    /// Calorimeter hits replaced by a hit carrying only passing contributions.
    pub split: usize,
    /// Elements removed entirely.
    pub removed: usize,
    /// Calorimeter hits folded into an earlier hit on the same cell.
    pub coalesced: usize,
}

/// Removes or splits the hits of a physics collection that fall outside the
/// collection's window, seeding the coalescing index with the survivors.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectionCropper;

impl CollectionCropper {
    /// Crops `collection` in place.
    ///
    /// Tracker hits are kept iff their time passes the window. Each
    /// calorimeter hit is kept as is when every contribution passes, dropped
    /// when none does, and otherwise replaced by a hit on the same cell
    /// carrying only the passing contributions. Other kinds are left alone.
    pub fn crop(
        &self,
        name: &str,
        collection: &mut Collection,
        window: &TimeWindow,
        index: &mut CoalescingIndex,
    ) -> CropOutcome {
        let outcome = match collection.data_mut() {
            CollectionData::TrackerHits(hits) => crop_tracker_hits(hits, window),
            CollectionData::CalorimeterHits(hits) => {
                let outcome = crop_calorimeter_hits(hits, window);
                index.rebuild(name, hits);
                outcome
            }
            _ => return CropOutcome::default(),
        };
        debug!(
            collection = name,
            kept = outcome.kept,
            split = outcome.split,
            removed = outcome.removed,
            coalesced = outcome.coalesced,
            "cropped physics collection"
        );
        outcome
    }
}

fn crop_tracker_hits(hits: &mut Vec<TrackerHit>, window: &TimeWindow) -> CropOutcome {
    let before = hits.len();
    hits.retain(|hit| window.admits(hit.time, hit.position, 0.0));
    CropOutcome {
        kept: hits.len(),
        removed: before - hits.len(),
        ..CropOutcome::default()
    }
}

fn crop_calorimeter_hits(hits: &mut Vec<CalorimeterHit>, window: &TimeWindow) -> CropOutcome {
    let mut outcome = CropOutcome::default();
    let mut survivors: Vec<CalorimeterHit> = Vec::with_capacity(hits.len());
    let mut cells = HashMap::with_capacity(hits.len());

    for hit in hits.drain(..) {
        let passing = hit
            .contributions
            .iter()
            .filter(|contribution| window.admits(contribution.time, hit.position, 0.0))
            .count();

        let survivor = if passing == hit.contributions.len() {
            outcome.kept += 1;
            hit
        } else if passing == 0 {
            outcome.removed += 1;
            continue;
        } else {
            outcome.split += 1;
            let mut replacement = hit.same_cell();
            replacement.contributions = hit
                .contributions
                .into_iter()
                .filter(|contribution| window.admits(contribution.time, hit.position, 0.0))
                .collect();
            replacement
        };

        match cells.entry(survivor.cell_key()) {
            Entry::Occupied(slot) => {
                let position: usize = *slot.get();
                survivors[position]
                    .contributions
                    .extend(survivor.contributions);
                outcome.coalesced += 1;
            }
            Entry::Vacant(slot) => {
                let _ = slot.insert(survivors.len());
                survivors.push(survivor);
            }
        }
    }

    *hits = survivors;
    outcome
}
