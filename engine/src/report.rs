use std::collections::BTreeMap;

use bx_overlay_system_merge::MergeOutcome;
use serde::{Deserialize, Serialize};
use tracing::info;

/// End-of-job summary returned by [`crate::OverlayEngine::finalize`].
///
/// Purely diagnostic; nothing in the merged events depends on it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayReport {
    /// Physics events overlaid.
    pub events_processed: u64,
    /// Background events merged over the whole job.
    pub background_events: u64,
    /// Mean number of background events per physics event.
    pub mean_overlay: f64,
    /// Elements moved into each destination collection over the whole job.
    pub merged_per_collection: BTreeMap<String, u64>,
    /// Coalesced calorimeter hits whose positions disagreed.
    pub position_mismatches: u64,
}

impl OverlayReport {
    pub(crate) fn record_merge(&mut self, collection: &str, outcome: &MergeOutcome) {
        let transferred = u64::try_from(outcome.transferred()).unwrap_or(u64::MAX);
        if transferred > 0 {
            let total = self
                .merged_per_collection
                .entry(collection.to_owned())
                .or_default();
            *total = total.saturating_add(transferred);
        }
        if let MergeOutcome::Hits(stats) = outcome {
            self.position_mismatches = self
                .position_mismatches
                .saturating_add(u64::try_from(stats.position_mismatches).unwrap_or(u64::MAX));
        }
    }

    pub(crate) fn record_event(&mut self, background_events: u64) {
        self.events_processed += 1;
        self.background_events = self.background_events.saturating_add(background_events);
        self.mean_overlay = self.background_events as f64 / self.events_processed as f64;
    }

    pub(crate) fn log(&self) {
        info!(
            events = self.events_processed,
            background_events = self.background_events,
            mean_overlay = self.mean_overlay,
            position_mismatches = self.position_mismatches,
            "overlay finished"
        );
        for (collection, total) in &self.merged_per_collection {
            info!(collection = %collection, merged = total, "collection totals");
        }
    }
}
