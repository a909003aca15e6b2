#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-collection integration windows and the time-of-flight admissibility
//! predicate shared by cropping and merging.
//!
//! A [`TimeWindowPolicy`] maps a collection *name* to a [`WindowSpec`]. The
//! window is compared against a hit time corrected for the light-speed flight
//! from the interaction point, so a hit at time `t` and position `p` is
//! admitted iff `start + tof(p) < t + offset < stop + tof(p)`, both bounds
//! exclusive.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Speed of light in millimetres per nanosecond.
pub const SPEED_OF_LIGHT_MM_PER_NS: f64 = 299.792_458;

/// Default integration start, slightly before the physics crossing.
///
/// Corresponds to 7.5 cm of flight at light speed.
pub const DEFAULT_START_INTEGRATION_TIME_NS: f64 = -0.25;

/// Integration time assigned to every known subsystem by [`TimeWindowPolicy::legacy`].
pub const NOMINAL_INTEGRATION_TIME_NS: f64 = 10.0;

/// Subsystem collections known to the legacy window table.
pub const LEGACY_COLLECTIONS: &[&str] = &[
    "BeamCalCollection",
    "LumiCalCollection",
    "EcalBarrelCollection",
    "EcalBarrelPreShowerCollection",
    "EcalEndcapCollection",
    "EcalEndcapPreShowerCollection",
    "EcalEndcapRingCollection",
    "EcalEndcapRingPreShowerCollection",
    "HcalBarrelRegCollection",
    "HcalEndCapRingsCollection",
    "HcalEndCapsCollection",
    "LHcalCollection",
    "MuonBarrelCollection",
    "MuonEndCapCollection",
    "ETDCollection",
    "FTDCollection",
    "SETCollection",
    "SITCollection",
    "VXDCollection",
    "TPCCollection",
    "TPCSpacePointCollection",
    "ECalBarrelCollection",
    "ECalEndcapCollection",
    "ECalPlugCollection",
    "HCalBarrelCollection",
    "HCalEndcapCollection",
    "HCalRingCollection",
    "YokeBarrelCollection",
    "YokeEndcapCollection",
    "VertexBarrelCollection",
    "VertexEndcapCollection",
    "InnerTrackerBarrelCollection",
    "InnerTrackerEndcapCollection",
    "OuterTrackerBarrelCollection",
    "OuterTrackerEndcapCollection",
];

/// Drift-chamber collections of the legacy table.
pub const DEFAULT_DRIFT_COUPLED_COLLECTIONS: &[&str] =
    &["TPCCollection", "TPCSpacePointCollection"];

/// Light-speed flight time from the interaction point to `position` (mm) in ns.
#[must_use]
pub fn time_of_flight(position: [f64; 3]) -> f64 {
    let [x, y, z] = position;
    (x * x + y * y + z * z).sqrt() / SPEED_OF_LIGHT_MM_PER_NS
}

/// Open interval of admissible flight-corrected hit times in ns.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: f64,
    stop: f64,
}

impl TimeWindow {
    /// Creates a window spanning `(start, stop)`.
    #[must_use]
    pub const fn new(start: f64, stop: f64) -> Self {
        Self { start, stop }
    }

    /// Creates a window that admits everything after `start`.
    #[must_use]
    pub const fn open_ended(start: f64) -> Self {
        Self {
            start,
            stop: f64::INFINITY,
        }
    }

    /// Lower bound of the window.
    #[must_use]
    pub const fn start(&self) -> f64 {
        self.start
    }

    /// Upper bound of the window.
    #[must_use]
    pub const fn stop(&self) -> f64 {
        self.stop
    }

    /// Reports whether a hit at `time` and `position`, shifted by `offset`, is admitted.
    #[must_use]
    pub fn admits(&self, time: f64, position: [f64; 3], offset: f64) -> bool {
        let tof = time_of_flight(position);
        let shifted = time + offset;
        shifted > self.start + tof && shifted < self.stop + tof
    }
}

/// Window attached to a collection name plus its drift-coupling flag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Admissible time window.
    pub window: TimeWindow,
    /// Hits additionally shift along z with the applied time offset.
    pub drift_coupled: bool,
}

/// Treatment of collection names missing from the window table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCollection {
    /// Admit everything after the integration start.
    #[default]
    Admit,
    /// Fail the lookup with [`WindowError::MissingIntegrationTime`].
    Reject,
}

/// Errors raised while building or querying the window table.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum WindowError {
    /// Flat name/time list does not consist of pairs.
    #[error("collection integration times need name/time pairs, got {len} entries")]
    OddPairList {
        /// Number of entries in the rejected list.
        len: usize,
    },
    /// Integration time is not a finite, non-negative number.
    #[error("invalid integration time '{value}' for collection '{collection}'")]
    InvalidIntegrationTime {
        /// Collection the time was configured for.
        collection: String,
        /// Rejected textual value.
        value: String,
    },
    /// Strict table has no entry for the collection.
    #[error("cannot find integration time for collection '{collection}'")]
    MissingIntegrationTime {
        /// Collection that was looked up.
        collection: String,
    },
}

/// Name-keyed table of integration windows.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeWindowPolicy {
    start: f64,
    integration_times: BTreeMap<String, f64>,
    drift_coupled: BTreeSet<String>,
    unknown: UnknownCollection,
}

impl TimeWindowPolicy {
    /// Creates an empty strict table: every lookup must be configured.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            start: DEFAULT_START_INTEGRATION_TIME_NS,
            integration_times: BTreeMap::new(),
            drift_coupled: BTreeSet::new(),
            unknown: UnknownCollection::Reject,
        }
    }

    /// Creates the lenient table listing every known subsystem at the nominal
    /// integration time, with the drift chambers coupled.
    #[must_use]
    pub fn legacy() -> Self {
        let integration_times = LEGACY_COLLECTIONS
            .iter()
            .map(|name| ((*name).to_owned(), NOMINAL_INTEGRATION_TIME_NS))
            .collect();
        let drift_coupled = DEFAULT_DRIFT_COUPLED_COLLECTIONS
            .iter()
            .map(|name| (*name).to_owned())
            .collect();
        Self {
            start: DEFAULT_START_INTEGRATION_TIME_NS,
            integration_times,
            drift_coupled,
            unknown: UnknownCollection::Admit,
        }
    }

    /// Overrides the integration start shared by every non-drift window.
    #[must_use]
    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    /// Selects how names missing from the table are treated.
    #[must_use]
    pub fn with_unknown(mut self, unknown: UnknownCollection) -> Self {
        self.unknown = unknown;
        self
    }

    /// Marks `name` as a drift-coupled collection.
    #[must_use]
    pub fn with_drift_coupled(mut self, name: impl Into<String>) -> Self {
        let _ = self.drift_coupled.insert(name.into());
        self
    }

    /// Replaces the set of drift-coupled collections.
    #[must_use]
    pub fn with_drift_coupled_set<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drift_coupled = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the integration time of `name`, replacing any previous entry.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        integration_time: f64,
    ) -> Result<(), WindowError> {
        let name = name.into();
        if !integration_time.is_finite() || integration_time < 0.0 {
            return Err(WindowError::InvalidIntegrationTime {
                collection: name,
                value: integration_time.to_string(),
            });
        }
        let _ = self.integration_times.insert(name, integration_time);
        Ok(())
    }

    /// Inserts every pair of a flat `[name, time, name, time, ...]` list.
    pub fn extend_from_pairs(&mut self, pairs: &[String]) -> Result<(), WindowError> {
        for (name, time) in parse_pairs(pairs)? {
            self.insert(name, time)?;
        }
        Ok(())
    }

    /// Integration start shared by every non-drift window.
    #[must_use]
    pub const fn start(&self) -> f64 {
        self.start
    }

    /// Treatment of unknown names.
    #[must_use]
    pub const fn unknown(&self) -> UnknownCollection {
        self.unknown
    }

    /// Configured integration time of `name`, if any.
    #[must_use]
    pub fn integration_time(&self, name: &str) -> Option<f64> {
        self.integration_times.get(name).copied()
    }

    /// Reports whether `name` is drift-coupled.
    #[must_use]
    pub fn is_drift_coupled(&self, name: &str) -> bool {
        self.drift_coupled.contains(name)
    }

    /// Resolves the window of the collection called `name`.
    pub fn window_for(&self, name: &str) -> Result<WindowSpec, WindowError> {
        match self.integration_times.get(name) {
            Some(&time) if self.is_drift_coupled(name) => Ok(WindowSpec {
                window: TimeWindow::new(-time / 2.0, time / 2.0),
                drift_coupled: true,
            }),
            Some(&time) => Ok(WindowSpec {
                window: TimeWindow::new(self.start, time),
                drift_coupled: false,
            }),
            None => match self.unknown {
                UnknownCollection::Admit => Ok(WindowSpec {
                    window: TimeWindow::open_ended(self.start),
                    drift_coupled: false,
                }),
                UnknownCollection::Reject => Err(WindowError::MissingIntegrationTime {
                    collection: name.to_owned(),
                }),
            },
        }
    }

    /// Latest window stop over every collection the table can resolve.
    ///
    /// Infinite when unknown names are admitted.
    #[must_use]
    pub fn max_stop(&self) -> f64 {
        if self.unknown == UnknownCollection::Admit {
            return f64::INFINITY;
        }
        self.integration_times
            .iter()
            .map(|(name, &time)| {
                if self.is_drift_coupled(name) {
                    time / 2.0
                } else {
                    time
                }
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Emits the resolved table at debug level.
    pub fn log_table(&self) {
        for (name, time) in &self.integration_times {
            debug!(
                collection = %name,
                integration_time_ns = time,
                drift_coupled = self.is_drift_coupled(name),
                "integration window"
            );
        }
    }
}

impl Default for TimeWindowPolicy {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Parses a flat `[name, time, name, time, ...]` list into pairs.
pub fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, f64)>, WindowError> {
    if pairs.len() % 2 != 0 {
        return Err(WindowError::OddPairList { len: pairs.len() });
    }
    pairs
        .chunks_exact(2)
        .map(|pair| {
            let name = &pair[0];
            let value = pair[1].trim();
            match value.parse::<f64>() {
                Ok(time) if time.is_finite() && time >= 0.0 => Ok((name.clone(), time)),
                _ => Err(WindowError::InvalidIntegrationTime {
                    collection: name.clone(),
                    value: value.to_owned(),
                }),
            }
        })
        .collect()
}
