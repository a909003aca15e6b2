use std::collections::BTreeMap;

use bx_overlay_source::{SourceConfig, SupplyMode};
use bx_overlay_system_scheduling::{BunchTrain, OverlayCount, ScheduleError};
use bx_overlay_system_time_window::{
    TimeWindowPolicy, UnknownCollection, WindowError, DEFAULT_DRIFT_COUPLED_COLLECTIONS,
    DEFAULT_START_INTEGRATION_TIME_NS,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors detected while loading or validating an [`OverlayConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML text could not be parsed into a configuration.
    #[error("failed to parse overlay configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// Window table is malformed or lacks a requested collection.
    #[error(transparent)]
    Window(#[from] WindowError),
    /// Bunch-train or overlay-count parameters are out of range.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// Drift velocity is negative or not finite.
    #[error("invalid drift velocity {value} mm/ns")]
    InvalidDriftVelocity {
        /// Rejected velocity.
        value: f64,
    },
    /// Start integration time is not finite.
    #[error("invalid start integration time {value} ns")]
    InvalidStartTime {
        /// Rejected time.
        value: f64,
    },
    /// Configured start file does not exist.
    #[error("start background file index {index} outside the {files} configured files")]
    StartFileOutOfRange {
        /// Configured index.
        index: usize,
        /// Number of configured files.
        files: usize,
    },
}

/// Overlay flavour run for each physics event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    /// Bunch-train overlay with per-collection time windows.
    #[default]
    Timing,
    /// Untimed overlay of a fixed or Poisson number of events.
    Simple,
}

/// Engine configuration. Every field has a default, so an empty TOML document
/// is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Background file paths.
    pub background_files: Vec<String>,
    /// Overlay flavour.
    pub mode: OverlayMode,
    /// Background supply strategy.
    pub supply: SupplyMode,
    /// Events overlaid per crossing (timing) or per physics event (simple).
    pub overlay_count: OverlayCount,
    /// Number of crossings in the bunch train.
    pub bunch_train_size: u32,
    /// 1-based crossing holding the physics event.
    pub physics_bunch_crossing: u32,
    /// Draw the physics crossing at random for every event.
    pub random_bunch_crossing: bool,
    /// Time between crossings in ns.
    pub bunch_spacing_ns: f64,
    /// Drift velocity of drift-coupled collections in mm/ns.
    pub drift_velocity_mm_per_ns: f64,
    /// Start of every non-drift integration window in ns.
    pub start_integration_time_ns: f64,
    /// Treatment of collections without an integration time.
    pub unknown_collections: UnknownCollection,
    /// Integration time overrides in ns. With `unknown_collections = "admit"`
    /// they are applied on top of the table of known subsystems.
    pub integration_times: BTreeMap<String, f64>,
    /// Flat `[name, time, name, time, ...]` integration time list.
    pub collection_integration_times: Vec<String>,
    /// Global random seed.
    pub random_seed: u64,
    /// Identity mixed into every per-event seed.
    pub processor_name: String,
    /// Reuse background files once all were consumed.
    pub allow_reusing_background_files: bool,
    /// Background file opened first.
    pub start_background_file_index: Option<usize>,
    /// Events skipped in the first opened background file.
    pub start_background_event_index: Option<usize>,
    /// Name of the particle collection in every event.
    pub mc_particle_collection: String,
    /// Name under which the cropped physics particles are recorded before any
    /// background is merged. `None` disables the copy.
    pub mc_physics_particle_collection: Option<String>,
    /// Flat `[source, destination, ...]` collection pairs.
    pub collection_map: Vec<String>,
    /// Skip crossings that cannot reach any window.
    pub skip_dead_crossings: bool,
    /// Collections using symmetric windows and drift shifts.
    pub drift_coupled_collections: Vec<String>,
    /// Tracker collections created with the has-momentum bit.
    pub momentum_flag_collections: Vec<String>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            background_files: Vec::new(),
            mode: OverlayMode::Timing,
            supply: SupplyMode::Sequential,
            overlay_count: OverlayCount::default(),
            bunch_train_size: 1,
            physics_bunch_crossing: 1,
            random_bunch_crossing: false,
            bunch_spacing_ns: 0.5,
            drift_velocity_mm_per_ns: 0.05,
            start_integration_time_ns: DEFAULT_START_INTEGRATION_TIME_NS,
            unknown_collections: UnknownCollection::Admit,
            integration_times: BTreeMap::new(),
            collection_integration_times: Vec::new(),
            random_seed: 42,
            processor_name: "OverlayTiming".to_owned(),
            allow_reusing_background_files: false,
            start_background_file_index: None,
            start_background_event_index: None,
            mc_particle_collection: "MCParticle".to_owned(),
            mc_physics_particle_collection: Some("MCPhysicsParticles".to_owned()),
            collection_map: Vec::new(),
            skip_dead_crossings: false,
            drift_coupled_collections: DEFAULT_DRIFT_COUPLED_COLLECTIONS
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            momentum_flag_collections: vec!["TPCCollection".to_owned()],
        }
    }
}

impl OverlayConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Checks every parameter that can be checked before the first event.
    ///
    /// With `unknown_collections = "reject"` every mapped destination other
    /// than the particle collection must have an integration time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = self.time_window_policy()?;
        if self.unknown_collections == UnknownCollection::Reject {
            for (_, destination) in self.collection_pairs() {
                if destination != self.mc_particle_collection {
                    let _ = policy.window_for(&destination)?;
                }
            }
        }
        let _ = self.bunch_train()?;
        self.overlay_count.validate()?;
        if !self.drift_velocity_mm_per_ns.is_finite() || self.drift_velocity_mm_per_ns < 0.0 {
            return Err(ConfigError::InvalidDriftVelocity {
                value: self.drift_velocity_mm_per_ns,
            });
        }
        if let Some(index) = self.start_background_file_index {
            if index >= self.background_files.len() {
                return Err(ConfigError::StartFileOutOfRange {
                    index,
                    files: self.background_files.len(),
                });
            }
        }
        Ok(())
    }

    /// Builds the window table.
    pub fn time_window_policy(&self) -> Result<TimeWindowPolicy, ConfigError> {
        if !self.start_integration_time_ns.is_finite() {
            return Err(ConfigError::InvalidStartTime {
                value: self.start_integration_time_ns,
            });
        }
        let base = match self.unknown_collections {
            UnknownCollection::Admit => TimeWindowPolicy::legacy(),
            UnknownCollection::Reject => TimeWindowPolicy::strict(),
        };
        let mut policy = base
            .with_start(self.start_integration_time_ns)
            .with_unknown(self.unknown_collections)
            .with_drift_coupled_set(self.drift_coupled_collections.iter().cloned());
        for (name, time) in &self.integration_times {
            policy.insert(name.clone(), *time)?;
        }
        policy.extend_from_pairs(&self.collection_integration_times)?;
        Ok(policy)
    }

    /// Builds the bunch-train description.
    pub fn bunch_train(&self) -> Result<BunchTrain, ConfigError> {
        Ok(BunchTrain::new(
            self.bunch_train_size,
            self.physics_bunch_crossing,
            self.random_bunch_crossing,
            self.bunch_spacing_ns,
        )?)
    }

    /// Builds the background source configuration.
    #[must_use]
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            files: self.background_files.clone(),
            mode: self.supply,
            allow_reuse: self.allow_reusing_background_files,
            start_file: self.start_background_file_index,
            start_event: self.start_background_event_index,
        }
    }

    /// Source/destination pairs of the collection map. A trailing unpaired
    /// entry is ignored.
    #[must_use]
    pub fn collection_pairs(&self) -> Vec<(String, String)> {
        if self.collection_map.len() % 2 != 0 {
            warn!(
                entries = self.collection_map.len(),
                "collection map has an odd number of entries, ignoring the last one"
            );
        }
        self.collection_map
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use bx_overlay_system_time_window::{TimeWindow, NOMINAL_INTEGRATION_TIME_NS};

    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = OverlayConfig::from_toml_str("").expect("parse");
        assert_eq!(config, OverlayConfig::default());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn full_document_is_parsed() {
        let config = OverlayConfig::from_toml_str(
            r#"
            background_files = ["bg1.slcio", "bg2.slcio"]
            mode = "timing"
            supply = "random_access"
            overlay_count = { mode = "poisson", mean = 1.7 }
            bunch_train_size = 60
            physics_bunch_crossing = 1
            random_bunch_crossing = true
            unknown_collections = "reject"
            collection_integration_times = [
                "VertexBarrelCollection", "10",
                "ECalBarrelCollection", "25",
            ]
            allow_reusing_background_files = true
            "#,
        )
        .expect("parse");
        assert_eq!(config.supply, SupplyMode::RandomAccess);
        assert_eq!(config.overlay_count, OverlayCount::Poisson { mean: 1.7 });
        config.validate().expect("valid");

        let policy = config.time_window_policy().expect("policy");
        assert_eq!(
            policy.window_for("ECalBarrelCollection").expect("known").window,
            TimeWindow::new(DEFAULT_START_INTEGRATION_TIME_NS, 25.0)
        );
        assert!(policy.window_for("HCalRingCollection").is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            OverlayConfig::from_toml_str("no_such_option = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn lenient_overrides_apply_on_top_of_known_subsystems() {
        let mut config = OverlayConfig::default();
        let _ = config.integration_times.insert("TPCCollection".to_owned(), 30.0);
        let policy = config.time_window_policy().expect("policy");
        assert_eq!(policy.integration_time("TPCCollection"), Some(30.0));
        assert_eq!(
            policy.integration_time("VXDCollection"),
            Some(NOMINAL_INTEGRATION_TIME_NS)
        );
        assert!(policy.window_for("TPCCollection").expect("known").drift_coupled);
    }

    #[test]
    fn malformed_parameters_are_reported() {
        let odd = OverlayConfig {
            collection_integration_times: vec!["VXDCollection".to_owned()],
            ..OverlayConfig::default()
        };
        assert!(matches!(
            odd.validate(),
            Err(ConfigError::Window(WindowError::OddPairList { len: 1 }))
        ));

        let slot = OverlayConfig {
            bunch_train_size: 3,
            physics_bunch_crossing: 5,
            ..OverlayConfig::default()
        };
        assert!(matches!(slot.validate(), Err(ConfigError::Schedule(_))));

        let mean = OverlayConfig {
            overlay_count: OverlayCount::Poisson { mean: f64::NAN },
            ..OverlayConfig::default()
        };
        assert!(matches!(mean.validate(), Err(ConfigError::Schedule(_))));

        let start = OverlayConfig {
            start_background_file_index: Some(0),
            ..OverlayConfig::default()
        };
        assert!(matches!(
            start.validate(),
            Err(ConfigError::StartFileOutOfRange { index: 0, files: 0 })
        ));
    }

    #[test]
    fn strict_map_destinations_need_windows() {
        let mut config = OverlayConfig {
            unknown_collections: UnknownCollection::Reject,
            collection_integration_times: vec!["VXDCollection".to_owned(), "10".to_owned()],
            collection_map: vec![
                "MCParticle".to_owned(),
                "MCParticle".to_owned(),
                "VXDCollection".to_owned(),
                "VXDCollection".to_owned(),
                "SITCollection".to_owned(),
                "SITCollection_BG".to_owned(),
            ],
            ..OverlayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Window(WindowError::MissingIntegrationTime { .. }))
        ));

        config
            .collection_integration_times
            .extend(["SITCollection_BG".to_owned(), "20".to_owned()]);
        config.validate().expect("every destination has a window");

        config.unknown_collections = UnknownCollection::Admit;
        config.collection_integration_times.truncate(2);
        config.validate().expect("lenient tables admit unlisted destinations");
    }

    #[test]
    fn physics_particles_are_recorded_by_default() {
        let config = OverlayConfig::from_toml_str("").expect("parse");
        assert_eq!(
            config.mc_physics_particle_collection.as_deref(),
            Some("MCPhysicsParticles")
        );
    }

    #[test]
    fn odd_collection_map_drops_trailing_entry() {
        let config = OverlayConfig {
            collection_map: vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            ..OverlayConfig::default()
        };
        assert_eq!(
            config.collection_pairs(),
            vec![("A".to_owned(), "B".to_owned())]
        );
    }
}
