use bx_overlay_core::{
    CollectionKind, Event, EventKey, PARAM_OVERLAY_EVENT_COUNT, PARAM_OVERLAY_EVENT_NUMBERS,
    PARAM_OVERLAY_RUN_NUMBERS, PARAM_OVERLAY_TOTAL,
};
use bx_overlay_source::{BackgroundEventSource, EventStore};
use bx_overlay_system_merge::{
    CollectionFactory, Gate, HitMerger, MergeOutcome, ParticleRemap, Timing,
};
use bx_overlay_system_scheduling::{
    event_rng, BunchTrainScheduler, EventSeeder, OverlayCount,
};
use bx_overlay_system_time_window::TimeWindowPolicy;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::{
    config::{OverlayConfig, OverlayMode},
    report::OverlayReport,
    untimed::{merge_event, Pairs},
    OverlayError,
};

/// Everything built from the configuration at initialization.
pub(crate) struct Session<S: EventStore> {
    mode: OverlayMode,
    policy: TimeWindowPolicy,
    scheduler: BunchTrainScheduler,
    seeder: EventSeeder,
    count: OverlayCount,
    source: BackgroundEventSource<S>,
    merger: HitMerger,
    factory: CollectionFactory,
    pairs: Vec<(String, String)>,
    mc_collection: String,
    mc_physics_collection: Option<String>,
    skip_dead_crossings: bool,
    run_counter: u64,
    event_counter: u64,
    report: OverlayReport,
}

impl<S: EventStore> Session<S> {
    pub(crate) fn new(store: S, config: &OverlayConfig) -> Result<Self, OverlayError> {
        let policy = config.time_window_policy()?;
        policy.log_table();
        let source = BackgroundEventSource::new(store, config.source_config())?;
        Ok(Self {
            mode: config.mode,
            policy,
            scheduler: BunchTrainScheduler::new(config.bunch_train()?),
            seeder: EventSeeder::new(config.random_seed, config.processor_name.clone()),
            count: config.overlay_count,
            source,
            merger: HitMerger::new(config.drift_velocity_mm_per_ns),
            factory: CollectionFactory::new(config.momentum_flag_collections.iter().cloned()),
            pairs: config.collection_pairs(),
            mc_collection: config.mc_particle_collection.clone(),
            mc_physics_collection: config.mc_physics_particle_collection.clone(),
            skip_dead_crossings: config.skip_dead_crossings,
            run_counter: 0,
            event_counter: 0,
            report: OverlayReport::default(),
        })
    }

    pub(crate) fn has_files(&self) -> bool {
        self.source.file_count() > 0
    }

    pub(crate) fn start_run(&mut self) {
        self.run_counter += 1;
        debug!(run_counter = self.run_counter, "run started");
    }

    pub(crate) fn next_seed(&mut self) -> u64 {
        self.event_counter += 1;
        self.seeder.seed_for(self.run_counter, self.event_counter)
    }

    pub(crate) fn overlay(&mut self, mut event: Event, seed: u64) -> Result<Event, OverlayError> {
        let mut rng = event_rng(seed);
        self.merger.begin_event();
        let merged = match self.mode {
            OverlayMode::Timing => self.overlay_timing(&mut event, &mut rng)?,
            OverlayMode::Simple => self.overlay_simple(&mut event, &mut rng)?,
        };
        self.report
            .record_event(u64::try_from(merged.len()).unwrap_or(u64::MAX));
        self.write_parameters(&mut event, &merged);
        debug!(
            run = event.run_number(),
            event = event.event_number(),
            seed,
            background_events = merged.len(),
            "overlaid physics event"
        );
        Ok(event)
    }

    pub(crate) fn finish(&mut self) -> OverlayReport {
        self.source.close();
        self.report.log();
        self.report.clone()
    }

    fn overlay_timing(
        &mut self,
        event: &mut Event,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventKey>, OverlayError> {
        self.crop_physics(event)?;
        self.record_physics_particles(event)?;

        let mut merged = Vec::new();
        if !self.has_files() || !self.count.is_active() {
            return Ok(merged);
        }

        let plan = self.scheduler.schedule(rng);
        self.source.begin_event(rng)?;
        let max_stop = self.policy.max_stop();
        for &crossing in plan.offsets() {
            let overlays = self.count.draw(rng);
            if self.skip_dead_crossings && !self.scheduler.crossing_is_live(crossing, max_stop) {
                debug!(crossing, "crossing outside every window, skipped");
                continue;
            }
            let offset = self.scheduler.time_offset(crossing);
            for _ in 0..overlays {
                let mut background = self.source.next(rng)?;
                merged.push(background.key());
                self.merge_crossing(event, &mut background, crossing, offset)?;
            }
        }
        Ok(merged)
    }

    fn crop_physics(&mut self, event: &mut Event) -> Result<(), OverlayError> {
        let names: Vec<String> = if self.pairs.is_empty() {
            event
                .collection_names()
                .filter(|name| {
                    event
                        .collection(name)
                        .is_some_and(|collection| collection.kind().is_timed())
                })
                .map(str::to_owned)
                .collect()
        } else {
            self.pairs.iter().map(|(_, into)| into.clone()).collect()
        };

        for name in names {
            let Some(collection) = event.collection_mut(&name) else {
                continue;
            };
            if !collection.kind().is_timed() {
                continue;
            }
            let spec = self.policy.window_for(&name)?;
            let outcome = self.merger.crop(&name, collection, &spec);
            debug!(collection = %name, outcome = ?outcome, "cropped physics collection");
        }
        Ok(())
    }

    fn record_physics_particles(&self, event: &mut Event) -> Result<(), OverlayError> {
        let Some(name) = &self.mc_physics_collection else {
            return Ok(());
        };
        let Some(particles) = event
            .collection(&self.mc_collection)
            .filter(|collection| collection.kind() == CollectionKind::McParticle)
            .filter(|collection| !collection.is_empty())
            .cloned()
        else {
            return Ok(());
        };
        if event.contains(name) {
            warn!(
                collection = %name,
                "physics particle collection already present, not recorded"
            );
            return Ok(());
        }
        debug!(collection = %name, particles = particles.len(), "recorded physics particles");
        event.add_collection(name.clone(), particles)?;
        Ok(())
    }

    fn merge_crossing(
        &mut self,
        event: &mut Event,
        background: &mut Event,
        crossing: i32,
        offset: f64,
    ) -> Result<(), OverlayError> {
        let remap = match background.take_collection(&self.mc_collection) {
            Some(mut particles) => {
                let destination = self.factory.ensure(event, &self.mc_collection, &particles);
                let timing = Timing {
                    offset,
                    gate: Gate::Open,
                    remap: ParticleRemap::Keep,
                };
                let outcome = self
                    .merger
                    .merge(&self.mc_collection, &mut particles, destination, &timing);
                self.report.record_merge(&self.mc_collection, &outcome);
                match outcome {
                    MergeOutcome::Particles { remap, .. } => remap,
                    _ => ParticleRemap::Drop,
                }
            }
            None => ParticleRemap::Drop,
        };

        let pairs: Vec<(String, String)> = if self.pairs.is_empty() {
            background
                .collection_names()
                .map(|name| (name.to_owned(), name.to_owned()))
                .collect()
        } else {
            self.pairs.clone()
        };

        for (from, into) in pairs {
            let Some(mut collection) = background.take_collection(&from) else {
                debug!(collection = %from, "collection absent from background event, skipping");
                continue;
            };
            let timing = match collection.kind() {
                CollectionKind::TrackerHit | CollectionKind::CalorimeterHit => {
                    let spec = self.policy.window_for(&into)?;
                    if self.skip_dead_crossings && crossing != 0 && spec.window.stop() <= offset {
                        continue;
                    }
                    Timing::windowed(offset, spec, remap)
                }
                CollectionKind::PackedHit | CollectionKind::Other => Timing::untimed(remap),
                CollectionKind::McParticle => {
                    debug!(collection = %from, "secondary particle collection not overlaid");
                    continue;
                }
            };
            let destination = self.factory.ensure(event, &into, &collection);
            let outcome = self.merger.merge(&into, &mut collection, destination, &timing);
            self.report.record_merge(&into, &outcome);
        }
        Ok(())
    }

    fn overlay_simple(
        &mut self,
        event: &mut Event,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<EventKey>, OverlayError> {
        let mut merged = Vec::new();
        if !self.has_files() {
            return Ok(merged);
        }
        let overlays = self.count.draw(rng);
        if overlays == 0 {
            return Ok(merged);
        }
        self.source.begin_event(rng)?;
        let pairs = if self.pairs.is_empty() {
            Pairs::SameNamed
        } else {
            Pairs::Explicit(&self.pairs)
        };
        for _ in 0..overlays {
            let mut background = self.source.next(rng)?;
            merged.push(background.key());
            let outcomes =
                merge_event(&mut self.merger, &self.factory, &mut background, event, pairs);
            for (collection, outcome) in &outcomes {
                self.report.record_merge(collection, outcome);
            }
        }
        Ok(merged)
    }

    fn write_parameters(&self, event: &mut Event, merged: &[EventKey]) {
        let parameters = event.parameters_mut();
        parameters.set_ints(
            PARAM_OVERLAY_EVENT_COUNT,
            vec![i32::try_from(merged.len()).unwrap_or(i32::MAX)],
        );
        parameters.set_ints(
            PARAM_OVERLAY_RUN_NUMBERS,
            merged.iter().map(|key| key.run).collect(),
        );
        parameters.set_ints(
            PARAM_OVERLAY_EVENT_NUMBERS,
            merged.iter().map(|key| key.event).collect(),
        );
        parameters.set_ints(
            PARAM_OVERLAY_TOTAL,
            vec![i32::try_from(self.report.background_events).unwrap_or(i32::MAX)],
        );
    }

    pub(crate) fn log_start(&self) {
        info!(
            mode = ?self.mode,
            files = self.source.file_count(),
            train = self.scheduler.train().size(),
            spacing_ns = self.scheduler.train().spacing_ns(),
            expected_per_crossing = self.count.expected(),
            "overlay initialized"
        );
    }
}
