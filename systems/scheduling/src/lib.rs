#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic bunch-train scheduling for the overlay engine.
//!
//! Every physics event receives its own random stream, derived from a global
//! seed, a processor name and the run and event counters. The stream places the
//! physics event inside the bunch train, permutes the crossing order and draws
//! how many background events each crossing receives.

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors raised while validating scheduling parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ScheduleError {
    /// Bunch train has no slots.
    #[error("bunch train must contain at least one crossing")]
    EmptyTrain,
    /// Physics slot lies outside `1..=size`.
    #[error("physics bunch crossing {slot} lies outside the train of {size} crossings")]
    PhysicsSlotOutOfRange {
        /// Configured 1-based slot.
        slot: u32,
        /// Number of crossings in the train.
        size: u32,
    },
    /// Bunch spacing is negative or not finite.
    #[error("invalid bunch spacing {spacing} ns")]
    InvalidSpacing {
        /// Rejected spacing.
        spacing: f64,
    },
    /// Poisson mean is negative or not finite.
    #[error("invalid poisson mean {mean}")]
    InvalidMean {
        /// Rejected mean.
        mean: f64,
    },
}

/// Derives per-event seeds from a global seed and a processor name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSeeder {
    global_seed: u64,
    processor: String,
}

impl EventSeeder {
    /// Creates a seeder for the processor called `processor`.
    #[must_use]
    pub fn new(global_seed: u64, processor: impl Into<String>) -> Self {
        Self {
            global_seed,
            processor: processor.into(),
        }
    }

    /// Seed of the event numbered `event_counter` within run `run_counter`.
    #[must_use]
    pub fn seed_for(&self, run_counter: u64, event_counter: u64) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.global_seed.to_le_bytes());
        hasher.update(self.processor.as_bytes());
        hasher.update(run_counter.to_le_bytes());
        hasher.update(event_counter.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }
}

/// Creates the random stream of one physics event.
#[must_use]
pub fn event_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Shape of the simulated bunch train.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BunchTrain {
    size: u32,
    physics_slot: u32,
    randomize_slot: bool,
    spacing_ns: f64,
}

impl BunchTrain {
    /// Creates a train of `size` crossings spaced by `spacing_ns`, holding the
    /// physics event at the 1-based `physics_slot`.
    pub fn new(
        size: u32,
        physics_slot: u32,
        randomize_slot: bool,
        spacing_ns: f64,
    ) -> Result<Self, ScheduleError> {
        if size == 0 {
            return Err(ScheduleError::EmptyTrain);
        }
        if !randomize_slot && !(1..=size).contains(&physics_slot) {
            return Err(ScheduleError::PhysicsSlotOutOfRange {
                slot: physics_slot,
                size,
            });
        }
        if !spacing_ns.is_finite() || spacing_ns < 0.0 {
            return Err(ScheduleError::InvalidSpacing {
                spacing: spacing_ns,
            });
        }
        Ok(Self {
            size,
            physics_slot,
            randomize_slot,
            spacing_ns,
        })
    }

    /// Train holding only the physics crossing.
    #[must_use]
    pub const fn single() -> Self {
        Self {
            size: 1,
            physics_slot: 1,
            randomize_slot: false,
            spacing_ns: 0.0,
        }
    }

    /// Number of crossings.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Time between consecutive crossings in ns.
    #[must_use]
    pub const fn spacing_ns(&self) -> f64 {
        self.spacing_ns
    }
}

/// Crossing order of one physics event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossingPlan {
    physics_slot: u32,
    offsets: Vec<i32>,
}

impl CrossingPlan {
    /// 1-based slot of the physics event in the train.
    #[must_use]
    pub const fn physics_slot(&self) -> u32 {
        self.physics_slot
    }

    /// Crossing offsets relative to the physics crossing, in processing order.
    #[must_use]
    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }
}

/// Places the physics event in the train and permutes the crossings.
#[derive(Clone, Debug)]
pub struct BunchTrainScheduler {
    train: BunchTrain,
}

impl BunchTrainScheduler {
    /// Creates a scheduler for `train`.
    #[must_use]
    pub const fn new(train: BunchTrain) -> Self {
        Self { train }
    }

    /// Train the scheduler works on.
    #[must_use]
    pub const fn train(&self) -> &BunchTrain {
        &self.train
    }

    /// Draws the physics slot if requested and returns a uniformly permuted
    /// sequence `-(slot - 1)..=size - slot` of crossing offsets.
    pub fn schedule<R: Rng + ?Sized>(&self, rng: &mut R) -> CrossingPlan {
        let size = self.train.size;
        let physics_slot = if self.train.randomize_slot {
            rng.gen_range(1..=size)
        } else {
            self.train.physics_slot
        };
        let first = 1_i64 - i64::from(physics_slot);
        let last = i64::from(size) - i64::from(physics_slot);
        let mut offsets: Vec<i32> = (first..=last)
            .filter_map(|offset| i32::try_from(offset).ok())
            .collect();
        offsets.shuffle(rng);
        debug!(physics_slot, crossings = offsets.len(), "scheduled bunch train");
        CrossingPlan {
            physics_slot,
            offsets,
        }
    }

    /// Time offset of the crossing at relative `offset` in ns.
    #[must_use]
    pub fn time_offset(&self, offset: i32) -> f64 {
        f64::from(offset) * self.train.spacing_ns
    }

    /// Reports whether hits of the crossing at `offset` can still reach a
    /// window closing at `max_stop`. The physics crossing is always live.
    #[must_use]
    pub fn crossing_is_live(&self, offset: i32, max_stop: f64) -> bool {
        offset == 0 || self.time_offset(offset) < max_stop
    }
}

/// Number of background events overlaid on one crossing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OverlayCount {
    /// Always `count` events.
    Fixed {
        /// Events per crossing.
        count: u32,
    },
    /// Poisson-distributed with the given mean.
    Poisson {
        /// Expected events per crossing.
        mean: f64,
    },
    /// `count` events plus a Poisson-distributed number with the given mean.
    Additive {
        /// Guaranteed events per crossing.
        count: u32,
        /// Expected additional events per crossing.
        mean: f64,
    },
}

impl Default for OverlayCount {
    fn default() -> Self {
        Self::Fixed { count: 1 }
    }
}

impl OverlayCount {
    /// Checks that the Poisson mean, if any, is finite and non-negative.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match *self {
            Self::Fixed { .. } => Ok(()),
            Self::Poisson { mean } | Self::Additive { mean, .. } => {
                if mean.is_finite() && mean >= 0.0 {
                    Ok(())
                } else {
                    Err(ScheduleError::InvalidMean { mean })
                }
            }
        }
    }

    /// Expected number of events per crossing.
    #[must_use]
    pub fn expected(&self) -> f64 {
        match *self {
            Self::Fixed { count } => f64::from(count),
            Self::Poisson { mean } => mean,
            Self::Additive { count, mean } => f64::from(count) + mean,
        }
    }

    /// Reports whether any event can ever be drawn.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.expected() > 0.0
    }

    /// Draws the number of events for one crossing.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            Self::Fixed { count } => count,
            Self::Poisson { mean } => draw_poisson(mean, rng),
            Self::Additive { count, mean } => count.saturating_add(draw_poisson(mean, rng)),
        }
    }
}

fn draw_poisson<R: Rng + ?Sized>(mean: f64, rng: &mut R) -> u32 {
    match Poisson::new(mean) {
        Ok(distribution) => {
            let value: f64 = distribution.sample(rng);
            value as u32
        }
        Err(_) => 0,
    }
}
