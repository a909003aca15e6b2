use bx_overlay_core::ParticleId;

/// Translation of particle handles from a background event's particle table
/// into the destination event's table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParticleRemap {
    /// Handles already address the destination table.
    Keep,
    /// The background table of `count` particles was appended at `base`.
    Shift {
        /// Destination index of the first moved particle.
        base: u32,
        /// Number of particles moved.
        count: u32,
    },
    /// The background particles were not moved; provenance is dropped.
    #[default]
    Drop,
}

impl ParticleRemap {
    /// Translates a single handle.
    #[must_use]
    pub fn apply(self, particle: Option<ParticleId>) -> Option<ParticleId> {
        match self {
            Self::Keep => particle,
            Self::Shift { base, count } => particle
                .filter(|id| id.get() < count)
                .and_then(|id| id.get().checked_add(base))
                .map(ParticleId::new),
            Self::Drop => None,
        }
    }

    /// Translates a list of handles, removing the ones that cannot be kept.
    pub fn apply_all(self, particles: &mut Vec<ParticleId>) {
        match self {
            Self::Keep => {}
            Self::Drop => particles.clear(),
            Self::Shift { .. } => {
                *particles = particles
                    .iter()
                    .filter_map(|id| self.apply(Some(*id)))
                    .collect();
            }
        }
    }
}
