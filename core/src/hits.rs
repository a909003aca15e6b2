use serde::{Deserialize, Serialize};

use crate::{CellKey, ParticleId};

/// Monte-Carlo truth particle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct McParticle {
    /// PDG particle code.
    pub pdg: i32,
    /// Generator status code.
    pub generator_status: i32,
    /// Electric charge in units of e.
    pub charge: f32,
    /// Rest mass in GeV.
    pub mass: f64,
    /// Production time in ns.
    pub time: f64,
    /// Production vertex in mm.
    pub vertex: [f64; 3],
    /// Momentum at the vertex in GeV.
    pub momentum: [f64; 3],
    /// Parents within the owning event's particle table.
    pub parents: Vec<ParticleId>,
    /// Daughters within the owning event's particle table.
    pub daughters: Vec<ParticleId>,
    /// Set once the particle was merged in from a background event.
    pub overlay: bool,
}

/// Simulated tracker hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerHit {
    /// First cell identifier.
    pub cell_id0: u32,
    /// Second cell identifier.
    pub cell_id1: u32,
    /// Hit position in mm.
    pub position: [f64; 3],
    /// Hit time in ns.
    pub time: f64,
    /// Deposited energy in GeV.
    pub energy_deposit: f64,
    /// Path length within the sensitive volume in mm.
    pub path_length: f64,
    /// Particle momentum at the hit in GeV.
    pub momentum: [f64; 3],
    /// Particle that produced the hit, if provenance is kept.
    pub particle: Option<ParticleId>,
}

/// Single Monte-Carlo contribution to a calorimeter cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct McContribution {
    /// Particle that deposited the energy, if provenance is kept.
    pub particle: Option<ParticleId>,
    /// Deposited energy in GeV.
    pub energy: f64,
    /// Deposition time in ns.
    pub time: f64,
    /// Step length in mm.
    pub length: f64,
    /// PDG code of the secondary that deposited the energy.
    pub pdg: Option<i32>,
    /// Step position in mm.
    pub step_position: Option<[f64; 3]>,
}

impl McContribution {
    /// Creates a contribution carrying only particle, energy and time.
    #[must_use]
    pub fn new(particle: Option<ParticleId>, energy: f64, time: f64) -> Self {
        Self {
            particle,
            energy,
            time,
            ..Self::default()
        }
    }
}

/// Simulated calorimeter hit addressed by its sensor cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterHit {
    /// First cell identifier.
    pub cell_id0: u32,
    /// Second cell identifier.
    pub cell_id1: u32,
    /// Cell position in mm.
    pub position: [f64; 3],
    /// Contributions accumulated on the cell, in arrival order.
    pub contributions: Vec<McContribution>,
}

impl CalorimeterHit {
    /// Creates a hit on the given cell without contributions.
    #[must_use]
    pub fn new(cell_id0: u32, cell_id1: u32, position: [f64; 3]) -> Self {
        Self {
            cell_id0,
            cell_id1,
            position,
            contributions: Vec::new(),
        }
    }

    /// Key identifying the cell the hit belongs to.
    #[must_use]
    pub const fn cell_key(&self) -> CellKey {
        CellKey::combine(self.cell_id0, self.cell_id1)
    }

    /// Total energy summed over all contributions.
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.contributions.iter().map(|c| c.energy).sum()
    }

    /// Creates an empty hit on the same cell and position.
    #[must_use]
    pub fn same_cell(&self) -> Self {
        Self::new(self.cell_id0, self.cell_id1, self.position)
    }
}

/// One fired pixel inside a packed ladder record.
///
/// The pixel coordinates share one 32-bit word: `xi` in the high half, `zeta`
/// in the low half.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackedPixel {
    /// Packed `(xi << 16) | zeta` coordinate word.
    pub word: u32,
    /// Collected charge.
    pub charge: f64,
}

impl PackedPixel {
    /// Packs pixel coordinates and charge.
    #[must_use]
    pub const fn new(xi: u16, zeta: u16, charge: f64) -> Self {
        Self {
            word: ((xi as u32) << 16) | zeta as u32,
            charge,
        }
    }

    /// Pixel index across the ladder.
    #[must_use]
    pub const fn xi(&self) -> u16 {
        (self.word >> 16) as u16
    }

    /// Pixel index along the ladder.
    #[must_use]
    pub const fn zeta(&self) -> u16 {
        self.word as u16
    }
}

/// Bit-packed pixel record holding every fired pixel of one ladder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PackedHit {
    /// Detector layer.
    pub layer: u16,
    /// Ladder within the layer.
    pub ladder: u16,
    /// Fired pixels.
    pub pixels: Vec<PackedPixel>,
}

/// Opaque record for collection types without a dedicated merge rule.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    /// Integer payload.
    pub ints: Vec<i32>,
    /// Floating point payload.
    pub floats: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_pixel_splits_word() {
        let pixel = PackedPixel::new(513, 7, 1.5);
        assert_eq!(pixel.word, (513 << 16) | 7);
        assert_eq!(pixel.xi(), 513);
        assert_eq!(pixel.zeta(), 7);
    }

    #[test]
    fn calorimeter_energy_sums_contributions() {
        let mut hit = CalorimeterHit::new(3, 7, [0.0, 0.0, 0.0]);
        hit.contributions
            .push(McContribution::new(Some(ParticleId::new(1)), 1.0, 2.0));
        hit.contributions.push(McContribution::new(None, 2.0, 3.0));
        assert!((hit.energy() - 3.0).abs() < 1e-12);
        assert_eq!(hit.cell_key(), CellKey::combine(3, 7));
    }
}
