use std::collections::BTreeMap;

use bx_overlay_core::{PackedHit, PackedPixel};

/// Unpacked pixel charges keyed by `(layer, ladder)` and `(xi, zeta)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PixelMap {
    ladders: BTreeMap<(u16, u16), BTreeMap<(u16, u16), f64>>,
}

impl PixelMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unpacks ladder records, summing charges of repeated pixels.
    #[must_use]
    pub fn unpack(records: &[PackedHit]) -> Self {
        let mut map = Self::new();
        for record in records {
            let ladder = map.ladders.entry((record.layer, record.ladder)).or_default();
            for pixel in &record.pixels {
                *ladder.entry((pixel.xi(), pixel.zeta())).or_insert(0.0) += pixel.charge;
            }
        }
        map
    }

    /// Adds every pixel charge of `other` into this map.
    pub fn accumulate(&mut self, other: &Self) {
        for (key, pixels) in &other.ladders {
            let ladder = self.ladders.entry(*key).or_default();
            for (pixel, charge) in pixels {
                *ladder.entry(*pixel).or_insert(0.0) += charge;
            }
        }
    }

    /// Packs one record per ladder in ascending `(layer, ladder)` order.
    #[must_use]
    pub fn pack(&self) -> Vec<PackedHit> {
        self.ladders
            .iter()
            .filter(|(_, pixels)| !pixels.is_empty())
            .map(|(&(layer, ladder), pixels)| PackedHit {
                layer,
                ladder,
                pixels: pixels
                    .iter()
                    .map(|(&(xi, zeta), &charge)| PackedPixel::new(xi, zeta, charge))
                    .collect(),
            })
            .collect()
    }

    /// Total number of distinct fired pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.ladders.values().map(BTreeMap::len).sum()
    }
}

/// Accumulates `source` into `destination`, leaving `source` empty and
/// `destination` repacked. Returns the repacked record and pixel counts.
pub(crate) fn accumulate_packed(
    source: &mut Vec<PackedHit>,
    destination: &mut Vec<PackedHit>,
) -> (usize, usize) {
    let mut merged = PixelMap::unpack(destination);
    merged.accumulate(&PixelMap::unpack(source));
    source.clear();
    *destination = merged.pack();
    (destination.len(), merged.pixel_count())
}
