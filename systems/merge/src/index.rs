use std::collections::{hash_map::Entry, HashMap};

use bx_overlay_core::{CalorimeterHit, CellKey};

#[derive(Debug, Default)]
struct IndexedCollection {
    cells: HashMap<CellKey, usize>,
    indexed_len: usize,
}

impl IndexedCollection {
    fn build(hits: &[CalorimeterHit]) -> Self {
        let mut cells = HashMap::with_capacity(hits.len());
        for (position, hit) in hits.iter().enumerate() {
            let _ = cells.entry(hit.cell_key()).or_insert(position);
        }
        Self {
            cells,
            indexed_len: hits.len(),
        }
    }
}

/// Per-event index from destination collection name and cell key to the
/// position of the hit holding that cell.
///
/// The index never stores references into a collection, only positions. It is
/// rebuilt from the hits whenever the tracked length no longer matches the
/// collection it describes.
#[derive(Debug, Default)]
pub struct CoalescingIndex {
    collections: HashMap<String, IndexedCollection>,
}

impl CoalescingIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every collection. Called at the start of each physics event.
    pub fn clear(&mut self) {
        self.collections.clear();
    }

    /// Number of indexed destination collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Reports whether no collection is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Indexes `hits` under `name` unless an up-to-date entry exists.
    pub fn ensure_indexed(&mut self, name: &str, hits: &[CalorimeterHit]) {
        match self.collections.get_mut(name) {
            Some(entry) if entry.indexed_len == hits.len() => {}
            Some(entry) => *entry = IndexedCollection::build(hits),
            None => {
                let _ = self
                    .collections
                    .insert(name.to_owned(), IndexedCollection::build(hits));
            }
        }
    }

    /// Replaces the entry of `name` with a fresh index over `hits`.
    pub fn rebuild(&mut self, name: &str, hits: &[CalorimeterHit]) {
        let _ = self
            .collections
            .insert(name.to_owned(), IndexedCollection::build(hits));
    }

    /// Position of the hit holding `key` in collection `name`.
    #[must_use]
    pub fn lookup(&self, name: &str, key: CellKey) -> Option<usize> {
        self.collections
            .get(name)
            .and_then(|entry| entry.cells.get(&key).copied())
    }

    /// Records that the hit at `position` holds `key`.
    ///
    /// `position` must be the index of a hit just appended to the collection.
    /// Returns `false` and leaves the index untouched when the cell is already
    /// registered.
    pub fn register(&mut self, name: &str, key: CellKey, position: usize) -> bool {
        let entry = self.collections.entry(name.to_owned()).or_default();
        entry.indexed_len = entry.indexed_len.max(position + 1);
        match entry.cells.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let _ = slot.insert(position);
                true
            }
        }
    }
}
