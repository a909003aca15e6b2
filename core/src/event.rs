use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CalorimeterHit, CollectionKind, GenericRecord, McParticle, PackedHit, Parameters, TrackerHit,
};

/// Run and event numbers identifying an event within a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    /// Run number.
    pub run: i32,
    /// Event number within the run.
    pub event: i32,
}

impl EventKey {
    /// Creates a key from run and event numbers.
    #[must_use]
    pub const fn new(run: i32, event: i32) -> Self {
        Self { run, event }
    }
}

/// Typed element storage of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CollectionData {
    /// Monte-Carlo particles.
    McParticles(Vec<McParticle>),
    /// Tracker hits.
    TrackerHits(Vec<TrackerHit>),
    /// Calorimeter hits.
    CalorimeterHits(Vec<CalorimeterHit>),
    /// Bit-packed pixel records.
    PackedHits(Vec<PackedHit>),
    /// Records of a type without a dedicated merge rule.
    Other {
        /// Declared type name of the records.
        type_name: String,
        /// Opaque records.
        records: Vec<GenericRecord>,
    },
}

impl CollectionData {
    /// Tag of the stored element kind.
    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::McParticles(_) => CollectionKind::McParticle,
            Self::TrackerHits(_) => CollectionKind::TrackerHit,
            Self::CalorimeterHits(_) => CollectionKind::CalorimeterHit,
            Self::PackedHits(_) => CollectionKind::PackedHit,
            Self::Other { .. } => CollectionKind::Other,
        }
    }

    /// Declared type name of the stored elements.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Other { type_name, .. } => type_name,
            other => other.kind().type_name(),
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::McParticles(items) => items.len(),
            Self::TrackerHits(items) => items.len(),
            Self::CalorimeterHits(items) => items.len(),
            Self::PackedHits(items) => items.len(),
            Self::Other { records, .. } => records.len(),
        }
    }

    /// Reports whether no element is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates empty storage of the same kind and type name.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        match self {
            Self::McParticles(_) => Self::McParticles(Vec::new()),
            Self::TrackerHits(_) => Self::TrackerHits(Vec::new()),
            Self::CalorimeterHits(_) => Self::CalorimeterHits(Vec::new()),
            Self::PackedHits(_) => Self::PackedHits(Vec::new()),
            Self::Other { type_name, .. } => Self::Other {
                type_name: type_name.clone(),
                records: Vec::new(),
            },
        }
    }

    /// Reports whether both storages hold the same declared type.
    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.type_name() == other.type_name()
    }
}

/// Collection-level flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFlags {
    /// Collection is not meant to be persisted.
    pub transient: bool,
    /// Tracker hits carry momentum information.
    pub has_momentum: bool,
}

/// Named-in-event, typed sequence of elements with its own parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    data: CollectionData,
    parameters: Parameters,
    flags: CollectionFlags,
}

impl Collection {
    /// Wraps element storage into a collection with empty parameters.
    #[must_use]
    pub fn new(data: CollectionData) -> Self {
        Self {
            data,
            parameters: Parameters::new(),
            flags: CollectionFlags::default(),
        }
    }

    /// Tag of the stored element kind.
    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        self.data.kind()
    }

    /// Declared type name of the stored elements.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.data.type_name()
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Reports whether no element is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only access to the element storage.
    #[must_use]
    pub fn data(&self) -> &CollectionData {
        &self.data
    }

    /// Mutable access to the element storage.
    pub fn data_mut(&mut self) -> &mut CollectionData {
        &mut self.data
    }

    /// Read-only access to the collection parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Mutable access to the collection parameters.
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Collection flag bits.
    #[must_use]
    pub const fn flags(&self) -> CollectionFlags {
        self.flags
    }

    /// Reports whether the collection is transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.flags.transient
    }

    /// Sets or clears the transient bit.
    pub fn set_transient(&mut self, transient: bool) {
        self.flags.transient = transient;
    }

    /// Sets or clears the has-momentum bit.
    pub fn set_has_momentum(&mut self, has_momentum: bool) {
        self.flags.has_momentum = has_momentum;
    }

    /// Particles stored in the collection, if it is a particle collection.
    #[must_use]
    pub fn mc_particles(&self) -> Option<&[McParticle]> {
        match &self.data {
            CollectionData::McParticles(items) => Some(items),
            _ => None,
        }
    }

    /// Tracker hits stored in the collection, if it is a tracker collection.
    #[must_use]
    pub fn tracker_hits(&self) -> Option<&[TrackerHit]> {
        match &self.data {
            CollectionData::TrackerHits(items) => Some(items),
            _ => None,
        }
    }

    /// Calorimeter hits stored in the collection, if it is a calorimeter collection.
    #[must_use]
    pub fn calorimeter_hits(&self) -> Option<&[CalorimeterHit]> {
        match &self.data {
            CollectionData::CalorimeterHits(items) => Some(items),
            _ => None,
        }
    }

    /// Packed records stored in the collection, if it is a packed collection.
    #[must_use]
    pub fn packed_hits(&self) -> Option<&[PackedHit]> {
        match &self.data {
            CollectionData::PackedHits(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Vec<McParticle>> for Collection {
    fn from(items: Vec<McParticle>) -> Self {
        Self::new(CollectionData::McParticles(items))
    }
}

impl From<Vec<TrackerHit>> for Collection {
    fn from(items: Vec<TrackerHit>) -> Self {
        Self::new(CollectionData::TrackerHits(items))
    }
}

impl From<Vec<CalorimeterHit>> for Collection {
    fn from(items: Vec<CalorimeterHit>) -> Self {
        Self::new(CollectionData::CalorimeterHits(items))
    }
}

impl From<Vec<PackedHit>> for Collection {
    fn from(items: Vec<PackedHit>) -> Self {
        Self::new(CollectionData::PackedHits(items))
    }
}

/// Errors raised by structural event mutations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// A collection with this name already exists in the event.
    #[error("collection '{name}' already exists in event {run}/{event}")]
    DuplicateCollection {
        /// Name of the rejected collection.
        name: String,
        /// Run number of the event.
        run: i32,
        /// Event number of the event.
        event: i32,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct NamedCollection {
    name: String,
    collection: Collection,
}

/// Ordered, name-keyed set of collections plus identifiers and parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    run_number: i32,
    event_number: i32,
    collections: Vec<NamedCollection>,
    parameters: Parameters,
}

impl Event {
    /// Creates an empty event.
    #[must_use]
    pub fn new(run_number: i32, event_number: i32) -> Self {
        Self {
            run_number,
            event_number,
            collections: Vec::new(),
            parameters: Parameters::new(),
        }
    }

    /// Run number of the event.
    #[must_use]
    pub const fn run_number(&self) -> i32 {
        self.run_number
    }

    /// Event number of the event.
    #[must_use]
    pub const fn event_number(&self) -> i32 {
        self.event_number
    }

    /// Run and event numbers combined.
    #[must_use]
    pub const fn key(&self) -> EventKey {
        EventKey::new(self.run_number, self.event_number)
    }

    /// Names of the collections in insertion order.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|named| named.name.as_str())
    }

    /// Number of collections in the event.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Reports whether a collection with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Looks up a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.position(name)
            .map(|index| &self.collections[index].collection)
    }

    /// Looks up a collection by name for mutation.
    pub fn collection_mut(&mut self, name: &str) -> Option<&mut Collection> {
        self.position(name)
            .map(move |index| &mut self.collections[index].collection)
    }

    /// Adds a collection under a new name.
    pub fn add_collection(
        &mut self,
        name: impl Into<String>,
        collection: Collection,
    ) -> Result<(), EventError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(EventError::DuplicateCollection {
                name,
                run: self.run_number,
                event: self.event_number,
            });
        }
        self.collections.push(NamedCollection { name, collection });
        Ok(())
    }

    /// Returns the named collection, inserting the result of `create` first if absent.
    pub fn collection_or_insert_with<F>(&mut self, name: &str, create: F) -> &mut Collection
    where
        F: FnOnce() -> Collection,
    {
        let index = match self.position(name) {
            Some(index) => index,
            None => {
                self.collections.push(NamedCollection {
                    name: name.to_owned(),
                    collection: create(),
                });
                self.collections.len() - 1
            }
        };
        &mut self.collections[index].collection
    }

    /// Removes a collection from the event and hands it to the caller.
    pub fn take_collection(&mut self, name: &str) -> Option<Collection> {
        self.position(name)
            .map(|index| self.collections.remove(index).collection)
    }

    /// Read-only access to the event parameters.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Mutable access to the event parameters.
    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.collections.iter().position(|named| named.name == name)
    }
}
