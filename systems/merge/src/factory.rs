use std::collections::BTreeSet;

use bx_overlay_core::{Collection, CollectionKind, Event};
use tracing::debug;

/// Lazily creates destination collections mirroring a source collection.
#[derive(Clone, Debug, Default)]
pub struct CollectionFactory {
    momentum_flag_names: BTreeSet<String>,
}

impl CollectionFactory {
    /// Creates a factory that sets the has-momentum bit on tracker collections
    /// created under any of `momentum_flag_names`.
    #[must_use]
    pub fn new<I, S>(momentum_flag_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            momentum_flag_names: momentum_flag_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the collection called `name` in `event`, creating it first as an
    /// empty collection of the same type as `like` with its parameters copied.
    pub fn ensure<'e>(
        &self,
        event: &'e mut Event,
        name: &str,
        like: &Collection,
    ) -> &'e mut Collection {
        event.collection_or_insert_with(name, || self.create(name, like))
    }

    /// Builds an empty collection of the same type as `like`.
    #[must_use]
    pub fn create(&self, name: &str, like: &Collection) -> Collection {
        let mut collection = Collection::new(like.data().empty_like());
        *collection.parameters_mut() = like.parameters().clone();
        if like.kind() == CollectionKind::TrackerHit && self.momentum_flag_names.contains(name) {
            collection.set_has_momentum(true);
        }
        debug!(
            collection = name,
            type_name = like.type_name(),
            "created destination collection"
        );
        collection
    }
}
