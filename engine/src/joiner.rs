use bx_overlay_core::Event;
use bx_overlay_source::EventFile;
use tracing::{debug, warn};

use crate::OverlayError;

/// Suffix appended to joined collection names unless overridden.
pub const DEFAULT_JOIN_SUFFIX: &str = "_1";

/// Moves the collections of the partner event with the same run and event
/// numbers from a direct-access file into the current event.
#[derive(Debug)]
pub struct EventJoiner<F: EventFile> {
    file: F,
    suffix: String,
}

impl<F: EventFile> EventJoiner<F> {
    /// Creates a joiner reading partners from `file` and suffixing every
    /// joined collection with [`DEFAULT_JOIN_SUFFIX`].
    #[must_use]
    pub fn new(file: F) -> Self {
        Self {
            file,
            suffix: DEFAULT_JOIN_SUFFIX.to_owned(),
        }
    }

    /// Overrides the suffix; an empty suffix keeps the partner's names.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Suffix appended to joined collection names.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Joins the partner of `event` into it.
    ///
    /// Returns `false` when the file holds no partner. Names already present
    /// in `event` are left untouched.
    pub fn join(&mut self, event: &mut Event) -> Result<bool, OverlayError> {
        let Some(mut partner) = self.file.read_by_key(event.key())? else {
            warn!(
                run = event.run_number(),
                event = event.event_number(),
                "no partner event to join"
            );
            return Ok(false);
        };

        let names: Vec<String> = partner.collection_names().map(str::to_owned).collect();
        for name in names {
            let target = format!("{name}{}", self.suffix);
            if event.contains(&target) {
                warn!(
                    collection = %target,
                    run = event.run_number(),
                    event = event.event_number(),
                    "collection already present, not joining"
                );
                continue;
            }
            if let Some(mut collection) = partner.take_collection(&name) {
                collection.set_transient(false);
                event.add_collection(target, collection)?;
            }
        }
        debug!(
            run = event.run_number(),
            event = event.event_number(),
            collections = event.collection_count(),
            "joined partner event"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use bx_overlay_core::{Collection, McParticle, TrackerHit};
    use bx_overlay_source::{memory::MemoryStore, EventStore};

    use super::*;

    fn partner(run: i32, event: i32) -> Event {
        let mut partner = Event::new(run, event);
        let mut hits = Collection::from(vec![TrackerHit::default(); 2]);
        hits.set_transient(true);
        partner.add_collection("VXDCollection", hits).expect("add");
        partner
            .add_collection("MCParticle", Collection::from(vec![McParticle::default()]))
            .expect("add");
        partner
    }

    #[test]
    fn partner_collections_are_moved_under_suffixed_names() {
        let store =
            MemoryStore::new().with_file("partner.slcio", vec![partner(1, 4), partner(1, 5)]);
        let mut joiner = EventJoiner::new(store.open("partner.slcio").expect("open"));

        let mut event = Event::new(1, 5);
        event
            .add_collection("MCParticle_1", Collection::from(Vec::<McParticle>::new()))
            .expect("add");
        assert!(joiner.join(&mut event).expect("join"));

        let joined = event.collection("VXDCollection_1").expect("joined");
        assert_eq!(joined.len(), 2);
        assert!(!joined.is_transient());
        assert_eq!(event.collection("MCParticle_1").map(Collection::len), Some(0));
    }

    #[test]
    fn missing_partner_is_not_an_error() {
        let store = MemoryStore::new().with_file("partner.slcio", vec![partner(1, 4)]);
        let mut joiner =
            EventJoiner::new(store.open("partner.slcio").expect("open")).with_suffix("");
        let mut event = Event::new(2, 4);
        assert!(!joiner.join(&mut event).expect("join"));
        assert_eq!(event.collection_count(), 0);
    }

    #[test]
    fn empty_suffix_keeps_names() {
        let store = MemoryStore::new().with_file("partner.slcio", vec![partner(3, 1)]);
        let mut joiner =
            EventJoiner::new(store.open("partner.slcio").expect("open")).with_suffix("");
        let mut event = Event::new(3, 1);
        assert!(joiner.join(&mut event).expect("join"));
        assert!(event.contains("VXDCollection"));
        assert!(event.contains("MCParticle"));
    }
}
