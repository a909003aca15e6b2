use bx_overlay_core::Event;
use bx_overlay_system_merge::{CollectionFactory, HitMerger};
use tracing::debug;

use crate::untimed::{merge_event, Pairs};

/// Folds the named collections of a stream of events into one event.
///
/// The first accumulated event lends its run and event numbers to the result.
/// Calorimeter hits coalesce by cell across every accumulated event.
#[derive(Debug)]
pub struct EventAccumulator {
    pairs: Vec<(String, String)>,
    merger: HitMerger,
    factory: CollectionFactory,
    accumulated: Option<Event>,
    events: usize,
}

impl EventAccumulator {
    /// Creates an accumulator for `names`. With no names every collection of
    /// every incoming event is accumulated.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pairs: names
                .into_iter()
                .map(Into::into)
                .map(|name: String| (name.clone(), name))
                .collect(),
            merger: HitMerger::new(0.0),
            factory: CollectionFactory::default(),
            accumulated: None,
            events: 0,
        }
    }

    /// Number of events accumulated so far.
    #[must_use]
    pub const fn events(&self) -> usize {
        self.events
    }

    /// Merges the configured collections of `event` into the accumulated event.
    pub fn accumulate(&mut self, mut event: Event) {
        let accumulated = self.accumulated.get_or_insert_with(|| {
            self.merger.begin_event();
            Event::new(event.run_number(), event.event_number())
        });
        let every: Vec<(String, String)>;
        let pairs = if self.pairs.is_empty() {
            every = event
                .collection_names()
                .map(|name| (name.to_owned(), name.to_owned()))
                .collect();
            &every
        } else {
            &self.pairs
        };
        let outcomes = merge_event(
            &mut self.merger,
            &self.factory,
            &mut event,
            accumulated,
            Pairs::Explicit(pairs),
        );
        self.events += 1;
        debug!(
            run = event.run_number(),
            event = event.event_number(),
            collections = outcomes.len(),
            accumulated = self.events,
            "accumulated event"
        );
    }

    /// Hands out the accumulated event, if any event was accumulated, and
    /// starts over.
    pub fn finish(&mut self) -> Option<Event> {
        self.events = 0;
        self.accumulated.take()
    }
}
