//! Untimed merging of whole events, shared by the simple overlay mode and the
//! event accumulator.

use bx_overlay_core::{CollectionKind, Event};
use bx_overlay_system_merge::{
    CollectionFactory, HitMerger, MergeOutcome, ParticleRemap, Timing,
};
use tracing::{debug, warn};

/// Collections merged from a source event.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Pairs<'a> {
    /// Every collection whose name exists in both events.
    SameNamed,
    /// Explicit `(source, destination)` pairs; missing destinations are created.
    Explicit(&'a [(String, String)]),
}

/// Moves the collections selected by `pairs` out of `source` and into
/// `destination` without time gating.
///
/// Particle collections go first so that the handles carried by hits can be
/// translated into the destination particle table. Returns the outcome of
/// every merge keyed by destination name.
pub(crate) fn merge_event(
    merger: &mut HitMerger,
    factory: &CollectionFactory,
    source: &mut Event,
    destination: &mut Event,
    pairs: Pairs<'_>,
) -> Vec<(String, MergeOutcome)> {
    let resolved: Vec<(String, String)> = match pairs {
        Pairs::SameNamed => source
            .collection_names()
            .filter(|name| destination.contains(name))
            .map(|name| (name.to_owned(), name.to_owned()))
            .collect(),
        Pairs::Explicit(pairs) => pairs
            .iter()
            .filter(|(from, _)| {
                let present = source.contains(from);
                if !present {
                    warn!(
                        collection = %from,
                        run = source.run_number(),
                        event = source.event_number(),
                        "source collection missing from background event, skipping"
                    );
                }
                present
            })
            .cloned()
            .collect(),
    };

    let (particles, others): (Vec<_>, Vec<_>) = resolved.into_iter().partition(|(from, _)| {
        source
            .collection(from)
            .is_some_and(|collection| collection.kind() == CollectionKind::McParticle)
    });

    let mut outcomes = Vec::with_capacity(particles.len() + others.len());
    let mut remap = ParticleRemap::Drop;
    for (from, into) in particles {
        let outcome = move_collection(
            merger,
            factory,
            source,
            destination,
            &from,
            &into,
            ParticleRemap::Keep,
        );
        if let Some(MergeOutcome::Particles { remap: moved, .. }) = outcome {
            if remap == ParticleRemap::Drop {
                remap = moved;
            }
        }
        outcomes.extend(outcome.map(|outcome| (into, outcome)));
    }
    for (from, into) in others {
        let outcome = move_collection(merger, factory, source, destination, &from, &into, remap);
        outcomes.extend(outcome.map(|outcome| (into, outcome)));
    }
    outcomes
}

fn move_collection(
    merger: &mut HitMerger,
    factory: &CollectionFactory,
    source: &mut Event,
    destination: &mut Event,
    from: &str,
    into: &str,
    remap: ParticleRemap,
) -> Option<MergeOutcome> {
    let mut collection = source.take_collection(from)?;
    let target = factory.ensure(destination, into, &collection);
    let outcome = merger.merge(into, &mut collection, target, &Timing::untimed(remap));
    if !collection.is_empty() {
        debug!(
            collection = from,
            left = collection.len(),
            "source elements left behind by untimed merge"
        );
    }
    Some(outcome)
}
