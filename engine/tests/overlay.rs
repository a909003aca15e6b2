use bx_overlay_core::{
    CalorimeterHit, Collection, Event, McContribution, McParticle, PackedHit, PackedPixel,
    ParticleId, TrackerHit, PARAM_OVERLAY_EVENT_COUNT, PARAM_OVERLAY_EVENT_NUMBERS,
    PARAM_OVERLAY_RUN_NUMBERS, PARAM_OVERLAY_TOTAL,
};
use bx_overlay_engine::{OverlayConfig, OverlayEngine, OverlayError, OverlayMode};
use bx_overlay_source::{memory::MemoryStore, SourceError, SupplyMode};
use bx_overlay_system_scheduling::OverlayCount;
use bx_overlay_system_time_window::UnknownCollection;

fn particles(count: usize) -> Collection {
    Collection::from(vec![McParticle::default(); count])
}

fn tracker_hit(time: f64, z: f64, particle: u32) -> TrackerHit {
    TrackerHit {
        position: [0.0, 0.0, z],
        time,
        particle: Some(ParticleId::new(particle)),
        ..TrackerHit::default()
    }
}

fn calo_hit(id0: u32, id1: u32, times: &[f64]) -> CalorimeterHit {
    let mut hit = CalorimeterHit::new(id0, id1, [0.0, 0.0, 0.0]);
    hit.contributions = times
        .iter()
        .map(|&time| McContribution::new(Some(ParticleId::new(0)), 0.001, time))
        .collect();
    hit
}

fn background(run: i32, number: i32, particle_count: usize) -> Event {
    let mut event = Event::new(run, number);
    event
        .add_collection("MCParticle", particles(particle_count))
        .expect("add particles");
    let base = f64::from(number);
    event
        .add_collection(
            "VXDCollection",
            Collection::from(vec![
                tracker_hit(base, 10.0, 0),
                tracker_hit(base + 12.0, -10.0, 0),
            ]),
        )
        .expect("add tracker hits");
    event
        .add_collection(
            "TPCCollection",
            Collection::from(vec![tracker_hit(base - 1.0, -500.0, 0), tracker_hit(1.0, 500.0, 0)]),
        )
        .expect("add tpc hits");
    event
        .add_collection(
            "ECalBarrelCollection",
            Collection::from(vec![
                calo_hit(3, 7, &[base, base + 20.0]),
                calo_hit(u32::try_from(number).unwrap_or(0), 1, &[2.0]),
            ]),
        )
        .expect("add calorimeter hits");
    event
}

fn physics() -> Event {
    let mut event = Event::new(100, 1);
    event.add_collection("MCParticle", particles(2)).expect("add");
    event
        .add_collection(
            "VXDCollection",
            Collection::from(vec![tracker_hit(1.0, 5.0, 1), tracker_hit(20.0, 5.0, 0)]),
        )
        .expect("add");
    event
        .add_collection(
            "ECalBarrelCollection",
            Collection::from(vec![calo_hit(3, 7, &[-5.0, 2.0, 20.0])]),
        )
        .expect("add");
    event
}

fn store(files: &[(&str, i32, i32)]) -> MemoryStore {
    files
        .iter()
        .fold(MemoryStore::new(), |store, &(path, run, events)| {
            store.with_file(
                path,
                (0..events)
                    .map(|number| background(run, number, usize::try_from(number + 1).unwrap_or(1)))
                    .collect(),
            )
        })
}

fn int_list(event: &Event, key: &str) -> Vec<i32> {
    event
        .parameters()
        .ints(key)
        .map(<[i32]>::to_vec)
        .unwrap_or_default()
}

#[test]
fn simple_poisson_overlay_counts_merged_events() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 5)]));
    engine
        .initialize(&OverlayConfig {
            mode: OverlayMode::Simple,
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Poisson { mean: 2.0 },
            allow_reusing_background_files: true,
            ..OverlayConfig::default()
        })
        .expect("initialize");
    engine.on_run_start().expect("run start");

    let mut total = 0;
    for _ in 0..20 {
        let event = engine.overlay(physics()).expect("overlay");
        let merged = int_list(&event, PARAM_OVERLAY_EVENT_NUMBERS);
        let count = event.parameters().int(PARAM_OVERLAY_EVENT_COUNT).expect("count");
        assert_eq!(usize::try_from(count).expect("non-negative"), merged.len());
        assert_eq!(int_list(&event, PARAM_OVERLAY_RUN_NUMBERS), vec![1; merged.len()]);

        // background event n holds n + 1 particles
        let expected: usize = 2 + merged
            .iter()
            .map(|&number| usize::try_from(number + 1).expect("non-negative"))
            .sum::<usize>();
        assert_eq!(
            event.collection("MCParticle").map(Collection::len),
            Some(expected)
        );

        total += count;
        assert_eq!(event.parameters().int(PARAM_OVERLAY_TOTAL), Some(total));
    }

    let report = engine.finalize().expect("finalize");
    assert_eq!(report.events_processed, 20);
    assert_eq!(report.background_events, u64::try_from(total).expect("non-negative"));
}

#[test]
fn exhausted_background_stops_processing() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 3)]));
    engine
        .initialize(&OverlayConfig {
            mode: OverlayMode::Simple,
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 10 },
            allow_reusing_background_files: false,
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let error = engine.overlay(physics()).expect_err("exhaustion");
    assert!(error.is_stop_processing());
    assert!(matches!(
        error,
        OverlayError::StopProcessing(SourceError::Exhausted { files: 1 })
    ));
}

#[test]
fn timing_overlay_applies_windows_and_remaps_particles() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 1)]));
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 1 },
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let event = engine.overlay(physics()).expect("overlay");
    assert_eq!(event.parameters().int(PARAM_OVERLAY_EVENT_COUNT), Some(1));

    let mc = event
        .collection("MCParticle")
        .and_then(Collection::mc_particles)
        .expect("particles");
    assert_eq!(mc.len(), 3);
    assert!(!mc[0].overlay);
    assert!(mc[2].overlay);

    // physics hit at 20 ns is cropped, background hit at 12 ns is rejected
    let vxd = event
        .collection("VXDCollection")
        .and_then(Collection::tracker_hits)
        .expect("tracker hits");
    let times: Vec<f64> = vxd.iter().map(|hit| hit.time).collect();
    assert_eq!(times, vec![1.0, 0.0]);
    assert_eq!(vxd[0].particle, Some(ParticleId::new(1)));
    assert_eq!(vxd[1].particle, Some(ParticleId::new(2)));

    let ecal = event
        .collection("ECalBarrelCollection")
        .and_then(Collection::calorimeter_hits)
        .expect("calorimeter hits");
    assert_eq!(ecal.len(), 2);
    let cell = ecal
        .iter()
        .find(|hit| (hit.cell_id0, hit.cell_id1) == (3, 7))
        .expect("coalesced cell");
    let contribution_times: Vec<f64> = cell
        .contributions
        .iter()
        .map(|contribution| contribution.time)
        .collect();
    assert_eq!(contribution_times, vec![2.0, 0.0]);

    let tpc = event
        .collection("TPCCollection")
        .expect("created from background");
    assert!(tpc.flags().has_momentum);
}

#[test]
fn collection_map_redirects_background() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 2, 2)]));
    engine
        .initialize(&OverlayConfig {
            mode: OverlayMode::Simple,
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 2 },
            collection_map: vec![
                "MCParticle".to_owned(),
                "MCParticle".to_owned(),
                "VXDCollection".to_owned(),
                "VXDCollection_BG".to_owned(),
                "SITCollection".to_owned(),
                "SITCollection".to_owned(),
            ],
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let event = engine.overlay(physics()).expect("overlay");
    assert_eq!(int_list(&event, PARAM_OVERLAY_EVENT_NUMBERS), vec![0, 1]);
    assert_eq!(event.collection("VXDCollection").map(Collection::len), Some(2));
    assert_eq!(event.collection("VXDCollection_BG").map(Collection::len), Some(4));
    assert_eq!(event.collection("ECalBarrelCollection").map(Collection::len), Some(1));
    assert!(!event.contains("SITCollection"));
    assert!(!event.contains("TPCCollection"));

    let redirected = event
        .collection("VXDCollection_BG")
        .and_then(Collection::tracker_hits)
        .expect("tracker hits");
    let particles: Vec<_> = redirected.iter().map(|hit| hit.particle).collect();
    assert_eq!(
        particles,
        vec![
            Some(ParticleId::new(2)),
            Some(ParticleId::new(2)),
            Some(ParticleId::new(3)),
            Some(ParticleId::new(3))
        ]
    );
}

#[test]
fn strict_windows_reject_unlisted_collections() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 2)]));
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["bg.slcio".to_owned()],
            unknown_collections: UnknownCollection::Reject,
            collection_integration_times: vec!["VXDCollection".to_owned(), "10".to_owned()],
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let error = engine.overlay(physics()).expect_err("missing window");
    assert!(matches!(error, OverlayError::Config(_)));
}

#[test]
fn malformed_window_pairs_fail_initialization() {
    let mut engine = OverlayEngine::new(MemoryStore::new());
    let config = OverlayConfig::from_toml_str(
        r#"
        unknown_collections = "reject"
        collection_integration_times = ["VXDCollection", "ten"]
        "#,
    )
    .expect("parse");
    assert!(matches!(
        engine.initialize(&config),
        Err(OverlayError::Config(_))
    ));
}

#[test]
fn supply_modes_only_change_event_choice() {
    for supply in [SupplyMode::Sequential, SupplyMode::Wraparound, SupplyMode::RandomAccess] {
        let mut engine = OverlayEngine::new(store(&[("a.slcio", 1, 4), ("b.slcio", 2, 6)]));
        engine
            .initialize(&OverlayConfig {
                mode: OverlayMode::Simple,
                supply,
                background_files: vec!["a.slcio".to_owned(), "b.slcio".to_owned()],
                overlay_count: OverlayCount::Fixed { count: 3 },
                allow_reusing_background_files: true,
                ..OverlayConfig::default()
            })
            .expect("initialize");
        for _ in 0..5 {
            let event = engine.overlay(physics()).expect("overlay");
            assert_eq!(event.parameters().int(PARAM_OVERLAY_EVENT_COUNT), Some(3));
        }
    }
}

#[test]
fn physics_particles_are_recorded_before_merging() {
    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 1)]));
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 1 },
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let event = engine.overlay(physics()).expect("overlay");
    let recorded = event
        .collection("MCPhysicsParticles")
        .and_then(Collection::mc_particles)
        .expect("physics particles");
    assert_eq!(recorded.to_vec(), vec![McParticle::default(); 2]);
    assert!(recorded.iter().all(|particle| !particle.overlay));
    assert_eq!(event.collection("MCParticle").map(Collection::len), Some(3));

    let mut engine = OverlayEngine::new(store(&[("bg.slcio", 1, 1)]));
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["bg.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 1 },
            mc_physics_particle_collection: None,
            ..OverlayConfig::default()
        })
        .expect("initialize");
    let event = engine.overlay(physics()).expect("overlay");
    assert!(!event.contains("MCPhysicsParticles"));
}

fn train_background(number: i32) -> Event {
    let mut event = Event::new(3, number);
    event.add_collection("MCParticle", particles(1)).expect("add");
    event
        .add_collection(
            "VXDCollection",
            Collection::from(vec![
                tracker_hit(0.5, 0.0, 0),
                tracker_hit(3.0, 0.0, 0),
                tracker_hit(-9.0, 0.0, 0),
            ]),
        )
        .expect("add");
    event
}

fn train_physics() -> Event {
    let mut event = Event::new(100, 2);
    event.add_collection("MCParticle", particles(2)).expect("add");
    event
        .add_collection(
            "VXDCollection",
            Collection::from(vec![tracker_hit(1.0, 0.0, 1)]),
        )
        .expect("add");
    event
}

fn overlay_train(spacing: f64, skip_dead_crossings: bool) -> (i32, Vec<f64>) {
    let store = MemoryStore::new()
        .with_file("train.slcio", (0..10).map(train_background).collect());
    let mut engine = OverlayEngine::new(store);
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["train.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 1 },
            bunch_train_size: 8,
            physics_bunch_crossing: 1,
            bunch_spacing_ns: spacing,
            unknown_collections: UnknownCollection::Reject,
            collection_integration_times: vec!["VXDCollection".to_owned(), "10".to_owned()],
            allow_reusing_background_files: true,
            skip_dead_crossings,
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let event = engine.overlay(train_physics()).expect("overlay");
    let count = event.parameters().int(PARAM_OVERLAY_EVENT_COUNT).expect("count");
    let mut times: Vec<f64> = event
        .collection("VXDCollection")
        .and_then(Collection::tracker_hits)
        .expect("tracker hits")
        .iter()
        .map(|hit| hit.time)
        .collect();
    times.sort_by(f64::total_cmp);
    (count, times)
}

#[test]
fn dead_crossings_are_skipped_only_on_request() {
    // crossings at 0, 4 and 8 ns can reach the 10 ns window
    let (count, times) = overlay_train(4.0, true);
    assert_eq!(count, 3);
    assert_eq!(times, vec![0.5, 1.0, 3.0, 4.5, 7.0, 8.5]);

    // late crossings still contribute hits with negative local times
    let (count, times) = overlay_train(4.0, false);
    assert_eq!(count, 8);
    assert_eq!(times, vec![0.5, 1.0, 3.0, 3.0, 4.5, 7.0, 7.0, 8.5]);
}

#[test]
fn physics_crossing_is_never_skipped() {
    let (count, times) = overlay_train(20.0, true);
    assert_eq!(count, 1);
    assert_eq!(times, vec![0.5, 1.0, 3.0]);
}

fn pixel_record(ladder: u16, pixels: &[(u16, u16, f64)]) -> PackedHit {
    PackedHit {
        layer: 1,
        ladder,
        pixels: pixels
            .iter()
            .map(|&(xi, zeta, charge)| PackedPixel::new(xi, zeta, charge))
            .collect(),
    }
}

#[test]
fn timing_overlay_accumulates_pixel_charge() {
    let mut background = Event::new(4, 0);
    background.add_collection("MCParticle", particles(1)).expect("add");
    background
        .add_collection(
            "VXDPixels",
            Collection::from(vec![pixel_record(2, &[(10, 20, 0.5), (11, 20, 4.0)])]),
        )
        .expect("add");
    let store = MemoryStore::new().with_file("pixels.slcio", vec![background]);

    let mut engine = OverlayEngine::new(store);
    engine
        .initialize(&OverlayConfig {
            background_files: vec!["pixels.slcio".to_owned()],
            overlay_count: OverlayCount::Fixed { count: 1 },
            ..OverlayConfig::default()
        })
        .expect("initialize");

    let mut event = physics();
    event
        .add_collection(
            "VXDPixels",
            Collection::from(vec![
                pixel_record(2, &[(10, 20, 1.0)]),
                pixel_record(0, &[(3, 3, 2.0)]),
            ]),
        )
        .expect("add");
    let event = engine.overlay(event).expect("overlay");

    assert_eq!(event.parameters().int(PARAM_OVERLAY_EVENT_COUNT), Some(1));
    assert_eq!(
        event.collection("VXDPixels").and_then(Collection::packed_hits),
        Some(
            &[
                pixel_record(0, &[(3, 3, 2.0)]),
                pixel_record(2, &[(10, 20, 1.5), (11, 20, 4.0)]),
            ][..]
        )
    );
}
