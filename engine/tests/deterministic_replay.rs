use bx_overlay_core::{
    CalorimeterHit, Collection, Event, McContribution, McParticle, ParticleId, TrackerHit,
    PARAM_OVERLAY_EVENT_NUMBERS, PARAM_OVERLAY_RUN_NUMBERS,
};
use bx_overlay_engine::{OverlayConfig, OverlayEngine, OverlayReport};
use bx_overlay_source::{memory::MemoryStore, SupplyMode};
use bx_overlay_system_scheduling::OverlayCount;

fn background(run: i32, number: i32) -> Event {
    let mut event = Event::new(run, number);
    let step = f64::from(number);
    event
        .add_collection(
            "MCParticle",
            Collection::from(vec![
                McParticle::default();
                usize::try_from(number % 3 + 1).unwrap_or(1)
            ]),
        )
        .expect("add");
    event
        .add_collection(
            "TPCCollection",
            Collection::from(
                (0..4)
                    .map(|index| TrackerHit {
                        position: [0.0, 0.0, f64::from(index - 2) * 250.0],
                        time: step * 0.3 - 1.0,
                        particle: Some(ParticleId::new(0)),
                        ..TrackerHit::default()
                    })
                    .collect::<Vec<_>>(),
            ),
        )
        .expect("add");
    let cells = (0..6u32)
        .map(|cell| {
            let mut hit = CalorimeterHit::new(cell % 3, 11, [f64::from(cell % 3), 0.0, 1500.0]);
            hit.contributions = (0..3)
                .map(|k| {
                    McContribution::new(Some(ParticleId::new(0)), 0.01, step + f64::from(k) * 4.0)
                })
                .collect();
            hit
        })
        .collect::<Vec<_>>();
    event
        .add_collection("ECalBarrelCollection", Collection::from(cells))
        .expect("add");
    event
}

fn physics(number: i32) -> Event {
    let mut event = Event::new(7, number);
    event
        .add_collection("MCParticle", Collection::from(vec![McParticle::default(); 4]))
        .expect("add");
    event
        .add_collection(
            "ECalBarrelCollection",
            Collection::from(vec![CalorimeterHit::new(1, 11, [1.0, 0.0, 1500.0])]),
        )
        .expect("add");
    event
}

fn config() -> OverlayConfig {
    OverlayConfig {
        background_files: vec!["a.slcio".to_owned(), "b.slcio".to_owned()],
        supply: SupplyMode::RandomAccess,
        overlay_count: OverlayCount::Poisson { mean: 1.5 },
        bunch_train_size: 8,
        random_bunch_crossing: true,
        bunch_spacing_ns: 2.0,
        allow_reusing_background_files: true,
        random_seed: 1234,
        ..OverlayConfig::default()
    }
}

fn replay(config: &OverlayConfig) -> (Vec<Event>, OverlayReport) {
    let store = MemoryStore::new()
        .with_file("a.slcio", (0..3).map(|number| background(1, number)).collect())
        .with_file("b.slcio", (0..9).map(|number| background(2, number)).collect());
    let mut engine = OverlayEngine::new(store);
    engine.initialize(config).expect("initialize");
    engine.on_run_start().expect("run start");
    let events = (0..6)
        .map(|number| engine.overlay(physics(number)).expect("overlay"))
        .collect();
    let report = engine.finalize().expect("finalize");
    (events, report)
}

#[test]
fn identical_configuration_replays_identically() {
    let (first, first_report) = replay(&config());
    let (second, second_report) = replay(&config());

    assert_eq!(first, second);
    assert_eq!(first_report, second_report);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(
            bincode::serialize(a).expect("encode"),
            bincode::serialize(b).expect("encode")
        );
    }
}

#[test]
fn merged_events_carry_their_identifiers() {
    let (events, report) = replay(&config());
    let mut merged = 0;
    for event in &events {
        let runs = event
            .parameters()
            .ints(PARAM_OVERLAY_RUN_NUMBERS)
            .expect("run numbers");
        let numbers = event
            .parameters()
            .ints(PARAM_OVERLAY_EVENT_NUMBERS)
            .expect("event numbers");
        assert_eq!(runs.len(), numbers.len());
        for (&run, &number) in runs.iter().zip(numbers) {
            match run {
                1 => assert!((0..3).contains(&number)),
                2 => assert!((0..9).contains(&number)),
                other => panic!("unexpected background run {other}"),
            }
        }
        merged += runs.len();

        let cells = event
            .collection("ECalBarrelCollection")
            .and_then(Collection::calorimeter_hits)
            .expect("calorimeter hits");
        let mut keys: Vec<_> = cells.iter().map(|hit| hit.cell_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), cells.len());
    }
    assert_eq!(report.background_events, u64::try_from(merged).expect("fits"));
}

#[test]
fn external_seed_overrides_counters() {
    let store = || {
        MemoryStore::new()
            .with_file("a.slcio", (0..3).map(|number| background(1, number)).collect())
            .with_file("b.slcio", (0..9).map(|number| background(2, number)).collect())
    };
    let mut first = OverlayEngine::new(store());
    first.initialize(&config()).expect("initialize");
    let mut second = OverlayEngine::new(store());
    second.initialize(&config()).expect("initialize");

    let _ = second.overlay(physics(0)).expect("warm up");
    let a = first.overlay_with_seed(physics(1), 99).expect("overlay");
    let b = second.overlay_with_seed(physics(1), 99).expect("overlay");
    assert_eq!(a, b);
}
