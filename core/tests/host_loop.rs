//! Host loop tests: reset delivery, run-mode control, fault isolation and
//! the publish contract, driven through the public API with a scripted
//! counter simulation.

use serde_json::{json, Value};
use simhost_core::{
    config::HostConfig,
    host::TickPhase,
    snapshot::{ArrayData, NumericArray},
    HostError, Simulation, SimulationHost, SnapshotValue,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counts its own steps from zero. Can be scripted to fail or panic on a
/// given step number.
struct Counter {
    steps:    i64,
    fail_on:  Option<i64>,
    panic_on: Option<i64>,
    logs:     Vec<SnapshotValue>,
}

impl Counter {
    fn new() -> Self {
        Self { steps: 0, fail_on: None, panic_on: None, logs: Vec::new() }
    }
}

impl Simulation for Counter {
    fn step(&mut self) -> anyhow::Result<()> {
        self.steps += 1;
        if self.fail_on == Some(self.steps) {
            anyhow::bail!("engine fault at step {}", self.steps);
        }
        if self.panic_on == Some(self.steps) {
            panic!("engine panicked at step {}", self.steps);
        }
        self.logs.push(SnapshotValue::map([
            ("step", SnapshotValue::Int(self.steps)),
            ("fuel", SnapshotValue::Float(100.0 - self.steps as f64)),
        ]));
        Ok(())
    }

    fn logs(&self) -> &[SnapshotValue] {
        &self.logs
    }
}

fn fresh_counter() -> anyhow::Result<Counter> {
    Ok(Counter::new())
}

fn config(root: &Path) -> HostConfig {
    // Caching off so rapid rewrites in tests are always observed.
    HostConfig { cache_control: false, ..HostConfig::default().with_data_dir(root) }
}

fn write_control(root: &Path, play: bool, speed: f64) {
    fs::write(root.join("control.json"), json!({ "play": play, "speed": speed }).to_string()).unwrap();
}

fn drop_reset(root: &Path) {
    fs::write(root.join("reset.json"), "{}").unwrap();
}

fn read_state(root: &Path) -> Value {
    serde_json::from_slice(&fs::read(root.join("latest.json")).unwrap()).unwrap()
}

fn counting_factory(builds: Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<Counter> {
    move || {
        builds.fetch_add(1, Ordering::SeqCst);
        Ok(Counter::new())
    }
}

#[test]
fn initial_construction_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let factory = || -> anyhow::Result<Counter> { anyhow::bail!("no engine available") };

    let err = SimulationHost::new(factory, &config(dir.path()))
        .err()
        .expect("construction must fail");
    assert!(matches!(err, HostError::EngineInit(_)), "unexpected error: {err}");
}

#[test]
fn new_creates_the_shared_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("simulation_data");

    let host = SimulationHost::new(fresh_counter, &config(&root)).unwrap();

    assert!(root.is_dir());
    assert_eq!(host.state_path(), root.join("latest.json"));
    assert!(!host.run_id().is_empty());
}

#[test]
fn missing_control_file_means_playing() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = SimulationHost::new(fresh_counter, &config(dir.path())).unwrap();

    let report = host.tick();

    assert!(report.control.playing);
    assert_eq!(report.interval(), Duration::from_millis(500));
    assert!(report.stepped && report.published);
    assert_eq!(read_state(dir.path()), json!({ "step": 1, "fuel": 99.0 }));
}

#[test]
fn paused_host_neither_steps_nor_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut host = SimulationHost::new(fresh_counter, &config(root)).unwrap();

    write_control(root, false, 0.0);
    for _ in 0..3 {
        let report = host.tick();
        assert!(!report.stepped && !report.published);
    }
    assert_eq!(host.simulation().steps, 0);
    assert!(!root.join("latest.json").exists());
    assert!(!host.clock.playing);

    write_control(root, true, 0.0);
    assert!(host.tick().published);
    assert_eq!(read_state(root)["step"], json!(1));
}

#[test]
fn single_reset_marker_rebuilds_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut host = SimulationHost::new(counting_factory(builds.clone()), &config(root)).unwrap();
    write_control(root, true, 0.0);

    host.tick();
    host.tick();
    let first_run = host.run_id().to_string();
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    drop_reset(root);
    let report = host.tick();

    assert!(report.reset_requested);
    assert_eq!(report.generation, 1);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert!(!root.join("reset.json").exists());
    assert_ne!(host.run_id(), first_run);
    assert_eq!(host.simulation().steps, 1, "fresh engine steps from zero");

    let report = host.tick();
    assert!(!report.reset_requested);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn reset_while_paused_rebuilds_without_stepping() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let builds = Arc::new(AtomicUsize::new(0));
    let mut host = SimulationHost::new(counting_factory(builds.clone()), &config(root)).unwrap();

    write_control(root, true, 0.0);
    host.tick();
    write_control(root, false, 0.0);
    drop_reset(root);
    let report = host.tick();

    assert!(report.reset_requested && !report.stepped);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert!(host.simulation().logs().is_empty());
}

#[test]
fn step_error_does_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let factory = || -> anyhow::Result<Counter> {
        Ok(Counter { fail_on: Some(2), ..Counter::new() })
    };
    let mut host = SimulationHost::new(factory, &config(root)).unwrap();
    write_control(root, true, 0.0);

    assert!(host.tick().published);

    let failed = host.tick();
    assert!(!failed.stepped && !failed.published);
    assert!(failed.failed(TickPhase::Step));
    assert!(failed.failures[0].message.contains("engine fault at step 2"));
    // The consumer keeps seeing the last good snapshot.
    assert_eq!(read_state(root)["step"], json!(1));

    let next = host.tick();
    assert!(next.stepped && next.published && next.failures.is_empty());
    assert_eq!(read_state(root)["step"], json!(3));
}

#[test]
fn step_panic_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let factory = || -> anyhow::Result<Counter> {
        Ok(Counter { panic_on: Some(1), ..Counter::new() })
    };
    let mut host = SimulationHost::new(factory, &config(root)).unwrap();
    write_control(root, true, 0.0);

    let report = host.tick();
    assert!(report.failed(TickPhase::Step));
    assert!(report.failures[0].message.contains("engine panicked at step 1"));

    assert!(host.tick().published);
    assert_eq!(read_state(root)["step"], json!(2));
}

#[test]
fn oversized_array_shape_is_a_step_error() {
    /// Logs an array whose shape overflows on its first step.
    struct Oversized {
        steps: i64,
        logs:  Vec<SnapshotValue>,
    }
    impl Simulation for Oversized {
        fn step(&mut self) -> anyhow::Result<()> {
            self.steps += 1;
            let shape = if self.steps == 1 { vec![1 << 33, 1 << 31] } else { vec![2, 0] };
            let field = NumericArray::new(shape, ArrayData::Float(Vec::new()))?;
            self.logs.push(SnapshotValue::map([
                ("step", SnapshotValue::Int(self.steps)),
                ("field", field.into()),
            ]));
            Ok(())
        }
        fn logs(&self) -> &[SnapshotValue] {
            &self.logs
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let factory = || -> anyhow::Result<Oversized> { Ok(Oversized { steps: 0, logs: Vec::new() }) };
    let mut host = SimulationHost::new(factory, &config(root)).unwrap();

    let report = host.tick();
    assert!(report.failed(TickPhase::Step));
    assert!(report.failures[0].message.contains("too large"), "{}", report.failures[0].message);
    assert!(!root.join("latest.json").exists());

    assert!(host.tick().published);
    assert_eq!(read_state(root), json!({ "step": 2, "field": [[], []] }));
}

#[test]
fn failed_rebuild_keeps_the_running_engine() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let refuse = Arc::new(AtomicBool::new(false));
    let gate = refuse.clone();
    let factory = move || -> anyhow::Result<Counter> {
        if gate.load(Ordering::SeqCst) {
            anyhow::bail!("engine assets missing");
        }
        Ok(Counter::new())
    };
    let mut host = SimulationHost::new(factory, &config(root)).unwrap();
    write_control(root, true, 0.0);
    host.tick();
    let run_id = host.run_id().to_string();

    refuse.store(true, Ordering::SeqCst);
    drop_reset(root);
    let report = host.tick();

    assert!(report.failed(TickPhase::Reset));
    assert_eq!(report.generation, 0);
    assert_eq!(host.run_id(), run_id);
    assert!(report.stepped);
    assert_eq!(read_state(root)["step"], json!(2));
    assert!(!root.join("reset.json").exists());
}

#[test]
fn publish_through_host_clears_stray_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut host = SimulationHost::new(fresh_counter, &config(root)).unwrap();
    write_control(root, true, 0.0);
    for i in 0..5 {
        fs::write(root.join(format!("leftover_{i}.json")), "{}").unwrap();
    }

    assert!(host.tick().published);

    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["control.json", "latest.json"]);
}

#[test]
fn silent_engine_publishes_nothing() {
    struct Silent;
    impl Simulation for Silent {
        fn step(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn logs(&self) -> &[SnapshotValue] {
            &[]
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut host = SimulationHost::new(|| -> anyhow::Result<Silent> { Ok(Silent) }, &config(dir.path())).unwrap();
    fs::write(dir.path().join("stray.txt"), "x").unwrap();

    let report = host.tick();
    assert!(report.stepped && !report.published);
    assert!(!dir.path().join("latest.json").exists());
    assert!(dir.path().join("stray.txt").exists());
}

#[test]
fn run_until_cuts_the_sleep_short() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut host = SimulationHost::new(fresh_counter, &config(root)).unwrap();
    write_control(root, true, 60.0);

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        flag.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let ticks = host.run_until(&stop);
    stopper.join().unwrap();

    assert_eq!(ticks, 1);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(read_state(root)["step"], json!(1));
}
