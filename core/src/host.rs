//! The simulation host loop: the heart of the daemon.
//!
//! TICK ORDER (fixed, never reordered):
//!   1. Reset signal: rebuild the simulation if a marker is present
//!   2. Control read: playing / paused, sleep interval
//!   3. Step + publish: only when playing; publish the latest log entry
//!   4. Sleep: for the interval read in step 2
//!
//! RULES:
//!   - One tick runs to completion before the next begins.
//!   - Nothing that happens inside a tick stops the loop. Step errors,
//!     step panics, failed rebuilds and failed publishes are logged and
//!     reported in the [`TickReport`].
//!   - The only fatal failure is building the first engine in `new()`.

use crate::{
    channel::SharedDirectory,
    clock::HostClock,
    config::HostConfig,
    control::{ControlReader, RunControl},
    error::{HostError, HostResult},
    publisher::StatePublisher,
    reset::check_and_consume_reset,
    simulation::{Simulation, SimulationFactory},
    types::{Generation, RunId, Tick},
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest stretch `run_until` sleeps before re-checking its stop flag.
pub const STOP_POLL: Duration = Duration::from_millis(50);

/// The engine and its run id, replaced as a whole on reset.
struct EngineInstance<S> {
    run_id: RunId,
    sim:    S,
}

impl<S: Simulation> EngineInstance<S> {
    fn build<F>(factory: &F) -> HostResult<Self>
    where
        F: SimulationFactory<Output = S>,
    {
        let sim = factory.build().map_err(HostError::EngineInit)?;
        Ok(Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            sim,
        })
    }
}

/// Which part of a tick failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Reset,
    Step,
    Publish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickFailure {
    pub phase:   TickPhase,
    pub message: String,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick:            Tick,
    /// Generation of the engine in place at the end of the tick.
    pub generation:      Generation,
    pub reset_requested: bool,
    pub control:         RunControl,
    pub stepped:         bool,
    pub published:       bool,
    pub failures:        Vec<TickFailure>,
}

impl TickReport {
    fn new(tick: Tick) -> Self {
        Self {
            tick,
            generation:      0,
            reset_requested: false,
            control:         RunControl::default(),
            stepped:         false,
            published:       false,
            failures:        Vec::new(),
        }
    }

    fn fail(&mut self, phase: TickPhase, message: String) {
        self.failures.push(TickFailure { phase, message });
    }

    /// How long the loop sleeps after this tick.
    pub fn interval(&self) -> Duration {
        self.control.interval()
    }

    pub fn failed(&self, phase: TickPhase) -> bool {
        self.failures.iter().any(|f| f.phase == phase)
    }
}

pub struct SimulationHost<F: SimulationFactory> {
    pub clock:  HostClock,
    factory:    F,
    instance:   EngineInstance<F::Output>,
    reset_path: PathBuf,
    control:    ControlReader,
    publisher:  StatePublisher,
}

impl<F: SimulationFactory> SimulationHost<F> {
    /// Prepare the shared directory and build the first engine. Failure to
    /// build it is fatal: there is nothing to run without one.
    pub fn new(factory: F, config: &HostConfig) -> HostResult<Self> {
        config.validate()?;
        let dir = SharedDirectory::open(config)?;
        let instance = EngineInstance::build(&factory)?;

        log::info!(
            "Simulation host ready in {} (control={}, reset={}, state={}); run {}",
            dir.root().display(),
            config.control_file,
            config.reset_file,
            config.state_file,
            instance.run_id,
        );

        Ok(Self {
            clock:      HostClock::new(),
            factory,
            instance,
            reset_path: dir.reset_path(),
            control:    ControlReader::new(dir.control_path(), config.cache_control),
            publisher:  StatePublisher::new(dir),
        })
    }

    /// Run one tick without sleeping.
    pub fn tick(&mut self) -> TickReport {
        let tick = self.clock.advance();
        let mut report = TickReport::new(tick);

        if check_and_consume_reset(&self.reset_path) {
            report.reset_requested = true;
            log::info!("Reset requested at tick {tick}; rebuilding simulation");
            if let Err(e) = self.rebuild() {
                log::error!("Reset failed at tick {tick}, keeping run {}: {e}", self.instance.run_id);
                report.fail(TickPhase::Reset, e.to_string());
            }
        }

        let control = self.control.read();
        self.clock.set_playing(control.playing);
        report.control = control;

        if control.playing {
            match self.step_instance() {
                Ok(()) => {
                    report.stepped = true;
                    self.clock.record_step();
                    self.publish_latest(&mut report);
                }
                Err(message) => {
                    log::error!(
                        "Step failed at tick {tick} (run {}): {message}",
                        self.instance.run_id
                    );
                    report.fail(TickPhase::Step, message);
                }
            }
        }

        report.generation = self.clock.generation;
        report
    }

    /// Tick and sleep forever. Termination is external.
    pub fn run(&mut self) -> ! {
        loop {
            let report = self.tick();
            thread::sleep(report.interval());
        }
    }

    /// Run `n` ticks, sleeping between them. Used for bounded runs.
    pub fn run_ticks(&mut self, n: u64) -> Vec<TickReport> {
        let mut reports = Vec::with_capacity(n as usize);
        for i in 0..n {
            let report = self.tick();
            if i + 1 < n {
                thread::sleep(report.interval());
            }
            reports.push(report);
        }
        reports
    }

    /// Tick until `stop` is set. The end-of-tick sleep is cut short within
    /// [`STOP_POLL`] of the flag flipping. Returns the number of ticks run.
    pub fn run_until(&mut self, stop: &AtomicBool) -> u64 {
        let mut ticks = 0;
        while !stop.load(Ordering::Relaxed) {
            let report = self.tick();
            ticks += 1;
            sleep_unless_stopped(report.interval(), stop);
        }
        log::info!("Host stopped after {ticks} ticks (run {})", self.instance.run_id);
        ticks
    }

    pub fn simulation(&self) -> &F::Output {
        &self.instance.sim
    }

    pub fn run_id(&self) -> &str {
        &self.instance.run_id
    }

    pub fn state_path(&self) -> PathBuf {
        self.publisher.state_path()
    }

    /// Replace the engine wholesale. On failure the old one stays.
    fn rebuild(&mut self) -> HostResult<()> {
        let fresh = EngineInstance::build(&self.factory)?;
        let previous = std::mem::replace(&mut self.instance, fresh);
        let retired_steps = self.clock.steps_in_generation;
        let generation = self.clock.begin_generation();
        log::info!(
            "Simulation rebuilt: generation {generation}, run {} replaces {} after {retired_steps} steps",
            self.instance.run_id,
            previous.run_id,
        );
        Ok(())
    }

    /// Step the engine, turning both errors and panics into a message.
    fn step_instance(&mut self) -> Result<(), String> {
        let sim = &mut self.instance.sim;
        match panic::catch_unwind(AssertUnwindSafe(|| sim.step())) {
            Ok(Ok(()))   => Ok(()),
            Ok(Err(e))   => Err(format!("{e:#}")),
            Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
        }
    }

    fn publish_latest(&self, report: &mut TickReport) {
        let Some(latest) = self.instance.sim.latest_log() else {
            return;
        };
        match self.publisher.publish(latest) {
            Ok(removed) => {
                report.published = true;
                if removed > 0 {
                    log::debug!("Tick {}: removed {removed} stray file(s)", report.tick);
                }
            }
            Err(e) => {
                log::error!("Publish failed at tick {}: {e}", report.tick);
                report.fail(TickPhase::Publish, e.to_string());
            }
        }
    }
}

fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let started = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let elapsed = started.elapsed();
        if elapsed >= interval {
            break;
        }
        thread::sleep((interval - elapsed).min(STOP_POLL));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
