//! Demonstration engine hosted by `simhostd`.
//!
//! A small fleet of agents wanders the unit square burning fuel. An agent
//! with an empty tank stops moving until the periodic refuel. Runs are
//! fully reproducible for a given seed; every reset replays the same run
//! from step one.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use simhost_core::{snapshot::NumericArray, Simulation, SimulationFactory, SnapshotValue};

pub const DEFAULT_AGENTS: usize = 8;

const FULL_TANK:     f64 = 100.0;
const MAX_STRIDE:    f64 = 0.05;
/// Fuel burned per unit of distance travelled.
const BURN_RATE:     f64 = 60.0;
const REFUEL_EVERY:  u64 = 25;
const LOG_CAPACITY:  usize = 512;

/// Fuel tanks of the fleet, one per agent.
pub struct FuelModel {
    tanks: Vec<f64>,
}

impl FuelModel {
    pub fn new(n_agents: usize) -> Self {
        Self { tanks: vec![FULL_TANK; n_agents] }
    }

    fn has_fuel(&self, agent: usize) -> bool {
        self.tanks[agent] > 0.0
    }

    /// Burn fuel for `distance`; the tank never goes below zero.
    fn burn(&mut self, agent: usize, distance: f64) {
        let tank = &mut self.tanks[agent];
        *tank = (*tank - distance * BURN_RATE).max(0.0);
    }

    fn refuel_all(&mut self) {
        self.tanks.iter_mut().for_each(|t| *t = FULL_TANK);
    }

    fn depleted(&self) -> impl Iterator<Item = usize> + '_ {
        self.tanks
            .iter()
            .enumerate()
            .filter(|(_, t)| **t <= 0.0)
            .map(|(i, _)| i)
    }
}

/// Moves the fleet over a [`FuelModel`] and records one entry per step.
pub struct FleetLoop {
    tick:      u64,
    rng:       Pcg64Mcg,
    positions: Vec<[f64; 2]>,
    fuel:      FuelModel,
    logs:      Vec<SnapshotValue>,
}

impl FleetLoop {
    pub fn new(fuel: FuelModel, seed: u64) -> Self {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let positions = (0..fuel.tanks.len())
            .map(|_| [rng.gen::<f64>(), rng.gen::<f64>()])
            .collect();
        Self { tick: 0, rng, positions, fuel, logs: Vec::new() }
    }

    fn record(&self) -> anyhow::Result<SnapshotValue> {
        let agents = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, [x, y])| {
                SnapshotValue::map([
                    ("id", SnapshotValue::Int(i as i64)),
                    ("x", SnapshotValue::Float(*x)),
                    ("y", SnapshotValue::Float(*y)),
                    ("fuel", SnapshotValue::Float(self.fuel.tanks[i])),
                    ("moving", SnapshotValue::Bool(self.fuel.has_fuel(i))),
                ])
            })
            .collect();

        Ok(SnapshotValue::map([
            ("tick", SnapshotValue::from(self.tick)),
            ("fuel", NumericArray::from_floats(self.fuel.tanks.clone()).into()),
            ("positions", NumericArray::from_rows(&self.positions)?.into()),
            ("depleted", SnapshotValue::set(self.fuel.depleted())),
            ("agents", SnapshotValue::Seq(agents)),
        ]))
    }
}

impl Simulation for FleetLoop {
    fn step(&mut self) -> anyhow::Result<()> {
        self.tick += 1;

        for agent in 0..self.positions.len() {
            if !self.fuel.has_fuel(agent) {
                continue;
            }
            let dx = self.rng.gen_range(-MAX_STRIDE..=MAX_STRIDE);
            let dy = self.rng.gen_range(-MAX_STRIDE..=MAX_STRIDE);
            let [x, y] = self.positions[agent];
            let next = [(x + dx).clamp(0.0, 1.0), (y + dy).clamp(0.0, 1.0)];
            let distance = (next[0] - x).hypot(next[1] - y);
            self.positions[agent] = next;
            self.fuel.burn(agent, distance);
        }

        if self.tick % REFUEL_EVERY == 0 {
            self.fuel.refuel_all();
        }

        let entry = self.record()?;
        if self.logs.len() == LOG_CAPACITY {
            self.logs.drain(..LOG_CAPACITY / 2);
        }
        self.logs.push(entry);
        Ok(())
    }

    fn logs(&self) -> &[SnapshotValue] {
        &self.logs
    }
}

/// Builds a fresh fleet with the same size and seed every time.
pub struct DemoFactory {
    pub agents: usize,
    pub seed:   u64,
}

impl SimulationFactory for DemoFactory {
    type Output = FleetLoop;

    fn build(&self) -> anyhow::Result<FleetLoop> {
        if self.agents == 0 {
            anyhow::bail!("demo fleet needs at least one agent");
        }
        Ok(FleetLoop::new(FuelModel::new(self.agents), self.seed))
    }
}
