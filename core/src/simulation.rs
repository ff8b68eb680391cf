//! Engine collaborator contract.
//!
//! RULE: the host knows nothing about what a simulation computes. It can
//! build one, step it, and read its most recent log entry. Everything else
//! (physics, agents, resources) stays behind this trait.
//!
//! An implementation is the engine together with whatever orchestrates it,
//! built as one owned unit by a [`SimulationFactory`]. A reset drops the
//! unit and asks the factory for a new one, so no state survives a reset.

use crate::snapshot::SnapshotValue;

pub trait Simulation {
    /// Advance one step. May append to [`Simulation::logs`].
    fn step(&mut self) -> anyhow::Result<()>;

    /// Every entry recorded since this instance was built, oldest first.
    fn logs(&self) -> &[SnapshotValue];

    /// The entry the host publishes after a successful step.
    fn latest_log(&self) -> Option<&SnapshotValue> {
        self.logs().last()
    }
}

impl<S: Simulation + ?Sized> Simulation for Box<S> {
    fn step(&mut self) -> anyhow::Result<()> {
        (**self).step()
    }

    fn logs(&self) -> &[SnapshotValue] {
        (**self).logs()
    }

    fn latest_log(&self) -> Option<&SnapshotValue> {
        (**self).latest_log()
    }
}

/// Builds fresh simulation instances, at start-up and on every reset.
pub trait SimulationFactory {
    type Output: Simulation;

    fn build(&self) -> anyhow::Result<Self::Output>;
}

impl<S, F> SimulationFactory for F
where
    S: Simulation,
    F: Fn() -> anyhow::Result<S>,
{
    type Output = S;

    fn build(&self) -> anyhow::Result<S> {
        self()
    }
}
