//! simhost-core: the control loop and state-publication protocol for a
//! long-running simulation host daemon.
//!
//! The daemon owns one steppable simulation, polls a shared directory for
//! run-mode and reset commands every tick, and publishes the simulation's
//! latest observable state to the same directory for an external consumer.

pub mod channel;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod host;
pub mod publisher;
pub mod reset;
pub mod simulation;
pub mod snapshot;
pub mod types;

pub use error::{HostError, HostResult};
pub use host::{SimulationHost, TickReport};
pub use simulation::{Simulation, SimulationFactory};
pub use snapshot::{NumericArray, SetElement, SnapshotValue};
