//! Host clock: counts loop ticks, engine generations and steps.

use crate::types::{Generation, Tick};

#[derive(Debug, Clone, PartialEq)]
pub struct HostClock {
    /// Ticks since the daemon started. Never reset.
    pub current_tick:        Tick,
    pub generation:          Generation,
    /// Ticks since the current engine instance was built.
    pub ticks_in_generation: Tick,
    /// Successful steps of the current engine instance.
    pub steps_in_generation: u64,
    pub playing:             bool,
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock {
    pub fn new() -> Self {
        Self {
            current_tick:        0,
            generation:          0,
            ticks_in_generation: 0,
            steps_in_generation: 0,
            playing:             true,
        }
    }

    /// Start a tick. Returns the new tick number.
    pub fn advance(&mut self) -> Tick {
        self.current_tick += 1;
        self.ticks_in_generation += 1;
        self.current_tick
    }

    /// A fresh engine replaced the old one. The current tick counts toward
    /// the new generation.
    pub fn begin_generation(&mut self) -> Generation {
        self.generation += 1;
        self.ticks_in_generation = 1;
        self.steps_in_generation = 0;
        self.generation
    }

    pub fn record_step(&mut self) {
        self.steps_in_generation += 1;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_restarts_per_instance_counters() {
        let mut clock = HostClock::new();
        clock.advance();
        clock.record_step();
        clock.advance();
        clock.record_step();
        assert_eq!((clock.current_tick, clock.ticks_in_generation, clock.steps_in_generation), (2, 2, 2));

        clock.advance();
        assert_eq!(clock.begin_generation(), 1);
        assert_eq!(clock.current_tick, 3);
        assert_eq!(clock.ticks_in_generation, 1);
        assert_eq!(clock.steps_in_generation, 0);
    }
}
