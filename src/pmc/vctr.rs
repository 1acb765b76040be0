use super::{Control, CpuState, PmuDesc, Registers, Unit};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Registers loaded and counting.
    Active,
    /// Switched away, sums hold everything counted so far.
    Suspended,
}

/// Counters of one context, virtualized over whichever unit it runs on.
#[derive(Clone, Debug)]
pub struct VirtualCounter {
    state: CpuState,
    phase: Phase,
    ireload_needed: bool,
}

impl VirtualCounter {
    pub fn new(width: u32) -> Self {
        Self {
            state: CpuState::new(width),
            phase: Phase::Idle,
            ireload_needed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &CpuState {
        &self.state
    }

    /// Counted values in logical counter order.
    pub fn values(&self) -> Vec<i64> {
        self.state.sums().map(|it| it as i64).collect()
    }

    pub fn update_control(&mut self, control: Control, desc: &PmuDesc) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(Error::InvalidState("counters are running"));
        }
        self.state.update_control(control, desc)?;
        self.ireload_needed = false;
        Ok(())
    }

    pub fn start<R: Registers>(&mut self, unit: &mut Unit<R>) -> Result<()> {
        if self.state.id().is_none() {
            return Err(Error::InvalidState("no control image"));
        }
        if self.phase != Phase::Idle {
            return Err(Error::InvalidState("counters are running"));
        }
        self.state.clear();
        self.ireload_needed = false;
        self.state.resume(unit);
        self.phase = Phase::Active;
        log::trace!("started on unit {}", unit.index());
        Ok(())
    }

    pub fn switch_out<R: Registers>(&mut self, unit: &mut Unit<R>) {
        if self.phase == Phase::Active {
            self.state.suspend(unit);
            self.phase = Phase::Suspended;
        }
    }

    pub fn switch_in<R: Registers>(&mut self, unit: &mut Unit<R>) {
        if self.phase != Phase::Suspended {
            return;
        }
        if self.ireload_needed {
            self.state.ireload();
            self.ireload_needed = false;
        }
        self.state.resume(unit);
        self.phase = Phase::Active;
    }

    pub fn sample<R: Registers>(&mut self, unit: &mut Unit<R>) {
        if self.phase == Phase::Active {
            self.state.sample(unit);
        }
    }

    /// Stops counting and returns the final values. Safe in any phase.
    pub fn stop<R: Registers>(&mut self, unit: &mut Unit<R>) -> Vec<i64> {
        if self.phase == Phase::Active {
            self.state.suspend(unit);
        }
        self.phase = Phase::Idle;
        self.values()
    }

    /// Zeroes the sums, counting continues from here.
    pub fn reset<R: Registers>(&mut self, unit: &mut Unit<R>) {
        match self.phase {
            Phase::Active => {
                self.state.suspend(unit);
                self.state.clear();
                self.state.resume(unit);
            }
            Phase::Suspended | Phase::Idle => {
                self.state.clear();
                self.ireload_needed = false;
            }
        }
    }

    /// Handles an overflow interrupt taken while this context was active
    /// on `unit`.
    ///
    /// Returns the mask of overflowed logical counters. An empty mask means
    /// a spurious interrupt, counting simply goes on. Otherwise the context
    /// stays suspended until the next [`switch_in`][Self::switch_in], which
    /// reloads the rearmed counters.
    pub fn handle_overflow<R: Registers>(&mut self, unit: &mut Unit<R>) -> Result<u32> {
        if self.phase != Phase::Active {
            return Err(Error::InvalidState("overflow while not counting"));
        }
        self.state.suspend(unit);
        let mask = self.state.identify_overflow();
        if mask == 0 {
            self.state.resume(unit);
            return Ok(0);
        }
        log::debug!("overflow on unit {}: mask {:#x}", unit.index(), mask);
        self.ireload_needed = true;
        self.phase = Phase::Suspended;
        Ok(mask)
    }
}
