use arrayvec::ArrayVec;

use super::{Control, Identity, PmuDesc, Registers, Unit, MAX_PMCS};
use crate::count::{delta, Width};
use crate::error::ConfigError;

/// Overflow mask bit reported when only the time base interrupt is armed.
pub const TIMEBASE_OVERFLOW: u32 = 1 << 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PmcSum {
    /// Register value at the last fold.
    pub start: u64,
    pub sum: u64,
}

/// Running sums of one context and the control image they are counted under.
#[derive(Clone, Debug)]
pub struct CpuState {
    control: Control,
    id: Option<Identity>,
    width: Width,
    pmc: ArrayVec<PmcSum, MAX_PMCS>,
    tsc_start: u64,
    tsc_sum: u64,
    // Unit on which the interrupt-mode counters were last suspended.
    isuspend_unit: Option<usize>,
}

impl CpuState {
    pub fn new(width: u32) -> Self {
        Self {
            control: Control::default(),
            id: None,
            width: Width::Bits(width),
            pmc: ArrayVec::new(),
            tsc_start: 0,
            tsc_sum: 0,
            isuspend_unit: None,
        }
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn id(&self) -> Option<Identity> {
        self.id
    }

    pub fn sums(&self) -> impl Iterator<Item = u64> + '_ {
        self.pmc.iter().map(|it| it.sum)
    }

    pub fn pmc(&self) -> &[PmcSum] {
        &self.pmc
    }

    pub fn tsc_sum(&self) -> u64 {
        self.tsc_sum
    }

    fn has_ictrs(&self) -> bool {
        self.control.nrictrs > 0
    }

    /// Adopts `control` once it validates against `desc`, otherwise
    /// nothing changes.
    pub fn update_control(&mut self, control: Control, desc: &PmuDesc) -> Result<(), ConfigError> {
        let id = control.validate(desc)?;
        self.control = control;
        self.id = Some(id);
        self.clear();
        Ok(())
    }

    /// Zeroes the sums and rearms the interrupt-mode counters at their
    /// reset values.
    pub fn clear(&mut self) {
        self.isuspend_unit = None;
        self.tsc_start = 0;
        self.tsc_sum = 0;
        self.pmc.clear();
        for i in 0..self.control.nrctrs() {
            let start = match i >= self.control.nractrs {
                true => self.control.ireset[self.control.pmc_map[i]],
                false => 0,
            };
            self.pmc.push(PmcSum { start, sum: 0 });
        }
    }

    fn fold(&mut self, i: usize, now: u64) {
        let pmc = &mut self.pmc[i];
        pmc.sum = pmc.sum.wrapping_add(delta(pmc.start, now, self.width));
        pmc.start = now;
    }

    /// Folds what the unit counted since the last fold into the sums.
    /// Reads only.
    pub fn suspend<R: Registers>(&mut self, unit: &mut Unit<R>) {
        if self.has_ictrs() {
            self.isuspend_unit = Some(unit.index());
        }
        self.sample(unit);
    }

    /// Makes the unit count for this context again.
    ///
    /// Resuming on the unit of the last suspend, with the unit still
    /// holding this image, writes no register at all.
    pub fn resume<R: Registers>(&mut self, unit: &mut Unit<R>) {
        let Some(id) = self.id else {
            return;
        };
        if self.has_ictrs() {
            self.iresume(unit, id);
        }
        unit.write_control(id, &self.control);

        if self.control.tsc {
            self.tsc_start = unit.read_timebase();
        }
        for i in 0..self.control.nractrs {
            self.pmc[i].start = unit.read_pmc(self.control.pmc_map[i]);
        }
    }

    fn iresume<R: Registers>(&mut self, unit: &mut Unit<R>, id: Identity) {
        if !unit.cache().needs_write(id) && self.isuspend_unit == Some(unit.index()) {
            return;
        }
        // Another image owns the unit, or this one migrated. Stop counting
        // before reprogramming so no overflow is lost.
        unit.freeze();
        for i in self.control.nractrs..self.control.nrctrs() {
            unit.write_pmc(self.control.pmc_map[i], self.pmc[i].start);
        }
        unit.forget_image();
    }

    /// Folds all counters without stopping them.
    pub fn sample<R: Registers>(&mut self, unit: &mut Unit<R>) {
        if self.control.tsc {
            let now = unit.read_timebase();
            self.tsc_sum = self.tsc_sum.wrapping_add(now.wrapping_sub(self.tsc_start));
            self.tsc_start = now;
        }
        for i in 0..self.control.nrctrs() {
            let now = unit.read_pmc(self.control.pmc_map[i]);
            self.fold(i, now);
        }
    }

    /// Forces the next resume to reload the interrupt-mode counters.
    pub fn ireload(&mut self) {
        self.isuspend_unit = None;
    }

    /// Finds the interrupt-mode counters that overflowed and rearms them.
    ///
    /// A counter has overflowed when its last folded value reads as
    /// negative in the counter width. Bit `i` of the result stands for
    /// logical counter `i`.
    pub fn identify_overflow(&mut self) -> u32 {
        let mut mask = 0;
        for i in self.control.nractrs..self.control.nrctrs() {
            if self.width.is_negative(self.pmc[i].start) {
                self.pmc[i].start = self.control.ireset[self.control.pmc_map[i]];
                mask |= 1 << i;
            }
        }
        if mask == 0 && self.control.timebase_irq {
            mask = TIMEBASE_OVERFLOW;
        }
        mask
    }
}
