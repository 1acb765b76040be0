use super::{Control, Identity, PmuDesc, MAX_PMCS};
use crate::count::Width;

/// Global control register of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Global {
    /// All counters of the unit are stopped.
    pub frozen: bool,
    pub overflow_irq: bool,
    pub timebase_irq: bool,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            frozen: true,
            overflow_irq: false,
            timebase_irq: false,
        }
    }
}

/// Raw access to the counter registers of one execution unit.
pub trait Registers {
    fn read_pmc(&mut self, slot: usize) -> u64;
    fn write_pmc(&mut self, slot: usize, value: u64);
    fn write_select(&mut self, slot: usize, select: u32);
    fn write_global(&mut self, global: Global);
    /// Free-running time base of the unit.
    fn read_timebase(&mut self) -> u64;
}

/// Last values written to a unit and the identity of the image they form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitCache {
    pub id: Option<Identity>,
    pub select: [u32; MAX_PMCS],
    pub global: Global,
}

impl UnitCache {
    /// Whether loading image `id` needs any register write.
    pub fn needs_write(&self, id: Identity) -> bool {
        self.id != Some(id)
    }
}

/// One execution unit: its registers and what was last written to them.
pub struct Unit<R> {
    index: usize,
    nr_pmcs: usize,
    width: Width,
    regs: R,
    cache: UnitCache,
    // Registers may disagree with the cache, rewrite all of them.
    stale: bool,
}

impl<R: Registers> Unit<R> {
    /// Takes over `regs`, freezing and clearing every counter.
    pub fn new(index: usize, desc: &PmuDesc, mut regs: R) -> Self {
        let cache = UnitCache::default();
        let nr_pmcs = desc.nr_pmcs.min(MAX_PMCS);
        regs.write_global(cache.global);
        for slot in 0..nr_pmcs {
            regs.write_select(slot, 0);
            regs.write_pmc(slot, 0);
        }
        Self {
            index,
            nr_pmcs,
            width: Width::Bits(desc.width),
            regs,
            cache,
            stale: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn nr_pmcs(&self) -> usize {
        self.nr_pmcs
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn cache(&self) -> &UnitCache {
        &self.cache
    }

    /// Distrusts everything cached for the unit, the next load rewrites
    /// every register.
    pub fn invalidate(&mut self) {
        self.cache.id = None;
        self.stale = true;
    }

    /// Forgets which image the unit holds while keeping the register cache.
    pub(super) fn forget_image(&mut self) {
        self.cache.id = None;
    }

    pub fn read_pmc(&mut self, slot: usize) -> u64 {
        self.width.mask(self.regs.read_pmc(slot))
    }

    pub fn write_pmc(&mut self, slot: usize, value: u64) {
        self.regs.write_pmc(slot, self.width.mask(value));
    }

    pub fn read_timebase(&mut self) -> u64 {
        self.regs.read_timebase()
    }

    /// Stops all counters of the unit unless they are stopped already.
    pub fn freeze(&mut self) {
        if !self.cache.global.frozen {
            self.cache.global.frozen = true;
            self.regs.write_global(self.cache.global);
        }
    }

    /// Loads image `id` described by `control`.
    ///
    /// Nothing is written when the unit already holds `id`, otherwise only
    /// registers whose cached value differs. The global register goes
    /// last since it may enable interrupts.
    pub fn write_control(&mut self, id: Identity, control: &Control) {
        if !self.cache.needs_write(id) {
            return;
        }
        let stale = std::mem::take(&mut self.stale);
        for slot in 0..self.nr_pmcs {
            let select = control.select[slot];
            if stale || self.cache.select[slot] != select {
                self.cache.select[slot] = select;
                self.regs.write_select(slot, select);
            }
        }
        let global = Global {
            frozen: false,
            overflow_irq: control.overflow_irq,
            timebase_irq: control.timebase_irq,
        };
        if stale || self.cache.global != global {
            self.cache.global = global;
            self.regs.write_global(global);
        }
        self.cache.id = Some(id);
    }
}
