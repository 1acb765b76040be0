use std::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayVec;

use super::{PmuDesc, MAX_PMCS};
use crate::count::Width;
use crate::error::ConfigError;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Token naming one validated control image.
///
/// A unit whose cache carries the same identity already holds that image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Identity(u64);

impl Identity {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Register image requested for one context.
///
/// Logical counters `0..nractrs` count freely, `nractrs..nractrs + nrictrs`
/// raise an interrupt on overflow. `select` and `ireset` are indexed by
/// physical slot, `pmc_map` maps logical counters to physical slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Control {
    pub tsc: bool,
    pub nractrs: usize,
    pub nrictrs: usize,
    pub pmc_map: ArrayVec<usize, MAX_PMCS>,
    pub select: [u32; MAX_PMCS],
    pub ireset: [u64; MAX_PMCS],
    pub overflow_irq: bool,
    pub timebase_irq: bool,
}

impl Control {
    pub fn nrctrs(&self) -> usize {
        self.nractrs + self.nrictrs
    }

    /// Checks the image against `desc` and mints a fresh identity for it.
    pub fn validate(&self, desc: &PmuDesc) -> Result<Identity, ConfigError> {
        // Images hold at most `MAX_PMCS` slots whatever the hardware has.
        let nr_pmcs = desc.nr_pmcs.min(MAX_PMCS);
        let nrctrs = self.nrctrs();
        if nrctrs > nr_pmcs {
            return Err(ConfigError::TooManyCounters {
                count: nrctrs,
                max: nr_pmcs,
            });
        }
        if self.pmc_map.len() != nrctrs {
            return Err(ConfigError::CountMismatch {
                mapped: self.pmc_map.len(),
                counters: nrctrs,
            });
        }
        if self.nrictrs > 0 && !desc.interrupts {
            return Err(ConfigError::InterruptsUnsupported);
        }

        let mut used = 0u32;
        for &pmc in &self.pmc_map {
            if pmc >= nr_pmcs {
                return Err(ConfigError::SlotOutOfRange(pmc));
            }
            if used & (1 << pmc) != 0 {
                return Err(ConfigError::SlotReused(pmc));
            }
            used |= 1 << pmc;

            let max = desc.max_select.get(pmc).copied().unwrap_or(0);
            if self.select[pmc] > max {
                return Err(ConfigError::IllegalMode {
                    slot: pmc,
                    select: self.select[pmc],
                    max,
                });
            }
        }

        // Unused slots must not count anything.
        for (slot, &select) in self.select.iter().enumerate() {
            if used & (1 << slot) == 0 && select != 0 {
                return Err(ConfigError::UnusedSelect(slot));
            }
        }

        if self.overflow_irq && self.nrictrs == 0 {
            return Err(ConfigError::NoInterruptCounter);
        }

        let width = Width::Bits(desc.width);
        for &pmc in &self.pmc_map[self.nractrs..] {
            if width.is_negative(self.ireset[pmc]) {
                return Err(ConfigError::BadResetValue(pmc));
            }
        }

        Ok(Identity::next())
    }
}
