//! Virtualized hardware performance counters.
//!
//! Each execution unit has a handful of physical counter slots programmed
//! through select registers and one global control register, reached
//! through a [`Registers`] backend. A [`VirtualCounter`] carries the sums of
//! one context across suspends and resumes on any unit. Units remember the
//! [`Identity`] of the image they hold so that a context resuming where it
//! left off costs register reads only.

use std::cell::{Cell, Ref, RefCell};

use arrayvec::ArrayVec;

use crate::component::{Component, Info};
use crate::error::{Error, Result};
use crate::event::{Catalog, EventCode, EventTable};
use crate::ffi;

mod control;
mod state;
mod unit;
mod vctr;

pub use control::*;
pub use state::*;
pub use unit::*;
pub use vctr::*;

/// Physical counter slots supported per unit.
pub const MAX_PMCS: usize = 8;

pub const NAME: &str = "pmc";
const DESCRIPTION: &str = "Hardware performance counters";

/// Shape of the counter hardware, identical on every unit.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PmuDesc {
    pub nr_pmcs: usize,
    /// Counter width in bits.
    pub width: u32,
    /// Largest legal event select per slot.
    pub max_select: ArrayVec<u32, MAX_PMCS>,
    /// Whether overflow interrupts can be delivered.
    pub interrupts: bool,
}

/// A countable hardware event.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventDef {
    pub name: String,
    pub description: String,
    pub select: u32,
    /// Bit `n` set when the event can be counted in slot `n`.
    pub slots: u32,
}

/// Resource of a catalog entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector {
    pub select: u32,
    pub slots: u32,
}

pub struct PmcControl {
    control: Control,
    values: Vec<i64>,
}

impl PmcControl {
    pub fn control(&self) -> &Control {
        &self.control
    }
}

/// Maps each event, given as its slot mask, to a distinct slot.
///
/// Augmenting paths over the event/slot bipartite graph, `None` when no
/// complete matching exists.
pub fn assign_slots(masks: &[u32], nr_pmcs: usize) -> Option<ArrayVec<usize, MAX_PMCS>> {
    fn augment(
        event: usize,
        masks: &[u32],
        nr_pmcs: usize,
        owner: &mut [Option<usize>; MAX_PMCS],
        seen: &mut [bool; MAX_PMCS],
    ) -> bool {
        for slot in 0..nr_pmcs {
            if masks[event] & (1 << slot) == 0 || seen[slot] {
                continue;
            }
            seen[slot] = true;
            let free = match owner[slot] {
                None => true,
                Some(other) => augment(other, masks, nr_pmcs, owner, seen),
            };
            if free {
                owner[slot] = Some(event);
                return true;
            }
        }
        false
    }

    let nr_pmcs = nr_pmcs.min(MAX_PMCS);
    if masks.len() > nr_pmcs {
        return None;
    }
    let mut owner = [None; MAX_PMCS];
    for event in 0..masks.len() {
        let mut seen = [false; MAX_PMCS];
        if !augment(event, masks, nr_pmcs, &mut owner, &mut seen) {
            return None;
        }
    }

    let mut map = ArrayVec::new();
    for event in 0..masks.len() {
        let slot = owner.iter().position(|it| *it == Some(event))?;
        map.push(slot);
    }
    Some(map)
}

/// Component over the units of a machine, one [`Registers`] backend each.
pub struct PmcComponent<R> {
    info: Info,
    desc: PmuDesc,
    catalog: Catalog<Selector>,
    units: Vec<RefCell<Unit<R>>>,
    pinned: Cell<Option<usize>>,
}

impl<R: Registers> PmcComponent<R> {
    pub fn new(desc: PmuDesc, events: Vec<EventDef>, regs: Vec<R>) -> Self {
        let units = regs
            .into_iter()
            .enumerate()
            .map(|(index, regs)| RefCell::new(Unit::new(index, &desc, regs)))
            .collect::<Vec<_>>();

        let mut catalog = Catalog::new();
        for event in events {
            let selector = Selector {
                select: event.select,
                slots: event.slots,
            };
            catalog.push(event.name, event.description, "", selector);
        }

        let info = if units.is_empty() || desc.nr_pmcs == 0 {
            Info::disabled(NAME, DESCRIPTION, "No counter hardware found")
        } else if desc.nr_pmcs > MAX_PMCS {
            let reason = format!(
                "{} counters per unit, at most {} supported",
                desc.nr_pmcs, MAX_PMCS
            );
            Info::disabled(NAME, DESCRIPTION, reason)
        } else if catalog.is_empty() {
            Info::disabled(NAME, DESCRIPTION, "No events defined")
        } else {
            log::info!("{}: {} units, {} events", NAME, units.len(), catalog.len());
            Info::enabled(NAME, DESCRIPTION)
        };

        Self {
            info,
            desc,
            catalog,
            units,
            pinned: Cell::new(None),
        }
    }

    pub fn desc(&self) -> &PmuDesc {
        &self.desc
    }

    /// Runs every following operation on `unit` instead of the unit the
    /// calling thread happens to be on.
    pub fn pin(&self, unit: Option<usize>) {
        self.pinned.set(unit);
    }

    /// Index of the unit operations act upon.
    pub fn current_unit(&self) -> usize {
        let unit = self.pinned.get().unwrap_or_else(ffi::current_cpu);
        unit % self.units.len().max(1)
    }

    pub fn unit(&self, index: usize) -> Option<Ref<'_, Unit<R>>> {
        self.units.get(index).map(RefCell::borrow)
    }

    /// Forgets the image held by `unit`, the next resume there rewrites it.
    pub fn invalidate(&self, unit: usize) {
        if let Some(unit) = self.units.get(unit) {
            unit.borrow_mut().invalidate();
        }
    }

    fn with_unit<T>(&self, f: impl FnOnce(&mut Unit<R>) -> T) -> Result<T> {
        let unit = self
            .units
            .get(self.current_unit())
            .ok_or(Error::InvalidState("no counter hardware"))?;
        let mut unit = unit
            .try_borrow_mut()
            .map_err(|_| Error::InvalidState("unit busy"))?;
        Ok(f(&mut *unit))
    }

    fn control_for(&self, codes: &[EventCode]) -> Result<Control> {
        let mut masks = vec![];
        let mut selects = vec![];
        for code in codes {
            let selector = self.catalog.get(*code)?.resource;
            masks.push(selector.slots);
            selects.push(selector.select);
        }
        let pmc_map = assign_slots(&masks, self.desc.nr_pmcs).ok_or(Error::Conflict)?;

        let mut control = Control {
            tsc: true,
            nractrs: codes.len(),
            ..Control::default()
        };
        for (&slot, select) in pmc_map.iter().zip(selects) {
            control.select[slot] = select;
        }
        control.pmc_map = pmc_map;
        Ok(control)
    }
}

impl<R: Registers + 'static> Component for PmcComponent<R> {
    type Context = VirtualCounter;
    type Control = PmcControl;

    fn info(&self) -> &Info {
        &self.info
    }

    fn events(&self) -> &dyn EventTable {
        &self.catalog
    }

    fn init_context(&self) -> VirtualCounter {
        VirtualCounter::new(self.desc.width)
    }

    fn init_control(&self) -> PmcControl {
        PmcControl {
            control: Control::default(),
            values: vec![],
        }
    }

    fn update_control(&self, ctl: &mut PmcControl, codes: &[EventCode], ctx: &mut VirtualCounter) -> Result<()> {
        let control = self.control_for(codes)?;
        ctx.update_control(control.clone(), &self.desc)?;
        ctl.control = control;
        ctl.values = vec![0; codes.len()];
        Ok(())
    }

    fn start(&self, ctx: &mut VirtualCounter, ctl: &mut PmcControl) -> Result<()> {
        self.with_unit(|unit| ctx.start(unit))??;
        ctl.values.fill(0);
        Ok(())
    }

    fn stop<'a>(&self, ctx: &mut VirtualCounter, ctl: &'a mut PmcControl) -> Result<&'a [i64]> {
        ctl.values = self.with_unit(|unit| ctx.stop(unit))?;
        Ok(&ctl.values)
    }

    fn read<'a>(&self, ctx: &mut VirtualCounter, ctl: &'a mut PmcControl) -> Result<&'a [i64]> {
        self.with_unit(|unit| ctx.sample(unit))?;
        ctl.values = ctx.values();
        Ok(&ctl.values)
    }

    fn reset(&self, ctx: &mut VirtualCounter, ctl: &mut PmcControl) -> Result<()> {
        self.with_unit(|unit| ctx.reset(unit))?;
        ctl.values.fill(0);
        Ok(())
    }

    fn suspend(&self, ctx: &mut VirtualCounter, _: &mut PmcControl) -> Result<()> {
        self.with_unit(|unit| ctx.switch_out(unit))
    }

    fn resume(&self, ctx: &mut VirtualCounter, _: &mut PmcControl) -> Result<()> {
        self.with_unit(|unit| ctx.switch_in(unit))
    }

    fn overflow(&self, ctx: &mut VirtualCounter, _: &mut PmcControl) -> Result<u32> {
        self.with_unit(|unit| ctx.handle_overflow(unit))?
    }
}
