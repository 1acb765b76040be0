//! Per-thread I/O statistics gathered by instrumenting system calls.
//!
//! Programs either call the wrappers in [`io`] directly or, with the
//! `interpose` feature, get every `read`, `write`, `recv`, `send`, `lseek`,
//! `poll`, `open` and `close` of the process counted without changes.
//!
//! ```no_run
//! use vcounter::appio::{self, Counter};
//!
//! appio::clear();
//! let n = appio::io::write(1, b"hello\n").unwrap();
//! assert_eq!(appio::snapshot()[Counter::WriteBytes], n as i64);
//! ```

use crate::component::{Component, Info};
use crate::error::Result;
use crate::event::{Catalog, EventCode, EventTable};

#[cfg(feature = "interpose")]
mod interpose;
pub mod io;
mod stats;

pub use stats::*;

pub const NAME: &str = "appio";
const DESCRIPTION: &str = "Linux I/O system calls";

pub struct Appio {
    info: Info,
    catalog: Catalog<Counter>,
}

pub struct AppioControl {
    counters: Vec<Counter>,
    values: Vec<i64>,
}

impl Default for Appio {
    fn default() -> Self {
        Self::new()
    }
}

impl Appio {
    pub fn new() -> Self {
        let mut catalog = Catalog::new();
        for counter in Counter::ALL {
            catalog.push(counter.name(), counter.description(), counter.unit(), *counter);
        }
        Self {
            info: Info::enabled(NAME, DESCRIPTION),
            catalog,
        }
    }

    fn sample(ctl: &mut AppioControl) {
        let stats = stats::snapshot();
        for (counter, value) in ctl.counters.iter().zip(ctl.values.iter_mut()) {
            *value = stats[*counter];
        }
    }
}

impl Component for Appio {
    type Context = ();
    type Control = AppioControl;

    fn info(&self) -> &Info {
        &self.info
    }

    fn events(&self) -> &dyn EventTable {
        &self.catalog
    }

    fn init_context(&self) {}

    fn init_control(&self) -> AppioControl {
        AppioControl {
            counters: vec![],
            values: vec![],
        }
    }

    fn update_control(&self, ctl: &mut AppioControl, codes: &[EventCode], _: &mut ()) -> Result<()> {
        let counters = codes
            .iter()
            .map(|code| Ok(self.catalog.get(*code)?.resource))
            .collect::<Result<Vec<_>>>()?;
        ctl.values = vec![0; counters.len()];
        ctl.counters = counters;
        Ok(())
    }

    fn start(&self, _: &mut (), ctl: &mut AppioControl) -> Result<()> {
        stats::clear();
        ctl.values.fill(0);
        Ok(())
    }

    fn stop<'a>(&self, _: &mut (), ctl: &'a mut AppioControl) -> Result<&'a [i64]> {
        Self::sample(ctl);
        Ok(&ctl.values)
    }

    fn read<'a>(&self, _: &mut (), ctl: &'a mut AppioControl) -> Result<&'a [i64]> {
        Self::sample(ctl);
        Ok(&ctl.values)
    }

    fn reset(&self, _: &mut (), ctl: &mut AppioControl) -> Result<()> {
        stats::clear();
        ctl.values.fill(0);
        Ok(())
    }
}
