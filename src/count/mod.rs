use std::any::Any;

use crate::appio::Appio;
use crate::component::{Component, Info, Status};
use crate::config::Opts;
use crate::dl::nvml::Nvml;
use crate::error::{Error, Result};
use crate::event::{EventCode, EventTable};
use crate::fs::{hwmon, infiniband, net, powercap};

mod delta;
mod set;

pub use delta::*;
pub use set::*;

/// Separates a component name from an event name, e.g. `net:::lo:rx:bytes`.
pub const SEPARATOR: &str = ":::";

type State = Box<dyn Any>;

// Type-erased view of a `Component`, so components with different context
// and control types can share one registry.
trait Dispatch {
    fn info(&self) -> &Info;
    fn events(&self) -> &dyn EventTable;
    fn init_context(&self) -> State;
    fn init_control(&self) -> State;
    fn update_control(&self, ctl: &mut State, codes: &[EventCode], ctx: &mut State) -> Result<()>;
    fn start(&self, ctx: &mut State, ctl: &mut State) -> Result<()>;
    fn stop<'a>(&self, ctx: &mut State, ctl: &'a mut State) -> Result<&'a [i64]>;
    fn read<'a>(&self, ctx: &mut State, ctl: &'a mut State) -> Result<&'a [i64]>;
    fn reset(&self, ctx: &mut State, ctl: &mut State) -> Result<()>;
    fn suspend(&self, ctx: &mut State, ctl: &mut State) -> Result<()>;
    fn resume(&self, ctx: &mut State, ctl: &mut State) -> Result<()>;
    fn overflow(&self, ctx: &mut State, ctl: &mut State) -> Result<u32>;
    fn shutdown(&mut self);
}

fn cast<T: 'static>(state: &mut State) -> Result<&mut T> {
    state
        .downcast_mut()
        .ok_or(Error::InvalidState("state belongs to another component"))
}

impl<C: Component> Dispatch for C {
    fn info(&self) -> &Info {
        Component::info(self)
    }

    fn events(&self) -> &dyn EventTable {
        Component::events(self)
    }

    fn init_context(&self) -> State {
        Box::new(Component::init_context(self))
    }

    fn init_control(&self) -> State {
        Box::new(Component::init_control(self))
    }

    fn update_control(&self, ctl: &mut State, codes: &[EventCode], ctx: &mut State) -> Result<()> {
        Component::update_control(self, cast(ctl)?, codes, cast(ctx)?)
    }

    fn start(&self, ctx: &mut State, ctl: &mut State) -> Result<()> {
        Component::start(self, cast(ctx)?, cast(ctl)?)
    }

    fn stop<'a>(&self, ctx: &mut State, ctl: &'a mut State) -> Result<&'a [i64]> {
        Component::stop(self, cast(ctx)?, cast(ctl)?)
    }

    fn read<'a>(&self, ctx: &mut State, ctl: &'a mut State) -> Result<&'a [i64]> {
        Component::read(self, cast(ctx)?, cast(ctl)?)
    }

    fn reset(&self, ctx: &mut State, ctl: &mut State) -> Result<()> {
        Component::reset(self, cast(ctx)?, cast(ctl)?)
    }

    fn suspend(&self, ctx: &mut State, ctl: &mut State) -> Result<()> {
        Component::suspend(self, cast(ctx)?, cast(ctl)?)
    }

    fn resume(&self, ctx: &mut State, ctl: &mut State) -> Result<()> {
        Component::resume(self, cast(ctx)?, cast(ctl)?)
    }

    fn overflow(&self, ctx: &mut State, ctl: &mut State) -> Result<u32> {
        Component::overflow(self, cast(ctx)?, cast(ctl)?)
    }

    fn shutdown(&mut self) {
        Component::shutdown(self)
    }
}

/// Registry of components, the entry point for building event sets.
///
/// ```no_run
/// use vcounter::config::Opts;
/// use vcounter::count::Library;
///
/// let lib = Library::with_defaults(&Opts::default());
/// for (cidx, info) in lib.components() {
///     match info.disabled_reason() {
///         None => println!("{}: {} events", info.name, lib.events(cidx).unwrap().len()),
///         Some(reason) => println!("{}: disabled ({})", info.name, reason),
///     }
/// }
///
/// let mut set = lib.event_set();
/// set.add("net:::lo:rx:bytes").unwrap();
/// set.start().unwrap();
/// // ... do some work ...
/// let values = set.stop().unwrap();
/// println!("{} bytes received on lo", values[0]);
/// ```
#[derive(Default)]
pub struct Library {
    components: Vec<Box<dyn Dispatch>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers all built-in components.
    ///
    /// Components whose counter domain is absent are still registered, in
    /// the disabled state with zero events.
    pub fn with_defaults(opts: &Opts) -> Self {
        let mut lib = Self::new();
        lib.register(hwmon::discover(opts));
        lib.register(net::Net::discover(opts));
        lib.register(infiniband::discover(opts));
        lib.register(powercap::discover(opts));
        lib.register(Nvml::load(&opts.nvml));
        lib.register(Appio::new());
        lib
    }

    /// Adds a component and returns its index.
    pub fn register<C: Component + 'static>(&mut self, component: C) -> usize {
        let info = Component::info(&component);
        if info.status == Status::Enabled {
            log::info!(
                "{}: {} events",
                info.name,
                Component::events(&component).len()
            );
        }
        self.components.push(Box::new(component));
        self.components.len() - 1
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = (usize, &Info)> {
        self.components.iter().map(|c| c.info()).enumerate()
    }

    pub fn info(&self, cidx: usize) -> Result<&Info> {
        Ok(self.get(cidx)?.info())
    }

    pub fn events(&self, cidx: usize) -> Result<&dyn EventTable> {
        Ok(self.get(cidx)?.events())
    }

    /// Resolves `component:::event`, or a bare event name searched in every
    /// enabled component in registration order.
    pub fn event_code(&self, name: &str) -> Result<(usize, EventCode)> {
        if let Some((component, event)) = name.split_once(SEPARATOR) {
            let (cidx, c) = self
                .components
                .iter()
                .enumerate()
                .find(|(_, c)| c.info().name == component)
                .ok_or(Error::UnknownEvent)?;
            return Ok((cidx, c.events().name_to_code(event)?));
        }

        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.info().status == Status::Enabled)
            .find_map(|(cidx, c)| c.events().lookup(name).map(|code| (cidx, code)))
            .ok_or(Error::UnknownEvent)
    }

    pub fn event_name(&self, cidx: usize, code: EventCode) -> Result<&str> {
        self.get(cidx)?.events().code_to_name(code)
    }

    pub fn event_set(&self) -> EventSet<'_> {
        EventSet::new(self)
    }

    fn get(&self, cidx: usize) -> Result<&dyn Dispatch> {
        self.components
            .get(cidx)
            .map(|c| c.as_ref())
            .ok_or(Error::InvalidState("no such component"))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        for c in self.components.iter_mut() {
            c.shutdown();
        }
    }
}

#[cfg(test)]
mod test;
