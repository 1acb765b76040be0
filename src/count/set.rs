use std::marker::PhantomData;
use std::rc::Rc;

use super::{Dispatch, Library, State};
use crate::component::ensure_enabled;
use crate::error::{Error, Result};
use crate::event::EventCode;

/// A group of events of one component, started, read and stopped together.
///
/// The context of the set is created on first use and stays bound to the
/// execution unit that uses it, so `EventSet` is neither `Send` nor `Sync`.
pub struct EventSet<'a> {
    lib: &'a Library,
    cidx: Option<usize>,
    codes: Vec<EventCode>,
    control: Option<State>,
    context: Option<State>,
    running: bool,
    _unit: PhantomData<Rc<()>>,
}

impl<'a> EventSet<'a> {
    pub(super) fn new(lib: &'a Library) -> Self {
        Self {
            lib,
            cidx: None,
            codes: vec![],
            control: None,
            context: None,
            running: false,
            _unit: PhantomData,
        }
    }

    /// Component index the set is bound to, fixed by the first added event.
    pub fn component(&self) -> Option<usize> {
        self.cidx
    }

    pub fn codes(&self) -> &[EventCode] {
        &self.codes
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resolves `name` and adds it, see [`Library::event_code`].
    pub fn add(&mut self, name: &str) -> Result<EventCode> {
        let (cidx, code) = self.lib.event_code(name)?;
        self.add_code(cidx, code)?;
        Ok(code)
    }

    pub fn add_code(&mut self, cidx: usize, code: EventCode) -> Result<()> {
        if self.running {
            return Err(Error::InvalidState("event set is running"));
        }
        if self.cidx.is_some_and(|it| it != cidx) {
            return Err(Error::MixedComponents);
        }
        let lib = self.lib;
        let component = lib.get(cidx)?;
        ensure_enabled(component.info())?;
        component.events().code_to_name(code)?;
        if self.codes.contains(&code) {
            return Err(Error::InvalidState("event already in set"));
        }

        let mut codes = self.codes.clone();
        codes.push(code);
        self.rebuild(component, codes)?;
        self.cidx = Some(cidx);
        Ok(())
    }

    pub fn remove(&mut self, code: EventCode) -> Result<()> {
        if self.running {
            return Err(Error::InvalidState("event set is running"));
        }
        let Some(pos) = self.codes.iter().position(|it| *it == code) else {
            return Err(Error::UnknownEvent);
        };
        let component = self.dispatch()?;

        let mut codes = self.codes.clone();
        codes.remove(pos);
        self.rebuild(component, codes)
    }

    // The component leaves its control state untouched on failure, so the
    // set only adopts `codes` once the update went through. States of a set
    // not yet bound are kept only when the first add succeeds.
    fn rebuild(&mut self, component: &dyn Dispatch, codes: Vec<EventCode>) -> Result<()> {
        let mut ctx = self
            .context
            .take()
            .unwrap_or_else(|| component.init_context());
        let mut ctl = self
            .control
            .take()
            .unwrap_or_else(|| component.init_control());
        let result = component.update_control(&mut ctl, &codes, &mut ctx);
        if result.is_ok() || self.cidx.is_some() {
            self.context = Some(ctx);
            self.control = Some(ctl);
        }
        result?;
        self.codes = codes;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::InvalidState("event set is running"));
        }
        if self.codes.is_empty() {
            return Err(Error::InvalidState("event set is empty"));
        }
        let component = self.dispatch()?;
        let (ctx, ctl) = self.states()?;
        component.start(ctx, ctl)?;
        self.running = true;
        Ok(())
    }

    /// Stops counting and returns the final values, in the order of
    /// [`codes`][Self::codes].
    pub fn stop(&mut self) -> Result<Vec<i64>> {
        let component = self.running()?;
        let (ctx, ctl) = self.states()?;
        let values = component.stop(ctx, ctl)?.to_vec();
        self.running = false;
        Ok(values)
    }

    pub fn read(&mut self) -> Result<Vec<i64>> {
        let component = self.running()?;
        let (ctx, ctl) = self.states()?;
        Ok(component.read(ctx, ctl)?.to_vec())
    }

    /// Restarts the running totals from zero.
    pub fn reset(&mut self) -> Result<()> {
        let component = self.dispatch()?;
        let (ctx, ctl) = self.states()?;
        component.reset(ctx, ctl)
    }

    /// Notifies the component that the execution unit is being switched away.
    pub fn suspend(&mut self) -> Result<()> {
        let component = self.running()?;
        let (ctx, ctl) = self.states()?;
        component.suspend(ctx, ctl)
    }

    /// Notifies the component that the execution unit is being switched back in.
    pub fn resume(&mut self) -> Result<()> {
        let component = self.running()?;
        let (ctx, ctl) = self.states()?;
        component.resume(ctx, ctl)
    }

    /// Handles an overflow interrupt, returns the mask of overflowed counters.
    pub fn overflow(&mut self) -> Result<u32> {
        let component = self.running()?;
        let (ctx, ctl) = self.states()?;
        component.overflow(ctx, ctl)
    }

    fn dispatch(&self) -> Result<&'a dyn Dispatch> {
        let cidx = self.cidx.ok_or(Error::InvalidState("event set is empty"))?;
        self.lib.get(cidx)
    }

    fn running(&self) -> Result<&'a dyn Dispatch> {
        if !self.running {
            return Err(Error::InvalidState("event set is not running"));
        }
        self.dispatch()
    }

    fn states(&mut self) -> Result<(&mut State, &mut State)> {
        match (self.context.as_mut(), self.control.as_mut()) {
            (Some(ctx), Some(ctl)) => Ok((ctx, ctl)),
            _ => Err(Error::InvalidState("event set is empty")),
        }
    }
}

impl Drop for EventSet<'_> {
    fn drop(&mut self) {
        if self.running {
            if let Err(e) = self.stop() {
                log::debug!("stopping dropped event set: {}", e);
            }
        }
    }
}
