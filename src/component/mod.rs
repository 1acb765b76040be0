use crate::error::{Error, Result};
use crate::event::{EventCode, EventInfo, EventTable, Modifier};

/// Whether a component contributes events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Enabled,
    /// Discovery found nothing to count, the reason is meant for humans.
    Disabled(String),
}

#[derive(Clone, Debug)]
pub struct Info {
    pub name: &'static str,
    pub description: &'static str,
    pub status: Status,
}

impl Info {
    pub fn enabled(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            status: Status::Enabled,
        }
    }

    pub fn disabled(name: &'static str, description: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        log::info!("{}: disabled: {}", name, reason);
        Self {
            name,
            description,
            status: Status::Disabled(reason),
        }
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.status {
            Status::Enabled => None,
            Status::Disabled(reason) => Some(reason),
        }
    }
}

/// Outcome of probing for an optional backend.
#[derive(Debug)]
pub enum Probe<T> {
    Available(T),
    Unavailable(String),
}

impl<T> Probe<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Available(it) => Some(it),
            Self::Unavailable(_) => None,
        }
    }
}

/// The operation set every counter source implements.
///
/// A component owns its catalog. `Context` holds per execution unit state
/// (start snapshots, running sums), `Control` holds per event set state
/// (selected codes and their last values). Values returned by
/// [`read`][Self::read] and [`stop`][Self::stop] are in the order of the
/// codes given to [`update_control`][Self::update_control].
pub trait Component {
    type Context: 'static;
    type Control: 'static;

    fn info(&self) -> &Info;

    fn events(&self) -> &dyn EventTable;

    fn init_context(&self) -> Self::Context;

    fn init_control(&self) -> Self::Control;

    /// Rebuilds the control state for `codes`. On failure the control state
    /// and any hardware it describes are left as they were.
    fn update_control(
        &self,
        ctl: &mut Self::Control,
        codes: &[EventCode],
        ctx: &mut Self::Context,
    ) -> Result<()>;

    fn start(&self, ctx: &mut Self::Context, ctl: &mut Self::Control) -> Result<()>;

    fn stop<'a>(&self, ctx: &mut Self::Context, ctl: &'a mut Self::Control) -> Result<&'a [i64]>;

    fn read<'a>(&self, ctx: &mut Self::Context, ctl: &'a mut Self::Control) -> Result<&'a [i64]>;

    fn reset(&self, ctx: &mut Self::Context, ctl: &mut Self::Control) -> Result<()>;

    /// Called when the execution unit running `ctx` is switched away.
    fn suspend(&self, _ctx: &mut Self::Context, _ctl: &mut Self::Control) -> Result<()> {
        Ok(())
    }

    /// Called when the execution unit running `ctx` is switched back in.
    fn resume(&self, _ctx: &mut Self::Context, _ctl: &mut Self::Control) -> Result<()> {
        Ok(())
    }

    /// Handles an overflow interrupt and returns the mask of overflowed counters.
    fn overflow(&self, _ctx: &mut Self::Context, _ctl: &mut Self::Control) -> Result<u32> {
        Ok(0)
    }

    fn shutdown(&mut self) {}

    fn enumerate(&self, code: EventCode, modifier: Modifier) -> Result<EventCode> {
        self.events().enumerate(code, modifier)
    }

    fn code_to_name(&self, code: EventCode) -> Result<&str> {
        self.events().code_to_name(code)
    }

    fn code_to_descr(&self, code: EventCode) -> Result<&str> {
        self.events().code_to_descr(code)
    }

    fn code_to_info(&self, code: EventCode) -> Result<EventInfo> {
        self.events().code_to_info(code)
    }

    fn name_to_code(&self, name: &str) -> Result<EventCode> {
        self.events().name_to_code(name)
    }
}

/// Fails with [`Error::Disabled`] when the component is not enabled.
pub(crate) fn ensure_enabled(info: &Info) -> Result<()> {
    match &info.status {
        Status::Enabled => Ok(()),
        Status::Disabled(reason) => Err(Error::Disabled(reason.clone())),
    }
}
