use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown event")]
    UnknownEvent,

    #[error("no more events")]
    NoMoreEvents,

    /// The counter domain is absent on this host, or an optional
    /// dependency of the component could not be loaded.
    #[error("component disabled: {0}")]
    Disabled(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// No physical slot assignment satisfies the requested events.
    #[error("event conflict: counters cannot be mapped to slots")]
    Conflict,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("event set already holds events of another component")]
    MixedComponents,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Rejections from control image validation. Nothing is written to
/// hardware when one of these is returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{count} counters requested, {max} available")]
    TooManyCounters { count: usize, max: usize },

    #[error("{counters} counters declared, {mapped} mapped to slots")]
    CountMismatch { mapped: usize, counters: usize },

    #[error("slot {0} does not exist")]
    SlotOutOfRange(usize),

    #[error("slot {0} assigned to more than one counter")]
    SlotReused(usize),

    #[error("event select {select:#x} of slot {slot} exceeds {max:#x}")]
    IllegalMode { slot: usize, select: u32, max: u32 },

    #[error("unused slot {0} has a non-zero event select")]
    UnusedSelect(usize),

    #[error("overflow interrupts enabled without an interrupt-mode counter")]
    NoInterruptCounter,

    #[error("interrupt-mode counters are not supported")]
    InterruptsUnsupported,

    #[error("reset value of slot {0} is within the overflow range")]
    BadResetValue(usize),
}
