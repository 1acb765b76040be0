use std::collections::HashMap;

use crate::error::{Error, Result};

/// Dense, 0-based index into a component's catalog.
pub type EventCode = u32;

/// Value reported for a slot whose backing read failed.
///
/// Running sums are not advanced when a sample comes back as unavailable.
pub const UNAVAILABLE: i64 = i64::MIN;

/// Enumeration step, see [`Catalog::enumerate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modifier {
    First,
    Next,
}

/// A single countable metric exposed by one component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NativeEvent<R> {
    pub name: String,
    pub description: String,
    pub unit: String,
    /// Backing resource, e.g. a file path or a register selector.
    pub resource: R,
}

/// Owned copy of the descriptive part of a [`NativeEvent`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventInfo {
    pub code: EventCode,
    pub name: String,
    pub description: String,
    pub unit: String,
}

/// Object-safe view of a catalog, independent of its resource type.
pub trait EventTable {
    fn len(&self) -> usize;
    fn name(&self, code: EventCode) -> Option<&str>;
    fn description(&self, code: EventCode) -> Option<&str>;
    fn unit(&self, code: EventCode) -> Option<&str>;
    fn lookup(&self, name: &str) -> Option<EventCode>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stateless enumeration driven purely by `code`.
    ///
    /// `First` ignores `code` and yields the first event, `Next` yields the
    /// event after `code`. Both report [`Error::NoMoreEvents`] past the end.
    fn enumerate(&self, code: EventCode, modifier: Modifier) -> Result<EventCode> {
        let len = self.len();
        match modifier {
            Modifier::First if len > 0 => Ok(0),
            Modifier::First => Err(Error::NoMoreEvents),
            Modifier::Next => {
                let code = code as usize;
                if code >= len {
                    Err(Error::UnknownEvent)
                } else if code + 1 < len {
                    Ok(code as EventCode + 1)
                } else {
                    Err(Error::NoMoreEvents)
                }
            }
        }
    }

    fn code_to_name(&self, code: EventCode) -> Result<&str> {
        self.name(code).ok_or(Error::UnknownEvent)
    }

    fn code_to_descr(&self, code: EventCode) -> Result<&str> {
        self.description(code).ok_or(Error::UnknownEvent)
    }

    fn name_to_code(&self, name: &str) -> Result<EventCode> {
        self.lookup(name).ok_or(Error::UnknownEvent)
    }

    fn code_to_info(&self, code: EventCode) -> Result<EventInfo> {
        let name = self.code_to_name(code)?;
        Ok(EventInfo {
            code,
            name: name.to_string(),
            description: self.description(code).unwrap_or_default().to_string(),
            unit: self.unit(code).unwrap_or_default().to_string(),
        })
    }

    /// Copies the name of `code` into `buf`, truncating at a character
    /// boundary if needed. Returns the number of bytes written.
    fn copy_name(&self, code: EventCode, buf: &mut [u8]) -> Result<usize> {
        let name = self.code_to_name(code)?;
        let mut len = name.len().min(buf.len());
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Ok(len)
    }
}

/// Ordered table of native events, built once at discovery.
#[derive(Clone, Debug)]
pub struct Catalog<R> {
    events: Vec<NativeEvent<R>>,
    by_name: HashMap<String, EventCode>,
}

impl<R> Default for Catalog<R> {
    fn default() -> Self {
        Self {
            events: vec![],
            by_name: HashMap::new(),
        }
    }
}

impl<R> Catalog<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its code.
    ///
    /// A name that is already present is rejected with `None`, codes stay dense.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        resource: R,
    ) -> Option<EventCode> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            log::debug!("skipping duplicate event {}", name);
            return None;
        }
        let code = self.events.len() as EventCode;
        self.by_name.insert(name.clone(), code);
        self.events.push(NativeEvent {
            name,
            description: description.into(),
            unit: unit.into(),
            resource,
        });
        Some(code)
    }

    pub fn get(&self, code: EventCode) -> Result<&NativeEvent<R>> {
        self.events.get(code as usize).ok_or(Error::UnknownEvent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventCode, &NativeEvent<R>)> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, ev)| (i as EventCode, ev))
    }
}

impl<R> EventTable for Catalog<R> {
    fn len(&self) -> usize {
        self.events.len()
    }

    fn name(&self, code: EventCode) -> Option<&str> {
        self.events.get(code as usize).map(|ev| ev.name.as_str())
    }

    fn description(&self, code: EventCode) -> Option<&str> {
        self.events
            .get(code as usize)
            .map(|ev| ev.description.as_str())
    }

    fn unit(&self, code: EventCode) -> Option<&str> {
        self.events.get(code as usize).map(|ev| ev.unit.as_str())
    }

    fn lookup(&self, name: &str) -> Option<EventCode> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod test;
