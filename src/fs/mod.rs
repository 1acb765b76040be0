//! Components backed by files of pseudo filesystems.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::component::{Component, Info};
use crate::count::{delta, Width};
use crate::error;
use crate::event::{Catalog, EventCode, EventTable, UNAVAILABLE};

pub mod hwmon;
pub mod infiniband;
pub mod net;
pub mod powercap;

/// Parses the leading integer of the first line of `path`.
///
/// Trailing text is ignored, e.g. `4: ACTIVE` reads as `4`.
pub fn read_value<T>(path: &Path) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let line = read_line(path)?;
    let line = line.trim_start();
    let end = line
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(line.len(), |(i, _)| i);
    let digits = &line[..end];
    if digits.is_empty() || digits == "-" {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("{} holds no integer", path.display()),
        ));
    }
    digits.parse::<T>().map_err(Error::other)
}

/// First line of `path` without the line break.
pub fn read_line(path: &Path) -> Result<String> {
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    let len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(len);
    Ok(line)
}

/// Entry names of `dir` in lexical order, dot files excluded.
pub fn list_dir(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .filter_map(|it| it.ok())
        .filter_map(|it| it.file_name().into_string().ok())
        .filter(|it| !it.starts_with('.'))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Tracks when a cached sample was taken.
#[derive(Clone, Debug)]
pub struct Refresh {
    latency: Duration,
    last: Option<Instant>,
}

impl Refresh {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            last: None,
        }
    }

    /// Whether the cached sample is older than the latency window.
    pub fn due(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.latency)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn expire(&mut self) {
        self.last = None;
    }
}

/// How the value of a [`FileEvent`] evolves.
#[derive(Debug)]
pub enum Kind {
    /// Absolute sample, reported as read.
    Instant,
    /// Constant, read once and cached for the lifetime of the catalog.
    Stone(OnceLock<i64>),
    /// Increasing counter, reported as the difference to the start snapshot.
    Monotonic(Width),
}

impl Kind {
    pub fn stone() -> Self {
        Self::Stone(OnceLock::new())
    }
}

/// Resource of an event backed by one file.
#[derive(Debug)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: Kind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: Kind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Component with one file per event.
pub struct Sysfs {
    info: Info,
    catalog: Catalog<FileEvent>,
    latency: Duration,
}

pub struct SysfsContext {
    start: Vec<Option<u64>>,
}

pub struct SysfsControl {
    codes: Vec<EventCode>,
    values: Vec<i64>,
    refresh: Refresh,
}

impl Sysfs {
    pub fn new(info: Info, catalog: Catalog<FileEvent>, latency: Duration) -> Self {
        Self {
            info,
            catalog,
            latency,
        }
    }

    pub fn catalog(&self) -> &Catalog<FileEvent> {
        &self.catalog
    }

    fn snapshot(&self, ctx: &mut SysfsContext, ctl: &mut SysfsControl) -> error::Result<()> {
        for (code, value) in ctl.codes.iter().zip(ctl.values.iter_mut()) {
            let ev = &self.catalog.get(*code)?.resource;
            if let Kind::Monotonic(_) = ev.kind {
                ctx.start[*code as usize] = read_value::<u64>(&ev.path)
                    .inspect_err(|e| log::debug!("{}: {}", ev.path.display(), e))
                    .ok();
                *value = 0;
            }
        }
        Ok(())
    }

    fn sample(&self, ctx: &mut SysfsContext, ctl: &mut SysfsControl) -> error::Result<()> {
        for (code, value) in ctl.codes.iter().zip(ctl.values.iter_mut()) {
            let ev = &self.catalog.get(*code)?.resource;
            *value = match &ev.kind {
                Kind::Instant => read_value::<i64>(&ev.path).unwrap_or_else(|e| {
                    log::debug!("{}: {}", ev.path.display(), e);
                    UNAVAILABLE
                }),
                Kind::Stone(cell) => match cell.get() {
                    Some(v) => *v,
                    None => match read_value::<i64>(&ev.path) {
                        Ok(v) => *cell.get_or_init(|| v),
                        Err(e) => {
                            log::debug!("{}: {}", ev.path.display(), e);
                            UNAVAILABLE
                        }
                    },
                },
                Kind::Monotonic(width) => {
                    let start = &mut ctx.start[*code as usize];
                    match (read_value::<u64>(&ev.path), *start) {
                        (Ok(now), Some(start)) => delta(start, now, *width) as i64,
                        // The start snapshot failed, count from here on.
                        (Ok(now), None) => {
                            *start = Some(now);
                            0
                        }
                        (Err(e), _) => {
                            log::debug!("{}: {}", ev.path.display(), e);
                            UNAVAILABLE
                        }
                    }
                }
            };
        }
        Ok(())
    }
}

impl Component for Sysfs {
    type Context = SysfsContext;
    type Control = SysfsControl;

    fn info(&self) -> &Info {
        &self.info
    }

    fn events(&self) -> &dyn EventTable {
        &self.catalog
    }

    fn init_context(&self) -> SysfsContext {
        SysfsContext {
            start: vec![None; self.catalog.len()],
        }
    }

    fn init_control(&self) -> SysfsControl {
        SysfsControl {
            codes: vec![],
            values: vec![],
            refresh: Refresh::new(self.latency),
        }
    }

    fn update_control(
        &self,
        ctl: &mut SysfsControl,
        codes: &[EventCode],
        _: &mut SysfsContext,
    ) -> error::Result<()> {
        for code in codes {
            self.catalog.get(*code)?;
        }
        ctl.codes = codes.to_vec();
        ctl.values = vec![0; codes.len()];
        ctl.refresh.expire();
        Ok(())
    }

    fn start(&self, ctx: &mut SysfsContext, ctl: &mut SysfsControl) -> error::Result<()> {
        self.snapshot(ctx, ctl)?;
        self.sample(ctx, ctl)?;
        ctl.refresh.touch(Instant::now());
        Ok(())
    }

    fn stop<'a>(&self, ctx: &mut SysfsContext, ctl: &'a mut SysfsControl) -> error::Result<&'a [i64]> {
        self.sample(ctx, ctl)?;
        ctl.refresh.touch(Instant::now());
        Ok(&ctl.values)
    }

    fn read<'a>(&self, ctx: &mut SysfsContext, ctl: &'a mut SysfsControl) -> error::Result<&'a [i64]> {
        let now = Instant::now();
        if ctl.refresh.due(now) {
            self.sample(ctx, ctl)?;
            ctl.refresh.touch(now);
        }
        Ok(&ctl.values)
    }

    fn reset(&self, ctx: &mut SysfsContext, ctl: &mut SysfsControl) -> error::Result<()> {
        self.snapshot(ctx, ctl)?;
        ctl.refresh.touch(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod test;
