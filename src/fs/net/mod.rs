//! Interface statistics of the network stack.

use std::collections::HashMap;
use std::fs;
use std::io::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::Refresh;
use crate::component::{Component, Info};
use crate::config::Opts;
use crate::count::{delta, Width};
use crate::error;
use crate::event::{Catalog, EventCode, EventTable, UNAVAILABLE};

pub const NAME: &str = "net";
const DESCRIPTION: &str = "Network interface statistics";

/// Counters of one interface line, in column order.
pub const COUNTERS: [(&str, &str); 16] = [
    ("rx:bytes", "receive bytes"),
    ("rx:packets", "receive packets"),
    ("rx:errors", "receive errors"),
    ("rx:dropped", "receive dropped"),
    ("rx:fifo", "receive fifo"),
    ("rx:frame", "receive frame"),
    ("rx:compressed", "receive compressed"),
    ("rx:multicast", "receive multicast"),
    ("tx:bytes", "transmit bytes"),
    ("tx:packets", "transmit packets"),
    ("tx:errors", "transmit errors"),
    ("tx:dropped", "transmit dropped"),
    ("tx:fifo", "transmit fifo"),
    ("tx:colls", "transmit colls"),
    ("tx:carrier", "transmit carrier"),
    ("tx:compressed", "transmit compressed"),
];

pub type Stats = [u64; COUNTERS.len()];

/// Parses the statistics file: two header lines, then `iface: c0 c1 ... c15`.
///
/// Lines that do not carry sixteen counters are skipped.
pub fn parse(text: &str) -> Vec<(String, Stats)> {
    text.lines()
        .skip(2)
        .filter_map(|line| {
            let (iface, data) = line.split_once(':')?;
            let mut stats = [0; COUNTERS.len()];
            let mut fields = data.split_whitespace();
            for slot in stats.iter_mut() {
                *slot = fields.next()?.parse().ok()?;
            }
            Some((iface.trim().to_string(), stats))
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct Counter {
    pub iface: String,
    pub index: usize,
}

pub struct Net {
    info: Info,
    catalog: Catalog<Counter>,
    path: PathBuf,
    latency: Duration,
    width: Width,
}

pub struct NetContext {
    start: Vec<Option<u64>>,
}

pub struct NetControl {
    codes: Vec<EventCode>,
    values: Vec<i64>,
    refresh: Refresh,
}

impl Net {
    pub fn discover(opts: &Opts) -> Self {
        Self::discover_in(&opts.net_dev, opts.refresh.net, opts.net_width)
    }

    pub fn discover_in(path: &Path, latency: Duration, width: u32) -> Self {
        let mut catalog = Catalog::new();
        let info = match fs::read_to_string(path) {
            Ok(text) => {
                for (iface, _) in parse(&text) {
                    for (index, (counter, description)) in COUNTERS.iter().enumerate() {
                        let unit = if counter.ends_with("bytes") { "bytes" } else { "" };
                        catalog.push(
                            format!("{}:{}", iface, counter),
                            format!("{} {}", iface, description),
                            unit,
                            Counter {
                                iface: iface.clone(),
                                index,
                            },
                        );
                    }
                }
                if catalog.is_empty() {
                    Info::disabled(NAME, DESCRIPTION, "No network interfaces found")
                } else {
                    Info::enabled(NAME, DESCRIPTION)
                }
            }
            Err(e) => {
                log::debug!("{}: {}", path.display(), e);
                Info::disabled(NAME, DESCRIPTION, format!("Cannot open {}", path.display()))
            }
        };

        Self {
            info,
            catalog,
            path: path.to_path_buf(),
            latency,
            width: Width::Bits(width),
        }
    }

    fn stats(&self) -> Result<HashMap<String, Stats>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(parse(&text).into_iter().collect())
    }

    fn raw(&self, stats: &HashMap<String, Stats>, code: EventCode) -> error::Result<Option<u64>> {
        let counter = &self.catalog.get(code)?.resource;
        Ok(stats.get(&counter.iface).map(|it| it[counter.index]))
    }

    fn snapshot(&self, ctx: &mut NetContext, ctl: &mut NetControl) -> error::Result<()> {
        let stats = self.stats().unwrap_or_else(|e| {
            log::debug!("{}: {}", self.path.display(), e);
            HashMap::new()
        });
        for (code, value) in ctl.codes.iter().zip(ctl.values.iter_mut()) {
            ctx.start[*code as usize] = self.raw(&stats, *code)?;
            *value = 0;
        }
        Ok(())
    }

    fn sample(&self, ctx: &mut NetContext, ctl: &mut NetControl) -> error::Result<()> {
        let stats = self.stats().unwrap_or_else(|e| {
            log::debug!("{}: {}", self.path.display(), e);
            HashMap::new()
        });
        for (code, value) in ctl.codes.iter().zip(ctl.values.iter_mut()) {
            let start = &mut ctx.start[*code as usize];
            *value = match (self.raw(&stats, *code)?, *start) {
                (Some(now), Some(start)) => delta(start, now, self.width) as i64,
                (Some(now), None) => {
                    *start = Some(now);
                    0
                }
                (None, _) => UNAVAILABLE,
            };
        }
        Ok(())
    }
}

impl Component for Net {
    type Context = NetContext;
    type Control = NetControl;

    fn info(&self) -> &Info {
        &self.info
    }

    fn events(&self) -> &dyn EventTable {
        &self.catalog
    }

    fn init_context(&self) -> NetContext {
        NetContext {
            start: vec![None; self.catalog.len()],
        }
    }

    fn init_control(&self) -> NetControl {
        NetControl {
            codes: vec![],
            values: vec![],
            refresh: Refresh::new(self.latency),
        }
    }

    fn update_control(
        &self,
        ctl: &mut NetControl,
        codes: &[EventCode],
        _: &mut NetContext,
    ) -> error::Result<()> {
        for code in codes {
            self.catalog.get(*code)?;
        }
        ctl.codes = codes.to_vec();
        ctl.values = vec![0; codes.len()];
        ctl.refresh.expire();
        Ok(())
    }

    fn start(&self, ctx: &mut NetContext, ctl: &mut NetControl) -> error::Result<()> {
        self.snapshot(ctx, ctl)?;
        ctl.refresh.touch(Instant::now());
        Ok(())
    }

    fn stop<'a>(&self, ctx: &mut NetContext, ctl: &'a mut NetControl) -> error::Result<&'a [i64]> {
        self.sample(ctx, ctl)?;
        ctl.refresh.touch(Instant::now());
        Ok(&ctl.values)
    }

    fn read<'a>(&self, ctx: &mut NetContext, ctl: &'a mut NetControl) -> error::Result<&'a [i64]> {
        let now = Instant::now();
        if ctl.refresh.due(now) {
            self.sample(ctx, ctl)?;
            ctl.refresh.touch(now);
        }
        Ok(&ctl.values)
    }

    fn reset(&self, ctx: &mut NetContext, ctl: &mut NetControl) -> error::Result<()> {
        self.start(ctx, ctl)
    }
}
