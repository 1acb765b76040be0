//! Port counters of fabric host channel adapters.

use std::io::Result;
use std::path::Path;
use std::time::Duration;

use super::{list_dir, read_value, FileEvent, Kind, Sysfs};
use crate::component::Info;
use crate::config::Opts;
use crate::count::Width;
use crate::event::{Catalog, EventTable};

pub const NAME: &str = "infiniband";
const DESCRIPTION: &str = "Infiniband port counters";

// `ports/N/state` reads `4: ACTIVE` for a port that is up.
const PORT_ACTIVE: i32 = 4;

// Extended counters are free-running 64-bit values, the classic ones are
// 32-bit and reset by the subnet manager.
const COUNTER_DIRS: [(&str, bool); 2] = [("counters_ext", true), ("counters", false)];

pub fn discover(opts: &Opts) -> Sysfs {
    discover_in(&opts.infiniband_dir, opts.refresh.infiniband)
}

pub fn discover_in(dir: &Path, latency: Duration) -> Sysfs {
    let ports = match active_ports(dir) {
        Ok(ports) => ports,
        Err(e) => {
            log::debug!("{}: {}", dir.display(), e);
            let info = Info::disabled(NAME, DESCRIPTION, "Infiniband sysfs interface not found");
            return Sysfs::new(info, Catalog::new(), latency);
        }
    };
    if ports.is_empty() {
        let info = Info::disabled(NAME, DESCRIPTION, "No active Infiniband ports found");
        return Sysfs::new(info, Catalog::new(), latency);
    }

    let mut catalog = Catalog::new();
    for (hca, port) in ports {
        for (sub, extended) in COUNTER_DIRS {
            let path = dir
                .join(&hca)
                .join("ports")
                .join(port.to_string())
                .join(sub);
            let Ok(files) = list_dir(&path) else {
                continue;
            };
            for file in files {
                let counter = path.join(&file);
                if let Err(e) = read_value::<u64>(&counter) {
                    log::debug!("cannot read value for event {}: {}", counter.display(), e);
                    continue;
                }
                let (suffix, width) = if extended {
                    ("_ext", Width::Bits(64))
                } else {
                    ("", Width::Bits(32))
                };
                catalog.push(
                    format!("{}_{}{}:{}", hca, port, suffix, file),
                    describe(&file, extended),
                    "",
                    FileEvent::new(counter, Kind::Monotonic(width)),
                );
            }
        }
    }

    let info = if catalog.is_empty() {
        Info::disabled(NAME, DESCRIPTION, "No supported Infiniband events found")
    } else {
        Info::enabled(NAME, DESCRIPTION)
    };
    Sysfs::new(info, catalog, latency)
}

fn active_ports(dir: &Path) -> Result<Vec<(String, u32)>> {
    let mut active = vec![];
    for hca in list_dir(dir)? {
        let ports = dir.join(&hca).join("ports");
        let Ok(entries) = list_dir(&ports) else {
            log::debug!("cannot open ports of {}", hca);
            continue;
        };
        let mut numbers = entries
            .iter()
            .filter_map(|it| it.parse::<u32>().ok())
            .filter(|it| *it > 0)
            .collect::<Vec<_>>();
        numbers.sort();
        for port in numbers {
            match read_value::<i32>(&ports.join(port.to_string()).join("state")) {
                Ok(PORT_ACTIVE) => active.push((hca.clone(), port)),
                Ok(state) => log::debug!("skipping inactive {} port {}, state {}", hca, port, state),
                Err(e) => log::debug!("cannot read state of {} port {}: {}", hca, port, e),
            }
        }
    }
    Ok(active)
}

/// `port_xmit_data` becomes `Port xmit data (free-running 64bit counter).`
pub fn describe(file: &str, extended: bool) -> String {
    let kind = if extended {
        "free-running 64bit counter"
    } else {
        "overflowing, auto-resetting counter"
    };
    let mut chars = file.replace('_', " ").chars().collect::<Vec<_>>();
    if let Some(first) = chars.first_mut() {
        first.make_ascii_uppercase();
    }
    format!("{} ({}).", chars.into_iter().collect::<String>(), kind)
}

#[cfg(test)]
mod test;
