//! Energy counters and limits of the power capping class.

use std::path::Path;
use std::time::Duration;

use super::{list_dir, read_line, read_value, FileEvent, Kind, Sysfs};
use crate::component::Info;
use crate::config::Opts;
use crate::count::Width;
use crate::event::{Catalog, EventTable};

pub const NAME: &str = "powercap";
const DESCRIPTION: &str = "Energy zones of the power capping framework";

const ZONE_PREFIX: &str = "intel-rapl:";

enum Value {
    Energy,
    Stone,
    Instant,
}

// Event prefix, backing file, unit and how it evolves.
const ZONE_FILES: [(&str, &str, &str, Value); 8] = [
    ("ENERGY_UJ", "energy_uj", "uJ", Value::Energy),
    ("MAX_ENERGY_RANGE_UJ", "max_energy_range_uj", "uJ", Value::Stone),
    ("MAX_POWER_A_UW", "constraint_0_max_power_uw", "uW", Value::Stone),
    ("POWER_LIMIT_A_UW", "constraint_0_power_limit_uw", "uW", Value::Instant),
    ("TIME_WINDOW_A_US", "constraint_0_time_window_us", "us", Value::Instant),
    ("MAX_POWER_B_UW", "constraint_1_max_power_uw", "uW", Value::Stone),
    ("POWER_LIMIT_B_UW", "constraint_1_power_limit_uw", "uW", Value::Instant),
    ("TIME_WINDOW_B_US", "constraint_1_time_window_us", "us", Value::Instant),
];

pub fn discover(opts: &Opts) -> Sysfs {
    discover_in(&opts.powercap_dir, opts.refresh.powercap)
}

pub fn discover_in(dir: &Path, latency: Duration) -> Sysfs {
    let zones = match list_dir(dir) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|it| Some((zone_label(&it)?, it)))
            .collect::<Vec<_>>(),
        Err(e) => {
            log::debug!("{}: {}", dir.display(), e);
            let info = Info::disabled(NAME, DESCRIPTION, format!("Cannot open {}", dir.display()));
            return Sysfs::new(info, Catalog::new(), latency);
        }
    };

    let mut catalog = Catalog::new();
    for (label, zone) in zones {
        let path = dir.join(&zone);
        let name = read_line(&path.join("name")).unwrap_or_else(|_| zone.clone());
        let range = read_value::<u64>(&path.join("max_energy_range_uj")).ok();

        for (event, file, unit, value) in &ZONE_FILES {
            let file = path.join(file);
            if let Err(e) = read_value::<u64>(&file) {
                log::debug!("skipping {}: {}", file.display(), e);
                continue;
            }
            let kind = match value {
                Value::Energy => match range {
                    Some(range) => Kind::Monotonic(Width::Range(range)),
                    None => Kind::Monotonic(Width::Bits(64)),
                },
                Value::Stone => Kind::stone(),
                Value::Instant => Kind::Instant,
            };
            catalog.push(
                format!("{}:{}", event, label),
                format!("{} of {} ({})", event.to_lowercase().replace('_', " "), name, zone),
                *unit,
                FileEvent::new(file, kind),
            );
        }

        let enabled = path.join("enabled");
        if read_value::<u64>(&enabled).is_ok() {
            catalog.push(
                format!("ENABLED:{}", label),
                format!("power capping enabled on {} ({})", name, zone),
                "",
                FileEvent::new(enabled, Kind::Instant),
            );
        }
    }

    let info = if catalog.is_empty() {
        Info::disabled(NAME, DESCRIPTION, "No powercap zones found")
    } else {
        Info::enabled(NAME, DESCRIPTION)
    };
    Sysfs::new(info, catalog, latency)
}

/// `intel-rapl:1` becomes `ZONE1`, `intel-rapl:1:0` becomes `ZONE1_SUBZONE0`.
pub fn zone_label(entry: &str) -> Option<String> {
    let ids = entry.strip_prefix(ZONE_PREFIX)?;
    match ids.split_once(':') {
        None => Some(format!("ZONE{}", ids.parse::<u32>().ok()?)),
        Some((zone, sub)) => Some(format!(
            "ZONE{}_SUBZONE{}",
            zone.parse::<u32>().ok()?,
            sub.parse::<u32>().ok()?
        )),
    }
}

#[cfg(test)]
mod test;
