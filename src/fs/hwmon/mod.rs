//! Temperature, voltage and fan sensors of the hardware monitor class.

use std::io::Result;
use std::path::Path;
use std::time::Duration;

use super::{list_dir, read_line, read_value, FileEvent, Kind, Sysfs};
use crate::component::Info;
use crate::config::Opts;
use crate::event::{Catalog, EventTable};

pub const NAME: &str = "hwmon";
const DESCRIPTION: &str = "Hardware monitor sensors (temperature, voltage, fan)";

// Channel prefix and the unit of its `_input` files.
const CHANNELS: [(&str, &str); 3] = [("in", "mV"), ("temp", "millidegrees C"), ("fan", "RPM")];

const MAX_CHANNELS: usize = 32;

// Thresholds set by firmware, constant while the module is loaded.
const TEMP_LIMITS: [&str; 2] = ["max", "crit"];

pub fn discover(opts: &Opts) -> Sysfs {
    discover_in(&opts.hwmon_dir, opts.refresh.hwmon)
}

pub fn discover_in(dir: &Path, latency: Duration) -> Sysfs {
    let (info, catalog) = match scan(dir) {
        Ok(catalog) if !catalog.is_empty() => (Info::enabled(NAME, DESCRIPTION), catalog),
        Ok(catalog) => (
            Info::disabled(NAME, DESCRIPTION, "No hwmon sensors found"),
            catalog,
        ),
        Err(e) => {
            log::debug!("{}: {}", dir.display(), e);
            (
                Info::disabled(NAME, DESCRIPTION, format!("Cannot open {}", dir.display())),
                Catalog::new(),
            )
        }
    };
    Sysfs::new(info, catalog, latency)
}

fn scan(dir: &Path) -> Result<Catalog<FileEvent>> {
    let mut catalog = Catalog::new();

    for module in list_dir(dir)?.iter().filter(|it| it.starts_with("hwmon")) {
        // Older drivers keep their files under `device`.
        for sub in ["device", "."] {
            let path = dir.join(module).join(sub);
            if !path.is_dir() {
                continue;
            }
            let name = read_line(&path.join("name")).unwrap_or_else(|_| "Unknown".to_string());

            for (ch, unit) in CHANNELS {
                for i in 0..MAX_CHANNELS {
                    let input = path.join(format!("{}{}_input", ch, i));
                    if let Err(e) = read_value::<i64>(&input) {
                        if input.exists() {
                            log::debug!("skipping {}: {}", input.display(), e);
                        }
                        continue;
                    }
                    let label = read_line(&path.join(format!("{}{}_label", ch, i)))
                        .unwrap_or_else(|_| "?".to_string());
                    let description = format!("{}, {} module, label {}", unit, name, label);

                    catalog.push(
                        format!("{}:{}{}_input", module, ch, i),
                        &description,
                        unit,
                        FileEvent::new(input, Kind::Instant),
                    );

                    if ch != "temp" {
                        continue;
                    }
                    for limit in TEMP_LIMITS {
                        let file = path.join(format!("temp{}_{}", i, limit));
                        if read_value::<i64>(&file).is_ok() {
                            catalog.push(
                                format!("{}:temp{}_{}", module, i, limit),
                                format!("{}, {} threshold", description, limit),
                                unit,
                                FileEvent::new(file, Kind::stone()),
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(catalog)
}

#[cfg(test)]
mod test;
