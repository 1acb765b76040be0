use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use super::{discover_in, zone_label};
use crate::component::{Component, Status};

fn zone(root: &Path, entry: &str, name: &str, energy: u64) {
    let dir = root.join(entry);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
    fs::write(dir.join("energy_uj"), format!("{}\n", energy)).unwrap();
    fs::write(dir.join("max_energy_range_uj"), "262143328850\n").unwrap();
    fs::write(dir.join("constraint_0_power_limit_uw"), "15000000\n").unwrap();
    fs::write(dir.join("enabled"), "1\n").unwrap();
}

#[test]
fn test_zone_label() {
    assert_eq!(zone_label("intel-rapl:0").as_deref(), Some("ZONE0"));
    assert_eq!(
        zone_label("intel-rapl:0:2").as_deref(),
        Some("ZONE0_SUBZONE2")
    );
    assert_eq!(zone_label("intel-rapl"), None);
    assert_eq!(zone_label("intel-rapl:x"), None);
}

#[test]
fn test_discover() {
    let dir = TempDir::new().unwrap();
    zone(dir.path(), "intel-rapl:0", "package-0", 1000);
    zone(dir.path(), "intel-rapl:0:0", "core", 10);
    fs::create_dir(dir.path().join("intel-rapl")).unwrap();

    let powercap = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(powercap.info().status, Status::Enabled);
    for name in [
        "ENERGY_UJ:ZONE0",
        "MAX_ENERGY_RANGE_UJ:ZONE0",
        "POWER_LIMIT_A_UW:ZONE0",
        "ENABLED:ZONE0",
        "ENERGY_UJ:ZONE0_SUBZONE0",
    ] {
        powercap.name_to_code(name).unwrap();
    }
    assert!(powercap.name_to_code("MAX_POWER_A_UW:ZONE0").is_err());

    let code = powercap.name_to_code("ENERGY_UJ:ZONE0").unwrap();
    assert_eq!(
        powercap.code_to_descr(code).unwrap(),
        "energy uj of package-0 (intel-rapl:0)"
    );
}

#[test]
fn test_no_zones() {
    let dir = TempDir::new().unwrap();
    let powercap = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(
        powercap.info().disabled_reason(),
        Some("No powercap zones found")
    );
}

#[test]
fn test_energy_wraps_at_range() {
    let dir = TempDir::new().unwrap();
    let range = 262143328850u64;
    zone(dir.path(), "intel-rapl:0", "package-0", range - 1000);

    let powercap = discover_in(dir.path(), Duration::ZERO);
    let energy = powercap.name_to_code("ENERGY_UJ:ZONE0").unwrap();
    let limit = powercap.name_to_code("POWER_LIMIT_A_UW:ZONE0").unwrap();

    let mut ctx = powercap.init_context();
    let mut ctl = powercap.init_control();
    powercap
        .update_control(&mut ctl, &[energy, limit], &mut ctx)
        .unwrap();
    powercap.start(&mut ctx, &mut ctl).unwrap();

    fs::write(dir.path().join("intel-rapl:0").join("energy_uj"), "500\n").unwrap();
    assert_eq!(
        powercap.stop(&mut ctx, &mut ctl).unwrap(),
        &[1500, 15000000]
    );
}
