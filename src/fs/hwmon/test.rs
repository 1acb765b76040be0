use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use super::discover_in;
use crate::component::{Component, Status};
use crate::event::EventTable;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let hwmon0 = dir.path().join("hwmon0");
    fs::create_dir(&hwmon0).unwrap();
    fs::write(hwmon0.join("name"), "coretemp\n").unwrap();
    fs::write(hwmon0.join("temp1_input"), "42000\n").unwrap();
    fs::write(hwmon0.join("temp1_label"), "Package id 0\n").unwrap();
    fs::write(hwmon0.join("temp1_max"), "90000\n").unwrap();
    fs::write(hwmon0.join("temp2_input"), "garbage\n").unwrap();
    fs::write(hwmon0.join("fan1_input"), "1200\n").unwrap();

    let hwmon1 = dir.path().join("hwmon1").join("device");
    fs::create_dir_all(&hwmon1).unwrap();
    fs::write(hwmon1.join("in0_input"), "912\n").unwrap();
    dir
}

fn write(dir: &Path, file: &str, value: &str) {
    fs::write(dir.join(file), value).unwrap();
}

#[test]
fn test_discover() {
    let dir = fixture();
    let hwmon = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(hwmon.info().status, Status::Enabled);

    let events = hwmon.events();
    let names = (0..events.len() as u32)
        .map(|code| events.code_to_name(code).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "hwmon0:temp1_input",
            "hwmon0:temp1_max",
            "hwmon0:fan1_input",
            "hwmon1:in0_input",
        ]
    );

    let code = events.name_to_code("hwmon0:temp1_input").unwrap();
    assert_eq!(
        events.code_to_descr(code).unwrap(),
        "millidegrees C, coretemp module, label Package id 0"
    );
    let code = events.name_to_code("hwmon1:in0_input").unwrap();
    assert_eq!(
        events.code_to_descr(code).unwrap(),
        "mV, Unknown module, label ?"
    );
}

#[test]
fn test_missing_dir() {
    let dir = TempDir::new().unwrap();
    let hwmon = discover_in(&dir.path().join("hwmon"), Duration::ZERO);
    assert!(hwmon.events().is_empty());
    let reason = hwmon.info().disabled_reason().unwrap();
    assert!(reason.starts_with("Cannot open"));
}

#[test]
fn test_no_sensors() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("hwmon0")).unwrap();
    let hwmon = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(
        hwmon.info().disabled_reason(),
        Some("No hwmon sensors found")
    );
}

#[test]
fn test_read_within_refresh_window() {
    let dir = fixture();
    let hwmon = discover_in(dir.path(), Duration::from_secs(3600));
    let code = hwmon.name_to_code("hwmon0:temp1_input").unwrap();

    let mut ctx = hwmon.init_context();
    let mut ctl = hwmon.init_control();
    hwmon.update_control(&mut ctl, &[code], &mut ctx).unwrap();
    hwmon.start(&mut ctx, &mut ctl).unwrap();

    let first = hwmon.read(&mut ctx, &mut ctl).unwrap().to_vec();
    write(&dir.path().join("hwmon0"), "temp1_input", "50000\n");
    let second = hwmon.read(&mut ctx, &mut ctl).unwrap().to_vec();
    assert_eq!(first, vec![42000]);
    assert_eq!(first, second);

    assert_eq!(hwmon.stop(&mut ctx, &mut ctl).unwrap(), &[50000]);
}

#[test]
fn test_read_after_refresh_window() {
    let dir = fixture();
    let hwmon = discover_in(dir.path(), Duration::ZERO);
    let code = hwmon.name_to_code("hwmon0:temp1_input").unwrap();

    let mut ctx = hwmon.init_context();
    let mut ctl = hwmon.init_control();
    hwmon.update_control(&mut ctl, &[code], &mut ctx).unwrap();
    hwmon.start(&mut ctx, &mut ctl).unwrap();

    assert_eq!(hwmon.read(&mut ctx, &mut ctl).unwrap(), &[42000]);
    write(&dir.path().join("hwmon0"), "temp1_input", "50000\n");
    assert_eq!(hwmon.read(&mut ctx, &mut ctl).unwrap(), &[50000]);
}

#[test]
fn test_stone_cached_forever() {
    let dir = fixture();
    let hwmon = discover_in(dir.path(), Duration::ZERO);
    let max = hwmon.name_to_code("hwmon0:temp1_max").unwrap();
    let fan = hwmon.name_to_code("hwmon0:fan1_input").unwrap();

    let mut ctx = hwmon.init_context();
    let mut ctl = hwmon.init_control();
    hwmon.update_control(&mut ctl, &[max, fan], &mut ctx).unwrap();
    hwmon.start(&mut ctx, &mut ctl).unwrap();
    assert_eq!(hwmon.read(&mut ctx, &mut ctl).unwrap(), &[90000, 1200]);

    write(&dir.path().join("hwmon0"), "temp1_max", "95000\n");
    write(&dir.path().join("hwmon0"), "fan1_input", "1500\n");
    assert_eq!(hwmon.read(&mut ctx, &mut ctl).unwrap(), &[90000, 1500]);
}

#[test]
fn test_vanished_sensor_reads_unavailable() {
    let dir = fixture();
    let hwmon = discover_in(dir.path(), Duration::ZERO);
    let code = hwmon.name_to_code("hwmon0:fan1_input").unwrap();

    let mut ctx = hwmon.init_context();
    let mut ctl = hwmon.init_control();
    hwmon.update_control(&mut ctl, &[code], &mut ctx).unwrap();
    hwmon.start(&mut ctx, &mut ctl).unwrap();

    fs::remove_file(dir.path().join("hwmon0").join("fan1_input")).unwrap();
    assert_eq!(
        hwmon.read(&mut ctx, &mut ctl).unwrap(),
        &[crate::event::UNAVAILABLE]
    );
}
