use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use super::{describe, discover_in};
use crate::component::{Component, Status};
use crate::event::EventTable;

fn port(root: &Path, hca: &str, port: u32, state: &str) -> PathBuf {
    let dir = root.join(hca).join("ports").join(port.to_string());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("state"), state).unwrap();
    dir
}

fn counter(port: &Path, sub: &str, file: &str, value: u64) {
    let dir = port.join(sub);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), format!("{}\n", value)).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let p1 = port(dir.path(), "mlx4_0", 1, "4: ACTIVE\n");
    counter(&p1, "counters_ext", "port_xmit_data_64", 1000);
    counter(&p1, "counters", "port_xmit_data", 500);
    counter(&p1, "counters", "symbol_error", 0);
    fs::write(p1.join("counters").join("broken"), "N/A\n").unwrap();
    fs::write(p1.join("counters").join(".hidden"), "1\n").unwrap();

    let p2 = port(dir.path(), "mlx4_0", 2, "1: DOWN\n");
    counter(&p2, "counters", "port_rcv_data", 7);
    dir
}

#[test]
fn test_describe() {
    assert_eq!(
        describe("port_xmit_data", true),
        "Port xmit data (free-running 64bit counter)."
    );
    assert_eq!(
        describe("symbol_error", false),
        "Symbol error (overflowing, auto-resetting counter)."
    );
}

#[test]
fn test_discover_active_ports_only() {
    let dir = fixture();
    let ib = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(ib.info().status, Status::Enabled);

    let events = ib.events();
    let names = (0..events.len() as u32)
        .map(|code| events.code_to_name(code).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "mlx4_0_1_ext:port_xmit_data_64",
            "mlx4_0_1:port_xmit_data",
            "mlx4_0_1:symbol_error",
        ]
    );
}

#[test]
fn test_disabled_reasons() {
    let dir = TempDir::new().unwrap();
    let ib = discover_in(&dir.path().join("infiniband"), Duration::ZERO);
    assert_eq!(
        ib.info().disabled_reason(),
        Some("Infiniband sysfs interface not found")
    );

    port(dir.path(), "mlx4_0", 1, "1: DOWN\n");
    let ib = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(
        ib.info().disabled_reason(),
        Some("No active Infiniband ports found")
    );

    port(dir.path(), "mlx4_1", 1, "4: ACTIVE\n");
    let ib = discover_in(dir.path(), Duration::ZERO);
    assert_eq!(
        ib.info().disabled_reason(),
        Some("No supported Infiniband events found")
    );
}

#[test]
fn test_short_counter_wraps_at_32_bits() {
    let dir = fixture();
    let p1 = dir.path().join("mlx4_0").join("ports").join("1");
    counter(&p1, "counters", "port_xmit_data", u32::MAX as u64 - 9);

    let ib = discover_in(dir.path(), Duration::ZERO);
    let short = ib.name_to_code("mlx4_0_1:port_xmit_data").unwrap();
    let ext = ib.name_to_code("mlx4_0_1_ext:port_xmit_data_64").unwrap();

    let mut ctx = ib.init_context();
    let mut ctl = ib.init_control();
    ib.update_control(&mut ctl, &[short, ext], &mut ctx).unwrap();
    ib.start(&mut ctx, &mut ctl).unwrap();

    counter(&p1, "counters", "port_xmit_data", 20);
    counter(&p1, "counters_ext", "port_xmit_data_64", 1500);
    // 10 counts up to the wrap, 20 after it.
    assert_eq!(ib.read(&mut ctx, &mut ctl).unwrap(), &[30, 500]);
    assert_eq!(ib.stop(&mut ctx, &mut ctl).unwrap(), &[30, 500]);
}
