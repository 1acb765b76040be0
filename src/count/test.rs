use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::appio;
use crate::config::Opts;
use crate::pmc::{EventDef, Global, PmcComponent, PmuDesc, Registers};

#[test]
fn test_delta_no_wrap() {
    assert_eq!(delta(10, 25, Width::Bits(32)), 15);
    assert_eq!(delta(7, 7, Width::Range(100)), 0);
}

#[test]
fn test_delta_wraps_once() {
    let old = u32::MAX as u64 - 9;
    assert_eq!(delta(old, 5, Width::Bits(32)), (1 << 32) - old + 5);
    assert_eq!(delta(u64::MAX - 1, 3, Width::Bits(64)), 5);
    assert_eq!(delta(90, 15, Width::Range(100)), 25);
}

#[test]
fn test_width() {
    assert!(Width::Bits(32).is_negative(0x8000_0000));
    assert!(!Width::Bits(32).is_negative(0x7fff_ffff));
    assert!(!Width::Range(100).is_negative(99));
    assert_eq!(Width::Bits(16).mask(0x12345), 0x2345);
    assert_eq!(Width::Range(100).mask(250), 50);
}

fn write_net(path: &Path, lo_rx: u64) {
    let text = format!(
        "Inter-|   Receive\n face |bytes\n    lo: {} 1 0 0 0 0 0 0 0 1 0 0 0 0 0 0\n",
        lo_rx
    );
    fs::write(path, text).unwrap();
}

fn fixture(dir: &TempDir) -> Opts {
    let net_dev = dir.path().join("dev");
    write_net(&net_dev, 100);
    Opts {
        hwmon_dir: dir.path().join("no-hwmon"),
        net_dev,
        infiniband_dir: dir.path().join("no-infiniband"),
        powercap_dir: dir.path().join("no-powercap"),
        refresh: crate::config::Refresh {
            net: Duration::ZERO,
            ..Default::default()
        },
        ..Opts::default()
    }
}

fn library(opts: &Opts) -> Library {
    let mut lib = Library::new();
    lib.register(hwmon::discover(opts));
    lib.register(net::Net::discover(opts));
    lib.register(Appio::new());
    lib
}

#[test]
fn test_missing_domain_stays_registered() {
    let dir = TempDir::new().unwrap();
    let opts = fixture(&dir);
    let lib = library(&opts);

    assert_eq!(lib.len(), 3);
    let infos = lib.components().map(|(_, it)| it.clone()).collect::<Vec<_>>();
    assert_eq!(infos[0].name, hwmon::NAME);
    assert!(infos[0].disabled_reason().is_some());
    assert_eq!(lib.events(0).unwrap().len(), 0);
    assert_eq!(infos[1].status, Status::Enabled);
    assert_eq!(lib.events(1).unwrap().len(), net::COUNTERS.len());

    let mut set = lib.event_set();
    assert!(matches!(
        set.add("hwmon:::hwmon0:temp1_input"),
        Err(Error::UnknownEvent)
    ));
    assert!(matches!(set.add_code(0, 0), Err(Error::Disabled(_))));
    assert!(set.codes().is_empty());
}

#[test]
fn test_event_code_lookup() {
    let dir = TempDir::new().unwrap();
    let opts = fixture(&dir);
    let lib = library(&opts);

    assert_eq!(lib.event_code("net:::lo:rx:bytes").unwrap(), (1, 0));
    assert_eq!(lib.event_code("lo:tx:bytes").unwrap(), (1, 8));
    assert_eq!(lib.event_name(1, 8).unwrap(), "lo:tx:bytes");

    let code = appio::Counter::ReadBytes as EventCode;
    assert_eq!(lib.event_code("appio:::READ_BYTES").unwrap(), (2, code));
    assert!(matches!(
        lib.event_code("net:::eth7:rx:bytes"),
        Err(Error::UnknownEvent)
    ));
    assert!(matches!(
        lib.event_code("nope:::lo:rx:bytes"),
        Err(Error::UnknownEvent)
    ));
    assert!(matches!(lib.event_code("nothing"), Err(Error::UnknownEvent)));
}

#[test]
fn test_event_set_lifecycle() {
    let dir = TempDir::new().unwrap();
    let opts = fixture(&dir);
    let lib = library(&opts);

    let mut set = lib.event_set();
    assert!(matches!(set.start(), Err(Error::InvalidState(_))));
    assert!(matches!(set.read(), Err(Error::InvalidState(_))));

    let rx = set.add("net:::lo:rx:bytes").unwrap();
    set.add("lo:rx:packets").unwrap();
    assert_eq!(set.component(), Some(1));
    assert!(matches!(
        set.add("net:::lo:rx:bytes"),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        set.add("appio:::READ_CALLS"),
        Err(Error::MixedComponents)
    ));

    set.start().unwrap();
    assert!(set.is_running());
    assert!(matches!(set.add("lo:tx:bytes"), Err(Error::InvalidState(_))));
    assert!(matches!(set.start(), Err(Error::InvalidState(_))));

    write_net(&opts.net_dev, 160);
    assert_eq!(set.read().unwrap(), [60, 0]);
    assert_eq!(set.stop().unwrap(), [60, 0]);
    assert!(!set.is_running());

    set.remove(rx).unwrap();
    assert_eq!(set.codes().len(), 1);
    assert!(matches!(set.remove(rx), Err(Error::UnknownEvent)));
}

#[derive(Default)]
struct Quiet;

impl Registers for Quiet {
    fn read_pmc(&mut self, _: usize) -> u64 {
        0
    }

    fn write_pmc(&mut self, _: usize, _: u64) {}

    fn write_select(&mut self, _: usize, _: u32) {}

    fn write_global(&mut self, _: Global) {}

    fn read_timebase(&mut self) -> u64 {
        0
    }
}

#[test]
fn test_event_set_over_registers() {
    let desc = PmuDesc {
        nr_pmcs: 2,
        width: 32,
        max_select: [0xf; 2].into_iter().collect(),
        interrupts: false,
    };
    let events = vec![
        EventDef {
            name: "CYCLES".to_string(),
            description: "Processor cycles".to_string(),
            select: 1,
            slots: 0b01,
        },
        EventDef {
            name: "BRANCHES".to_string(),
            description: "Branches taken".to_string(),
            select: 2,
            slots: 0b01,
        },
    ];
    let mut lib = Library::new();
    let cidx = lib.register(PmcComponent::new(desc, events, vec![Quiet]));

    let mut set = lib.event_set();
    set.add_code(cidx, 0).unwrap();
    assert!(matches!(set.add_code(cidx, 1), Err(Error::Conflict)));
    assert_eq!(set.codes(), [0]);

    set.start().unwrap();
    set.suspend().unwrap();
    set.resume().unwrap();
    assert_eq!(set.overflow().unwrap(), 0);
    assert_eq!(set.stop().unwrap(), [0]);
}

#[test]
fn test_failed_first_add_leaves_set_unbound() {
    let dir = TempDir::new().unwrap();
    let opts = fixture(&dir);
    let desc = PmuDesc {
        nr_pmcs: 2,
        width: 32,
        max_select: [0xf; 2].into_iter().collect(),
        interrupts: false,
    };
    let events = vec![EventDef {
        name: "WIDE".to_string(),
        description: "Select beyond every slot".to_string(),
        select: 0x100,
        slots: 0b11,
    }];
    let mut lib = Library::new();
    let pmc = lib.register(PmcComponent::new(desc, events, vec![Quiet]));
    let net = lib.register(net::Net::discover(&opts));

    let mut set = lib.event_set();
    assert!(set.add_code(pmc, 0).is_err());
    assert_eq!(set.component(), None);
    assert!(set.codes().is_empty());

    // The set takes states of the net component, not leftovers.
    set.add("net:::lo:rx:bytes").unwrap();
    assert_eq!(set.component(), Some(net));
    set.start().unwrap();
    write_net(&opts.net_dev, 130);
    assert_eq!(set.stop().unwrap(), [30]);
}
