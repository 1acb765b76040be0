use super::{Catalog, EventTable, Modifier};
use crate::error::Error;

fn catalog() -> Catalog<()> {
    let mut catalog = Catalog::new();
    for name in ["eth0:rx:bytes", "eth0:tx:bytes", "lo:rx:bytes"] {
        catalog.push(name, format!("{} desc", name), "bytes", ());
    }
    catalog
}

#[test]
fn test_enumerate_visits_every_code_once() {
    let catalog = catalog();
    let mut seen = vec![catalog.enumerate(0, Modifier::First).unwrap()];
    loop {
        match catalog.enumerate(*seen.last().unwrap(), Modifier::Next) {
            Ok(code) => seen.push(code),
            Err(Error::NoMoreEvents) => break,
            Err(e) => panic!("{}", e),
        }
    }
    assert_eq!(seen, vec![0, 1, 2]);
}

#[test]
fn test_enumerate_empty() {
    let catalog = Catalog::<()>::new();
    assert!(matches!(
        catalog.enumerate(0, Modifier::First),
        Err(Error::NoMoreEvents)
    ));
}

#[test]
fn test_enumerate_out_of_range() {
    let catalog = catalog();
    assert!(matches!(
        catalog.enumerate(7, Modifier::Next),
        Err(Error::UnknownEvent)
    ));
}

#[test]
fn test_name_round_trip() {
    let catalog = catalog();
    for (code, ev) in catalog.iter() {
        assert_eq!(catalog.name_to_code(&ev.name).unwrap(), code);
        assert_eq!(catalog.code_to_name(code).unwrap(), ev.name);
    }
}

#[test]
fn test_unknown_name() {
    let catalog = catalog();
    assert!(matches!(
        catalog.name_to_code("wlan0:rx:bytes"),
        Err(Error::UnknownEvent)
    ));
    assert!(matches!(catalog.code_to_descr(3), Err(Error::UnknownEvent)));
}

#[test]
fn test_duplicate_keeps_codes_dense() {
    let mut catalog = catalog();
    assert_eq!(catalog.push("lo:rx:bytes", "", "", ()), None);
    assert_eq!(catalog.push("lo:tx:bytes", "", "", ()), Some(3));
    assert_eq!(catalog.len(), 4);
}

#[test]
fn test_copy_name_truncates() {
    let catalog = catalog();
    let mut buf = [0xff; 8];
    let len = catalog.copy_name(0, &mut buf[..4]).unwrap();
    assert_eq!(len, 4);
    assert_eq!(&buf[..4], b"eth0");
    assert_eq!(buf[4], 0xff);
}

#[test]
fn test_code_to_info() {
    let catalog = catalog();
    let info = catalog.code_to_info(2).unwrap();
    assert_eq!(info.name, "lo:rx:bytes");
    assert_eq!(info.description, "lo:rx:bytes desc");
    assert_eq!(info.unit, "bytes");
}
