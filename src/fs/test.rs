use std::fs;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::{list_dir, read_line, read_value, Refresh};

#[test]
fn test_read_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("value");

    fs::write(&path, "4: ACTIVE\n").unwrap();
    assert_eq!(read_value::<u32>(&path).unwrap(), 4);

    fs::write(&path, "  -1500\n").unwrap();
    assert_eq!(read_value::<i64>(&path).unwrap(), -1500);

    fs::write(&path, "18446744073709551615\n").unwrap();
    assert_eq!(read_value::<u64>(&path).unwrap(), u64::MAX);

    fs::write(&path, "N/A\n").unwrap();
    assert!(read_value::<i64>(&path).is_err());

    assert!(read_value::<i64>(&dir.path().join("missing")).is_err());
}

#[test]
fn test_read_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("name");
    fs::write(&path, "package-0\nsecond line\n").unwrap();
    assert_eq!(read_line(&path).unwrap(), "package-0");
}

#[test]
fn test_list_dir() {
    let dir = TempDir::new().unwrap();
    for name in ["b", "a", ".hidden"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    assert_eq!(list_dir(dir.path()).unwrap(), vec!["a", "b"]);
}

#[test]
fn test_refresh() {
    let now = Instant::now();
    let mut refresh = Refresh::new(Duration::from_millis(10));
    assert!(refresh.due(now));

    refresh.touch(now);
    assert!(!refresh.due(now + Duration::from_millis(5)));
    assert!(refresh.due(now + Duration::from_millis(10)));

    refresh.expire();
    assert!(refresh.due(now));
}
