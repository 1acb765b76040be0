//! Virtualized performance counters behind one event interface.
//!
//! Every counter source is a [component][component::Component] with a
//! catalog of named events and the same start, read and stop operations.
//! Built-in components:
//!
//! - [`hwmon`][fs::hwmon], [`net`][fs::net], [`infiniband`][fs::infiniband]
//!   and [`powercap`][fs::powercap] sample files of pseudo filesystems.
//! - [`nvml`][dl::nvml] queries GPUs through vendor libraries loaded at
//!   runtime, nothing is linked at build time.
//! - [`appio`] counts the I/O calls of the host process.
//! - [`pmc`] virtualizes hardware counter registers over context switches,
//!   for any register backend implementing [`pmc::Registers`].
//!
//! ## Example
//!
//! Count bytes received on the loopback interface.
//!
//! ```rust,no_run
//! use vcounter::config::Opts;
//! use vcounter::count::Library;
//!
//! let lib = Library::with_defaults(&Opts::default());
//!
//! let mut set = lib.event_set();
//! set.add("net:::lo:rx:bytes").unwrap();
//! set.start().unwrap();
//! std::net::TcpStream::connect("127.0.0.1:22").ok();
//! let values = set.stop().unwrap();
//! println!("{} bytes received", values[0]);
//! ```
//!
//! Components whose counter domain is missing on the host stay registered
//! but disabled, with a reason and no events.
//!
//! ## Interposition
//!
//! With the `interpose` feature the crate exports `read`, `write`, `recv`,
//! `send`, `lseek`, `poll`, `open` and `close`, so a binary linking it has
//! its own I/O calls counted by [`appio`].

pub mod appio;
pub mod component;
pub mod config;
pub mod count;
pub mod dl;
pub mod error;
pub mod event;
mod ffi;
pub mod fs;
pub mod pmc;
