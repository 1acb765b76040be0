//! Instrumented system calls.
//!
//! Each call is forwarded to the real one and its outcome is folded into
//! the calling thread's statistics.

use std::ffi::CStr;
use std::io::Result;
use std::os::fd::RawFd;

use libc::{c_int, pollfd};

use super::stats::{self, Transfer, READ, RECV, SEND, SOCK_READ, SOCK_WRITE, WRITE};
use crate::ffi::real_usec;
use crate::ffi::syscall;

fn timed<T>(call: impl FnOnce() -> T) -> (T, i64) {
    let start = real_usec();
    let result = call();
    (result, real_usec() - start)
}

fn record(families: &[&Transfer], blocked: bool, requested: usize, result: &Result<usize>, usec: i64) {
    stats::update(|stats| {
        for t in families {
            if blocked {
                stats.blocked(t);
            }
            stats.transfer(t, requested, result, usec);
        }
    });
}

/// # Safety
///
/// `buf` must be valid for writes of `count` bytes.
pub unsafe fn read_raw(fd: RawFd, buf: *mut u8, count: usize) -> Result<usize> {
    let socket = syscall::is_socket(fd);
    let blocked = syscall::would_block(fd, libc::POLLIN);
    let (result, usec) = timed(|| syscall::read(fd, buf, count));
    log::trace!("read({}, {}) = {:?}", fd, count, result);

    let families: &[&Transfer] = if socket { &[&READ, &SOCK_READ] } else { &[&READ] };
    record(families, blocked, count, &result, usec);
    result
}

/// # Safety
///
/// `buf` must be valid for reads of `count` bytes.
pub unsafe fn write_raw(fd: RawFd, buf: *const u8, count: usize) -> Result<usize> {
    let socket = syscall::is_socket(fd);
    let blocked = syscall::would_block(fd, libc::POLLOUT);
    let (result, usec) = timed(|| syscall::write(fd, buf, count));
    log::trace!("write({}, {}) = {:?}", fd, count, result);

    let families: &[&Transfer] = if socket { &[&WRITE, &SOCK_WRITE] } else { &[&WRITE] };
    record(families, blocked, count, &result, usec);
    result
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recv_raw(fd: RawFd, buf: *mut u8, len: usize, flags: c_int) -> Result<usize> {
    let blocked = syscall::would_block(fd, libc::POLLIN);
    let (result, usec) = timed(|| syscall::recv(fd, buf, len, flags));
    log::trace!("recv({}, {}, {:#x}) = {:?}", fd, len, flags, result);
    record(&[&RECV], blocked, len, &result, usec);
    result
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn send_raw(fd: RawFd, buf: *const u8, len: usize, flags: c_int) -> Result<usize> {
    let blocked = syscall::would_block(fd, libc::POLLOUT);
    let (result, usec) = timed(|| syscall::send(fd, buf, len, flags));
    log::trace!("send({}, {}, {:#x}) = {:?}", fd, len, flags, result);
    record(&[&SEND], blocked, len, &result, usec);
    result
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    unsafe { read_raw(fd, buf.as_mut_ptr(), buf.len()) }
}

pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    unsafe { write_raw(fd, buf.as_ptr(), buf.len()) }
}

pub fn recv(fd: RawFd, buf: &mut [u8], flags: c_int) -> Result<usize> {
    unsafe { recv_raw(fd, buf.as_mut_ptr(), buf.len(), flags) }
}

pub fn send(fd: RawFd, buf: &[u8], flags: c_int) -> Result<usize> {
    unsafe { send_raw(fd, buf.as_ptr(), buf.len(), flags) }
}

/// Seeks are counted whether or not they succeed.
pub fn lseek(fd: RawFd, offset: i64, whence: c_int) -> Result<i64> {
    let (result, usec) = timed(|| syscall::lseek(fd, offset, whence));
    log::trace!("lseek({}, {}, {}) = {:?}", fd, offset, whence, result);
    stats::update(|stats| stats.seek(offset, usec));
    result
}

pub fn poll(fds: &mut [pollfd], timeout: c_int) -> Result<usize> {
    let (result, usec) = timed(|| syscall::poll(fds, timeout));
    log::trace!("poll({}, {}) = {:?}", fds.len(), timeout, result);
    stats::update(|stats| stats.poll(usec));
    result
}

pub fn open(path: &CStr, flags: c_int, mode: u32) -> Result<RawFd> {
    let result = syscall::open(path, flags, mode);
    log::trace!("open({:?}, {:#o}) = {:?}", path, flags, result);
    stats::update(|stats| stats.open(result.is_ok()));
    result
}

pub fn close(fd: RawFd) -> Result<()> {
    let result = syscall::close(fd);
    log::trace!("close({}) = {:?}", fd, result);
    if result.is_ok() {
        stats::update(|stats| stats.close());
    }
    result
}
