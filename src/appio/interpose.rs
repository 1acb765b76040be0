//! Process-wide replacements for the C library's I/O entry points.
//!
//! Linking a binary with the `interpose` feature routes every caller of
//! `read`, `write`, ... through the instrumented calls in [`super::io`].

use std::cell::Cell;
use std::ffi::CStr;
use std::io;

use libc::{c_char, c_int, c_void, mode_t, nfds_t, off_t, pollfd, size_t, ssize_t};

use super::io as counted;
use crate::ffi::syscall;

thread_local! {
    static BUSY: Cell<bool> = const { Cell::new(false) };
}

// `call` is told whether to count. Calls made while recording another one,
// a logger writing its line say, go straight to the C library.
fn guarded<T>(call: impl FnOnce(bool) -> T) -> T {
    let entered = BUSY
        .try_with(|busy| !busy.replace(true))
        .unwrap_or(false);
    if !entered {
        return call(false);
    }
    let result = call(true);
    let _ = BUSY.try_with(|busy| busy.set(false));
    result
}

fn errno_of(e: &io::Error) -> c_int {
    e.raw_os_error().unwrap_or(libc::EIO)
}

fn to_ssize(result: io::Result<usize>) -> ssize_t {
    match result {
        Ok(n) => n as ssize_t,
        Err(e) => {
            syscall::set_errno(errno_of(&e));
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    to_ssize(guarded(|counting| match counting {
        true => counted::read_raw(fd, buf.cast(), count),
        false => syscall::read(fd, buf.cast(), count),
    }))
}

#[no_mangle]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    to_ssize(guarded(|counting| match counting {
        true => counted::write_raw(fd, buf.cast(), count),
        false => syscall::write(fd, buf.cast(), count),
    }))
}

#[no_mangle]
pub unsafe extern "C" fn recv(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t {
    to_ssize(guarded(|counting| match counting {
        true => counted::recv_raw(fd, buf.cast(), len, flags),
        false => syscall::recv(fd, buf.cast(), len, flags),
    }))
}

#[no_mangle]
pub unsafe extern "C" fn send(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t {
    to_ssize(guarded(|counting| match counting {
        true => counted::send_raw(fd, buf.cast(), len, flags),
        false => syscall::send(fd, buf.cast(), len, flags),
    }))
}

#[no_mangle]
pub unsafe extern "C" fn lseek(fd: c_int, offset: off_t, whence: c_int) -> off_t {
    let result = guarded(|counting| match counting {
        true => counted::lseek(fd, offset, whence),
        false => syscall::lseek(fd, offset, whence),
    });
    match result {
        Ok(pos) => pos,
        Err(e) => {
            syscall::set_errno(errno_of(&e));
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn poll(fds: *mut pollfd, nfds: nfds_t, timeout: c_int) -> c_int {
    let fds: &mut [pollfd] = if fds.is_null() || nfds == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(fds, nfds as usize)
    };
    let result = guarded(|counting| match counting {
        true => counted::poll(fds, timeout),
        false => syscall::poll(fds, timeout),
    });
    match result {
        Ok(ready) => ready as c_int,
        Err(e) => {
            syscall::set_errno(errno_of(&e));
            -1
        }
    }
}

// `mode` is only meaningful with O_CREAT or O_TMPFILE, it is read like the
// C library reads its variadic argument.
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    if path.is_null() {
        syscall::set_errno(libc::EFAULT);
        return -1;
    }
    let path = CStr::from_ptr(path);
    let result = guarded(|counting| match counting {
        true => counted::open(path, flags, mode),
        false => syscall::open(path, flags, mode),
    });
    match result {
        Ok(fd) => fd,
        Err(e) => {
            syscall::set_errno(errno_of(&e));
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    let result = guarded(|counting| match counting {
        true => counted::close(fd),
        false => syscall::close(fd),
    });
    match result {
        Ok(()) => 0,
        Err(e) => {
            syscall::set_errno(errno_of(&e));
            -1
        }
    }
}
