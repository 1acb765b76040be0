use std::ffi::CStr;
use std::io::{Error, Result};
use std::mem::MaybeUninit;
use std::os::fd::RawFd;

use libc::{c_int, c_void, pollfd};

// With `interpose` the crate exports its own `read`, `write`, ... so the
// wrappers below must reach glibc through its alternate entry points.
#[cfg(feature = "interpose")]
mod real {
    use std::mem::transmute;
    use std::sync::LazyLock;

    use libc::{c_char, c_int, c_void, mode_t, nfds_t, off_t, pollfd, size_t, ssize_t};

    extern "C" {
        #[link_name = "__read"]
        pub fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t;
        #[link_name = "__write"]
        pub fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t;
        #[link_name = "__send"]
        pub fn send(fd: c_int, buf: *const c_void, len: size_t, flags: c_int) -> ssize_t;
        #[link_name = "__lseek"]
        pub fn lseek(fd: c_int, offset: off_t, whence: c_int) -> off_t;
        #[link_name = "__poll"]
        pub fn poll(fds: *mut pollfd, nfds: nfds_t, timeout: c_int) -> c_int;
        #[link_name = "__open"]
        pub fn open(path: *const c_char, flags: c_int, ...) -> c_int;
        #[link_name = "__close"]
        pub fn close(fd: c_int) -> c_int;
    }

    type RecvFn = unsafe extern "C" fn(c_int, *mut c_void, size_t, c_int) -> ssize_t;

    // `__recv` is private to glibc, take the next definition in link order.
    static RECV: LazyLock<Option<RecvFn>> = LazyLock::new(|| {
        let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, c"recv".as_ptr()) };
        (!sym.is_null()).then(|| unsafe { transmute::<*mut c_void, RecvFn>(sym) })
    });

    pub unsafe fn recv(fd: c_int, buf: *mut c_void, len: size_t, flags: c_int) -> ssize_t {
        match *RECV {
            Some(recv) => recv(fd, buf, len, flags),
            None => {
                *libc::__errno_location() = libc::ENOSYS;
                -1
            }
        }
    }

    pub unsafe fn open_mode(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        open(path, flags, mode as c_int)
    }
}

#[cfg(not(feature = "interpose"))]
mod real {
    use libc::{c_char, c_int, mode_t};
    pub use libc::{close, lseek, poll, read, recv, send, write};

    pub unsafe fn open_mode(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
        libc::open(path, flags, mode as c_int)
    }
}

pub unsafe fn read(fd: RawFd, buf: *mut u8, count: usize) -> Result<usize> {
    let bytes = real::read(fd, buf as _, count);
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn write(fd: RawFd, buf: *const u8, count: usize) -> Result<usize> {
    let bytes = real::write(fd, buf as _, count);
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn recv(fd: RawFd, buf: *mut u8, len: usize, flags: c_int) -> Result<usize> {
    let bytes = real::recv(fd, buf as *mut c_void, len, flags);
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn send(fd: RawFd, buf: *const u8, len: usize, flags: c_int) -> Result<usize> {
    let bytes = real::send(fd, buf as *const c_void, len, flags);
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn lseek(fd: RawFd, offset: i64, whence: c_int) -> Result<i64> {
    let pos = unsafe { real::lseek(fd, offset as _, whence) };
    if pos != -1 {
        Ok(pos as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn poll(fds: &mut [pollfd], timeout: c_int) -> Result<usize> {
    let ready = unsafe { real::poll(fds.as_mut_ptr(), fds.len() as _, timeout) };
    if ready != -1 {
        Ok(ready as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn open(path: &CStr, flags: c_int, mode: u32) -> Result<RawFd> {
    let fd = unsafe { real::open_mode(path.as_ptr(), flags, mode as _) };
    if fd != -1 {
        Ok(fd)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn close(fd: RawFd) -> Result<()> {
    let result = unsafe { real::close(fd) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn fstat(fd: RawFd) -> Result<libc::stat> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    let result = unsafe { libc::fstat(fd, st.as_mut_ptr()) };
    if result != -1 {
        Ok(unsafe { st.assume_init() })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn is_socket(fd: RawFd) -> bool {
    fstat(fd).is_ok_and(|st| st.st_mode & libc::S_IFMT == libc::S_IFSOCK)
}

/// Probes `fd` with a zero timeout, true if none of `events` is ready.
pub fn would_block(fd: RawFd, events: i16) -> bool {
    let mut fds = [pollfd {
        fd,
        events,
        revents: 0,
    }];
    matches!(poll(&mut fds, 0), Ok(0))
}

pub fn set_errno(code: c_int) {
    unsafe { *libc::__errno_location() = code };
}
