//! Components backed by optional shared libraries.
//!
//! Nothing here links against a vendor library. Each library is opened by
//! its well-known name when the component is discovered and every entry
//! point is resolved into a function table, failures turn into a
//! [`Probe::Unavailable`][crate::component::Probe::Unavailable] reason.

use libloading::os::unix;
use libloading::Library;

pub mod nvml;

/// Whether the C runtime is linked statically into the host binary, in
/// which case shared objects cannot be loaded into it.
pub const fn statically_linked() -> bool {
    cfg!(target_feature = "crt-static")
}

/// Opens `name` with all symbols bound immediately and made available to
/// libraries loaded later.
pub fn open(name: &str, what: &str) -> Result<Library, String> {
    let flags = unix::RTLD_NOW | unix::RTLD_GLOBAL;
    match unsafe { unix::Library::open(Some(name), flags) } {
        Ok(lib) => Ok(lib.into()),
        Err(e) => {
            log::debug!("{}: {}", name, e);
            Err(format!("{} {} not found.", what, name))
        }
    }
}

/// Resolves `name` in `lib`.
///
/// # Safety
///
/// `T` must match the signature of the exported symbol, and the returned
/// value must not outlive `lib`.
pub unsafe fn symbol<T: Copy>(lib: &Library, name: &str, what: &str) -> Result<T, String> {
    match lib.get::<T>(name.as_bytes()) {
        Ok(sym) => Ok(*sym),
        Err(e) => {
            log::debug!("{}: {}", name, e);
            Err(format!("{} function {} not found.", what, name))
        }
    }
}
