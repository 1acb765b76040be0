use std::path::PathBuf;
use std::time::Duration;

/// Locations and tuning knobs of the built-in components.
///
/// The defaults point at the live system, tests and sandboxes redirect the
/// discovery roots to fixture trees.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opts {
    /// Hardware monitor class directory, one `hwmonN` entry per module.
    pub hwmon_dir: PathBuf,
    /// Network statistics pseudo-file.
    pub net_dev: PathBuf,
    /// Fabric device class directory.
    pub infiniband_dir: PathBuf,
    /// Power capping class directory.
    pub powercap_dir: PathBuf,

    pub refresh: Refresh,

    /// Width in bits of the interface counters in [`net_dev`][Self::net_dev].
    ///
    /// 32-bit kernels expose 32-bit counters.
    pub net_width: u32,

    pub nvml: VendorLibs,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            hwmon_dir: "/sys/class/hwmon".into(),
            net_dev: "/proc/net/dev".into(),
            infiniband_dir: "/sys/class/infiniband".into(),
            powercap_dir: "/sys/class/powercap".into(),
            refresh: Refresh::default(),
            net_width: 64,
            nvml: VendorLibs::default(),
        }
    }
}

/// Minimum time between two re-reads of a backing file.
///
/// Reads within the window are answered from the previous sample.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Refresh {
    pub hwmon: Duration,
    pub net: Duration,
    pub infiniband: Duration,
    pub powercap: Duration,
}

impl Default for Refresh {
    fn default() -> Self {
        Self {
            hwmon: Duration::from_micros(4000),
            net: Duration::from_secs(1),
            infiniband: Duration::ZERO,
            powercap: Duration::ZERO,
        }
    }
}

/// Well-known shared object names of the GPU vendor libraries.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VendorLibs {
    pub cuda: String,
    pub cudart: String,
    pub nvml: String,
}

impl Default for VendorLibs {
    fn default() -> Self {
        Self {
            cuda: "libcuda.so".to_string(),
            cudart: "libcudart.so".to_string(),
            nvml: "libnvidia-ml.so".to_string(),
        }
    }
}
