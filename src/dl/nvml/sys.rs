use std::ffi::{c_char, c_int, c_uint, c_ulonglong, c_void, CStr};

use libloading::Library;

use super::{
    Clock, EccBits, EccCounts, Inforom, Management, Memory, Runtime, Utilization, VendorError,
    VendorResult,
};
use crate::component::Probe;
use crate::config::VendorLibs;
use crate::dl;

const SUCCESS: c_int = 0;

const CLOCK_GRAPHICS: c_int = 0;
const CLOCK_SM: c_int = 1;
const CLOCK_MEM: c_int = 2;

const INFOROM_ECC: c_int = 1;
const INFOROM_POWER: c_int = 2;

const SINGLE_BIT_ECC: c_int = 0;
const DOUBLE_BIT_ECC: c_int = 1;
const VOLATILE_ECC: c_int = 0;

const TEMPERATURE_GPU: c_int = 0;
const FEATURE_ENABLED: c_int = 1;
const PSTATE_UNKNOWN: c_int = 32;

const STRING_BUFFER: usize = 96;

/// Opaque device handle of the management library.
#[derive(Clone, Copy, Debug)]
pub struct Device(*mut c_void);

#[allow(dead_code)]
#[repr(C)]
struct PciInfo {
    bus_id: [u8; 16],
    domain: c_uint,
    bus: c_uint,
    device: c_uint,
    pci_device_id: c_uint,
    pci_sub_system_id: c_uint,
    reserved: [c_uint; 4],
    // Later library versions append the wide bus id.
    bus_id_wide: [u8; 32],
}

#[repr(C)]
#[derive(Default)]
struct RawMemory {
    total: c_ulonglong,
    free: c_ulonglong,
    used: c_ulonglong,
}

#[repr(C)]
#[derive(Default)]
struct RawUtilization {
    gpu: c_uint,
    memory: c_uint,
}

#[repr(C)]
#[derive(Default)]
struct RawEccCounts {
    l1_cache: c_ulonglong,
    l2_cache: c_ulonglong,
    device_memory: c_ulonglong,
    register_file: c_ulonglong,
}

type Status = c_int;

struct Cuda {
    init: unsafe extern "C" fn(c_uint) -> Status,
}

struct Cudart {
    get_device: unsafe extern "C" fn(*mut c_int) -> Status,
    get_device_count: unsafe extern "C" fn(*mut c_int) -> Status,
    get_pci_bus_id: unsafe extern "C" fn(*mut c_char, c_int, c_int) -> Status,
}

struct Nvml {
    init: unsafe extern "C" fn() -> Status,
    shutdown: unsafe extern "C" fn() -> Status,
    error_string: unsafe extern "C" fn(Status) -> *const c_char,
    get_count: unsafe extern "C" fn(*mut c_uint) -> Status,
    get_handle_by_index: unsafe extern "C" fn(c_uint, *mut *mut c_void) -> Status,
    get_pci_info: unsafe extern "C" fn(*mut c_void, *mut PciInfo) -> Status,
    get_name: unsafe extern "C" fn(*mut c_void, *mut c_char, c_uint) -> Status,
    get_inforom_version: unsafe extern "C" fn(*mut c_void, c_int, *mut c_char, c_uint) -> Status,
    get_ecc_mode: unsafe extern "C" fn(*mut c_void, *mut c_int, *mut c_int) -> Status,
    get_clock_info: unsafe extern "C" fn(*mut c_void, c_int, *mut c_uint) -> Status,
    get_max_clock_info: unsafe extern "C" fn(*mut c_void, c_int, *mut c_uint) -> Status,
    get_detailed_ecc_errors:
        unsafe extern "C" fn(*mut c_void, c_int, c_int, *mut RawEccCounts) -> Status,
    get_total_ecc_errors:
        unsafe extern "C" fn(*mut c_void, c_int, c_int, *mut c_ulonglong) -> Status,
    get_fan_speed: unsafe extern "C" fn(*mut c_void, *mut c_uint) -> Status,
    get_memory_info: unsafe extern "C" fn(*mut c_void, *mut RawMemory) -> Status,
    get_performance_state: unsafe extern "C" fn(*mut c_void, *mut c_int) -> Status,
    get_power_usage: unsafe extern "C" fn(*mut c_void, *mut c_uint) -> Status,
    get_temperature: unsafe extern "C" fn(*mut c_void, c_int, *mut c_uint) -> Status,
    get_utilization_rates: unsafe extern "C" fn(*mut c_void, *mut RawUtilization) -> Status,
}

/// The CUDA driver, the CUDA runtime and the management library, loaded
/// at run time.
pub struct Libraries {
    cuda: Cuda,
    cudart: Cudart,
    nvml: Nvml,
    // Keep the shared objects mapped for as long as the tables above live.
    _libs: [Library; 3],
}

impl Libraries {
    pub fn load(libs: &VendorLibs) -> Probe<Self> {
        if dl::statically_linked() {
            return Probe::Unavailable(
                "NVML component does not support statically linking of libc.".to_string(),
            );
        }
        match unsafe { Self::resolve(libs) } {
            Ok(it) => Probe::Available(it),
            Err(reason) => Probe::Unavailable(reason),
        }
    }

    unsafe fn resolve(libs: &VendorLibs) -> Result<Self, String> {
        let cuda_lib = dl::open(&libs.cuda, "CUDA library")?;
        let cuda = Cuda {
            init: dl::symbol(&cuda_lib, "cuInit", "CUDA")?,
        };

        let cudart_lib = dl::open(&libs.cudart, "CUDA runtime library")?;
        let cudart = Cudart {
            get_device: dl::symbol(&cudart_lib, "cudaGetDevice", "CUDART")?,
            get_device_count: dl::symbol(&cudart_lib, "cudaGetDeviceCount", "CUDART")?,
            get_pci_bus_id: dl::symbol(&cudart_lib, "cudaDeviceGetPCIBusId", "CUDART")?,
        };

        let lib = dl::open(&libs.nvml, "NVML runtime library")?;
        let nvml = Nvml {
            get_clock_info: dl::symbol(&lib, "nvmlDeviceGetClockInfo", "NVML")?,
            error_string: dl::symbol(&lib, "nvmlErrorString", "NVML")?,
            get_detailed_ecc_errors: dl::symbol(&lib, "nvmlDeviceGetDetailedEccErrors", "NVML")?,
            get_fan_speed: dl::symbol(&lib, "nvmlDeviceGetFanSpeed", "NVML")?,
            get_memory_info: dl::symbol(&lib, "nvmlDeviceGetMemoryInfo", "NVML")?,
            get_performance_state: dl::symbol(&lib, "nvmlDeviceGetPerformanceState", "NVML")?,
            get_power_usage: dl::symbol(&lib, "nvmlDeviceGetPowerUsage", "NVML")?,
            get_temperature: dl::symbol(&lib, "nvmlDeviceGetTemperature", "NVML")?,
            get_total_ecc_errors: dl::symbol(&lib, "nvmlDeviceGetTotalEccErrors", "NVML")?,
            get_utilization_rates: dl::symbol(&lib, "nvmlDeviceGetUtilizationRates", "NVML")?,
            get_handle_by_index: dl::symbol(&lib, "nvmlDeviceGetHandleByIndex", "NVML")?,
            get_pci_info: dl::symbol(&lib, "nvmlDeviceGetPciInfo", "NVML")?,
            get_name: dl::symbol(&lib, "nvmlDeviceGetName", "NVML")?,
            get_inforom_version: dl::symbol(&lib, "nvmlDeviceGetInforomVersion", "NVML")?,
            get_ecc_mode: dl::symbol(&lib, "nvmlDeviceGetEccMode", "NVML")?,
            get_max_clock_info: dl::symbol(&lib, "nvmlDeviceGetMaxClockInfo", "NVML")?,
            init: dl::symbol(&lib, "nvmlInit", "NVML")?,
            get_count: dl::symbol(&lib, "nvmlDeviceGetCount", "NVML")?,
            shutdown: dl::symbol(&lib, "nvmlShutdown", "NVML")?,
        };

        Ok(Self {
            cuda,
            cudart,
            nvml,
            _libs: [cuda_lib, cudart_lib, lib],
        })
    }

    fn check(&self, status: Status) -> VendorResult<()> {
        if status == SUCCESS {
            return Ok(());
        }
        let text = unsafe { (self.nvml.error_string)(status) };
        if !text.is_null() {
            let text = unsafe { CStr::from_ptr(text) };
            log::debug!("nvml: {}", text.to_string_lossy());
        }
        Err(VendorError(status))
    }

    fn check_cuda(status: Status) -> VendorResult<()> {
        match status {
            SUCCESS => Ok(()),
            status => {
                log::debug!("cuda: status {}", status);
                Err(VendorError(status))
            }
        }
    }

    fn string(&self, fill: impl FnOnce(*mut c_char, c_uint) -> Status) -> VendorResult<String> {
        let mut buf = [0u8; STRING_BUFFER];
        self.check(fill(buf.as_mut_ptr().cast(), buf.len() as c_uint))?;
        Ok(to_string(&buf))
    }
}

fn to_string(buf: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buf) {
        Ok(it) => it.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buf).into_owned(),
    }
}

fn clock_type(clock: Clock) -> c_int {
    match clock {
        Clock::Graphics => CLOCK_GRAPHICS,
        Clock::Sm => CLOCK_SM,
        Clock::Memory => CLOCK_MEM,
    }
}

fn ecc_type(bits: EccBits) -> c_int {
    match bits {
        EccBits::Single => SINGLE_BIT_ECC,
        EccBits::Double => DOUBLE_BIT_ECC,
    }
}

impl Management for Libraries {
    type Device = Device;

    fn init(&self) -> VendorResult<()> {
        self.check(unsafe { (self.nvml.init)() })
    }

    fn shutdown(&self) -> VendorResult<()> {
        self.check(unsafe { (self.nvml.shutdown)() })
    }

    fn device_count(&self) -> VendorResult<u32> {
        let mut count = 0;
        self.check(unsafe { (self.nvml.get_count)(&mut count) })?;
        Ok(count)
    }

    fn device(&self, index: u32) -> VendorResult<Device> {
        let mut handle = std::ptr::null_mut();
        self.check(unsafe { (self.nvml.get_handle_by_index)(index, &mut handle) })?;
        Ok(Device(handle))
    }

    fn pci_bus_id(&self, dev: Device) -> VendorResult<String> {
        let mut info = PciInfo {
            bus_id: [0; 16],
            domain: 0,
            bus: 0,
            device: 0,
            pci_device_id: 0,
            pci_sub_system_id: 0,
            reserved: [0; 4],
            bus_id_wide: [0; 32],
        };
        self.check(unsafe { (self.nvml.get_pci_info)(dev.0, &mut info) })?;
        Ok(to_string(&info.bus_id))
    }

    fn name(&self, dev: Device) -> VendorResult<String> {
        self.string(|buf, len| unsafe { (self.nvml.get_name)(dev.0, buf, len) })
    }

    fn inforom_version(&self, dev: Device, object: Inforom) -> VendorResult<String> {
        let object = match object {
            Inforom::Ecc => INFOROM_ECC,
            Inforom::Power => INFOROM_POWER,
        };
        self.string(|buf, len| unsafe { (self.nvml.get_inforom_version)(dev.0, object, buf, len) })
    }

    fn ecc_enabled(&self, dev: Device) -> VendorResult<bool> {
        let mut current = 0;
        let mut pending = 0;
        self.check(unsafe { (self.nvml.get_ecc_mode)(dev.0, &mut current, &mut pending) })?;
        Ok(current == FEATURE_ENABLED)
    }

    fn clock(&self, dev: Device, clock: Clock) -> VendorResult<u32> {
        let mut mhz = 0;
        self.check(unsafe { (self.nvml.get_clock_info)(dev.0, clock_type(clock), &mut mhz) })?;
        Ok(mhz)
    }

    fn max_clock(&self, dev: Device, clock: Clock) -> VendorResult<u32> {
        let mut mhz = 0;
        self.check(unsafe {
            (self.nvml.get_max_clock_info)(dev.0, clock_type(clock), &mut mhz)
        })?;
        Ok(mhz)
    }

    fn detailed_ecc(&self, dev: Device, bits: EccBits) -> VendorResult<EccCounts> {
        let mut counts = RawEccCounts::default();
        self.check(unsafe {
            (self.nvml.get_detailed_ecc_errors)(dev.0, ecc_type(bits), VOLATILE_ECC, &mut counts)
        })?;
        Ok(EccCounts {
            l1: counts.l1_cache,
            l2: counts.l2_cache,
            memory: counts.device_memory,
            register_file: counts.register_file,
        })
    }

    fn total_ecc(&self, dev: Device, bits: EccBits) -> VendorResult<u64> {
        let mut count = 0;
        self.check(unsafe {
            (self.nvml.get_total_ecc_errors)(dev.0, ecc_type(bits), VOLATILE_ECC, &mut count)
        })?;
        Ok(count)
    }

    fn fan_speed(&self, dev: Device) -> VendorResult<u32> {
        let mut percent = 0;
        self.check(unsafe { (self.nvml.get_fan_speed)(dev.0, &mut percent) })?;
        Ok(percent)
    }

    fn memory(&self, dev: Device) -> VendorResult<Memory> {
        let mut memory = RawMemory::default();
        self.check(unsafe { (self.nvml.get_memory_info)(dev.0, &mut memory) })?;
        Ok(Memory {
            total: memory.total,
            free: memory.free,
            used: memory.used,
        })
    }

    fn performance_state(&self, dev: Device) -> VendorResult<Option<u32>> {
        let mut state = 0;
        self.check(unsafe { (self.nvml.get_performance_state)(dev.0, &mut state) })?;
        match state {
            PSTATE_UNKNOWN => Ok(None),
            state => Ok(Some(state as u32)),
        }
    }

    fn power_usage(&self, dev: Device) -> VendorResult<u32> {
        let mut milliwatts = 0;
        self.check(unsafe { (self.nvml.get_power_usage)(dev.0, &mut milliwatts) })?;
        Ok(milliwatts)
    }

    fn temperature(&self, dev: Device) -> VendorResult<u32> {
        let mut celsius = 0;
        self.check(unsafe { (self.nvml.get_temperature)(dev.0, TEMPERATURE_GPU, &mut celsius) })?;
        Ok(celsius)
    }

    fn utilization(&self, dev: Device) -> VendorResult<Utilization> {
        let mut rates = RawUtilization::default();
        self.check(unsafe { (self.nvml.get_utilization_rates)(dev.0, &mut rates) })?;
        Ok(Utilization {
            gpu: rates.gpu,
            memory: rates.memory,
        })
    }
}

impl Runtime for Libraries {
    fn init(&self) -> VendorResult<()> {
        Self::check_cuda(unsafe { (self.cuda.init)(0) })
    }

    fn device_count(&self) -> VendorResult<u32> {
        let mut count = 0;
        Self::check_cuda(unsafe { (self.cudart.get_device_count)(&mut count) })?;
        Ok(count.max(0) as u32)
    }

    fn pci_bus_id(&self, index: u32) -> VendorResult<String> {
        let mut buf = [0u8; STRING_BUFFER];
        Self::check_cuda(unsafe {
            (self.cudart.get_pci_bus_id)(buf.as_mut_ptr().cast(), buf.len() as c_int, index as c_int)
        })?;
        Ok(to_string(&buf))
    }

    fn current_device(&self) -> VendorResult<u32> {
        let mut device = 0;
        Self::check_cuda(unsafe { (self.cudart.get_device)(&mut device) })?;
        Ok(device.max(0) as u32)
    }
}
