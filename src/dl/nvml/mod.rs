//! GPU board metrics from the NVIDIA management library, keyed by the CUDA
//! device the calling thread has selected.

use thiserror::Error;

use crate::component::{Component, Info, Probe};
use crate::config::VendorLibs;
use crate::error;
use crate::event::{Catalog, EventCode, EventTable, UNAVAILABLE};

mod sys;

pub use sys::Libraries;

pub const NAME: &str = "nvml";
const DESCRIPTION: &str = "NVML provides the API for monitoring NVIDIA hardware";

const FEATURE_ERR: &str = "An error occurred in device feature detection, please check your NVIDIA Management Library and CUDA install.";

/// Non-success status of a vendor call.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("vendor call failed with status {0}")]
pub struct VendorError(pub i32);

pub type VendorResult<T> = Result<T, VendorError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clock {
    Graphics,
    Sm,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inforom {
    Ecc,
    Power,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EccBits {
    Single,
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EccLocation {
    L1,
    L2,
    Memory,
    RegisterFile,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EccCounts {
    pub l1: u64,
    pub l2: u64,
    pub memory: u64,
    pub register_file: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Utilization {
    pub gpu: u32,
    pub memory: u32,
}

/// Device queries of the management library.
pub trait Management {
    type Device: Copy;

    fn init(&self) -> VendorResult<()>;
    fn shutdown(&self) -> VendorResult<()>;
    fn device_count(&self) -> VendorResult<u32>;
    fn device(&self, index: u32) -> VendorResult<Self::Device>;
    fn pci_bus_id(&self, dev: Self::Device) -> VendorResult<String>;
    fn name(&self, dev: Self::Device) -> VendorResult<String>;
    fn inforom_version(&self, dev: Self::Device, object: Inforom) -> VendorResult<String>;
    fn ecc_enabled(&self, dev: Self::Device) -> VendorResult<bool>;
    fn clock(&self, dev: Self::Device, clock: Clock) -> VendorResult<u32>;
    fn max_clock(&self, dev: Self::Device, clock: Clock) -> VendorResult<u32>;
    fn detailed_ecc(&self, dev: Self::Device, bits: EccBits) -> VendorResult<EccCounts>;
    fn total_ecc(&self, dev: Self::Device, bits: EccBits) -> VendorResult<u64>;
    fn fan_speed(&self, dev: Self::Device) -> VendorResult<u32>;
    fn memory(&self, dev: Self::Device) -> VendorResult<Memory>;
    /// Performance state, 0 for maximum performance up to 15, `None` if unknown.
    fn performance_state(&self, dev: Self::Device) -> VendorResult<Option<u32>>;
    fn power_usage(&self, dev: Self::Device) -> VendorResult<u32>;
    fn temperature(&self, dev: Self::Device) -> VendorResult<u32>;
    fn utilization(&self, dev: Self::Device) -> VendorResult<Utilization>;
}

/// Device selection of the compute runtime.
pub trait Runtime {
    fn init(&self) -> VendorResult<()>;
    fn device_count(&self) -> VendorResult<u32>;
    fn pci_bus_id(&self, index: u32) -> VendorResult<String>;
    fn current_device(&self) -> VendorResult<u32>;
}

/// Groups of metrics a device model may support.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Clock,
    EccLocal,
    EccTotal,
    Fan,
    MaxClock,
    Memory,
    PerfState,
    Power,
    Temperature,
    Utilization,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Features(u32);

impl Features {
    pub fn insert(&mut self, family: Family) {
        self.0 |= 1 << family as u32;
    }

    pub fn contains(&self, family: Family) -> bool {
        self.0 & (1 << family as u32) != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    Total,
    Free,
    Used,
}

/// The single vendor query answering an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    Clock(Clock),
    MaxClock(Clock),
    EccLocal(EccBits, EccLocation),
    EccTotal(EccBits),
    Fan,
    Memory(MemoryKind),
    PerfState,
    Power,
    Temperature,
    GpuUtilization,
    MemoryUtilization,
}

impl Query {
    pub fn family(self) -> Family {
        match self {
            Self::Clock(_) => Family::Clock,
            Self::MaxClock(_) => Family::MaxClock,
            Self::EccLocal(..) => Family::EccLocal,
            Self::EccTotal(_) => Family::EccTotal,
            Self::Fan => Family::Fan,
            Self::Memory(_) => Family::Memory,
            Self::PerfState => Family::PerfState,
            Self::Power => Family::Power,
            Self::Temperature => Family::Temperature,
            Self::GpuUtilization | Self::MemoryUtilization => Family::Utilization,
        }
    }
}

// Event suffix, description, unit and query.
#[rustfmt::skip]
const METRICS: &[(&str, &str, &str, Query)] = &[
    ("graphics_clock", "Graphics clock domain (MHz).", "MHz", Query::Clock(Clock::Graphics)),
    ("sm_clock", "SM clock domain (MHz).", "MHz", Query::Clock(Clock::Sm)),
    ("memory_clock", "Memory clock domain (MHz).", "MHz", Query::Clock(Clock::Memory)),
    ("l1_single_ecc_errors", "L1 cache single bit ECC", "", Query::EccLocal(EccBits::Single, EccLocation::L1)),
    ("l2_single_ecc_errors", "L2 cache single bit ECC", "", Query::EccLocal(EccBits::Single, EccLocation::L2)),
    ("memory_single_ecc_errors", "Device memory single bit ECC", "", Query::EccLocal(EccBits::Single, EccLocation::Memory)),
    ("regfile_single_ecc_errors", "Register file single bit ECC", "", Query::EccLocal(EccBits::Single, EccLocation::RegisterFile)),
    ("l1_double_ecc_errors", "L1 cache double bit ECC", "", Query::EccLocal(EccBits::Double, EccLocation::L1)),
    ("l2_double_ecc_errors", "L2 cache double bit ECC", "", Query::EccLocal(EccBits::Double, EccLocation::L2)),
    ("memory_double_ecc_errors", "Device memory double bit ECC", "", Query::EccLocal(EccBits::Double, EccLocation::Memory)),
    ("regfile_double_ecc_errors", "Register file double bit ECC", "", Query::EccLocal(EccBits::Double, EccLocation::RegisterFile)),
    ("fan_speed", "The fan speed expressed as a percent of the maximum, i.e. full speed is 100%", "%", Query::Fan),
    ("graphics_max_clock", "Maximal Graphics clock domain (MHz).", "MHz", Query::MaxClock(Clock::Graphics)),
    ("sm_max_clock", "Maximal SM clock domain (MHz).", "MHz", Query::MaxClock(Clock::Sm)),
    ("memory_max_clock", "Maximal Memory clock domain (MHz).", "MHz", Query::MaxClock(Clock::Memory)),
    ("total_memory", "Total installed FB memory (in bytes).", "bytes", Query::Memory(MemoryKind::Total)),
    ("unallocated_memory", "Unallocated FB memory (in bytes).", "bytes", Query::Memory(MemoryKind::Free)),
    ("allocated_memory", "Allocated FB memory (in bytes). Note that the driver/GPU always sets aside a small amount of memory for bookkeeping.", "bytes", Query::Memory(MemoryKind::Used)),
    ("pstate", "The performance state of the device.", "", Query::PerfState),
    ("power", "Power usage reading for the device, in milliwatts. This is the power draw (+/-5 watts) for the entire board: GPU, memory, etc.", "mW", Query::Power),
    ("temperature", "Current temperature readings for the device, in degrees C.", "C", Query::Temperature),
    ("total_single_ecc_errors", "Total single bit errors.", "", Query::EccTotal(EccBits::Single)),
    ("total_double_ecc_errors", "Total double bit errors.", "", Query::EccTotal(EccBits::Double)),
    ("gpu_utilization", "Percent of time over the past second during which one or more kernels was executing on the GPU.", "%", Query::GpuUtilization),
    ("memory_utilization", "Percent of time over the past second during which global (device) memory was being read or written.", "%", Query::MemoryUtilization),
];

/// Resource of an event: the device model it is named after and its query.
#[derive(Clone, Copy, Debug)]
pub struct Metric {
    pub model: usize,
    pub query: Query,
}

#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub features: Features,
}

/// Device handles in CUDA index order and the model each one belongs to.
struct Devices<D> {
    handles: Vec<D>,
    models: Vec<usize>,
}

/// `Tesla C2075` becomes `Tesla_C2075`.
pub fn sanitize(name: &str) -> String {
    name.replace(' ', "_")
}

// Bus ids come as `domain:bus:device.function` in hex, the two libraries
// disagree on the width of the domain.
fn same_bus(a: &str, b: &str) -> bool {
    fn parse(id: &str) -> Option<[u32; 4]> {
        let (domain, rest) = id.trim().split_once(':')?;
        let (bus, rest) = rest.split_once(':')?;
        let (device, function) = rest.split_once('.')?;
        let hex = |s: &str| u32::from_str_radix(s, 16).ok();
        Some([hex(domain)?, hex(bus)?, hex(device)?, hex(function)?])
    }
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

fn probe<V: Management>(vendor: &V, dev: V::Device, name: &str) -> Features {
    let mut features = Features::default();

    let ecc = vendor.inforom_version(dev, Inforom::Ecc);
    let power = vendor.inforom_version(dev, Inforom::Power);
    // Boards older than Fermi have no inforom objects.
    let fermi = ecc.is_ok() && power.is_ok();
    let ecc_version = ecc
        .ok()
        .and_then(|it| {
            let end = it
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(it.len());
            it[..end].parse::<f32>().ok()
        })
        .unwrap_or(0.0);

    if fermi {
        features.insert(Family::Clock);
        features.insert(Family::MaxClock);
        features.insert(Family::PerfState);
        features.insert(Family::Utilization);
    }
    match vendor.ecc_enabled(dev) {
        Ok(true) => {
            if ecc_version >= 2.0 {
                features.insert(Family::EccLocal);
            }
            if ecc_version >= 1.0 {
                features.insert(Family::EccTotal);
            }
        }
        Ok(false) => {}
        Err(e) => log::debug!("{}: ECC mode unsupported: {}", name, e),
    }
    features.insert(Family::Fan);
    features.insert(Family::Memory);
    features.insert(Family::Temperature);
    match vendor.power_usage(dev) {
        Ok(_) => features.insert(Family::Power),
        Err(e) => log::debug!("{}: power usage unsupported: {}", name, e),
    }

    log::debug!("{}: features {:?}", name, features);
    features
}

// Runs with the management library initialized.
fn detect<V: Management + Runtime>(vendor: &V) -> Result<(Vec<Model>, Devices<V::Device>), String> {
    Runtime::init(vendor).map_err(|_| "The CUDA library failed to initialize.".to_string())?;

    let count = Management::device_count(vendor).map_err(|_| {
        "Unable to get a count of devices from the NVIDIA management library.".to_string()
    })?;
    let cuda_count = Runtime::device_count(vendor)
        .map_err(|_| "Unable to get a device count from CUDA.".to_string())?;
    if count != cuda_count {
        return Err(
            "Cuda and the NVIDIA management library have different device counts.".to_string(),
        );
    }

    let feature_err = |e: VendorError| {
        log::debug!("device detection: {}", e);
        FEATURE_ERR.to_string()
    };

    let mut by_bus = vec![];
    for index in 0..count {
        let dev = vendor.device(index).map_err(feature_err)?;
        by_bus.push((Management::pci_bus_id(vendor, dev).map_err(feature_err)?, dev));
    }

    let mut models: Vec<Model> = vec![];
    let mut devices = Devices {
        handles: vec![],
        models: vec![],
    };
    for index in 0..count {
        let bus = Runtime::pci_bus_id(vendor, index).map_err(feature_err)?;
        let Some(&(_, dev)) = by_bus.iter().find(|(it, _)| same_bus(it, &bus)) else {
            log::debug!("CUDA device {} at {} unknown to NVML", index, bus);
            return Err(FEATURE_ERR.to_string());
        };
        let name = vendor.name(dev).map_err(feature_err)?;

        // Boards of the same model share their features.
        let model = match models.iter().position(|it| it.name == name) {
            Some(model) => model,
            None => {
                let features = probe(vendor, dev, &name);
                models.push(Model { name, features });
                models.len() - 1
            }
        };
        devices.handles.push(dev);
        devices.models.push(model);
    }

    Ok((models, devices))
}

pub struct Nvml<V: Management + Runtime = Libraries> {
    info: Info,
    catalog: Catalog<Metric>,
    models: Vec<Model>,
    devices: Devices<V::Device>,
    vendor: Option<V>,
}

pub struct NvmlControl {
    codes: Vec<EventCode>,
    values: Vec<i64>,
}

impl Nvml<Libraries> {
    /// Loads the vendor libraries by their well-known names.
    pub fn load(libs: &VendorLibs) -> Self {
        match Libraries::load(libs) {
            Probe::Available(vendor) => Self::with_vendor(vendor),
            Probe::Unavailable(reason) => Self::unavailable(reason),
        }
    }
}

impl<V: Management + Runtime> Nvml<V> {
    pub fn with_vendor(vendor: V) -> Self {
        if Management::init(&vendor).is_err() {
            let reason = "The NVIDIA management library failed to initialize.";
            return Self::unavailable(reason.to_string());
        }
        let (models, devices) = match detect(&vendor) {
            Ok(it) => it,
            Err(reason) => {
                if let Err(e) = vendor.shutdown() {
                    log::debug!("shutdown: {}", e);
                }
                return Self::unavailable(reason);
            }
        };

        let mut catalog = Catalog::new();
        for (index, model) in models.iter().enumerate() {
            let prefix = sanitize(&model.name);
            for (metric, description, unit, query) in METRICS {
                if !model.features.contains(query.family()) {
                    continue;
                }
                catalog.push(
                    format!("{}:{}", prefix, metric),
                    *description,
                    *unit,
                    Metric {
                        model: index,
                        query: *query,
                    },
                );
            }
        }

        Self {
            info: Info::enabled(NAME, DESCRIPTION),
            catalog,
            models,
            devices,
            vendor: Some(vendor),
        }
    }

    pub fn unavailable(reason: String) -> Self {
        Self {
            info: Info::disabled(NAME, DESCRIPTION, reason),
            catalog: Catalog::new(),
            models: vec![],
            devices: Devices {
                handles: vec![],
                models: vec![],
            },
            vendor: None,
        }
    }

    // Shuts the management library down once, reads answer unavailable after.
    fn release(&mut self) {
        if let Some(vendor) = self.vendor.take() {
            if let Err(e) = vendor.shutdown() {
                log::debug!("shutdown: {}", e);
            }
        }
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    fn query(&self, vendor: &V, dev: V::Device, query: Query) -> VendorResult<i64> {
        let value = match query {
            Query::Clock(clock) => vendor.clock(dev, clock)? as i64,
            Query::MaxClock(clock) => vendor.max_clock(dev, clock)? as i64,
            Query::EccLocal(bits, location) => {
                let counts = vendor.detailed_ecc(dev, bits)?;
                let count = match location {
                    EccLocation::L1 => counts.l1,
                    EccLocation::L2 => counts.l2,
                    EccLocation::Memory => counts.memory,
                    EccLocation::RegisterFile => counts.register_file,
                };
                count as i64
            }
            Query::EccTotal(bits) => vendor.total_ecc(dev, bits)? as i64,
            Query::Fan => vendor.fan_speed(dev)? as i64,
            Query::Memory(kind) => {
                let memory = vendor.memory(dev)?;
                let bytes = match kind {
                    MemoryKind::Total => memory.total,
                    MemoryKind::Free => memory.free,
                    MemoryKind::Used => memory.used,
                };
                bytes as i64
            }
            Query::PerfState => match vendor.performance_state(dev)? {
                Some(state) => state as i64,
                None => UNAVAILABLE,
            },
            Query::Power => vendor.power_usage(dev)? as i64,
            Query::Temperature => vendor.temperature(dev)? as i64,
            Query::GpuUtilization => vendor.utilization(dev)?.gpu as i64,
            Query::MemoryUtilization => vendor.utilization(dev)?.memory as i64,
        };
        Ok(value)
    }

    fn sample(&self, ctl: &mut NvmlControl) -> error::Result<()> {
        let current = self.vendor.as_ref().and_then(|vendor| {
            let index = vendor
                .current_device()
                .inspect_err(|e| log::debug!("current device: {}", e))
                .ok()? as usize;
            Some((
                vendor,
                *self.devices.handles.get(index)?,
                *self.devices.models.get(index)?,
            ))
        });

        for (code, value) in ctl.codes.iter().zip(ctl.values.iter_mut()) {
            let metric = self.catalog.get(*code)?.resource;
            *value = match current {
                Some((vendor, dev, model)) if model == metric.model => {
                    self.query(vendor, dev, metric.query).unwrap_or_else(|e| {
                        log::debug!("{:?}: {}", metric.query, e);
                        UNAVAILABLE
                    })
                }
                _ => UNAVAILABLE,
            };
        }
        Ok(())
    }
}

impl<V: Management + Runtime + 'static> Component for Nvml<V> {
    type Context = ();
    type Control = NvmlControl;

    fn info(&self) -> &Info {
        &self.info
    }

    fn events(&self) -> &dyn EventTable {
        &self.catalog
    }

    fn init_context(&self) {}

    fn init_control(&self) -> NvmlControl {
        NvmlControl {
            codes: vec![],
            values: vec![],
        }
    }

    fn update_control(&self, ctl: &mut NvmlControl, codes: &[EventCode], _: &mut ()) -> error::Result<()> {
        for code in codes {
            self.catalog.get(*code)?;
        }
        ctl.codes = codes.to_vec();
        ctl.values = vec![0; codes.len()];
        Ok(())
    }

    fn start(&self, _: &mut (), ctl: &mut NvmlControl) -> error::Result<()> {
        ctl.values.fill(0);
        Ok(())
    }

    fn stop<'a>(&self, _: &mut (), ctl: &'a mut NvmlControl) -> error::Result<&'a [i64]> {
        self.sample(ctl)?;
        Ok(&ctl.values)
    }

    fn read<'a>(&self, _: &mut (), ctl: &'a mut NvmlControl) -> error::Result<&'a [i64]> {
        self.sample(ctl)?;
        Ok(&ctl.values)
    }

    // Board metrics are absolute readings, there is nothing to rewind.
    fn reset(&self, _: &mut (), _: &mut NvmlControl) -> error::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.release();
    }
}

impl<V: Management + Runtime> Drop for Nvml<V> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod test;
