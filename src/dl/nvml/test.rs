use std::cell::Cell;
use std::rc::Rc;

use super::*;
use crate::component::Status;

struct Board {
    name: &'static str,
    bus: &'static str,
    inforom: Option<&'static str>,
    ecc: bool,
    temperature: u32,
}

struct Fake {
    boards: Vec<Board>,
    // Board index of each CUDA device.
    cuda: Vec<usize>,
    current: Cell<u32>,
    probes: Cell<u32>,
    broken: Cell<bool>,
    shutdowns: Rc<Cell<u32>>,
    // CUDA reports a bus the management library does not know.
    foreign: bool,
}

impl Fake {
    fn new(boards: Vec<Board>, cuda: Vec<usize>) -> Self {
        Self {
            boards,
            cuda,
            current: Cell::new(0),
            probes: Cell::new(0),
            broken: Cell::new(false),
            shutdowns: Rc::default(),
            foreign: false,
        }
    }

    fn fail(&self) -> VendorResult<()> {
        match self.broken.get() {
            true => Err(VendorError(999)),
            false => Ok(()),
        }
    }
}

impl Management for Fake {
    type Device = usize;

    fn init(&self) -> VendorResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> VendorResult<()> {
        self.shutdowns.set(self.shutdowns.get() + 1);
        Ok(())
    }

    fn device_count(&self) -> VendorResult<u32> {
        Ok(self.boards.len() as u32)
    }

    fn device(&self, index: u32) -> VendorResult<usize> {
        Ok(index as usize)
    }

    fn pci_bus_id(&self, dev: usize) -> VendorResult<String> {
        Ok(format!("00000000{}", self.boards[dev].bus))
    }

    fn name(&self, dev: usize) -> VendorResult<String> {
        Ok(self.boards[dev].name.to_string())
    }

    fn inforom_version(&self, dev: usize, _: Inforom) -> VendorResult<String> {
        self.probes.set(self.probes.get() + 1);
        self.boards[dev]
            .inforom
            .map(str::to_string)
            .ok_or(VendorError(3))
    }

    fn ecc_enabled(&self, dev: usize) -> VendorResult<bool> {
        Ok(self.boards[dev].ecc)
    }

    fn clock(&self, _: usize, clock: Clock) -> VendorResult<u32> {
        self.fail()?;
        Ok(match clock {
            Clock::Graphics => 1100,
            Clock::Sm => 1200,
            Clock::Memory => 2500,
        })
    }

    fn max_clock(&self, dev: usize, clock: Clock) -> VendorResult<u32> {
        Ok(self.clock(dev, clock)? + 100)
    }

    fn detailed_ecc(&self, _: usize, bits: EccBits) -> VendorResult<EccCounts> {
        let base = match bits {
            EccBits::Single => 10,
            EccBits::Double => 20,
        };
        Ok(EccCounts {
            l1: base + 1,
            l2: base + 2,
            memory: base + 3,
            register_file: base + 4,
        })
    }

    fn total_ecc(&self, _: usize, _: EccBits) -> VendorResult<u64> {
        Ok(7)
    }

    fn fan_speed(&self, _: usize) -> VendorResult<u32> {
        Ok(40)
    }

    fn memory(&self, _: usize) -> VendorResult<Memory> {
        Ok(Memory {
            total: 6 << 30,
            free: 4 << 30,
            used: 2 << 30,
        })
    }

    fn performance_state(&self, _: usize) -> VendorResult<Option<u32>> {
        Ok(None)
    }

    fn power_usage(&self, _: usize) -> VendorResult<u32> {
        Ok(150_000)
    }

    fn temperature(&self, dev: usize) -> VendorResult<u32> {
        self.fail()?;
        Ok(self.boards[dev].temperature)
    }

    fn utilization(&self, _: usize) -> VendorResult<Utilization> {
        Ok(Utilization { gpu: 90, memory: 30 })
    }
}

impl Runtime for Fake {
    fn init(&self) -> VendorResult<()> {
        Ok(())
    }

    fn device_count(&self) -> VendorResult<u32> {
        Ok(self.cuda.len() as u32)
    }

    fn pci_bus_id(&self, index: u32) -> VendorResult<String> {
        if self.foreign {
            return Ok("0000:ff:00.0".to_string());
        }
        Ok(format!("0000{}", self.boards[self.cuda[index as usize]].bus))
    }

    fn current_device(&self) -> VendorResult<u32> {
        Ok(self.current.get())
    }
}

fn tesla(bus: &'static str, temperature: u32) -> Board {
    Board {
        name: "Tesla C2075",
        bus,
        inforom: Some("2.0"),
        ecc: true,
        temperature,
    }
}

fn quadro(bus: &'static str, temperature: u32) -> Board {
    Board {
        name: "Quadro 600",
        bus,
        inforom: None,
        ecc: false,
        temperature,
    }
}

fn run(nvml: &Nvml<Fake>, codes: &[EventCode]) -> Vec<i64> {
    let mut ctx = nvml.init_context();
    let mut ctl = nvml.init_control();
    nvml.update_control(&mut ctl, codes, &mut ctx).unwrap();
    nvml.start(&mut ctx, &mut ctl).unwrap();
    nvml.read(&mut ctx, &mut ctl).unwrap().to_vec()
}

#[test]
fn test_sanitize() {
    assert_eq!(sanitize("Tesla C2075"), "Tesla_C2075");
    assert_eq!(sanitize("GeForce GTX 480"), "GeForce_GTX_480");
}

#[test]
fn test_same_bus() {
    assert!(same_bus("00000000:02:00.0", "0000:02:00.0"));
    assert!(!same_bus("0000:02:00.0", "0000:03:00.0"));
    assert!(same_bus("0000:0A:00.0", "0000:0a:00.0"));
}

#[test]
fn test_models_probed_once() {
    let fake = Fake::new(
        vec![tesla(":02:00.0", 60), tesla(":03:00.0", 70), quadro(":04:00.0", 50)],
        vec![0, 1, 2],
    );
    let nvml = Nvml::with_vendor(fake);
    assert_eq!(nvml.info().status, Status::Enabled);

    let names = nvml
        .models()
        .iter()
        .map(|it| it.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["Tesla C2075", "Quadro 600"]);
    // Two inforom objects for each distinct model.
    assert_eq!(nvml.vendor.as_ref().unwrap().probes.get(), 4);
}

#[test]
fn test_features_shape_catalog() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60), quadro(":04:00.0", 50)], vec![0, 1]);
    let nvml = Nvml::with_vendor(fake);

    for name in [
        "Tesla_C2075:graphics_clock",
        "Tesla_C2075:l1_single_ecc_errors",
        "Tesla_C2075:total_double_ecc_errors",
        "Tesla_C2075:gpu_utilization",
        "Quadro_600:temperature",
        "Quadro_600:fan_speed",
        "Quadro_600:total_memory",
        "Quadro_600:power",
    ] {
        nvml.name_to_code(name).unwrap();
    }
    // No inforom, no clocks nor ECC.
    assert!(nvml.name_to_code("Quadro_600:graphics_clock").is_err());
    assert!(nvml.name_to_code("Quadro_600:l1_single_ecc_errors").is_err());

    let code = nvml.name_to_code("Tesla_C2075:power").unwrap();
    assert_eq!(nvml.code_to_info(code).unwrap().unit, "mW");
}

#[test]
fn test_cuda_order_cross_referenced() {
    // CUDA enumerates the boards in reverse.
    let fake = Fake::new(vec![tesla(":02:00.0", 60), quadro(":04:00.0", 50)], vec![1, 0]);
    let nvml = Nvml::with_vendor(fake);
    let tesla = nvml.name_to_code("Tesla_C2075:temperature").unwrap();
    let quadro = nvml.name_to_code("Quadro_600:temperature").unwrap();

    nvml.vendor.as_ref().unwrap().current.set(0);
    assert_eq!(run(&nvml, &[quadro, tesla]), vec![50, UNAVAILABLE]);

    nvml.vendor.as_ref().unwrap().current.set(1);
    assert_eq!(run(&nvml, &[quadro, tesla]), vec![UNAVAILABLE, 60]);
}

#[test]
fn test_read_values() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60)], vec![0]);
    let nvml = Nvml::with_vendor(fake);
    let codes = [
        "Tesla_C2075:sm_clock",
        "Tesla_C2075:memory_max_clock",
        "Tesla_C2075:regfile_double_ecc_errors",
        "Tesla_C2075:allocated_memory",
        "Tesla_C2075:pstate",
        "Tesla_C2075:memory_utilization",
    ]
    .map(|it| nvml.name_to_code(it).unwrap());
    assert_eq!(
        run(&nvml, &codes),
        vec![1200, 2600, 24, 2 << 30, UNAVAILABLE, 30]
    );
}

#[test]
fn test_vendor_failure_reads_unavailable() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60)], vec![0]);
    let nvml = Nvml::with_vendor(fake);
    let codes = ["Tesla_C2075:temperature", "Tesla_C2075:fan_speed"]
        .map(|it| nvml.name_to_code(it).unwrap());

    nvml.vendor.as_ref().unwrap().broken.set(true);
    assert_eq!(run(&nvml, &codes), vec![UNAVAILABLE, 40]);
}

#[test]
fn test_device_count_mismatch() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60), quadro(":04:00.0", 50)], vec![0]);
    let shutdowns = fake.shutdowns.clone();
    let nvml = Nvml::with_vendor(fake);
    assert_eq!(
        nvml.info().disabled_reason(),
        Some("Cuda and the NVIDIA management library have different device counts.")
    );
    assert!(nvml.events().is_empty());
    assert_eq!(shutdowns.get(), 1);
    drop(nvml);
    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_unknown_bus_disables() {
    let mut fake = Fake::new(vec![tesla(":02:00.0", 60)], vec![0]);
    fake.foreign = true;
    let shutdowns = fake.shutdowns.clone();
    let nvml = Nvml::with_vendor(fake);
    assert_eq!(nvml.info().disabled_reason(), Some(FEATURE_ERR));
    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_drop_shuts_down() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60)], vec![0]);
    let shutdowns = fake.shutdowns.clone();
    let nvml = Nvml::with_vendor(fake);
    assert_eq!(shutdowns.get(), 0);
    drop(nvml);
    assert_eq!(shutdowns.get(), 1);
}

#[test]
fn test_shutdown_releases_vendor() {
    let fake = Fake::new(vec![tesla(":02:00.0", 60)], vec![0]);
    let mut nvml = Nvml::with_vendor(fake);
    let shutdowns = nvml.vendor.as_ref().unwrap().shutdowns.clone();
    nvml.shutdown();
    assert!(nvml.vendor.is_none());
    nvml.shutdown();
    assert_eq!(shutdowns.get(), 1);

    let code = nvml.name_to_code("Tesla_C2075:temperature").unwrap();
    let mut ctl = nvml.init_control();
    nvml.update_control(&mut ctl, &[code], &mut ()).unwrap();
    assert_eq!(nvml.read(&mut (), &mut ctl).unwrap(), &[UNAVAILABLE]);
}

#[test]
fn test_missing_libraries() {
    let libs = VendorLibs {
        cuda: "libcuda-does-not-exist.so".to_string(),
        ..VendorLibs::default()
    };
    let nvml = Nvml::load(&libs);
    let reason = nvml.info().disabled_reason().unwrap();
    if !crate::dl::statically_linked() {
        assert_eq!(reason, "CUDA library libcuda-does-not-exist.so not found.");
    }
    assert!(nvml.events().is_empty());
}
