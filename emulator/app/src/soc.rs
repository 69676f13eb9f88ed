/*++

Licensed under the Apache-2.0 license.

File Name:

    soc.rs

Abstract:

    File contains the SoC assembler. It builds the clock/reset generator, the
    calibration sequencer, the warm boot controller and the memory map from a
    configuration and steps them with a single shared reset.

--*/

use std::cell::{Ref, RefCell};
use std::io::{self, Write};
use std::rc::Rc;

use emulator_bus::{BusEndpoint, BusError};
use emulator_periph::{
    new_ram, new_rom, CalibrationSequencer, CalibrationState, CalibrationStatus, Crg, CrgStatus,
    CsrBank, MemoryMap, WarmBoot, XipFlash,
};
use emulator_types::{Picos, RvAddr, RvData, RvSize};
use log::{info, warn};
use soc_config::{RegionConfig, RegionKind, SocConfig};
use soc_error::{SocError, SocResult};

use crate::cpu::Cpu;

/// CSR block names as they appear in the register map.
pub const WARM_BOOT_BLOCK: &str = "reboot";
pub const CRG_BLOCK: &str = "crg";

#[derive(Default)]
pub struct SocArgs {
    pub config: SocConfig,
    pub rom_image: Vec<u8>,
    pub flash_image: Vec<u8>,
}

struct Endpoints {
    csr: Option<(RvAddr, Rc<RefCell<CsrBank>>)>,
    flash: Option<Rc<RefCell<XipFlash>>>,
    rom_image: Option<Vec<u8>>,
    flash_image: Option<Vec<u8>>,
}

impl Endpoints {
    fn build(
        &mut self,
        region: &RegionConfig,
        config: &SocConfig,
        warm_boot: &Rc<RefCell<WarmBoot>>,
        status: &CalibrationStatus,
    ) -> SocResult<BusEndpoint> {
        let endpoint: BusEndpoint = match region.kind {
            RegionKind::Rom => {
                let image = self.rom_image.take().unwrap_or_default();
                Rc::new(RefCell::new(new_rom(region.size, &image)?))
            }
            RegionKind::Ram => Rc::new(RefCell::new(new_ram(region.size))),
            RegionKind::Csr => {
                if self.csr.is_some() {
                    return Err(SocError::configuration(format!(
                        "region {} is a second CSR bank",
                        region.name
                    )));
                }
                let mut bank = CsrBank::new(region.size);
                bank.add_block(WARM_BOOT_BLOCK, warm_boot.clone())?;
                let crg_status = CrgStatus::new(status.clone());
                bank.add_block(CRG_BLOCK, Rc::new(RefCell::new(crg_status)))?;
                let bank = Rc::new(RefCell::new(bank));
                self.csr = Some((region.base, bank.clone()));
                bank
            }
            RegionKind::SpiFlash => {
                let Some(image) = self.flash_image.take() else {
                    return Err(SocError::configuration(format!(
                        "region {} is a second flash window",
                        region.name
                    )));
                };
                let flash = Rc::new(RefCell::new(XipFlash::new(
                    &config.flash_part,
                    image,
                    status.clone(),
                )?));
                self.flash = Some(flash.clone());
                flash
            }
        };
        Ok(endpoint)
    }
}

pub struct Soc {
    config: SocConfig,
    crg: Crg,
    calibration: Rc<RefCell<CalibrationSequencer>>,
    warm_boot: Rc<RefCell<WarmBoot>>,
    csr: Rc<RefCell<CsrBank>>,
    csr_base: RvAddr,
    flash: Option<Rc<RefCell<XipFlash>>>,
    memory: Rc<MemoryMap>,
    cpu: Rc<RefCell<Cpu>>,
}

impl Soc {
    /// Assembles the SoC and releases its reset. Any configuration error
    /// aborts construction as a whole.
    pub fn new(args: SocArgs) -> SocResult<Self> {
        let SocArgs {
            config,
            rom_image,
            flash_image,
        } = args;
        config.validate()?;

        let mut crg = Crg::new(
            &config.input_clock_name,
            config.input_clock_hz,
            config.mmcm.clone(),
            config.pll_lock_cycles,
        )?;
        for domain in config.domains.iter() {
            crg.add_output_with_margin(
                &domain.name,
                domain.frequency_hz,
                domain.phase_degrees,
                domain.margin,
            )?;
        }

        let calibration_hz = config
            .domain(&config.calibration_domain)
            .map(|d| d.frequency_hz)
            .unwrap_or_default();
        let calibration = Rc::new(RefCell::new(CalibrationSequencer::new(
            config.minimum_settle_time_ns,
            calibration_hz,
        )?));
        let status = calibration.borrow().status();
        let warm_boot = Rc::new(RefCell::new(WarmBoot::new(config.boot_vector_default)));

        let mut endpoints = Endpoints {
            csr: None,
            flash: None,
            rom_image: Some(rom_image),
            flash_image: Some(flash_image),
        };
        let mut platform = Vec::new();
        for region in config.platform.iter() {
            let endpoint = endpoints.build(region, &config, &warm_boot, &status)?;
            platform.push((region.name.clone(), region.base, region.size, endpoint));
        }
        let mut memory = MemoryMap::new(platform, config.alignment)?;
        for region in config.regions.iter() {
            let endpoint = endpoints.build(region, &config, &warm_boot, &status)?;
            memory.register(&region.name, region.base, region.size, endpoint)?;
        }
        let Some((csr_base, csr)) = endpoints.csr else {
            return Err(SocError::configuration(
                "the memory map needs a CSR region for the warm boot controller",
            ));
        };
        let memory = Rc::new(memory);

        if memory.lookup_by_address(config.boot_vector_default).is_none() {
            warn!(
                "Boot vector 0x{:08x} is not inside any region",
                config.boot_vector_default
            );
        }

        let lines = warm_boot.borrow().lines();
        let cpu = Rc::new(RefCell::new(Cpu::new(memory.clone(), lines)));
        crg.attach(&config.cpu_domain, cpu.clone())?;
        crg.attach(&config.calibration_domain, calibration.clone())?;
        if let Some(flash) = endpoints.flash.as_ref() {
            crg.attach(&config.flash_domain, flash.clone())?;
        }

        info!(
            "{}: {} regions, boot vector 0x{:08x}, calibration {} ticks",
            config.ident,
            memory.len(),
            config.boot_vector_default,
            calibration.borrow().initial_countdown()
        );

        crg.set_reset(false);
        Ok(Self {
            config,
            crg,
            calibration,
            warm_boot,
            csr,
            csr_base,
            flash: endpoints.flash,
            memory,
            cpu,
        })
    }

    /// Advances to the next clock edge. Returns `None` while reset is held.
    pub fn step(&mut self) -> Option<Picos> {
        self.crg.step()
    }

    /// Runs until the CPU domain has seen `cycles` more edges. Returns the
    /// number of CPU cycles actually run.
    pub fn run_cycles(&mut self, cycles: u64) -> u64 {
        let start = self.cpu_cycles();
        let mut done = 0;
        while done < cycles {
            if self.crg.step().is_none() {
                break;
            }
            done = self.cpu_cycles() - start;
        }
        done
    }

    /// CPU domain edges since the last reset release.
    pub fn cpu_cycles(&self) -> u64 {
        self.crg.edge_count(&self.config.cpu_domain).unwrap_or(0)
    }

    /// Drives the shared reset of every clock domain.
    pub fn set_reset(&mut self, asserted: bool) {
        self.crg.set_reset(asserted);
    }

    /// Power cycle: restores the warm boot registers and releases reset.
    pub fn cold_reset(&mut self) {
        self.crg.set_reset(true);
        self.warm_boot.borrow_mut().cold_reset();
        self.crg.set_reset(false);
    }

    /// Host access through the system bus.
    pub fn bus_read(&self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        self.memory.bus_read(size, addr)
    }

    pub fn bus_write(&self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        self.memory.bus_write(size, addr, val)
    }

    /// Absolute address of `<block>.<register>`.
    pub fn csr_address(&self, block: &str, register: &str) -> Option<RvAddr> {
        let offset = self.csr.borrow().offset_of(block, register)?;
        Some(self.csr_base + offset)
    }

    pub fn write_csr(&self, block: &str, register: &str, val: RvData) -> Result<(), BusError> {
        let addr = self
            .csr_address(block, register)
            .ok_or(BusError::StoreAccessFault)?;
        self.bus_write(RvSize::Word, addr, val)
    }

    pub fn read_csr(&self, block: &str, register: &str) -> Result<RvData, BusError> {
        let addr = self
            .csr_address(block, register)
            .ok_or(BusError::LoadAccessFault)?;
        self.bus_read(RvSize::Word, addr)
    }

    pub fn config(&self) -> &SocConfig {
        &self.config
    }

    pub fn crg(&self) -> &Crg {
        &self.crg
    }

    pub fn memory_map(&self) -> &MemoryMap {
        &self.memory
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.borrow().state()
    }

    pub fn calibration_ready(&self) -> bool {
        self.calibration.borrow().ready()
    }

    pub fn flash_calibrated(&self) -> bool {
        self.flash
            .as_ref()
            .map(|f| f.borrow().calibrated())
            .unwrap_or(false)
    }

    pub fn warm_boot(&self) -> Ref<'_, WarmBoot> {
        self.warm_boot.borrow()
    }

    pub fn cpu(&self) -> Ref<'_, Cpu> {
        self.cpu.borrow()
    }

    pub fn now_ps(&self) -> Picos {
        self.crg.now_ps()
    }

    /// Writes the register map in the `csr.csv` format of the LiteX tooling.
    pub fn write_csr_csv(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "#{}", "-".repeat(80))?;
        writeln!(out, "# Auto-generated register map of {}", self.config.ident)?;
        writeln!(out, "#{}", "-".repeat(80))?;

        let bank = self.csr.borrow();
        for (block, offset) in bank.blocks() {
            writeln!(out, "csr_base,{block},0x{:08x},,", self.csr_base + offset)?;
        }
        for location in bank.locations() {
            writeln!(
                out,
                "csr_register,{},0x{:08x},{},{}",
                location.full_name(),
                self.csr_base + location.offset(),
                location.register.width.div_ceil(32),
                location.register.access.as_str()
            )?;
        }

        let cpu_hz = self
            .config
            .domain(&self.config.cpu_domain)
            .map(|d| d.frequency_hz)
            .unwrap_or_default();
        writeln!(out, "constant,config_clock_frequency,{cpu_hz},,")?;
        writeln!(
            out,
            "constant,config_cpu_reset_addr,{},,",
            self.config.boot_vector_default
        )?;
        for (name, value) in self.config.constants.iter() {
            writeln!(out, "constant,{},{value},,", name.to_lowercase())?;
        }

        for region in self.memory.iter() {
            let kind = match self.region_kind(&region.name) {
                Some(RegionKind::Csr) => "io",
                _ => "cached",
            };
            writeln!(
                out,
                "memory_region,{},0x{:08x},{},{kind}",
                region.name, region.base_address, region.size_bytes
            )?;
        }
        Ok(())
    }

    fn region_kind(&self, name: &str) -> Option<RegionKind> {
        self.config
            .platform
            .iter()
            .chain(self.config.regions.iter())
            .find(|r| r.name == name)
            .map(|r| r.kind)
    }
}
