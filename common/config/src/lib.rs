// Licensed under the Apache-2.0 license

//! Construction-time configuration of the simulated SoC.
//!
//! The defaults reproduce the SPI-flash boot simulation: a 12 MHz reference
//! feeding three MMCM outputs, an IDELAYCTRL gated by a 155 ns settle time, and
//! a CPU that boots from the execute-in-place flash window.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use emulator_consts as consts;
use serde::{Deserialize, Serialize};
use soc_error::{SocError, SocResult};

mod mmcm;

pub use mmcm::MmcmLimits;

/// Relative frequency tolerance applied when an output does not specify one.
pub const DEFAULT_MARGIN: f64 = 1e-2;

fn default_margin() -> f64 {
    DEFAULT_MARGIN
}

/// One requested output of the clock generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,
    pub frequency_hz: u64,
    #[serde(default)]
    pub phase_degrees: f64,
    /// Accepted relative deviation of the synthesized frequency.
    #[serde(default = "default_margin")]
    pub margin: f64,
}

impl DomainConfig {
    pub fn new(name: &str, frequency_hz: u64) -> Self {
        Self {
            name: name.to_string(),
            frequency_hz,
            phase_degrees: 0.0,
            margin: DEFAULT_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    /// Read-only boot memory.
    Rom,
    /// 32-bit read/write memory.
    Ram,
    /// Control/status register bank.
    Csr,
    /// Execute-in-place window of the SPI flash.
    SpiFlash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub name: String,
    pub kind: RegionKind,
    pub base: u32,
    pub size: u32,
}

impl RegionConfig {
    pub fn new(name: &str, kind: RegionKind, base: u32, size: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base,
            size,
        }
    }
}

/// What the memory map does with a region whose base is not aligned to its
/// power-of-two rounded size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    #[default]
    Warn,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SocConfig {
    pub ident: String,
    /// Name of the single reference input every domain derives from.
    pub input_clock_name: String,
    pub input_clock_hz: u64,
    pub pll_lock_cycles: u32,
    /// Domain clocking the processor and the system bus.
    pub cpu_domain: String,
    /// Domain driving the input-delay calibration sequencer.
    pub calibration_domain: String,
    /// Domain clocking the flash data path.
    pub flash_domain: String,
    /// Part number of the flash behind the execute-in-place window.
    pub flash_part: String,
    pub minimum_settle_time_ns: u64,
    pub boot_vector_default: u32,
    pub alignment: AlignmentPolicy,
    pub mmcm: MmcmLimits,
    pub domains: Vec<DomainConfig>,
    /// Integrated regions registered before any peripheral.
    pub platform: Vec<RegionConfig>,
    pub regions: Vec<RegionConfig>,
    pub constants: BTreeMap<String, i64>,
}

impl Default for SocConfig {
    fn default() -> Self {
        let mut spinor = DomainConfig::new(consts::SPINOR_DOMAIN, consts::SPINOR_CLOCK_HZ);
        spinor.phase_degrees = consts::SPINOR_PHASE_DEGREES;
        let mut sys = DomainConfig::new(consts::SYS_DOMAIN, consts::SYS_CLOCK_HZ);
        sys.margin = 0.0;

        let mut constants = BTreeMap::new();
        constants.insert("SIMULATION".to_string(), 1);
        constants.insert("SPIFLASH_SIMULATION".to_string(), 1);

        Self {
            ident: consts::IDENT.to_string(),
            input_clock_name: consts::INPUT_CLOCK_NAME.to_string(),
            input_clock_hz: consts::INPUT_CLOCK_HZ,
            pll_lock_cycles: consts::PLL_LOCK_REFERENCE_CYCLES,
            mmcm: MmcmLimits::default(),
            domains: vec![
                sys,
                spinor,
                DomainConfig::new(consts::IDELAY_REF_DOMAIN, consts::IDELAY_REF_CLOCK_HZ),
            ],
            cpu_domain: consts::SYS_DOMAIN.to_string(),
            calibration_domain: consts::IDELAY_REF_DOMAIN.to_string(),
            flash_domain: consts::SPINOR_DOMAIN.to_string(),
            flash_part: consts::FLASH_PART.to_string(),
            minimum_settle_time_ns: consts::IDELAY_MIN_SETTLE_NS,
            boot_vector_default: consts::CPU_RESET_ADDR,
            platform: vec![
                RegionConfig::new("rom", RegionKind::Rom, consts::ROM_ORG, consts::ROM_SIZE),
                RegionConfig::new("sram", RegionKind::Ram, consts::SRAM_ORG, consts::SRAM_SIZE),
                RegionConfig::new("csr", RegionKind::Csr, consts::CSR_ORG, consts::CSR_SIZE),
            ],
            regions: vec![
                RegionConfig::new(
                    "sram_ext",
                    RegionKind::Ram,
                    consts::SRAM_EXT_ORG,
                    consts::SRAM_EXT_SIZE,
                ),
                RegionConfig::new(
                    "spiflash",
                    RegionKind::SpiFlash,
                    consts::SPIFLASH_ORG,
                    consts::SPIFLASH_SIZE,
                ),
            ],
            alignment: AlignmentPolicy::Warn,
            constants,
        }
    }
}

impl SocConfig {
    /// Load a configuration from a TOML file. Fields missing from the file keep
    /// their default values.
    pub fn load(path: &Path) -> SocResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| SocError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SocConfig = toml::from_str(&text).map_err(|source| SocError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded SoC configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn has_region(&self, kind: RegionKind) -> bool {
        self.platform
            .iter()
            .chain(self.regions.iter())
            .any(|r| r.kind == kind)
    }

    /// Checks the cross references that cannot be expressed by the types alone.
    pub fn validate(&self) -> SocResult<()> {
        if self.input_clock_hz == 0 {
            return Err(SocError::configuration("input clock frequency must be non-zero"));
        }
        if self.domains.is_empty() {
            return Err(SocError::configuration("at least one clock domain is required"));
        }
        let mut roles = vec![
            ("cpu_domain", &self.cpu_domain),
            ("calibration_domain", &self.calibration_domain),
        ];
        // Only a flash window puts anything on the flash clock.
        if self.has_region(RegionKind::SpiFlash) {
            roles.push(("flash_domain", &self.flash_domain));
        }
        for (role, name) in roles {
            if self.domain(name).is_none() {
                return Err(SocError::configuration(format!(
                    "{role} refers to undeclared clock domain {name}"
                )));
            }
        }
        if self.minimum_settle_time_ns == 0 {
            return Err(SocError::configuration(
                "minimum settle time must be non-zero",
            ));
        }
        for region in self.platform.iter().chain(self.regions.iter()) {
            if region.size == 0 {
                return Err(SocError::configuration(format!(
                    "region {} has zero size",
                    region.name
                )));
            }
        }
        Ok(())
    }
}
