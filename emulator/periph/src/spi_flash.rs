/*++

Licensed under the Apache-2.0 license.

File Name:

    spi_flash.rs

Abstract:

    File contains the execute-in-place window of the SPI NOR flash. The data
    path samples through input delays, so reads are only honoured once the
    delay calibration has completed.

--*/

use emulator_bus::{Bus, BusError, Peripheral};
use emulator_types::{is_aligned, RvAddr, RvData, RvSize};
use log::{debug, warn};
use soc_error::{SocError, SocResult};

use crate::crg::Clocked;
use crate::idelay_ctrl::CalibrationStatus;

pub struct FlashPartInfo {
    pub part_name: &'static str,
    pub id: &'static [u8],
    pub chip_size: u32,
}

const SUPPORTED_FLASH: &[FlashPartInfo] = &[
    FlashPartInfo {
        part_name: "mx66um1g45g",
        id: &[0xc2, 0x80, 0x3b],
        chip_size: 128 * 1024 * 1024,
    },
    FlashPartInfo {
        part_name: "w25q01jv",
        id: &[0xef, 0x40, 0x21],
        chip_size: 256 * 1024 * 1024,
    },
    FlashPartInfo {
        part_name: "w25q128jv",
        id: &[0xef, 0x40, 0x18],
        chip_size: 16 * 1024 * 1024,
    },
];

pub struct XipFlash {
    info: &'static FlashPartInfo,
    image: Vec<u8>,
    calibration: CalibrationStatus,
    /// Two-flop synchronizer of the calibration flag into this domain.
    sync: [bool; 2],
    reported: bool,
}

impl XipFlash {
    pub fn new(part_name: &str, image: Vec<u8>, calibration: CalibrationStatus) -> SocResult<Self> {
        let info = SUPPORTED_FLASH
            .iter()
            .find(|f| f.part_name.eq_ignore_ascii_case(part_name))
            .ok_or_else(|| SocError::configuration(format!("unsupported flash part {part_name}")))?;
        if image.len() > info.chip_size as usize {
            return Err(SocError::configuration(format!(
                "flash image of {} bytes does not fit in {} ({} bytes)",
                image.len(),
                info.part_name,
                info.chip_size
            )));
        }
        Ok(Self {
            info,
            image,
            calibration,
            sync: [false; 2],
            reported: false,
        })
    }

    pub fn part_name(&self) -> &'static str {
        self.info.part_name
    }

    pub fn jedec_id(&self) -> &'static [u8] {
        self.info.id
    }

    /// Calibration flag as seen by the flash clock domain.
    pub fn calibrated(&self) -> bool {
        self.sync[1]
    }

    fn byte(&self, offset: usize) -> u8 {
        // Erased flash reads as all ones.
        self.image.get(offset).copied().unwrap_or(0xff)
    }
}

impl Clocked for XipFlash {
    fn tick(&mut self) {
        self.sync = [self.calibration.ready(), self.sync[0]];
    }

    fn reset(&mut self) {
        self.sync = [false; 2];
        self.reported = false;
    }
}

impl Bus for XipFlash {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        if !is_aligned(size, addr) {
            return Err(BusError::LoadAddrMisaligned);
        }
        if addr as u64 + size as u64 > self.info.chip_size as u64 {
            return Err(BusError::LoadAccessFault);
        }
        if !self.calibrated() {
            if !self.reported {
                warn!("Flash read at +0x{addr:x} before IDELAYCTRL calibration completed");
                self.reported = true;
            } else {
                debug!("Flash read at +0x{addr:x} while uncalibrated");
            }
            return Err(BusError::LoadAccessFault);
        }
        let start = addr as usize;
        Ok((start..start + size as usize)
            .rev()
            .fold(0, |acc, i| (acc << 8) | self.byte(i) as RvData))
    }

    fn write(&mut self, _size: RvSize, addr: RvAddr, _val: RvData) -> Result<(), BusError> {
        debug!("Write to read-only flash window at +0x{addr:x}");
        Err(BusError::StoreAccessFault)
    }
}

impl Peripheral for XipFlash {
    fn mmap_size(&self) -> RvAddr {
        self.info.chip_size
    }
}
