/*++

Licensed under the Apache-2.0 license.

File Name:

    csr.rs

Abstract:

    File contains the control/status register bank. The bank places every
    block in its own window and routes word accesses to it. Each block also
    declares a static register table for the register map export.

--*/

use std::cell::RefCell;
use std::rc::Rc;

use emulator_bus::{Bus, BusError, Peripheral};
use emulator_types::{is_aligned, RvAddr, RvData, RvSize};
use log::warn;
use soc_error::{SocError, SocResult};

/// Address space reserved for each block, in bytes.
pub const CSR_BLOCK_STRIDE: RvAddr = 0x800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrAccess {
    ReadWrite,
    ReadOnly,
}

impl CsrAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            CsrAccess::ReadWrite => "rw",
            CsrAccess::ReadOnly => "ro",
        }
    }
}

/// One entry of a block's register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrDescriptor {
    pub name: &'static str,
    /// Byte offset within the block window; word aligned.
    pub offset: RvAddr,
    /// Implemented width in bits, at most 32.
    pub width: u32,
    pub access: CsrAccess,
}

impl CsrDescriptor {
    pub fn mask(&self) -> RvData {
        if self.width >= 32 {
            RvData::MAX
        } else {
            (1 << self.width) - 1
        }
    }
}

/// A component exposing registers through the CSR bank. The register decode
/// is the block's own `caliptra_emu_bus::Bus`; the table describes it for the
/// register map export.
pub trait CsrBlock: caliptra_emu_bus::Bus {
    fn registers(&self) -> &'static [CsrDescriptor];
}

struct Slot {
    name: String,
    registers: &'static [CsrDescriptor],
    block: Rc<RefCell<dyn CsrBlock>>,
}

/// Location of one register inside the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrLocation {
    pub block: String,
    pub block_offset: RvAddr,
    pub register: CsrDescriptor,
}

impl CsrLocation {
    /// Name in `<block>_<register>` form.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.block, self.register.name)
    }

    pub fn offset(&self) -> RvAddr {
        self.block_offset + self.register.offset
    }
}

pub struct CsrBank {
    size: RvAddr,
    slots: Vec<Slot>,
}

impl CsrBank {
    pub fn new(size: RvAddr) -> Self {
        Self {
            size,
            slots: Vec::new(),
        }
    }

    /// Places `block` in the next free window.
    pub fn add_block(&mut self, name: &str, block: Rc<RefCell<dyn CsrBlock>>) -> SocResult<RvAddr> {
        if self.slots.iter().any(|s| s.name == name) {
            return Err(SocError::DuplicateName {
                kind: "CSR block",
                name: name.to_string(),
            });
        }
        let window = self.slots.len() as RvAddr * CSR_BLOCK_STRIDE;
        if window + CSR_BLOCK_STRIDE > self.size {
            return Err(SocError::configuration(format!(
                "CSR block {name} does not fit in the 0x{:x} byte CSR window",
                self.size
            )));
        }
        let registers = block.borrow().registers();
        for reg in registers {
            if reg.offset % 4 != 0 || reg.offset >= CSR_BLOCK_STRIDE || reg.width == 0 || reg.width > 32
            {
                return Err(SocError::configuration(format!(
                    "CSR {name}_{} has an invalid layout",
                    reg.name
                )));
            }
        }
        self.slots.push(Slot {
            name: name.to_string(),
            registers,
            block,
        });
        Ok(window)
    }

    /// Every register in window order.
    pub fn locations(&self) -> Vec<CsrLocation> {
        self.slots
            .iter()
            .enumerate()
            .flat_map(|(i, slot)| {
                slot.registers.iter().map(move |reg| CsrLocation {
                    block: slot.name.clone(),
                    block_offset: i as RvAddr * CSR_BLOCK_STRIDE,
                    register: *reg,
                })
            })
            .collect()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&str, RvAddr)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.name.as_str(), i as RvAddr * CSR_BLOCK_STRIDE))
    }

    /// Offset of `<block>.<register>` within the bank.
    pub fn offset_of(&self, block: &str, register: &str) -> Option<RvAddr> {
        self.locations()
            .into_iter()
            .find(|l| l.block == block && l.register.name == register)
            .map(|l| l.offset())
    }

    fn slot(&self, addr: RvAddr) -> Option<(&Slot, RvAddr)> {
        let slot = self.slots.get((addr / CSR_BLOCK_STRIDE) as usize)?;
        Some((slot, addr % CSR_BLOCK_STRIDE))
    }
}

impl Bus for CsrBank {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        if size != RvSize::Word {
            return Err(BusError::LoadAccessFault);
        }
        if !is_aligned(size, addr) {
            return Err(BusError::LoadAddrMisaligned);
        }
        let (slot, offset) = self.slot(addr).ok_or(BusError::LoadAccessFault)?;
        let mut block = slot.block.borrow_mut();
        Ok(caliptra_emu_bus::Bus::read(&mut *block, size, offset)?)
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        if size != RvSize::Word {
            return Err(BusError::StoreAccessFault);
        }
        if !is_aligned(size, addr) {
            return Err(BusError::StoreAddrMisaligned);
        }
        let (slot, offset) = self.slot(addr).ok_or(BusError::StoreAccessFault)?;
        let mut block = slot.block.borrow_mut();
        caliptra_emu_bus::Bus::write(&mut *block, size, offset, val).map_err(|err| {
            warn!(
                "Write of 0x{val:08x} to CSR {}+0x{offset:x} rejected: {err:?}",
                slot.name
            );
            BusError::from(err)
        })
    }
}

impl Peripheral for CsrBank {
    fn mmap_size(&self) -> RvAddr {
        self.size
    }
}
