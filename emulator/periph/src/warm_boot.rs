// Licensed under the Apache-2.0 license

//! Warm boot controller
//!
//! Software redirects the processor by writing a new reset vector to the
//! address register and then the reset key to the control register. The reset
//! is a level, not a pulse: it stays asserted for as long as the control
//! register holds the key.
//!
//! ## Registers
//!
//! - **ctrl** (offset 0x0, 8 bits): bits 7:2 equal to `0b101011` assert the
//!   reset. Bits 1:0 are ignored, so 0xAC through 0xAF all arm it.
//! - **addr** (offset 0x4, 32 bits): reset vector driven to the processor.
//!
//! Both registers persist across the warm reset they cause and are restored
//! only by a cold reset. The registers live in the host bus domain; the
//! processor samples them through [`WarmBootLines`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use caliptra_emu_bus::{BusError, ReadWriteRegister};
use caliptra_emu_derive::Bus;
use emulator_types::{RvAddr, RvData, RvSize};
use log::info;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::LocalRegisterCopy;

use crate::csr::{CsrAccess, CsrBlock, CsrDescriptor};

register_bitfields![u32,
    pub Ctrl [
        KEY OFFSET(2) NUMBITS(6) [
            Reset = 0b10_1011
        ],
        IGNORED OFFSET(0) NUMBITS(2) []
    ]
];

pub const CTRL_OFFSET: RvAddr = 0x0;
pub const ADDR_OFFSET: RvAddr = 0x4;

const CTRL_MASK: RvData = 0xff;

const REGISTERS: &[CsrDescriptor] = &[
    CsrDescriptor {
        name: "ctrl",
        offset: CTRL_OFFSET,
        width: 8,
        access: CsrAccess::ReadWrite,
    },
    CsrDescriptor {
        name: "addr",
        offset: ADDR_OFFSET,
        width: 32,
        access: CsrAccess::ReadWrite,
    },
];

fn key_armed(ctrl: u32) -> bool {
    LocalRegisterCopy::<u32, Ctrl::Register>::new(ctrl).matches_all(Ctrl::KEY::Reset)
}

/// Reset request and vector as seen from the processor clock domain.
///
/// The address is published before the control value, so a processor that
/// observes the key also observes the vector written ahead of it.
#[derive(Clone, Debug)]
pub struct WarmBootLines {
    ctrl: Arc<AtomicU32>,
    addr: Arc<AtomicU32>,
}

impl WarmBootLines {
    fn new(vector: RvAddr) -> Self {
        Self {
            ctrl: Arc::new(AtomicU32::new(0)),
            addr: Arc::new(AtomicU32::new(vector)),
        }
    }

    /// Evaluated from the current control value on every call.
    pub fn do_reset(&self) -> bool {
        key_armed(self.ctrl.load(Ordering::Acquire))
    }

    pub fn reset_vector(&self) -> RvAddr {
        self.addr.load(Ordering::Acquire)
    }

    fn publish(&self, ctrl: u32, addr: RvAddr) {
        self.addr.store(addr, Ordering::Release);
        self.ctrl.store(ctrl, Ordering::Release);
    }
}

#[derive(Bus)]
pub struct WarmBoot {
    /// Reset key
    #[register(offset = 0x0, write_fn = on_write_ctrl)]
    ctrl: ReadWriteRegister<u32, Ctrl::Register>,

    /// Reset vector
    #[register(offset = 0x4, write_fn = on_write_addr)]
    addr: ReadWriteRegister<u32>,

    lines: WarmBootLines,
    default_vector: RvAddr,
}

impl WarmBoot {
    pub fn new(default_vector: RvAddr) -> Self {
        Self {
            ctrl: ReadWriteRegister::new(0),
            addr: ReadWriteRegister::new(default_vector),
            lines: WarmBootLines::new(default_vector),
            default_vector,
        }
    }

    pub fn write_control(&mut self, value: u8) {
        let was_armed = self.do_reset();
        self.ctrl.reg.set(value as u32);
        self.publish();
        if self.do_reset() && !was_armed {
            info!(
                "Warm reset requested (ctrl 0x{value:02x}), vector 0x{:08x}",
                self.reset_vector()
            );
        }
    }

    pub fn write_address(&mut self, value: u32) {
        self.addr.reg.set(value);
        self.publish();
    }

    pub fn control(&self) -> u8 {
        self.ctrl.reg.get() as u8
    }

    pub fn reset_vector(&self) -> RvAddr {
        self.addr.reg.get()
    }

    pub fn default_vector(&self) -> RvAddr {
        self.default_vector
    }

    /// Evaluated from the current control value on every call.
    pub fn do_reset(&self) -> bool {
        key_armed(self.ctrl.reg.get())
    }

    /// Handle for the processor side of the controller.
    pub fn lines(&self) -> WarmBootLines {
        self.lines.clone()
    }

    /// Power-on values; no other reset reaches these registers.
    pub fn cold_reset(&mut self) {
        self.ctrl.reg.set(0);
        self.addr.reg.set(self.default_vector);
        self.publish();
    }

    fn publish(&self) {
        self.lines.publish(self.ctrl.reg.get(), self.addr.reg.get());
    }

    fn on_write_ctrl(&mut self, size: RvSize, val: RvData) -> Result<(), BusError> {
        if size != RvSize::Word {
            Err(BusError::StoreAccessFault)?
        }
        self.write_control((val & CTRL_MASK) as u8);
        Ok(())
    }

    fn on_write_addr(&mut self, size: RvSize, val: RvData) -> Result<(), BusError> {
        if size != RvSize::Word {
            Err(BusError::StoreAccessFault)?
        }
        self.write_address(val);
        Ok(())
    }
}

impl CsrBlock for WarmBoot {
    fn registers(&self) -> &'static [CsrDescriptor] {
        REGISTERS
    }
}
