/*++

Licensed under the Apache-2.0 license.

File Name:

    bus.rs

Abstract:

    File contains definition of the Bus and Peripheral traits.

--*/

use std::cell::RefCell;
use std::rc::Rc;

use emulator_types::{is_aligned, RvAddr, RvData, RvSize};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusError {
    /// Instruction access exception
    InstrAccessFault,

    /// Load address misaligned exception
    LoadAddrMisaligned,

    /// Load access fault exception
    LoadAccessFault,

    /// Store address misaligned exception
    StoreAddrMisaligned,

    /// Store access fault exception
    StoreAccessFault,
}

impl From<caliptra_emu_bus::BusError> for BusError {
    fn from(value: caliptra_emu_bus::BusError) -> Self {
        match value {
            caliptra_emu_bus::BusError::InstrAccessFault => BusError::InstrAccessFault,
            caliptra_emu_bus::BusError::LoadAddrMisaligned => BusError::LoadAddrMisaligned,
            caliptra_emu_bus::BusError::LoadAccessFault => BusError::LoadAccessFault,
            caliptra_emu_bus::BusError::StoreAddrMisaligned => BusError::StoreAddrMisaligned,
            caliptra_emu_bus::BusError::StoreAccessFault => BusError::StoreAccessFault,
        }
    }
}

/// Represents an abstract memory bus. Used to read and write from RAM and
/// peripheral addresses.
pub trait Bus {
    /// Read data of specified size from given address
    ///
    /// # Arguments
    ///
    /// * `size` - Size of the read
    /// * `addr` - Address to read from
    ///
    /// # Error
    ///
    /// * `BusError` - Exception with cause `BusError::LoadAccessFault` or `BusError::LoadAddrMisaligned`
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError>;

    /// Write data of specified size to given address
    ///
    /// # Arguments
    ///
    /// * `size` - Size of the write
    /// * `addr` - Address to write
    /// * `val` - Data to write
    ///
    /// # Error
    ///
    /// * `BusError` - Exception with cause `BusError::StoreAccessFault` or `BusError::StoreAddrMisaligned`
    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError>;

    /// This method is used to notify peripherals of the passage of time. The
    /// owner of this bus MAY call this function periodically.
    fn poll(&mut self) {
        // By default, do nothing
    }

    fn warm_reset(&mut self) {
        // By default, do nothing
    }
}

/// A bus target that occupies a fixed-size window of the address map.
///
/// Addresses handed to a peripheral are offsets within its own window.
pub trait Peripheral: Bus {
    /// Size of the address window this peripheral decodes, in bytes.
    fn mmap_size(&self) -> RvAddr;
}

/// Shared handle to the transaction interface of a mapped peripheral.
pub type BusEndpoint = Rc<RefCell<dyn Peripheral>>;

/// Places a `caliptra_emu_bus` device in a window of the SoC address map.
/// Accesses must be naturally aligned and start inside the window.
pub struct Mapped<T> {
    device: T,
    size: RvAddr,
}

impl<T> Mapped<T> {
    pub fn new(device: T, size: RvAddr) -> Self {
        Self { device, size }
    }

    pub fn device(&self) -> &T {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut T {
        &mut self.device
    }
}

impl<T: caliptra_emu_bus::Bus> Bus for Mapped<T> {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        if !is_aligned(size, addr) {
            return Err(BusError::LoadAddrMisaligned);
        }
        if addr >= self.size {
            return Err(BusError::LoadAccessFault);
        }
        Ok(caliptra_emu_bus::Bus::read(&mut self.device, size, addr)?)
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        if !is_aligned(size, addr) {
            return Err(BusError::StoreAddrMisaligned);
        }
        if addr >= self.size {
            return Err(BusError::StoreAccessFault);
        }
        Ok(caliptra_emu_bus::Bus::write(
            &mut self.device,
            size,
            addr,
            val,
        )?)
    }

    fn poll(&mut self) {
        caliptra_emu_bus::Bus::poll(&mut self.device);
    }

    fn warm_reset(&mut self) {
        caliptra_emu_bus::Bus::warm_reset(&mut self.device);
    }
}

impl<T: caliptra_emu_bus::Bus> Peripheral for Mapped<T> {
    fn mmap_size(&self) -> RvAddr {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caliptra_emu_bus::Ram;

    #[test]
    fn test_error_conversion() {
        assert_eq!(
            BusError::from(caliptra_emu_bus::BusError::LoadAccessFault),
            BusError::LoadAccessFault
        );
        assert_eq!(
            BusError::from(caliptra_emu_bus::BusError::StoreAddrMisaligned),
            BusError::StoreAddrMisaligned
        );
    }

    #[test]
    fn test_mapped_window() {
        let mut ram = Mapped::new(Ram::new(vec![0; 0x10]), 0x10);
        ram.write(RvSize::Word, 0x4, 0x1122_3344).unwrap();
        assert_eq!(ram.read(RvSize::Word, 0x4).unwrap(), 0x1122_3344);
        assert_eq!(&ram.device().data()[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(ram.read(RvSize::Word, 0x10), Err(BusError::LoadAccessFault));
        assert_eq!(
            ram.write(RvSize::Word, 0x10, 0),
            Err(BusError::StoreAccessFault)
        );
        assert_eq!(ram.mmap_size(), 0x10);
    }
}
