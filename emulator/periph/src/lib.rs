/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SoC emulator peripheral library.

--*/

mod crg;
mod csr;
mod idelay_ctrl;
mod mem_map;
mod memory;
mod spi_flash;
mod warm_boot;

pub use crg::{ClockDomain, ClockSource, Clocked, Crg, MmcmLadder};
pub use csr::{CsrAccess, CsrBank, CsrBlock, CsrDescriptor, CsrLocation, CSR_BLOCK_STRIDE};
pub use idelay_ctrl::{
    settle_ticks, CalibrationSequencer, CalibrationState, CalibrationStatus, CrgStatus,
};
pub use mem_map::{MemoryMap, MemoryRegion, RegionHandle};
pub use memory::{new_ram, new_rom, RamEndpoint, RomEndpoint};
pub use spi_flash::{FlashPartInfo, XipFlash};
pub use warm_boot::{WarmBoot, WarmBootLines};
