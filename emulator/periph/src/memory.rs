// Licensed under the Apache-2.0 license

//! Boot ROM and RAM endpoints.

use caliptra_emu_bus::{Ram, Rom};
use emulator_bus::Mapped;
use emulator_types::RvAddr;
use soc_error::{SocError, SocResult};

pub type RamEndpoint = Mapped<Ram>;
pub type RomEndpoint = Mapped<Rom>;

/// Zero-filled RAM covering a `size` byte window.
pub fn new_ram(size: RvAddr) -> RamEndpoint {
    Mapped::new(Ram::new(vec![0; size as usize]), size)
}

/// Read-only boot memory. Bytes past the loaded image read as zero.
pub fn new_rom(size: RvAddr, image: &[u8]) -> SocResult<RomEndpoint> {
    if image.len() > size as usize {
        return Err(SocError::configuration(format!(
            "ROM image of {} bytes does not fit in 0x{size:x} bytes",
            image.len()
        )));
    }
    let mut data = vec![0; size as usize];
    data[..image.len()].copy_from_slice(image);
    Ok(Mapped::new(Rom::new(data), size))
}
