/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the primitive types shared by the SoC emulator crates.

--*/

pub use caliptra_emu_types::{RvAddr, RvData, RvSize};

/// Frequency in Hertz.
pub type Hertz = u64;

/// Simulation time in picoseconds.
pub type Picos = u64;

pub const PICOS_PER_SECOND: u128 = 1_000_000_000_000;
pub const PICOS_PER_NANO: u64 = 1_000;

/// True when `addr` is naturally aligned for an access of `size`.
pub fn is_aligned(size: RvSize, addr: RvAddr) -> bool {
    match size {
        RvSize::Byte => true,
        RvSize::HalfWord => addr & 0x1 == 0,
        RvSize::Word => addr & 0x3 == 0,
        #[allow(unreachable_patterns)]
        _ => false,
    }
}
