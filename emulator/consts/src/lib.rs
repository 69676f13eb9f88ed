/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the default platform constants for the simulated SoC.

--*/

// Reference clock
pub const INPUT_CLOCK_NAME: &str = "clk12";
pub const INPUT_CLOCK_HZ: u64 = 12_000_000;

// Derived clock domains
pub const SYS_DOMAIN: &str = "sys";
pub const SYS_CLOCK_HZ: u64 = 100_000_000;
pub const SPINOR_DOMAIN: &str = "spinor";
pub const SPINOR_CLOCK_HZ: u64 = 100_000_000;
pub const SPINOR_PHASE_DEGREES: f64 = 82.5;
pub const IDELAY_REF_DOMAIN: &str = "idelay_ref";
pub const IDELAY_REF_CLOCK_HZ: u64 = 200_000_000;

/// Minimum IDELAYCTRL reset pulse before the delay taps can be trusted.
pub const IDELAY_MIN_SETTLE_NS: u64 = 155;

/// Reference cycles the MMCM needs after reset release before asserting lock.
pub const PLL_LOCK_REFERENCE_CYCLES: u32 = 16;

// Integrated memories; bases come from the platform table
pub const ROM_ORG: u32 = 0x0000_0000;
pub const ROM_SIZE: u32 = 0x8000;
pub const SRAM_ORG: u32 = 0x0100_0000;
pub const SRAM_SIZE: u32 = 0x2_0000;
pub const CSR_ORG: u32 = 0x8200_0000;
pub const CSR_SIZE: u32 = 0x1_0000;

// External peripherals
pub const SRAM_EXT_ORG: u32 = 0x4000_0000;
pub const SRAM_EXT_SIZE: u32 = 0x100_0000;
pub const SPIFLASH_ORG: u32 = 0x2000_0000;
pub const SPIFLASH_SIZE: u32 = 128 * 1024 * 1024;
pub const FLASH_PART: &str = "mx66um1g45g";

/// Offset of the firmware within the flash; leaves room for bitstreams when non-zero.
pub const BOOT_OFFSET: u32 = 0x0;

pub const CPU_RESET_ADDR: u32 = SPIFLASH_ORG + BOOT_OFFSET;

pub const IDENT: &str = "betrusted.io LiteX Base SoC";
