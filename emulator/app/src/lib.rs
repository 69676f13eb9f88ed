/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Library interface for the SoC bring-up emulator.

--*/

use std::sync::atomic::AtomicBool;

pub mod cpu;
pub mod emulator;
pub mod soc;

pub use cpu::{Cpu, ResetCause};
pub use emulator::{Emulator, EmulatorArgs, StepAction};
pub use soc::{Soc, SocArgs, CRG_BLOCK, WARM_BOOT_BLOCK};

/// Cleared to stop the main loop, e.g. from a Ctrl-C handler.
pub static EMULATOR_RUNNING: AtomicBool = AtomicBool::new(true);
