/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the SoC emulator bus library.

--*/

mod bus;

pub use bus::{Bus, BusEndpoint, BusError, Mapped, Peripheral};
