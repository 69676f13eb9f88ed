/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entrypoint for the SoC bring-up emulator.

--*/

use std::io::{self, IsTerminal};
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use emulator::{Emulator, EmulatorArgs, EMULATOR_RUNNING};
use simple_logger::SimpleLogger;

fn main() -> anyhow::Result<()> {
    let cli = EmulatorArgs::parse();
    let _ = SimpleLogger::new().with_level(cli.log_level).init();

    // exit cleanly on Ctrl-C so the run summary is still printed.
    if io::stdout().is_terminal() {
        ctrlc::set_handler(move || {
            EMULATOR_RUNNING.store(false, Ordering::Relaxed);
        })
        .context("failed to install the Ctrl-C handler")?;
    }

    let mut emulator = Emulator::from_args(cli)?;
    emulator.run();
    Ok(())
}
