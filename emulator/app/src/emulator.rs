/*++

Licensed under the Apache-2.0 license.

File Name:

    emulator.rs

Abstract:

    File contains the command line front end of the SoC emulator.

--*/

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use clap_num::maybe_hex;
use log::{info, LevelFilter};
use soc_config::SocConfig;

use crate::soc::{Soc, SocArgs};
use crate::EMULATOR_RUNNING;

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse()
        .map_err(|_| format!("unknown log level {s}; expected off, error, warn, info, debug or trace"))
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, name = "SoC Bring-up Emulator")]
pub struct EmulatorArgs {
    /// TOML configuration. Built-in defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Boot ROM image.
    #[arg(short, long)]
    pub rom: Option<PathBuf>,

    /// Image served through the execute-in-place flash window.
    #[arg(short, long)]
    pub flash_image: Option<PathBuf>,

    /// Override the reset vector loaded on cold reset.
    #[arg(long, value_parser=maybe_hex::<u32>)]
    pub boot_vector: Option<u32>,

    /// Override the input-delay calibration settle time.
    #[arg(long)]
    pub settle_ns: Option<u64>,

    /// Override the reference clock frequency.
    #[arg(long)]
    pub input_clock_hz: Option<u64>,

    /// CPU cycles to run. Runs until interrupted when omitted.
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Write the register map in csr.csv format.
    #[arg(long)]
    pub csr_csv: Option<PathBuf>,

    #[arg(long, value_parser = parse_level, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Break,
}

fn read_image(path: Option<&Path>, what: &str) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {what} {}", path.display()))
        }
        None => Ok(Vec::new()),
    }
}

pub struct Emulator {
    soc: Soc,
    cycle_limit: Option<u64>,
}

impl Emulator {
    pub fn from_args(cli: EmulatorArgs) -> anyhow::Result<Self> {
        let mut config = match cli.config.as_deref() {
            Some(path) => SocConfig::load(path)?,
            None => SocConfig::default(),
        };
        if let Some(boot_vector) = cli.boot_vector {
            config.boot_vector_default = boot_vector;
        }
        if let Some(settle_ns) = cli.settle_ns {
            config.minimum_settle_time_ns = settle_ns;
        }
        if let Some(input_clock_hz) = cli.input_clock_hz {
            config.input_clock_hz = input_clock_hz;
        }

        let rom_image = read_image(cli.rom.as_deref(), "ROM image")?;
        let flash_image = read_image(cli.flash_image.as_deref(), "flash image")?;
        let soc = Soc::new(SocArgs {
            config,
            rom_image,
            flash_image,
        })
        .context("failed to assemble the SoC")?;

        if let Some(path) = cli.csr_csv.as_deref() {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            soc.write_csr_csv(&mut out)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote register map to {}", path.display());
        }

        Ok(Self {
            soc,
            cycle_limit: cli.cycles,
        })
    }

    pub fn soc(&self) -> &Soc {
        &self.soc
    }

    pub fn soc_mut(&mut self) -> &mut Soc {
        &mut self.soc
    }

    pub fn step(&mut self) -> StepAction {
        if !EMULATOR_RUNNING.load(Ordering::Relaxed) {
            return StepAction::Break;
        }
        if self
            .cycle_limit
            .is_some_and(|limit| self.soc.cpu_cycles() >= limit)
        {
            return StepAction::Break;
        }
        match self.soc.step() {
            Some(_) => StepAction::Continue,
            None => StepAction::Break,
        }
    }

    pub fn run(&mut self) {
        while self.step() == StepAction::Continue {}
        let cpu = self.soc.cpu();
        info!(
            "Stopped at {} ps: {} fetches, {} stalls, {} warm resets, pc 0x{:08x}",
            self.soc.now_ps(),
            cpu.fetch_count(),
            cpu.stall_count(),
            cpu.warm_reset_count(),
            cpu.pc()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let cli = EmulatorArgs::parse_from([
            "emulator",
            "--boot-vector",
            "0x40000000",
            "--settle-ns",
            "60",
            "--cycles",
            "10",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.boot_vector, Some(0x4000_0000));
        assert_eq!(cli.settle_ns, Some(60));
        assert_eq!(cli.log_level, LevelFilter::Debug);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_default_log_level() {
        let cli = EmulatorArgs::parse_from(["emulator"]);
        assert_eq!(cli.log_level, LevelFilter::Info);
        assert!(EmulatorArgs::try_parse_from(["emulator", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn test_cycle_limit() {
        let cli = EmulatorArgs::parse_from(["emulator", "--cycles", "25"]);
        let mut emulator = Emulator::from_args(cli).unwrap();
        emulator.run();
        assert_eq!(emulator.soc().cpu_cycles(), 25);
    }

    #[test]
    fn test_missing_image_is_reported() {
        let cli = EmulatorArgs::parse_from(["emulator", "--rom", "/nonexistent/rom.bin"]);
        let err = Emulator::from_args(cli).err().unwrap();
        assert!(format!("{err:#}").contains("ROM image"));
    }
}
