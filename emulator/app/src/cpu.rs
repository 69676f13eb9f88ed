/*++

Licensed under the Apache-2.0 license.

File Name:

    cpu.rs

Abstract:

    File contains the processor front end: reset vector handling and the
    instruction fetch stream. Instructions are fetched, not executed.

--*/

use std::rc::Rc;

use emulator_periph::{Clocked, MemoryMap, WarmBootLines};
use emulator_types::{RvAddr, RvData, RvSize};
use log::{debug, info};

/// Why the processor last left reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Release of the shared clock/reset generator reset.
    PowerOn,
    /// Release of the warm boot request.
    Warm,
}

pub struct Cpu {
    pc: RvAddr,
    memory: Rc<MemoryMap>,
    warm_boot: WarmBootLines,
    /// Set by a domain reset; the vector is sampled again on the first edge.
    load_vector: bool,
    in_warm_reset: bool,
    last_reset: ResetCause,
    last_fetch: Option<(RvAddr, RvData)>,
    fetches: u64,
    stalls: u64,
    warm_resets: u64,
}

impl Cpu {
    pub fn new(memory: Rc<MemoryMap>, warm_boot: WarmBootLines) -> Self {
        let pc = warm_boot.reset_vector();
        Self {
            pc,
            memory,
            warm_boot,
            load_vector: true,
            in_warm_reset: false,
            last_reset: ResetCause::PowerOn,
            last_fetch: None,
            fetches: 0,
            stalls: 0,
            warm_resets: 0,
        }
    }

    pub fn pc(&self) -> RvAddr {
        self.pc
    }

    /// Address the next fetch will use, given the reset inputs as they stand now.
    pub fn next_fetch_address(&self) -> RvAddr {
        if self.warm_boot.do_reset() || self.load_vector {
            self.warm_boot.reset_vector()
        } else {
            self.pc
        }
    }

    pub fn in_warm_reset(&self) -> bool {
        self.in_warm_reset
    }

    pub fn last_reset(&self) -> ResetCause {
        self.last_reset
    }

    pub fn last_fetch(&self) -> Option<(RvAddr, RvData)> {
        self.last_fetch
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    pub fn stall_count(&self) -> u64 {
        self.stalls
    }

    pub fn warm_reset_count(&self) -> u64 {
        self.warm_resets
    }
}

impl Clocked for Cpu {
    fn tick(&mut self) {
        let held = self.warm_boot.do_reset();
        let vector = self.warm_boot.reset_vector();
        if held {
            if !self.in_warm_reset {
                info!("CPU held in warm reset, vector 0x{vector:08x}");
                self.in_warm_reset = true;
                self.warm_resets += 1;
                self.memory.warm_reset_endpoints();
            }
            self.pc = vector;
            self.load_vector = false;
            return;
        }
        if self.load_vector {
            self.pc = vector;
            self.load_vector = false;
        }
        if self.in_warm_reset {
            info!("CPU leaving warm reset at 0x{:08x}", self.pc);
            self.in_warm_reset = false;
            self.last_reset = ResetCause::Warm;
        }

        match self.memory.bus_read(RvSize::Word, self.pc) {
            Ok(word) => {
                self.last_fetch = Some((self.pc, word));
                self.fetches += 1;
                self.pc = self.pc.wrapping_add(4);
            }
            Err(err) => {
                debug!("Fetch at 0x{:08x} stalled: {err:?}", self.pc);
                self.stalls += 1;
            }
        }
    }

    fn reset(&mut self) {
        self.pc = self.warm_boot.reset_vector();
        self.load_vector = true;
        self.in_warm_reset = false;
        self.last_reset = ResetCause::PowerOn;
        self.last_fetch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulator_bus::BusEndpoint;
    use emulator_periph::{new_ram, RamEndpoint, WarmBoot};
    use soc_config::AlignmentPolicy;
    use std::cell::RefCell;

    fn setup() -> (Cpu, Rc<RefCell<WarmBoot>>, Rc<RefCell<RamEndpoint>>) {
        let ram = Rc::new(RefCell::new(new_ram(0x100)));
        let endpoint: BusEndpoint = ram.clone();
        let memory = Rc::new(
            MemoryMap::new(
                vec![("ram".to_string(), 0x4000_0000, 0x100, endpoint)],
                AlignmentPolicy::Deny,
            )
            .unwrap(),
        );
        let warm_boot = Rc::new(RefCell::new(WarmBoot::new(0x4000_0000)));
        let cpu = Cpu::new(memory, warm_boot.borrow().lines());
        (cpu, warm_boot, ram)
    }

    #[test]
    fn test_fetches_advance_pc() {
        let (mut cpu, _, ram) = setup();
        ram.borrow_mut().device_mut().data_mut()[0..4]
            .copy_from_slice(&0x0000_0013u32.to_le_bytes());
        cpu.tick();
        assert_eq!(cpu.last_fetch(), Some((0x4000_0000, 0x13)));
        cpu.tick();
        assert_eq!(cpu.pc(), 0x4000_0008);
        assert_eq!(cpu.fetch_count(), 2);
    }

    #[test]
    fn test_warm_reset_redirects() {
        let (mut cpu, warm_boot, _) = setup();
        cpu.tick();
        cpu.tick();

        warm_boot.borrow_mut().write_address(0x4000_0080);
        warm_boot.borrow_mut().write_control(0xac);
        assert_eq!(cpu.next_fetch_address(), 0x4000_0080);
        for _ in 0..5 {
            cpu.tick();
            assert!(cpu.in_warm_reset());
            assert_eq!(cpu.pc(), 0x4000_0080);
        }
        assert_eq!(cpu.warm_reset_count(), 1);

        warm_boot.borrow_mut().write_control(0);
        cpu.tick();
        assert_eq!(cpu.last_reset(), ResetCause::Warm);
        assert_eq!(cpu.last_fetch().unwrap().0, 0x4000_0080);
        assert_eq!(cpu.pc(), 0x4000_0084);
    }

    #[test]
    fn test_stall_on_fault() {
        let (mut cpu, warm_boot, _) = setup();
        warm_boot.borrow_mut().write_address(0x5000_0000);
        cpu.reset();
        cpu.tick();
        cpu.tick();
        assert_eq!(cpu.pc(), 0x5000_0000);
        assert_eq!(cpu.stall_count(), 2);
        assert_eq!(cpu.fetch_count(), 0);
    }

    #[test]
    fn test_domain_reset_samples_vector() {
        let (mut cpu, warm_boot, _) = setup();
        cpu.tick();
        cpu.reset();
        warm_boot.borrow_mut().write_address(0x4000_0040);
        assert_eq!(cpu.next_fetch_address(), 0x4000_0040);
        cpu.tick();
        assert_eq!(cpu.last_fetch().unwrap().0, 0x4000_0040);
        assert_eq!(cpu.last_reset(), ResetCause::PowerOn);
    }
}
