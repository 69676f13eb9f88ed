/*++

Licensed under the Apache-2.0 license.

File Name:

    idelay_ctrl.rs

Abstract:

    File contains the input-delay calibration sequencer. It holds the delay
    control primitive in reset for a minimum settle time after every domain
    reset and then raises `ready`.

--*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use caliptra_emu_bus::{BusError, ReadOnlyRegister};
use caliptra_emu_derive::Bus;
use emulator_types::{Hertz, RvAddr, RvData, RvSize, PICOS_PER_NANO, PICOS_PER_SECOND};
use log::{debug, info};
use smlang::statemachine;
use soc_error::{SocError, SocResult};

use crate::crg::Clocked;
use crate::csr::{CsrAccess, CsrBlock, CsrDescriptor};

statemachine! {
    derive_states: [Clone, Copy, Debug],
    transitions: {
        // syntax: CurrentState Event [guard] / action = NextState

        // one tick of the driving domain per event
        *Calibrating + Tick [settling] / count_down = Calibrating,
        Calibrating + Tick [last_tick] / count_down = Ready,
        Ready + Tick = Ready,

        // the only way back out of Ready
        _ + Reset / reload = Calibrating
    }
}

/// State machine extended variables.
pub(crate) struct Context {
    countdown: u32,
    reload: u32,
}

impl StateMachineContext for Context {
    fn settling(&self) -> Result<bool, ()> {
        Ok(self.countdown > 1)
    }

    fn last_tick(&self) -> Result<bool, ()> {
        Ok(self.countdown == 1)
    }

    fn count_down(&mut self) -> Result<(), ()> {
        self.countdown -= 1;
        Ok(())
    }

    fn reload(&mut self) -> Result<(), ()> {
        self.countdown = self.reload;
        Ok(())
    }
}

/// Snapshot of the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationState {
    pub countdown: u32,
    pub ready: bool,
}

/// Read side of the `ready` flag for consumers in other clock domains.
#[derive(Clone, Debug, Default)]
pub struct CalibrationStatus(Arc<AtomicBool>);

impl CalibrationStatus {
    pub fn ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn publish(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

pub const READY_OFFSET: RvAddr = 0x0;

const REGISTERS: &[CsrDescriptor] = &[CsrDescriptor {
    name: "ready",
    offset: READY_OFFSET,
    width: 1,
    access: CsrAccess::ReadOnly,
}];

/// The CRG status block: a read-only mirror of `ready`.
#[derive(Bus)]
pub struct CrgStatus {
    /// Calibration ready
    #[register(offset = 0x0, read_fn = on_read_ready)]
    ready: ReadOnlyRegister<u32>,

    status: CalibrationStatus,
}

impl CrgStatus {
    pub fn new(status: CalibrationStatus) -> Self {
        Self {
            ready: ReadOnlyRegister::new(0),
            status,
        }
    }

    fn on_read_ready(&mut self, size: RvSize) -> Result<RvData, BusError> {
        if size != RvSize::Word {
            Err(BusError::LoadAccessFault)?
        }
        Ok(self.status.ready() as RvData)
    }
}

impl CsrBlock for CrgStatus {
    fn registers(&self) -> &'static [CsrDescriptor] {
        REGISTERS
    }
}

/// Number of driving-domain ticks covering `settle_ns`, rounded up.
pub fn settle_ticks(settle_ns: u64, driving_hz: Hertz) -> u128 {
    let settle_ps = settle_ns as u128 * PICOS_PER_NANO as u128;
    (settle_ps * driving_hz as u128).div_ceil(PICOS_PER_SECOND)
}

pub struct CalibrationSequencer {
    machine: StateMachine<Context>,
    status: CalibrationStatus,
}

impl CalibrationSequencer {
    /// The reload value is computed once from the driving frequency.
    pub fn new(settle_ns: u64, driving_hz: Hertz) -> SocResult<Self> {
        let ticks = settle_ticks(settle_ns, driving_hz);
        if ticks == 0 {
            return Err(SocError::configuration(format!(
                "calibration settle time of {settle_ns} ns at {driving_hz} Hz needs no ticks"
            )));
        }
        let reload = u32::try_from(ticks).map_err(|_| {
            SocError::configuration(format!(
                "calibration settle time of {settle_ns} ns at {driving_hz} Hz needs {ticks} ticks"
            ))
        })?;
        debug!("IDELAYCTRL: {settle_ns} ns at {driving_hz} Hz reloads {reload} ticks");
        Ok(Self {
            machine: StateMachine::new(Context {
                countdown: reload,
                reload,
            }),
            status: CalibrationStatus::default(),
        })
    }

    pub fn ready(&self) -> bool {
        matches!(self.machine.state(), States::Ready)
    }

    pub fn countdown(&self) -> u32 {
        self.machine.context().countdown
    }

    pub fn initial_countdown(&self) -> u32 {
        self.machine.context().reload
    }

    pub fn state(&self) -> CalibrationState {
        CalibrationState {
            countdown: self.countdown(),
            ready: self.ready(),
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status.clone()
    }
}

impl Clocked for CalibrationSequencer {
    fn tick(&mut self) {
        let was_ready = self.ready();
        // Every state accepts Tick, so this cannot fail.
        let _ = self.machine.process_event(Events::Tick);
        let ready = self.ready();
        if ready && !was_ready {
            info!("IDELAYCTRL calibrated after {} ticks", self.initial_countdown());
        }
        self.status.publish(ready);
    }

    fn reset(&mut self) {
        let _ = self.machine.process_event(Events::Reset);
        self.status.publish(false);
    }
}
