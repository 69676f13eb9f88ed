/*++

Licensed under the Apache-2.0 license.

File Name:

    crg.rs

Abstract:

    File contains the clock and reset generator: a single MMCM ladder deriving
    every output domain from one reference input, with one shared reset.

--*/

use std::cell::RefCell;
use std::rc::Rc;

use emulator_types::{Hertz, Picos, PICOS_PER_SECOND};
use log::{debug, info};
use soc_config::{MmcmLimits, DEFAULT_MARGIN};
use soc_error::{SocError, SocResult};

/// An MMCM output can be shifted in steps of 1/8 VCO period, i.e. 45 / divide degrees.
const PHASE_STEP_DEGREES: f64 = 45.0;
const PHASE_EPSILON: f64 = 1e-6;

/// A synchronous process driven by one clock domain.
pub trait Clocked {
    /// Called on every rising edge of the attached domain.
    fn tick(&mut self);

    /// Called when the shared reset is asserted.
    fn reset(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClockSource {
    /// The external reference input itself.
    Reference,
    /// An output of the MMCM fed by the named reference.
    Mmcm { reference: String, divide: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockDomain {
    pub name: String,
    pub target_frequency_hz: Hertz,
    pub phase_offset_degrees: f64,
    pub source: ClockSource,
}

/// The shared multiply/divide settings of the MMCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmcmLadder {
    pub divclk_divide: u32,
    pub clkfbout_mult: u32,
}

impl MmcmLadder {
    pub fn vco_hz(&self, clkin_hz: Hertz) -> f64 {
        clkin_hz as f64 * self.clkfbout_mult as f64 / self.divclk_divide as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct Target {
    frequency_hz: Hertz,
    phase_degrees: f64,
    margin: f64,
}

struct Output {
    domain: ClockDomain,
    margin: f64,
    divide: u32,
    edges: u64,
    processes: Vec<Rc<RefCell<dyn Clocked>>>,
}

impl Output {
    fn target(&self) -> Target {
        Target {
            frequency_hz: self.domain.target_frequency_hz,
            phase_degrees: self.domain.phase_offset_degrees,
            margin: self.margin,
        }
    }
}

fn phase_reachable(phase_degrees: f64, divide: u32) -> bool {
    let steps = phase_degrees * divide as f64 / PHASE_STEP_DEGREES;
    (steps - steps.round()).abs() < PHASE_EPSILON
}

fn find_divide(
    clkin_hz: Hertz,
    ladder: MmcmLadder,
    limits: &MmcmLimits,
    target: &Target,
) -> Option<u32> {
    // Compare clkin * mult against f * divclk * d to stay in integers.
    let synthesized = clkin_hz as u128 * ladder.clkfbout_mult as u128;
    (limits.clkout_divide_min..=limits.clkout_divide_max).find(|&divide| {
        let wanted =
            target.frequency_hz as u128 * ladder.divclk_divide as u128 * divide as u128;
        let error = synthesized.abs_diff(wanted) as f64;
        error <= wanted as f64 * target.margin && phase_reachable(target.phase_degrees, divide)
    })
}

/// Searches the ladder the way the vendor tools do: smallest input divider
/// first, largest feedback multiplier first, first fit wins.
fn solve(
    clkin_hz: Hertz,
    limits: &MmcmLimits,
    targets: &[Target],
) -> Option<(MmcmLadder, Vec<u32>)> {
    for divclk_divide in limits.divclk_divide_min..=limits.divclk_divide_max {
        for clkfbout_mult in (limits.clkfbout_mult_min..=limits.clkfbout_mult_max).rev() {
            let ladder = MmcmLadder {
                divclk_divide,
                clkfbout_mult,
            };
            let vco_scaled = clkin_hz as u128 * clkfbout_mult as u128;
            if vco_scaled < limits.vco_min_hz as u128 * divclk_divide as u128
                || vco_scaled > limits.vco_max_hz as u128 * divclk_divide as u128
            {
                continue;
            }
            let divides: Option<Vec<u32>> = targets
                .iter()
                .map(|t| find_divide(clkin_hz, ladder, limits, t))
                .collect();
            if let Some(divides) = divides {
                return Some((ladder, divides));
            }
        }
    }
    None
}

pub struct Crg {
    reference: ClockDomain,
    clkin_hz: Hertz,
    limits: MmcmLimits,
    lock_cycles: u32,
    ladder: Option<MmcmLadder>,
    outputs: Vec<Output>,
    reset: bool,
    locked: bool,
    now: Picos,
    lock_at: Option<Picos>,
}

impl Crg {
    /// Creates a clock generator fed by `clkin_hz`. It starts with its reset
    /// asserted; outputs are added and processes attached before release.
    pub fn new(
        reference_name: &str,
        clkin_hz: Hertz,
        limits: MmcmLimits,
        lock_cycles: u32,
    ) -> SocResult<Self> {
        if clkin_hz < limits.clkin_min_hz || clkin_hz > limits.clkin_max_hz {
            return Err(SocError::configuration(format!(
                "reference {reference_name} at {clkin_hz} Hz is outside the MMCM input range {}..={} Hz",
                limits.clkin_min_hz, limits.clkin_max_hz
            )));
        }
        Ok(Self {
            reference: ClockDomain {
                name: reference_name.to_string(),
                target_frequency_hz: clkin_hz,
                phase_offset_degrees: 0.0,
                source: ClockSource::Reference,
            },
            clkin_hz,
            limits,
            lock_cycles,
            ladder: None,
            outputs: Vec::new(),
            reset: true,
            locked: false,
            now: 0,
            lock_at: None,
        })
    }

    pub fn add_output(
        &mut self,
        name: &str,
        target_frequency_hz: Hertz,
        phase_offset_degrees: f64,
    ) -> SocResult<()> {
        self.add_output_with_margin(name, target_frequency_hz, phase_offset_degrees, DEFAULT_MARGIN)
    }

    /// Adds an output domain, re-solving the ladder for every output. On
    /// failure the generator is left unchanged.
    pub fn add_output_with_margin(
        &mut self,
        name: &str,
        target_frequency_hz: Hertz,
        phase_offset_degrees: f64,
        margin: f64,
    ) -> SocResult<()> {
        if name == self.reference.name || self.outputs.iter().any(|o| o.domain.name == name) {
            return Err(SocError::DuplicateName {
                kind: "clock domain",
                name: name.to_string(),
            });
        }
        if !self.reset {
            return Err(SocError::configuration(format!(
                "clock domain {name} must be added while the CRG is held in reset"
            )));
        }
        if target_frequency_hz == 0 {
            return Err(SocError::configuration(format!(
                "clock domain {name} requests 0 Hz"
            )));
        }
        if !(0.0..360.0).contains(&phase_offset_degrees) {
            return Err(SocError::configuration(format!(
                "clock domain {name} phase {phase_offset_degrees} is outside [0, 360) degrees"
            )));
        }
        if !margin.is_finite() || margin < 0.0 {
            return Err(SocError::configuration(format!(
                "clock domain {name} margin {margin} must be a non-negative fraction"
            )));
        }
        if self.outputs.len() >= self.limits.max_outputs {
            return Err(SocError::configuration(format!(
                "clock domain {name} exceeds the {} MMCM outputs",
                self.limits.max_outputs
            )));
        }

        let target = Target {
            frequency_hz: target_frequency_hz,
            phase_degrees: phase_offset_degrees,
            margin,
        };
        let mut targets: Vec<Target> = self.outputs.iter().map(Output::target).collect();
        targets.push(target);
        let (ladder, divides) = solve(self.clkin_hz, &self.limits, &targets).ok_or_else(|| {
            SocError::configuration(format!(
                "no MMCM configuration derives {name} at {target_frequency_hz} Hz \
                 (phase {phase_offset_degrees} degrees, margin {margin}) from {} at {} Hz \
                 alongside the existing outputs",
                self.reference.name, self.clkin_hz
            ))
        })?;

        self.outputs.push(Output {
            domain: ClockDomain {
                name: name.to_string(),
                target_frequency_hz,
                phase_offset_degrees,
                source: ClockSource::Reference,
            },
            margin,
            divide: 0,
            edges: 0,
            processes: Vec::new(),
        });
        for (output, divide) in self.outputs.iter_mut().zip(divides) {
            output.divide = divide;
            output.domain.source = ClockSource::Mmcm {
                reference: self.reference.name.clone(),
                divide,
            };
        }
        debug!(
            "MMCM: divclk_divide={} clkfbout_mult={} vco={} Hz after adding {name}",
            ladder.divclk_divide,
            ladder.clkfbout_mult,
            ladder.vco_hz(self.clkin_hz)
        );
        self.ladder = Some(ladder);
        Ok(())
    }

    /// Attaches a process to the named output domain. Its `reset` runs on
    /// every assertion of the shared reset and its `tick` on every edge.
    pub fn attach(&mut self, domain: &str, process: Rc<RefCell<dyn Clocked>>) -> SocResult<()> {
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.domain.name == domain)
            .ok_or_else(|| {
                SocError::configuration(format!("cannot attach to unknown clock domain {domain}"))
            })?;
        process.borrow_mut().reset();
        output.processes.push(process);
        Ok(())
    }

    /// Drives the single upstream reset input shared by every output domain.
    pub fn set_reset(&mut self, asserted: bool) {
        if asserted {
            if !self.reset {
                info!("CRG reset asserted at {} ps", self.now);
            }
            self.reset = true;
            self.locked = false;
            self.lock_at = None;
            for output in self.outputs.iter_mut() {
                output.edges = 0;
                for process in output.processes.iter() {
                    process.borrow_mut().reset();
                }
            }
        } else if self.reset {
            self.reset = false;
            self.lock_at = Some(self.now + self.lock_time_ps());
            debug!("CRG reset released at {} ps", self.now);
        }
    }

    fn lock_time_ps(&self) -> Picos {
        (self.lock_cycles as u128 * PICOS_PER_SECOND).div_ceil(self.clkin_hz as u128) as Picos
    }

    fn period_ratio(&self, output: &Output, ladder: MmcmLadder) -> (u128, u128) {
        (
            PICOS_PER_SECOND * ladder.divclk_divide as u128 * output.divide as u128,
            self.clkin_hz as u128 * ladder.clkfbout_mult as u128,
        )
    }

    fn next_edge_ps(&self, output: &Output, ladder: MmcmLadder, lock_at: Picos) -> Picos {
        let (num, den) = self.period_ratio(output, ladder);
        let phase = (output.domain.phase_offset_degrees / 360.0 * num as f64 / den as f64) as u128;
        lock_at + (phase + output.edges as u128 * num / den) as Picos
    }

    /// Moves time forward to the next output edge. Returns the edge time and
    /// the indices of every domain with an edge at that instant, in domain
    /// order. Nothing toggles while reset is asserted or before lock.
    pub fn advance(&mut self) -> Option<(Picos, Vec<usize>)> {
        let lock_at = self.lock_at?;
        let ladder = self.ladder?;
        let edges: Vec<Picos> = self
            .outputs
            .iter()
            .map(|o| self.next_edge_ps(o, ladder, lock_at))
            .collect();
        let next = *edges.iter().min()?;
        self.now = next;
        if !self.locked {
            self.locked = true;
            info!("MMCM locked at {} ps", lock_at);
        }
        let ticked: Vec<usize> = edges
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == next)
            .map(|(i, _)| i)
            .collect();
        for &i in ticked.iter() {
            self.outputs[i].edges += 1;
        }
        Some((next, ticked))
    }

    /// Advances to the next edge and runs the attached processes of every
    /// domain that toggled, in domain order.
    pub fn step(&mut self) -> Option<Picos> {
        let (now, ticked) = self.advance()?;
        for i in ticked {
            for process in self.outputs[i].processes.iter() {
                process.borrow_mut().tick();
            }
        }
        Some(now)
    }

    pub fn reference(&self) -> &ClockDomain {
        &self.reference
    }

    pub fn domains(&self) -> impl Iterator<Item = &ClockDomain> {
        self.outputs.iter().map(|o| &o.domain)
    }

    pub fn domain(&self, name: &str) -> Option<&ClockDomain> {
        self.domains().find(|d| d.name == name)
    }

    pub fn domain_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.domain.name == name)
    }

    pub fn ladder(&self) -> Option<MmcmLadder> {
        self.ladder
    }

    /// Frequency the ladder actually synthesizes for the named domain.
    pub fn actual_frequency_hz(&self, name: &str) -> Option<f64> {
        let ladder = self.ladder?;
        let output = self.outputs.iter().find(|o| o.domain.name == name)?;
        Some(ladder.vco_hz(self.clkin_hz) / output.divide as f64)
    }

    pub fn edge_count(&self, name: &str) -> Option<u64> {
        self.outputs
            .iter()
            .find(|o| o.domain.name == name)
            .map(|o| o.edges)
    }

    pub fn in_reset(&self) -> bool {
        self.reset
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn now_ps(&self) -> Picos {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emulator_consts::*;

    #[derive(Default)]
    struct EdgeCounter {
        ticks: u64,
        resets: u64,
    }

    impl Clocked for EdgeCounter {
        fn tick(&mut self) {
            self.ticks += 1;
        }

        fn reset(&mut self) {
            self.ticks = 0;
            self.resets += 1;
        }
    }

    fn default_crg() -> Crg {
        let mut crg = Crg::new(
            INPUT_CLOCK_NAME,
            INPUT_CLOCK_HZ,
            MmcmLimits::default(),
            PLL_LOCK_REFERENCE_CYCLES,
        )
        .unwrap();
        crg.add_output_with_margin(SYS_DOMAIN, SYS_CLOCK_HZ, 0.0, 0.0)
            .unwrap();
        crg.add_output(SPINOR_DOMAIN, SPINOR_CLOCK_HZ, SPINOR_PHASE_DEGREES)
            .unwrap();
        crg.add_output(IDELAY_REF_DOMAIN, IDELAY_REF_CLOCK_HZ, 0.0)
            .unwrap();
        crg
    }

    #[test]
    fn test_default_ladder() {
        let crg = default_crg();
        assert_eq!(
            crg.ladder(),
            Some(MmcmLadder {
                divclk_divide: 1,
                clkfbout_mult: 50
            })
        );
        let divides: Vec<ClockSource> = crg.domains().map(|d| d.source.clone()).collect();
        assert_eq!(
            divides,
            vec![
                ClockSource::Mmcm {
                    reference: "clk12".into(),
                    divide: 6
                },
                ClockSource::Mmcm {
                    reference: "clk12".into(),
                    divide: 6
                },
                ClockSource::Mmcm {
                    reference: "clk12".into(),
                    divide: 3
                },
            ]
        );
        assert_eq!(crg.actual_frequency_hz(IDELAY_REF_DOMAIN), Some(200e6));
        assert_eq!(crg.reference().source, ClockSource::Reference);
    }

    #[test]
    fn test_unreachable_frequency_leaves_crg_unchanged() {
        let mut crg = default_crg();
        let err = crg
            .add_output_with_margin("odd", 123_456_789, 0.0, 0.0)
            .unwrap_err();
        assert!(matches!(err, SocError::Configuration(_)));
        assert!(err.to_string().contains("odd"));
        assert_eq!(crg.domains().count(), 3);
        assert_eq!(crg.ladder().unwrap().clkfbout_mult, 50);
    }

    #[test]
    fn test_unreachable_phase() {
        let mut crg = default_crg();
        // 100 MHz only comes out of divide 6, whose phase step is 7.5 degrees.
        assert!(matches!(
            crg.add_output_with_margin("skewed", 100_000_000, 10.0, 0.0),
            Err(SocError::Configuration(_))
        ));
        crg.add_output_with_margin("quadrature", 100_000_000, 90.0, 0.0)
            .unwrap();
    }

    #[test]
    fn test_phase_out_of_range() {
        let mut crg = default_crg();
        assert!(crg.add_output("wrap", 100_000_000, 360.0).is_err());
        assert!(crg.add_output("negative", 100_000_000, -7.5).is_err());
    }

    #[test]
    fn test_duplicate_domain_name() {
        let mut crg = default_crg();
        assert!(matches!(
            crg.add_output(SYS_DOMAIN, 50_000_000, 0.0),
            Err(SocError::DuplicateName { .. })
        ));
        assert!(matches!(
            crg.add_output(INPUT_CLOCK_NAME, 50_000_000, 0.0),
            Err(SocError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_output_count_limit() {
        let mut crg = default_crg();
        for i in 0..4 {
            crg.add_output(&format!("extra{i}"), 50_000_000, 0.0).unwrap();
        }
        assert!(matches!(
            crg.add_output("extra4", 50_000_000, 0.0),
            Err(SocError::Configuration(_))
        ));
    }

    #[test]
    fn test_reference_out_of_range() {
        assert!(Crg::new("slow", 1_000_000, MmcmLimits::default(), 16).is_err());
    }

    #[test]
    fn test_no_edges_before_lock() {
        let mut crg = default_crg();
        assert!(crg.advance().is_none());
        assert!(!crg.is_locked());

        crg.set_reset(false);
        assert!(!crg.is_locked());
        let (t, ticked) = crg.advance().unwrap();
        // 16 cycles of 12 MHz, rounded up to the next picosecond.
        assert_eq!(t, 1_333_334);
        assert_eq!(ticked, vec![0, 2]);
        assert!(crg.is_locked());
    }

    #[test]
    fn test_edges_follow_frequency_and_phase() {
        let mut crg = default_crg();
        crg.set_reset(false);
        while crg.edge_count(SYS_DOMAIN).unwrap() < 10 {
            crg.advance().unwrap();
        }
        assert_eq!(crg.now_ps(), 1_333_334 + 90_000);
        assert_eq!(crg.edge_count(IDELAY_REF_DOMAIN), Some(19));
        assert_eq!(crg.edge_count(SPINOR_DOMAIN), Some(9));
    }

    #[test]
    fn test_shared_reset_fans_out() {
        let mut crg = default_crg();
        let sys = Rc::new(RefCell::new(EdgeCounter::default()));
        let idelay = Rc::new(RefCell::new(EdgeCounter::default()));
        crg.attach(SYS_DOMAIN, sys.clone()).unwrap();
        crg.attach(IDELAY_REF_DOMAIN, idelay.clone()).unwrap();
        assert!(crg.attach("missing", sys.clone()).is_err());

        crg.set_reset(false);
        for _ in 0..30 {
            crg.step().unwrap();
        }
        // Three edges per 10 ns: sys and idelay_ref together, spinor, idelay_ref.
        assert_eq!(sys.borrow().ticks, 10);
        assert_eq!(idelay.borrow().ticks, 20);

        crg.set_reset(true);
        assert_eq!(sys.borrow().ticks, 0);
        assert_eq!(idelay.borrow().ticks, 0);
        assert_eq!(sys.borrow().resets, 2);
        assert_eq!(idelay.borrow().resets, 2);
        assert!(crg.step().is_none());
        assert!(!crg.is_locked());

        crg.set_reset(false);
        let now = crg.now_ps();
        assert_eq!(crg.step(), Some(now + 1_333_334));
        assert_eq!(sys.borrow().ticks, 1);
        assert_eq!(idelay.borrow().ticks, 1);
    }

    #[test]
    fn test_outputs_fixed_after_release() {
        let mut crg = default_crg();
        crg.set_reset(false);
        assert!(crg.add_output("late", 50_000_000, 0.0).is_err());
    }
}
