// Licensed under the Apache-2.0 license

use serde::{Deserialize, Serialize};

/// Integer ranges of the multiply/divide ladder of a mixed-mode clock manager.
///
/// Ranges are inclusive. The defaults describe a Xilinx 7-series MMCME2 in
/// speed grade -1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MmcmLimits {
    pub clkin_min_hz: u64,
    pub clkin_max_hz: u64,
    pub divclk_divide_min: u32,
    pub divclk_divide_max: u32,
    pub clkfbout_mult_min: u32,
    pub clkfbout_mult_max: u32,
    pub clkout_divide_min: u32,
    pub clkout_divide_max: u32,
    pub vco_min_hz: u64,
    pub vco_max_hz: u64,
    pub max_outputs: usize,
}

impl Default for MmcmLimits {
    fn default() -> Self {
        Self {
            clkin_min_hz: 10_000_000,
            clkin_max_hz: 800_000_000,
            divclk_divide_min: 1,
            divclk_divide_max: 106,
            clkfbout_mult_min: 2,
            clkfbout_mult_max: 64,
            clkout_divide_min: 1,
            clkout_divide_max: 128,
            vco_min_hz: 600_000_000,
            vco_max_hz: 1_200_000_000,
            max_outputs: 7,
        }
    }
}
