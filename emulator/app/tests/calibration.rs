// Licensed under the Apache-2.0 license

use emulator::{Soc, SocArgs, CRG_BLOCK};
use emulator_bus::BusError;
use emulator_consts::{IDELAY_REF_DOMAIN, SPIFLASH_ORG};
use emulator_types::RvSize;
use soc_config::SocConfig;

fn soc_with_image() -> Soc {
    Soc::new(SocArgs {
        flash_image: vec![0x37, 0x05, 0x00, 0x20],
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_ready_after_31_reference_ticks() {
    let mut soc = soc_with_image();
    assert!(!soc.calibration_ready());
    loop {
        let ticks = soc.crg().edge_count(IDELAY_REF_DOMAIN).unwrap();
        if soc.calibration_ready() {
            assert_eq!(ticks, 31);
            break;
        }
        assert!(ticks < 31, "not ready after {ticks} ticks");
        soc.step().unwrap();
    }
    for _ in 0..200 {
        soc.step().unwrap();
        assert!(soc.calibration_ready());
    }
}

#[test]
fn test_nothing_toggles_before_lock() {
    let mut soc = soc_with_image();
    assert!(!soc.crg().is_locked());
    let first = soc.step().unwrap();
    assert!(soc.crg().is_locked());
    // 16 cycles of the 12 MHz reference.
    assert!(first >= 1_333_333);
}

#[test]
fn test_flash_reads_gated_until_calibrated() {
    let mut soc = soc_with_image();
    assert_eq!(
        soc.bus_read(RvSize::Word, SPIFLASH_ORG),
        Err(BusError::LoadAccessFault)
    );
    assert_eq!(soc.read_csr(CRG_BLOCK, "ready").unwrap(), 0);

    soc.run_cycles(50);
    assert!(soc.flash_calibrated());
    assert_eq!(soc.bus_read(RvSize::Word, SPIFLASH_ORG).unwrap(), 0x2000_0537);
    assert_eq!(soc.read_csr(CRG_BLOCK, "ready").unwrap(), 1);
    assert!(soc.write_csr(CRG_BLOCK, "ready", 0).is_err());
}

#[test]
fn test_domain_reset_reloads_countdown() {
    let mut soc = soc_with_image();
    for _ in 0..20 {
        soc.step().unwrap();
    }
    assert!(soc.calibration_state().countdown < 31);

    soc.set_reset(true);
    assert_eq!(soc.calibration_state().countdown, 31);
    assert!(!soc.calibration_state().ready);
    assert!(soc.step().is_none());
    assert!(!soc.flash_calibrated());

    soc.set_reset(false);
    soc.run_cycles(50);
    assert!(soc.calibration_ready());
}

#[test]
fn test_countdown_follows_configuration() {
    let mut config = SocConfig::default();
    config.minimum_settle_time_ns = 60;
    config
        .domains
        .iter_mut()
        .find(|d| d.name == IDELAY_REF_DOMAIN)
        .unwrap()
        .frequency_hz = 100_000_000;
    let soc = Soc::new(SocArgs {
        config,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(soc.calibration_state().countdown, 6);
}

#[test]
fn test_zero_settle_time_rejected() {
    let mut config = SocConfig::default();
    config.minimum_settle_time_ns = 0;
    assert!(Soc::new(SocArgs {
        config,
        ..Default::default()
    })
    .is_err());
}
