// Licensed under the Apache-2.0 license

use std::fs;
use std::io::Write;

use clap::Parser;
use emulator::{Emulator, EmulatorArgs};

#[test]
fn test_csr_csv_export() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("csr.csv");
    let cli = EmulatorArgs::parse_from([
        "emulator",
        "--cycles",
        "1",
        "--csr-csv",
        csv.to_str().unwrap(),
    ]);
    Emulator::from_args(cli).unwrap();

    let text = fs::read_to_string(&csv).unwrap();
    let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    for expected in [
        "csr_base,reboot,0x82000000,,",
        "csr_base,crg,0x82000800,,",
        "csr_register,reboot_ctrl,0x82000000,1,rw",
        "csr_register,reboot_addr,0x82000004,1,rw",
        "csr_register,crg_ready,0x82000800,1,ro",
        "constant,config_clock_frequency,100000000,,",
        "constant,config_cpu_reset_addr,536870912,,",
        "constant,simulation,1,,",
        "constant,spiflash_simulation,1,,",
        "memory_region,rom,0x00000000,32768,cached",
        "memory_region,csr,0x82000000,65536,io",
        "memory_region,spiflash,0x20000000,134217728,cached",
    ] {
        assert!(lines.contains(&expected), "missing {expected} in\n{text}");
    }
}

#[test]
fn test_config_file_and_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
boot_vector_default = 0x40000000
minimum_settle_time_ns = 100
"#
    )
    .unwrap();
    let cli = EmulatorArgs::parse_from([
        "emulator",
        "--config",
        file.path().to_str().unwrap(),
        "--settle-ns",
        "20",
    ]);
    let emulator = Emulator::from_args(cli).unwrap();
    let soc = emulator.soc();
    assert_eq!(soc.warm_boot().reset_vector(), 0x4000_0000);
    assert_eq!(soc.calibration_state().countdown, 4);
}

#[test]
fn test_bad_config_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "cpu_domain = \"nope\"").unwrap();
    let cli = EmulatorArgs::parse_from(["emulator", "--config", file.path().to_str().unwrap()]);
    let err = Emulator::from_args(cli).err().unwrap();
    assert!(format!("{err:#}").contains("nope"));
}
