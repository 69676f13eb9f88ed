// Licensed under the Apache-2.0 license

//! Construction-time failures of the simulated SoC topology.
//!
//! Every variant is raised before the simulation starts running; an invalid
//! clock or address topology has no runtime recovery path.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocError {
    /// A clock frequency or phase that the multiply/divide ladder cannot produce,
    /// or a configuration value that is out of range.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "region {name} [0x{base:08x}, 0x{end:08x}) overlaps region {existing} [0x{existing_base:08x}, 0x{existing_end:08x})"
    )]
    Overlap {
        name: String,
        base: u64,
        end: u64,
        existing: String,
        existing_base: u64,
        existing_end: u64,
    },

    #[error("{kind} name {name} is already registered")]
    DuplicateName { kind: &'static str, name: String },

    #[error("region {name} declares 0x{requested:x} bytes but its peripheral decodes 0x{declared:x}")]
    SizeMismatch {
        name: String,
        requested: u64,
        declared: u64,
    },

    #[error("region {name} base 0x{base:08x} is not aligned to 0x{alignment:x}")]
    Misaligned {
        name: String,
        base: u64,
        alignment: u64,
    },

    #[error("failed to read {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl SocError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SocError::Configuration(msg.into())
    }
}

pub type SocResult<T> = Result<T, SocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_message_names_both_regions() {
        let err = SocError::Overlap {
            name: "spiflash".into(),
            base: 0x2000_0000,
            end: 0x2800_0000,
            existing: "sram_ext".into(),
            existing_base: 0x2400_0000,
            existing_end: 0x2500_0000,
        };
        let msg = err.to_string();
        assert!(msg.contains("spiflash"));
        assert!(msg.contains("sram_ext"));
        assert!(msg.contains("0x24000000"));
    }

    #[test]
    fn test_duplicate_message() {
        let err = SocError::DuplicateName {
            kind: "clock domain",
            name: "sys".into(),
        };
        assert_eq!(err.to_string(), "clock domain name sys is already registered");
    }
}
