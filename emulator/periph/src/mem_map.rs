/*++

Licensed under the Apache-2.0 license.

File Name:

    mem_map.rs

Abstract:

    File contains the memory map registrar and the address-decoding system
    bus built on it.

--*/

use std::fmt;

use emulator_bus::{Bus, BusEndpoint, BusError};
use emulator_types::{RvAddr, RvData, RvSize};
use log::{debug, info, warn};
use soc_config::AlignmentPolicy;
use soc_error::{SocError, SocResult};

/// A named window of the system address space.
#[derive(Clone)]
pub struct MemoryRegion {
    pub name: String,
    pub base_address: RvAddr,
    pub size_bytes: RvAddr,
    pub bus_endpoint: BusEndpoint,
    /// Taken from the platform table rather than registered by a peripheral.
    pub reserved: bool,
}

impl MemoryRegion {
    /// Exclusive end, widened so a region may reach the top of the address space.
    pub fn end(&self) -> u64 {
        self.base_address as u64 + self.size_bytes as u64
    }

    pub fn contains(&self, addr: RvAddr) -> bool {
        addr >= self.base_address && (addr as u64) < self.end()
    }

    fn intersects(&self, base: u64, end: u64) -> bool {
        base < self.end() && (self.base_address as u64) < end
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("base_address", &format_args!("0x{:08x}", self.base_address))
            .field("size_bytes", &format_args!("0x{:x}", self.size_bytes))
            .field("reserved", &self.reserved)
            .finish()
    }
}

/// Returned by a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionHandle(usize);

/// Append-only table of non-overlapping regions.
pub struct MemoryMap {
    regions: Vec<MemoryRegion>,
    policy: AlignmentPolicy,
}

impl MemoryMap {
    /// Creates the map with the platform regions already in place.
    pub fn new(
        platform: Vec<(String, RvAddr, RvAddr, BusEndpoint)>,
        policy: AlignmentPolicy,
    ) -> SocResult<Self> {
        let mut map = Self {
            regions: Vec::new(),
            policy,
        };
        for (name, base, size, endpoint) in platform {
            map.insert(&name, base, size, endpoint, true)?;
        }
        Ok(map)
    }

    pub fn register(
        &mut self,
        name: &str,
        base_address: RvAddr,
        size_bytes: RvAddr,
        bus_endpoint: BusEndpoint,
    ) -> SocResult<RegionHandle> {
        self.insert(name, base_address, size_bytes, bus_endpoint, false)
    }

    fn insert(
        &mut self,
        name: &str,
        base_address: RvAddr,
        size_bytes: RvAddr,
        bus_endpoint: BusEndpoint,
        reserved: bool,
    ) -> SocResult<RegionHandle> {
        let base = base_address as u64;
        let end = base + size_bytes as u64;
        if size_bytes == 0 {
            return Err(SocError::configuration(format!("region {name} has zero size")));
        }
        if end > 1 << 32 {
            return Err(SocError::configuration(format!(
                "region {name} at 0x{base:08x} runs past the end of the address space"
            )));
        }
        if let Some(existing) = self.regions.iter().find(|r| r.intersects(base, end)) {
            return Err(SocError::Overlap {
                name: name.to_string(),
                base,
                end,
                existing: existing.name.clone(),
                existing_base: existing.base_address as u64,
                existing_end: existing.end(),
            });
        }
        if self.regions.iter().any(|r| r.name == name) {
            return Err(SocError::DuplicateName {
                kind: "region",
                name: name.to_string(),
            });
        }
        let declared = bus_endpoint.borrow().mmap_size();
        if declared != size_bytes {
            return Err(SocError::SizeMismatch {
                name: name.to_string(),
                requested: size_bytes as u64,
                declared: declared as u64,
            });
        }
        let alignment = (size_bytes as u64).next_power_of_two();
        if base % alignment != 0 {
            match self.policy {
                AlignmentPolicy::Warn => warn!(
                    "Region {name} base 0x{base:08x} is not aligned to its size 0x{alignment:x}"
                ),
                AlignmentPolicy::Deny => {
                    return Err(SocError::Misaligned {
                        name: name.to_string(),
                        base,
                        alignment,
                    })
                }
            }
        }

        info!(
            "Registered {}region {name} at [0x{base:08x}, 0x{end:08x})",
            if reserved { "reserved " } else { "" }
        );
        self.regions.push(MemoryRegion {
            name: name.to_string(),
            base_address,
            size_bytes,
            bus_endpoint,
            reserved,
        });
        Ok(RegionHandle(self.regions.len() - 1))
    }

    /// Returns the owning region's name, its endpoint, and the offset of
    /// `addr` within it.
    pub fn lookup_by_address(&self, addr: RvAddr) -> Option<(&str, &BusEndpoint, RvAddr)> {
        self.regions
            .iter()
            .find(|r| r.contains(addr))
            .map(|r| (r.name.as_str(), &r.bus_endpoint, addr - r.base_address))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn region(&self, handle: RegionHandle) -> &MemoryRegion {
        &self.regions[handle.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn poll_endpoints(&self) {
        for region in self.regions.iter() {
            region.bus_endpoint.borrow_mut().poll();
        }
    }

    pub fn warm_reset_endpoints(&self) {
        for region in self.regions.iter() {
            region.bus_endpoint.borrow_mut().warm_reset();
        }
    }

    pub fn bus_read(&self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        let Some((name, endpoint, offset)) = self.lookup_by_address(addr) else {
            debug!("Read from unmapped address 0x{addr:08x}");
            return Err(BusError::LoadAccessFault);
        };
        endpoint.borrow_mut().read(size, offset).inspect_err(|err| {
            debug!("Read of {name}+0x{offset:x} failed: {err:?}");
        })
    }

    pub fn bus_write(&self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        let Some((name, endpoint, offset)) = self.lookup_by_address(addr) else {
            debug!("Write of 0x{val:08x} to unmapped address 0x{addr:08x}");
            return Err(BusError::StoreAccessFault);
        };
        endpoint.borrow_mut().write(size, offset, val).inspect_err(|err| {
            debug!("Write to {name}+0x{offset:x} failed: {err:?}");
        })
    }
}

impl Bus for MemoryMap {
    fn read(&mut self, size: RvSize, addr: RvAddr) -> Result<RvData, BusError> {
        self.bus_read(size, addr)
    }

    fn write(&mut self, size: RvSize, addr: RvAddr, val: RvData) -> Result<(), BusError> {
        self.bus_write(size, addr, val)
    }

    fn poll(&mut self) {
        self.poll_endpoints();
    }

    fn warm_reset(&mut self) {
        self.warm_reset_endpoints();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_ram;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ram(size: RvAddr) -> BusEndpoint {
        Rc::new(RefCell::new(new_ram(size)))
    }

    fn platform_map(policy: AlignmentPolicy) -> MemoryMap {
        MemoryMap::new(
            vec![
                ("rom".to_string(), 0x0, 0x8000, ram(0x8000)),
                ("sram".to_string(), 0x0100_0000, 0x2_0000, ram(0x2_0000)),
            ],
            policy,
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        let handle = map
            .register("sram_ext", 0x4000_0000, 0x100_0000, ram(0x100_0000))
            .unwrap();
        assert_eq!(map.region(handle).name, "sram_ext");
        assert!(!map.region(handle).reserved);
        assert!(map.lookup_by_name("rom").unwrap().reserved);

        let (name, _, offset) = map.lookup_by_address(0x4000_1234).unwrap();
        assert_eq!(name, "sram_ext");
        assert_eq!(offset, 0x1234);
        assert!(map.lookup_by_address(0x4100_0000).is_none());
        assert!(map.lookup_by_address(0x7fff).is_some());
        assert!(map.lookup_by_address(0x8000).is_none());
    }

    #[test]
    fn test_overlap_leaves_table_unchanged() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        map.register("sram_ext", 0x4000_0000, 0x100_0000, ram(0x100_0000))
            .unwrap();
        let before = map.len();
        let err = map
            .register("late", 0x40ff_fffc, 0x10, ram(0x10))
            .unwrap_err();
        match err {
            SocError::Overlap { name, existing, .. } => {
                assert_eq!(name, "late");
                assert_eq!(existing, "sram_ext");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(map.len(), before);
        assert!(map.lookup_by_name("late").is_none());
    }

    #[test]
    fn test_reserved_regions_collide() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        assert!(matches!(
            map.register("rom", 0x0, 0x8000, ram(0x8000)),
            Err(SocError::Overlap { .. })
        ));
        assert!(matches!(
            map.register("sram", 0x0100_0000, 0x2_0000, ram(0x2_0000)),
            Err(SocError::Overlap { .. })
        ));
        assert!(matches!(
            map.register("periph", 0x0101_0000, 0x1000, ram(0x1000)),
            Err(SocError::Overlap { .. })
        ));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_duplicate_name() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        assert!(matches!(
            map.register("rom", 0x5000_0000, 0x1000, ram(0x1000)),
            Err(SocError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_size_must_match_endpoint() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        assert!(matches!(
            map.register("short", 0x5000_0000, 0x2000, ram(0x1000)),
            Err(SocError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_alignment_policy() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        map.register("odd", 0x5000_1000, 0x3000, ram(0x3000))
            .unwrap();

        let mut map = platform_map(AlignmentPolicy::Deny);
        assert!(matches!(
            map.register("odd", 0x5000_1000, 0x3000, ram(0x3000)),
            Err(SocError::Misaligned {
                alignment: 0x4000,
                ..
            })
        ));
        map.register("even", 0x5000_4000, 0x3000, ram(0x3000))
            .unwrap();
    }

    #[test]
    fn test_top_of_address_space() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        map.register("top", 0xffff_f000, 0x1000, ram(0x1000))
            .unwrap();
        assert!(map.lookup_by_address(0xffff_ffff).is_some());
        assert!(matches!(
            map.register("past", 0xffff_fff0, 0x1000, ram(0x1000)),
            Err(SocError::Configuration(_))
        ));
    }

    #[test]
    fn test_bus_routing() {
        let mut map = platform_map(AlignmentPolicy::Warn);
        map.write(RvSize::Word, 0x0100_0010, 0xdead_beef).unwrap();
        assert_eq!(map.read(RvSize::Word, 0x0100_0010).unwrap(), 0xdead_beef);
        assert_eq!(map.read(RvSize::Byte, 0x0100_0013).unwrap(), 0xde);
        assert_eq!(
            map.read(RvSize::Word, 0x3000_0000),
            Err(BusError::LoadAccessFault)
        );
        assert_eq!(
            map.write(RvSize::Word, 0x3000_0000, 0),
            Err(BusError::StoreAccessFault)
        );
    }
}
