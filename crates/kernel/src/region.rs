//! Translation from ACL grants to ARMv7-M protection regions.

use log::debug;
use types::Acl;
use types::mpu::{
    AccessPermission, MPU_RASR_ENABLE, MPU_RASR_XN, RegionRegs, size_field,
};

use crate::fault::Fault;

/// Where a region in the pool came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionSource {
    /// Declared in the box's ACL array.
    User,
    /// Implicit grant over the box's stack window.
    Stack,
}

/// A protection region ready to be programmed into any hardware slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    pub size: u32,
    pub rasr: u32,
    pub acl: Acl,
    pub owner: u8,
    pub source: RegionSource,
    /// Times this region was demand-loaded after a memory fault.
    pub faults: u32,
}

impl Region {
    pub fn regs(&self, slot: usize) -> RegionRegs {
        RegionRegs::new(self.base, slot, self.rasr)
    }

    pub fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    /// Whether `addr` is granted, leaving out disabled subregions.
    pub fn contains(&self, addr: u32) -> bool {
        self.regs(0).covers(addr)
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        (self.base as u64) < other.end() && (other.base as u64) < self.end()
    }
}

/// log2 of the smallest power of two holding `size`, never below `floor_bits`.
pub fn region_bits(size: u32, floor_bits: u32) -> u32 {
    if size <= (1u32 << floor_bits) {
        return floor_bits;
    }
    32 - (size - 1).leading_zeros()
}

/// Map the access class of `acl` to AP/XN bits.
///
/// The hardware cannot express every combination; the inferred class must
/// match the requested one exactly.
pub fn map_acl(acl: Acl) -> Result<u32, Fault> {
    let (inferred, ap) = if acl.contains(Acl::UWRITE) {
        (
            Acl::UREAD | Acl::UWRITE | Acl::SREAD | Acl::SWRITE,
            AccessPermission::FullAccess,
        )
    } else if acl.contains(Acl::UREAD) {
        if acl.contains(Acl::SWRITE) {
            (Acl::UREAD | Acl::SREAD | Acl::SWRITE, AccessPermission::PrivRwUserRo)
        } else {
            (Acl::UREAD | Acl::SREAD, AccessPermission::ReadOnly)
        }
    } else if acl.contains(Acl::SWRITE) {
        (Acl::SREAD | Acl::SWRITE, AccessPermission::PrivRw)
    } else if acl.contains(Acl::SREAD) {
        (Acl::SREAD, AccessPermission::PrivRo)
    } else {
        (Acl::empty(), AccessPermission::NoAccess)
    };

    // Execute permission is one bit for both privilege levels.
    let (inferred, xn) = if acl.intersects(Acl::EXECUTE) {
        (inferred | Acl::EXECUTE, 0)
    } else {
        (inferred, MPU_RASR_XN)
    };

    if inferred != acl.access() {
        return Err(Fault::AclNotRepresentable {
            requested: acl.access().bits(),
            inferred: inferred.bits(),
        });
    }
    Ok(ap.rasr_bits() | xn)
}

/// Access class a programmed RASR grants.
pub fn decode_access(rasr: u32) -> Acl {
    let mut acl = Acl::empty();
    if let Some(ap) = AccessPermission::from_rasr(rasr) {
        if ap.user_read() {
            acl |= Acl::UREAD;
        }
        if ap.user_write() {
            acl |= Acl::UWRITE;
        }
        if ap.priv_read() {
            acl |= Acl::SREAD;
        }
        if ap.priv_write() {
            acl |= Acl::SWRITE;
        }
    }
    if rasr & MPU_RASR_XN == 0 {
        acl |= Acl::EXECUTE;
    }
    acl
}

/// Turn one grant into a region descriptor. Nothing is programmed here.
pub fn compute_region(base: u32, size: u32, acl: Acl, floor_bits: u32) -> Result<Region, Fault> {
    let mut bits = region_bits(size, floor_bits);
    if bits > 31 {
        return Err(Fault::RegionTooLarge { size });
    }

    if size > (1u32 << floor_bits) && (1u32 << bits) != size {
        if !acl.intersects(Acl::ROUNDING) {
            return Err(Fault::RegionNotRounded { size });
        }
        // Above the floor, so one step down never crosses it.
        if acl.contains(Acl::SIZE_ROUND_DOWN) {
            bits -= 1;
        }
    }

    let rounded = 1u32 << bits;
    if base & (rounded - 1) != 0 {
        return Err(Fault::RegionMisaligned {
            base,
            size: rounded,
        });
    }

    let flags = map_acl(acl)?;
    debug!(
        "region 0x{:08x} size={} rounded={} acl=0x{:04x}",
        base,
        size,
        rounded,
        acl.bits()
    );

    Ok(Region {
        base,
        size: rounded,
        rasr: flags | size_field(bits) | MPU_RASR_ENABLE,
        acl,
        owner: 0,
        source: RegionSource::User,
        faults: 0,
    })
}
