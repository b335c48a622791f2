
//! ARMv7-M MPU register encoding and the region-hardware capability.

/// RBAR: region number field.
pub const MPU_RBAR_REGION_MASK: u32 = 0xF;
/// RBAR: use the region field instead of RNR.
pub const MPU_RBAR_VALID: u32 = 1 << 4;
/// RBAR: base address bits (32-byte granularity).
pub const MPU_RBAR_ADDR_MASK: u32 = !0x1F;

pub const MPU_RASR_ENABLE: u32 = 1 << 0;
pub const MPU_RASR_SIZE_POS: u32 = 1;
pub const MPU_RASR_SIZE_MASK: u32 = 0x1F << MPU_RASR_SIZE_POS;
pub const MPU_RASR_SRD_POS: u32 = 8;
pub const MPU_RASR_SRD_MASK: u32 = 0xFF << MPU_RASR_SRD_POS;
/// Regions below 256 bytes cannot disable subregions.
pub const SUBREGION_MIN_BITS: u32 = 8;
pub const MPU_RASR_AP_POS: u32 = 24;
pub const MPU_RASR_AP_MASK: u32 = 0x7 << MPU_RASR_AP_POS;
pub const MPU_RASR_XN: u32 = 1 << 28;

/// Smallest region the ARMv7-M MPU supports, as a power of two.
pub const ARMV7M_ALIGNMENT_BITS: u32 = 5;

/// AP field values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessPermission {
    NoAccess = 0,
    PrivRw = 1,
    PrivRwUserRo = 2,
    FullAccess = 3,
    PrivRo = 5,
    ReadOnly = 6,
}

impl AccessPermission {
    pub const fn rasr_bits(self) -> u32 {
        (self as u32) << MPU_RASR_AP_POS
    }

    pub fn from_rasr(rasr: u32) -> Option<Self> {
        match (rasr & MPU_RASR_AP_MASK) >> MPU_RASR_AP_POS {
            0 => Some(AccessPermission::NoAccess),
            1 => Some(AccessPermission::PrivRw),
            2 => Some(AccessPermission::PrivRwUserRo),
            3 => Some(AccessPermission::FullAccess),
            5 => Some(AccessPermission::PrivRo),
            6 | 7 => Some(AccessPermission::ReadOnly),
            _ => None,
        }
    }

    pub fn user_read(self) -> bool {
        matches!(
            self,
            AccessPermission::PrivRwUserRo | AccessPermission::FullAccess | AccessPermission::ReadOnly
        )
    }

    pub fn user_write(self) -> bool {
        self == AccessPermission::FullAccess
    }

    pub fn priv_read(self) -> bool {
        self != AccessPermission::NoAccess
    }

    pub fn priv_write(self) -> bool {
        matches!(
            self,
            AccessPermission::PrivRw | AccessPermission::PrivRwUserRo | AccessPermission::FullAccess
        )
    }
}

/// RASR SIZE field for a region of `2^bits` bytes.
pub const fn size_field(bits: u32) -> u32 {
    ((bits - 1) << MPU_RASR_SIZE_POS) & MPU_RASR_SIZE_MASK
}

/// The RBAR/RASR pair programmed into one hardware slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionRegs {
    pub rbar: u32,
    pub rasr: u32,
}

impl RegionRegs {
    pub const fn new(base: u32, slot: usize, rasr: u32) -> Self {
        Self {
            rbar: (base & MPU_RBAR_ADDR_MASK) | MPU_RBAR_VALID | (slot as u32 & MPU_RBAR_REGION_MASK),
            rasr,
        }
    }

    /// A slot with its enable bit clear.
    pub const fn disabled(slot: usize) -> Self {
        Self::new(0, slot, 0)
    }

    pub fn base(&self) -> u32 {
        self.rbar & MPU_RBAR_ADDR_MASK
    }

    pub fn slot(&self) -> usize {
        (self.rbar & MPU_RBAR_REGION_MASK) as usize
    }

    pub fn enabled(&self) -> bool {
        self.rasr & MPU_RASR_ENABLE != 0
    }

    /// Region size in bytes; u64 so a 4 GiB region is representable.
    pub fn size(&self) -> u64 {
        1u64 << (((self.rasr & MPU_RASR_SIZE_MASK) >> MPU_RASR_SIZE_POS) + 1)
    }

    pub fn permission(&self) -> Option<AccessPermission> {
        AccessPermission::from_rasr(self.rasr)
    }

    pub fn executable(&self) -> bool {
        self.rasr & MPU_RASR_XN == 0
    }

    pub fn covers(&self, addr: u32) -> bool {
        if !self.enabled() {
            return false;
        }
        let base = self.base() as u64;
        let addr = addr as u64;
        if addr < base || addr >= base + self.size() {
            return false;
        }
        if self.size() < 1 << SUBREGION_MIN_BITS {
            return true;
        }
        // A disabled subregion is not covered; lower slots decide there.
        let sub = (addr - base) / (self.size() / 8);
        self.rasr & (1 << (MPU_RASR_SRD_POS as u64 + sub)) == 0
    }

    /// Same programmed region regardless of which slot holds it.
    pub fn same_region(&self, other: &RegionRegs) -> bool {
        self.base() == other.base() && self.rasr == other.rasr
    }
}

/// Whether unprivileged code may access `addr` under `slots`.
///
/// The highest-numbered enabled slot covering the address decides; an
/// address no slot covers is denied.
pub fn user_access<I>(slots: I, addr: u32, write: bool) -> bool
where
    I: IntoIterator<Item = RegionRegs>,
{
    let mut decision = false;
    for regs in slots {
        if regs.covers(addr) {
            decision = match regs.permission() {
                Some(ap) if write => ap.user_write(),
                Some(ap) => ap.user_read(),
                None => false,
            };
        }
    }
    decision
}

/// Abstraction over the protection unit's region slots.
///
/// Implementations only move register values; slot planning and diffing live
/// in the kernel's switch engine.
pub trait RegionHardware {
    fn slot_count(&self) -> usize;
    fn read_slot(&self, slot: usize) -> RegionRegs;
    fn write_slot(&mut self, slot: usize, regs: RegionRegs);
    /// Turn enforcement on or off (privileged default map stays enabled).
    fn set_protection(&mut self, enabled: bool);
}
