//! Access-control words and the ACL entry record boxes declare in flash.

use bitflags::bitflags;

use crate::hal::Bus;
use crate::le_u32;

bitflags! {
    /// Permission and modifier bits of one ACL entry.
    ///
    /// The low six bits are the (user, supervisor) x (read, write, execute)
    /// access class; the rest steer how the registry treats the entry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Acl: u32 {
        const UEXECUTE = 0x0001;
        const UWRITE = 0x0002;
        const UREAD = 0x0004;
        const SEXECUTE = 0x0008;
        const SWRITE = 0x0010;
        const SREAD = 0x0020;

        const STACK = 0x0040;
        const SIZE_ROUND_UP = 0x0080;
        const SIZE_ROUND_DOWN = 0x0100;
        const PERIPHERAL = 0x0200;
        const SHARED = 0x0400;
        const USER = 0x0800;
        const IRQ = 0x1000;

        const UACL = Self::UREAD.bits() | Self::UWRITE.bits() | Self::UEXECUTE.bits();
        const SACL = Self::SREAD.bits() | Self::SWRITE.bits() | Self::SEXECUTE.bits();
        const EXECUTE = Self::UEXECUTE.bits() | Self::SEXECUTE.bits();
        const ACCESS = Self::UACL.bits() | Self::SACL.bits();
        const ROUNDING = Self::SIZE_ROUND_UP.bits() | Self::SIZE_ROUND_DOWN.bits();

        const SECURE_BSS = Self::UREAD.bits()
            | Self::UWRITE.bits()
            | Self::SREAD.bits()
            | Self::SWRITE.bits()
            | Self::SIZE_ROUND_UP.bits();
        const SECURE_CONST = Self::UREAD.bits() | Self::SREAD.bits() | Self::SIZE_ROUND_UP.bits();
        const DATA = Self::SECURE_BSS.bits();
        const PERIPH = Self::PERIPHERAL.bits()
            | Self::UREAD.bits()
            | Self::UWRITE.bits()
            | Self::SREAD.bits()
            | Self::SWRITE.bits()
            | Self::SIZE_ROUND_UP.bits();
        const STACK_DEF = Self::STACK.bits()
            | Self::UREAD.bits()
            | Self::UWRITE.bits()
            | Self::SREAD.bits()
            | Self::SWRITE.bits();
    }
}

impl Acl {
    /// Only the access-class bits.
    pub fn access(self) -> Acl {
        self & Acl::ACCESS
    }

    pub fn is_shared(self) -> bool {
        self.contains(Acl::SHARED)
    }
}

/// One entry of a box's ACL array.
///
/// For memory and peripheral entries `param1` is the base address and
/// `param2` the length. IRQ entries reuse the fields as handler and line.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AclEntry {
    pub param1: u32,
    pub param2: u32,
    pub acl: u32,
}

impl AclEntry {
    pub const SIZE: u32 = 12;

    pub const fn new(base: u32, size: u32, acl: Acl) -> Self {
        Self {
            param1: base,
            param2: size,
            acl: acl.bits(),
        }
    }

    pub const fn irq(line: u32, handler: u32) -> Self {
        Self {
            param1: handler,
            param2: line,
            acl: Acl::IRQ.bits(),
        }
    }

    pub fn base(&self) -> u32 {
        self.param1
    }

    pub fn size(&self) -> u32 {
        self.param2
    }

    /// `None` when the word carries bits this kernel does not know.
    pub fn flags(&self) -> Option<Acl> {
        Acl::from_bits(self.acl)
    }

    pub fn encode(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..4].copy_from_slice(&self.param1.to_le_bytes());
        out[4..8].copy_from_slice(&self.param2.to_le_bytes());
        out[8..12].copy_from_slice(&self.acl.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE as usize {
            return None;
        }
        Some(Self {
            param1: le_u32(bytes, 0),
            param2: le_u32(bytes, 4),
            acl: le_u32(bytes, 8),
        })
    }

    pub fn read<B: Bus + ?Sized>(bus: &B, addr: u32) -> Option<Self> {
        Some(Self {
            param1: bus.read_u32(addr)?,
            param2: bus.read_u32(addr.checked_add(4)?)?,
            acl: bus.read_u32(addr.checked_add(8)?)?,
        })
    }
}
