//! Box configuration record as the loader places it in flash.

use crate::hal::Bus;
use crate::le_u32;

pub const BOX_MAGIC: u32 = 0x42CF_B66F;
pub const BOX_VERSION: u32 = 100;

/// Fixed 24-byte record describing one box.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxConfig {
    pub magic: u32,
    pub version: u32,
    /// Declared stack size in bytes. Zero for box 0.
    pub stack_size: u32,
    /// Private context size in bytes, carved from the bottom of the stack window.
    pub context_size: u32,
    /// Flash address of the `AclEntry` array.
    pub acl_list: u32,
    pub acl_count: u32,
}

impl BoxConfig {
    pub const SIZE: u32 = 24;

    pub const fn new(stack_size: u32, context_size: u32, acl_list: u32, acl_count: u32) -> Self {
        Self {
            magic: BOX_MAGIC,
            version: BOX_VERSION,
            stack_size,
            context_size,
            acl_list,
            acl_count,
        }
    }

    pub fn encode(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        let words = [
            self.magic,
            self.version,
            self.stack_size,
            self.context_size,
            self.acl_list,
            self.acl_count,
        ];
        for (i, word) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE as usize {
            return None;
        }
        Some(Self {
            magic: le_u32(bytes, 0),
            version: le_u32(bytes, 4),
            stack_size: le_u32(bytes, 8),
            context_size: le_u32(bytes, 12),
            acl_list: le_u32(bytes, 16),
            acl_count: le_u32(bytes, 20),
        })
    }

    /// Read the record word by word through `bus`.
    pub fn read<B: Bus + ?Sized>(bus: &B, addr: u32) -> Option<Self> {
        let mut words = [0u32; 6];
        for (i, word) in words.iter_mut().enumerate() {
            *word = bus.read_u32(addr.checked_add(i as u32 * 4)?)?;
        }
        Some(Self {
            magic: words[0],
            version: words[1],
            stack_size: words[2],
            context_size: words[3],
            acl_list: words[4],
            acl_count: words[5],
        })
    }
}
