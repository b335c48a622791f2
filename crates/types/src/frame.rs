//! Hardware-stacked exception frame.

use core::fmt;

use crate::hal::Bus;

pub const EXC_FRAME_WORDS: usize = 8;
pub const EXC_FRAME_SIZE: u32 = 32;

/// Thumb state bit; must stay set in every frame handed to the core.
pub const XPSR_THUMB: u32 = 1 << 24;
/// Set when the core inserted a 4-byte pad to reach 8-byte stack alignment.
pub const XPSR_ALIGN: u32 = 1 << 9;
/// Active exception number.
pub const XPSR_IPSR_MASK: u32 = 0x1FF;
/// Exception number of IRQ line 0.
pub const IRQN_OFFSET: u32 = 16;

/// The eight words the core pushes on exception entry, lowest address first.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl ExceptionFrame {
    /// Argument register `index` (r0..r3).
    pub fn arg(&self, index: usize) -> u32 {
        match index {
            0 => self.r0,
            1 => self.r1,
            2 => self.r2,
            3 => self.r3,
            _ => 0,
        }
    }

    pub fn set_arg(&mut self, index: usize, value: u32) {
        match index {
            0 => self.r0 = value,
            1 => self.r1 = value,
            2 => self.r2 = value,
            3 => self.r3 = value,
            _ => {}
        }
    }

    pub fn exception_number(&self) -> u32 {
        self.xpsr & XPSR_IPSR_MASK
    }

    /// Bytes of padding the core inserted below this frame.
    pub fn stack_pad(&self) -> u32 {
        if self.xpsr & XPSR_ALIGN != 0 { 4 } else { 0 }
    }

    /// Stack pointer value before this frame (and its pad) was pushed at `sp`.
    pub fn unwound_sp(&self, sp: u32) -> u32 {
        sp.wrapping_add(EXC_FRAME_SIZE + self.stack_pad())
    }

    pub fn to_words(&self) -> [u32; EXC_FRAME_WORDS] {
        [
            self.r0, self.r1, self.r2, self.r3, self.r12, self.lr, self.pc, self.xpsr,
        ]
    }

    pub fn from_words(words: [u32; EXC_FRAME_WORDS]) -> Self {
        Self {
            r0: words[0],
            r1: words[1],
            r2: words[2],
            r3: words[3],
            r12: words[4],
            lr: words[5],
            pc: words[6],
            xpsr: words[7],
        }
    }

    /// Read a frame at `sp` with privileged access.
    pub fn read<B: Bus + ?Sized>(bus: &B, sp: u32) -> Option<Self> {
        let mut words = [0u32; EXC_FRAME_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = bus.read_u32(sp.checked_add(i as u32 * 4)?)?;
        }
        Some(Self::from_words(words))
    }

    /// Read a frame at `sp` as the active unprivileged box would.
    ///
    /// Fails if any word lies outside what the current protection state grants.
    pub fn read_unprivileged<B: Bus + ?Sized>(bus: &B, sp: u32) -> Option<Self> {
        let mut words = [0u32; EXC_FRAME_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = bus.unprivileged_read_u32(sp.checked_add(i as u32 * 4)?)?;
        }
        Some(Self::from_words(words))
    }

    /// Store the frame at `sp`; `false` on the first word the bus refuses.
    pub fn write<B: Bus + ?Sized>(&self, bus: &mut B, sp: u32) -> bool {
        for (i, word) in self.to_words().iter().enumerate() {
            let addr = match sp.checked_add(i as u32 * 4) {
                Some(addr) => addr,
                None => return false,
            };
            if !bus.write_u32(addr, *word) {
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for ExceptionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionFrame")
            .field("r0", &format_args!("0x{:08x}", self.r0))
            .field("r1", &format_args!("0x{:08x}", self.r1))
            .field("r2", &format_args!("0x{:08x}", self.r2))
            .field("r3", &format_args!("0x{:08x}", self.r3))
            .field("r12", &format_args!("0x{:08x}", self.r12))
            .field("lr", &format_args!("0x{:08x}", self.lr))
            .field("pc", &format_args!("0x{:08x}", self.pc))
            .field("xpsr", &format_args!("0x{:08x}", self.xpsr))
            .finish()
    }
}
