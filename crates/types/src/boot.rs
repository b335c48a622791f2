//! Link-time platform layout handed to the kernel at boot.
//!
//! The linker script (or a board crate) fills this in; the kernel never
//! guesses addresses on its own.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on interrupt lines any board may declare.
pub const MAX_IRQ_LINES: usize = 128;
pub const IRQ_WORDS: usize = MAX_IRQ_LINES / 32;

/// Half-open address window `[start, end)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Window {
    pub start: u32,
    pub end: u32,
}

impl Window {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Whether `[addr, addr + len)` lies entirely inside the window.
    pub fn contains_range(&self, addr: u32, len: u32) -> bool {
        if len == 0 {
            return self.contains(addr);
        }
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }
}

/// Device address space split into equally sized access-control slots.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralWindow {
    pub base: u32,
    pub slot_size: u32,
    pub slot_count: u32,
}

impl PeripheralWindow {
    pub const fn none() -> Self {
        Self {
            base: 0,
            slot_size: 0,
            slot_count: 0,
        }
    }

    pub fn window(&self) -> Window {
        let len = self.slot_size.saturating_mul(self.slot_count);
        Window::new(self.base, self.base.saturating_add(len))
    }

    pub fn slot_of(&self, addr: u32) -> Option<usize> {
        if self.slot_size == 0 || !self.window().contains(addr) {
            return None;
        }
        Some(((addr - self.base) / self.slot_size) as usize)
    }
}

/// Memory windows and board facts the kernel needs before it can build any box.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BootInfo {
    /// All of flash. Box records and ACL arrays must sit here.
    pub flash: Window,
    /// Flash that box code may execute; gateways must live here.
    pub public_flash: Window,
    /// Array of pointers to box configuration records, box 0 first.
    pub cfgtbl_ptr: Window,
    pub sram: Window,
    /// RAM reserved for box stacks. Its top sits directly below the kernel's own RAM.
    pub stack_arena: Window,
    pub peripherals: PeripheralWindow,
    /// Debug ROM table; register gateways may target it.
    pub rom_table: Window,
    /// Address of the `svc` that ends a gateway call.
    pub gateway_thunk: u32,
    /// Word receiving the active box's context pointer; 0 when unused.
    pub box_context_slot: u32,
    /// Leading MPU slots the board programs itself and the kernel leaves alone.
    pub mpu_reserved_slots: u32,
    /// log2 of the smallest protection region.
    pub region_floor_bits: u32,
    pub irq_lines: u32,
    /// Lines the kernel keeps for itself; boxes cannot claim them.
    pub reserved_irqs: [u32; IRQ_WORDS],
}

impl BootInfo {
    pub fn irq_reserved(&self, irq: u32) -> bool {
        let word = (irq / 32) as usize;
        word < IRQ_WORDS && self.reserved_irqs[word] & (1 << (irq % 32)) != 0
    }
}
