//! Capability traits a board (or the host machine model) provides to the kernel.

pub use crate::mpu::RegionHardware;

/// Word and halfword access to the physical address space.
pub trait Bus {
    /// Privileged read. `None` for unmapped addresses.
    fn read_u32(&self, addr: u32) -> Option<u32>;
    fn read_u16(&self, addr: u32) -> Option<u16>;
    /// Privileged write. `false` for unmapped or read-only addresses.
    fn write_u32(&mut self, addr: u32, value: u32) -> bool;
    /// Read with the permissions of unprivileged code under the live
    /// protection state. `None` when that access would fault.
    fn unprivileged_read_u32(&self, addr: u32) -> Option<u32>;
    /// Whether unprivileged code could write `addr` under the live protection state.
    fn unprivileged_write_allowed(&self, addr: u32) -> bool;
}

/// Device access-control words (one nibble per peripheral slot).
pub trait PeripheralGate {
    /// Number of 32-bit access-control words; zero when the board has no gate.
    fn pacr_count(&self) -> usize;
    fn read_pacr(&self, index: usize) -> u32;
    fn write_pacr(&mut self, index: usize, value: u32);
}

/// Core registers the kernel touches around domain crossings.
pub trait Cpu {
    fn psp(&self) -> u32;
    fn set_psp(&mut self, sp: u32);
    fn msp(&self) -> u32;
    fn thread_unprivileged(&self) -> bool;
    fn set_thread_unprivileged(&mut self, unprivileged: bool);
    /// Mask interrupts, returning whether they were already masked.
    fn mask_interrupts(&mut self) -> bool;
    /// Undo `mask_interrupts` given its return value.
    fn restore_interrupts(&mut self, was_masked: bool);
}

/// Nested vectored interrupt controller.
pub trait InterruptController {
    fn irq_count(&self) -> usize;
    fn enable_irq(&mut self, irq: u32);
    fn disable_irq(&mut self, irq: u32);
    fn irq_enabled(&self, irq: u32) -> bool;
    fn set_pending(&mut self, irq: u32);
    fn clear_pending(&mut self, irq: u32);
    fn is_pending(&self, irq: u32) -> bool;
    fn set_priority(&mut self, irq: u32, priority: u8);
    fn priority(&self, irq: u32) -> u8;
}

/// Everything the kernel needs from a board.
pub trait Hardware: Bus + RegionHardware + PeripheralGate + Cpu + InterruptController {}

impl<T> Hardware for T where T: Bus + RegionHardware + PeripheralGate + Cpu + InterruptController {}
