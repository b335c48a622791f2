//! Host model of a Cortex-M class core, enough for the supervisor to run
//! unmodified: flash, SRAM, a register file for device windows, an
//! ARMv7-M MPU, a peripheral access gate and an NVIC.

pub mod aips;
pub mod cpu;
pub mod image;
pub mod memory;
pub mod mpu;
pub mod nvic;

use std::collections::BTreeMap;

use log::trace;
use types::boot::{PeripheralWindow, Window};
use types::frame::{EXC_FRAME_SIZE, ExceptionFrame, IRQN_OFFSET, XPSR_ALIGN, XPSR_THUMB};
use types::mpu::RegionRegs;
use types::{Bus, Cpu, InterruptController, PeripheralGate, RegionHardware};

pub use aips::SoftAips;
pub use cpu::CoreRegs;
pub use image::ImageBuilder;
pub use memory::Memory;
pub use mpu::SoftMpu;
pub use nvic::SoftNvic;

pub struct Machine {
    pub flash: Memory,
    pub sram: Memory,
    /// Device windows backed by a sparse register file.
    mmio_windows: Vec<Window>,
    mmio: BTreeMap<u32, u32>,
    pub mpu: SoftMpu,
    pub aips: SoftAips,
    pub nvic: SoftNvic,
    pub core: CoreRegs,
}

impl Machine {
    /// Eight MPU slots, no peripheral gate and 32 interrupt lines until
    /// configured otherwise.
    pub fn new(flash: Window, sram: Window) -> Self {
        Self {
            flash: Memory::new_with_base(flash.len() as usize, flash.start),
            sram: Memory::new_with_base(sram.len() as usize, sram.start),
            mmio_windows: Vec::new(),
            mmio: BTreeMap::new(),
            mpu: SoftMpu::new(8),
            aips: SoftAips::new(PeripheralWindow::none(), 0),
            nvic: SoftNvic::new(32),
            core: CoreRegs {
                msp: sram.end,
                ..CoreRegs::default()
            },
        }
    }

    pub fn with_mpu_slots(mut self, slots: usize) -> Self {
        self.mpu = SoftMpu::new(slots);
        self
    }

    /// Gate `window` with `pacr_count` access-control words and map it as MMIO.
    pub fn with_peripherals(mut self, window: PeripheralWindow, pacr_count: usize) -> Self {
        self.aips = SoftAips::new(window, pacr_count);
        self.mmio_windows.push(window.window());
        self
    }

    pub fn with_mmio(mut self, window: Window) -> Self {
        self.mmio_windows.push(window);
        self
    }

    pub fn with_irq_lines(mut self, lines: usize) -> Self {
        self.nvic = SoftNvic::new(lines);
        self
    }

    fn in_mmio(&self, addr: u32) -> bool {
        self.mmio_windows.iter().any(|w| w.contains(addr))
    }

    /// Raw register-file value, for tests poking at device windows.
    pub fn mmio(&self, addr: u32) -> u32 {
        self.mmio.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_mmio(&mut self, addr: u32, value: u32) {
        self.mmio.insert(addr, value);
    }

    fn user_permits(&self, addr: u32, write: bool) -> bool {
        let last = addr.wrapping_add(3);
        self.mpu.permits_user(addr, write)
            && self.mpu.permits_user(last, write)
            && self.aips.permits_user(addr)
    }

    /// Load from unprivileged code; `None` is a memory fault.
    pub fn user_read(&self, addr: u32) -> Option<u32> {
        self.unprivileged_read_u32(addr)
    }

    /// Store from unprivileged code; `false` is a memory fault.
    pub fn user_write(&mut self, addr: u32, value: u32) -> bool {
        self.unprivileged_write_allowed(addr) && self.write_u32(addr, value)
    }

    /// Stack `frame` as the core does on exception entry and return its address.
    pub fn exception_entry(&mut self, on_psp: bool, mut frame: ExceptionFrame) -> u32 {
        let sp = if on_psp { self.core.psp } else { self.core.msp };
        let padded = sp & 4 != 0;
        if padded {
            frame.xpsr |= XPSR_ALIGN;
        } else {
            frame.xpsr &= !XPSR_ALIGN;
        }
        let frame_sp = sp - EXC_FRAME_SIZE - if padded { 4 } else { 0 };
        frame.write(self, frame_sp);
        if on_psp {
            self.core.psp = frame_sp;
        } else {
            self.core.msp = frame_sp;
        }
        frame_sp
    }

    /// Unstack a frame as the core does on exception return.
    pub fn exception_return(&mut self, on_psp: bool) -> Option<ExceptionFrame> {
        let sp = if on_psp { self.core.psp } else { self.core.msp };
        let frame = ExceptionFrame::read(self, sp)?;
        let unwound = frame.unwound_sp(sp);
        if on_psp {
            self.core.psp = unwound;
        } else {
            self.core.msp = unwound;
        }
        Some(frame)
    }

    /// Thread code executes the `svc` at `svc_pc` with `args` in r0-r3.
    /// Returns the stacked frame address.
    pub fn svc_from_thread(&mut self, svc_pc: u32, args: [u32; 4]) -> u32 {
        let frame = ExceptionFrame {
            r0: args[0],
            r1: args[1],
            r2: args[2],
            r3: args[3],
            lr: 0xDEAD_BEEF,
            pc: svc_pc + 2,
            xpsr: XPSR_THUMB,
            ..ExceptionFrame::default()
        };
        trace!("svc at 0x{:08x} from thread", svc_pc);
        self.exception_entry(true, frame)
    }

    /// Line `irq` preempts thread code at `thread_pc`, its vector runs the
    /// multiplexer stub at `stub_pc`, and the stub's first `svc` traps.
    /// Returns `(thread frame, stub frame)` addresses.
    pub fn interrupt_stub_svc(&mut self, irq: u32, thread_pc: u32, stub_pc: u32) -> (u32, u32) {
        let thread = ExceptionFrame {
            pc: thread_pc,
            lr: 0xDEAD_BEEF,
            xpsr: XPSR_THUMB,
            ..ExceptionFrame::default()
        };
        let thread_sp = self.exception_entry(true, thread);
        let stub = ExceptionFrame {
            lr: 0xFFFF_FFFD,
            pc: stub_pc + 2,
            xpsr: XPSR_THUMB | (IRQN_OFFSET + irq),
            ..ExceptionFrame::default()
        };
        let stub_sp = self.exception_entry(false, stub);
        (thread_sp, stub_sp)
    }
}

impl Bus for Machine {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        if addr % 4 != 0 {
            return None;
        }
        if self.in_mmio(addr) {
            return Some(self.mmio(addr));
        }
        self.flash.load_u32(addr).or_else(|| self.sram.load_u32(addr))
    }

    fn read_u16(&self, addr: u32) -> Option<u16> {
        if addr % 2 != 0 {
            return None;
        }
        self.flash.load_u16(addr).or_else(|| self.sram.load_u16(addr))
    }

    fn write_u32(&mut self, addr: u32, value: u32) -> bool {
        if addr % 4 != 0 {
            return false;
        }
        if self.in_mmio(addr) {
            self.mmio.insert(addr, value);
            return true;
        }
        self.sram.store_u32(addr, value)
    }

    fn unprivileged_read_u32(&self, addr: u32) -> Option<u32> {
        if !self.user_permits(addr, false) {
            return None;
        }
        self.read_u32(addr)
    }

    fn unprivileged_write_allowed(&self, addr: u32) -> bool {
        self.user_permits(addr, true)
    }
}

impl RegionHardware for Machine {
    fn slot_count(&self) -> usize {
        self.mpu.slot_count()
    }

    fn read_slot(&self, slot: usize) -> RegionRegs {
        self.mpu.read(slot)
    }

    fn write_slot(&mut self, slot: usize, regs: RegionRegs) {
        self.mpu.write(slot, regs);
    }

    fn set_protection(&mut self, enabled: bool) {
        self.mpu.set_enabled(enabled);
    }
}

impl PeripheralGate for Machine {
    fn pacr_count(&self) -> usize {
        self.aips.pacr_count()
    }

    fn read_pacr(&self, index: usize) -> u32 {
        self.aips.read(index)
    }

    fn write_pacr(&mut self, index: usize, value: u32) {
        self.aips.write(index, value);
    }
}

impl Cpu for Machine {
    fn psp(&self) -> u32 {
        self.core.psp
    }

    fn set_psp(&mut self, sp: u32) {
        self.core.psp = sp;
    }

    fn msp(&self) -> u32 {
        self.core.msp
    }

    fn thread_unprivileged(&self) -> bool {
        self.core.unprivileged
    }

    fn set_thread_unprivileged(&mut self, unprivileged: bool) {
        self.core.unprivileged = unprivileged;
    }

    fn mask_interrupts(&mut self) -> bool {
        let was = self.core.primask;
        self.core.primask = true;
        self.core.mask_count += 1;
        was
    }

    fn restore_interrupts(&mut self, was_masked: bool) {
        self.core.primask = was_masked;
    }
}

impl InterruptController for Machine {
    fn irq_count(&self) -> usize {
        self.nvic.lines()
    }

    fn enable_irq(&mut self, irq: u32) {
        self.nvic.enable(irq, true);
    }

    fn disable_irq(&mut self, irq: u32) {
        self.nvic.enable(irq, false);
    }

    fn irq_enabled(&self, irq: u32) -> bool {
        self.nvic.enabled(irq)
    }

    fn set_pending(&mut self, irq: u32) {
        self.nvic.pend(irq, true);
    }

    fn clear_pending(&mut self, irq: u32) {
        self.nvic.pend(irq, false);
    }

    fn is_pending(&self, irq: u32) -> bool {
        self.nvic.pending(irq)
    }

    fn set_priority(&mut self, irq: u32, priority: u8) {
        self.nvic.set_priority(irq, priority);
    }

    fn priority(&self, irq: u32) -> u8 {
        self.nvic.priority(irq)
    }
}
