//! ARMv7-M backend: memory-mapped MPU, NVIC and peripheral gate, plus the
//! exception entry points the board's vector table points at.

use core::arch::{asm, naked_asm};
use core::ptr::{read_volatile, write_volatile};

use types::boot::BootInfo;
use types::mpu::{RegionRegs, user_access};
use types::{Bus, Cpu, InterruptController, PeripheralGate, RegionHardware};

use crate::config::Config;
use crate::fault::{FaultReporter, LogReporter, Snapshot};
use crate::global::Global;
use crate::supervisor::Supervisor;
use crate::svc::{Origin, Resume};

const ICTR: u32 = 0xE000_E004;
const NVIC_ISER: u32 = 0xE000_E100;
const NVIC_ICER: u32 = 0xE000_E180;
const NVIC_ISPR: u32 = 0xE000_E200;
const NVIC_ICPR: u32 = 0xE000_E280;
const NVIC_IPR: u32 = 0xE000_E400;

const SCB_CCR: u32 = 0xE000_ED14;
const SCB_SHCSR: u32 = 0xE000_ED24;
const SCB_MMFSR: u32 = 0xE000_ED28;
const SCB_MMFAR: u32 = 0xE000_ED34;
const CCR_NONBASETHRDENA: u32 = 1 << 0;
const SHCSR_MEMFAULTENA: u32 = 1 << 16;
const MMFSR_MMARVALID: u32 = 1 << 7;

const MPU_TYPE: u32 = 0xE000_ED90;
const MPU_CTRL: u32 = 0xE000_ED94;
const MPU_RNR: u32 = 0xE000_ED98;
const MPU_RBAR: u32 = 0xE000_ED9C;
const MPU_RASR: u32 = 0xE000_EDA0;
const MPU_CTRL_ENABLE: u32 = 1 << 0;
const MPU_CTRL_PRIVDEFENA: u32 = 1 << 2;

const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;
const EXC_RETURN_HANDLER_MSP: u32 = 0xFFFF_FFF1;

/// Handle to the on-chip system peripherals of a Cortex-M3/M4 core.
pub struct Armv7m {
    /// First access-control word of the board's peripheral gate.
    pub pacr_base: u32,
    pub pacr_count: usize,
}

static SUPERVISOR: Global<Option<Supervisor>> = Global::new(None);
static BOARD: Global<Option<Armv7m>> = Global::new(None);

fn reg_read(addr: u32) -> u32 {
    unsafe { read_volatile(addr as *const u32) }
}

fn reg_write(addr: u32, value: u32) {
    unsafe { write_volatile(addr as *mut u32, value) }
}

fn barrier() {
    unsafe { asm!("dsb", "isb") };
}

impl Armv7m {
    fn mpu_enabled(&self) -> bool {
        reg_read(MPU_CTRL) & MPU_CTRL_ENABLE != 0
    }

    fn user_may(&self, addr: u32, write: bool) -> bool {
        if !self.mpu_enabled() {
            return true;
        }
        user_access((0..self.slot_count()).map(|slot| self.read_slot(slot)), addr, write)
    }
}

impl Bus for Armv7m {
    fn read_u32(&self, addr: u32) -> Option<u32> {
        if addr % 4 != 0 {
            return None;
        }
        Some(reg_read(addr))
    }

    fn read_u16(&self, addr: u32) -> Option<u16> {
        if addr % 2 != 0 {
            return None;
        }
        Some(unsafe { read_volatile(addr as *const u16) })
    }

    fn write_u32(&mut self, addr: u32, value: u32) -> bool {
        if addr % 4 != 0 {
            return false;
        }
        reg_write(addr, value);
        true
    }

    fn unprivileged_read_u32(&self, addr: u32) -> Option<u32> {
        if addr % 4 != 0 || !self.user_may(addr, false) || !self.user_may(addr.wrapping_add(3), false) {
            return None;
        }
        Some(reg_read(addr))
    }

    fn unprivileged_write_allowed(&self, addr: u32) -> bool {
        self.user_may(addr, true)
    }
}

impl RegionHardware for Armv7m {
    fn slot_count(&self) -> usize {
        ((reg_read(MPU_TYPE) >> 8) & 0xFF) as usize
    }

    fn read_slot(&self, slot: usize) -> RegionRegs {
        reg_write(MPU_RNR, slot as u32);
        RegionRegs {
            rbar: reg_read(MPU_RBAR),
            rasr: reg_read(MPU_RASR),
        }
    }

    fn write_slot(&mut self, slot: usize, regs: RegionRegs) {
        // RBAR with VALID selects the slot for the RASR write.
        reg_write(MPU_RBAR, RegionRegs::new(regs.base(), slot, 0).rbar);
        reg_write(MPU_RASR, regs.rasr);
        barrier();
    }

    fn set_protection(&mut self, enabled: bool) {
        if enabled {
            reg_write(SCB_SHCSR, reg_read(SCB_SHCSR) | SHCSR_MEMFAULTENA);
            reg_write(MPU_CTRL, MPU_CTRL_ENABLE | MPU_CTRL_PRIVDEFENA);
        } else {
            reg_write(MPU_CTRL, 0);
        }
        barrier();
    }
}

impl PeripheralGate for Armv7m {
    fn pacr_count(&self) -> usize {
        self.pacr_count
    }

    fn read_pacr(&self, index: usize) -> u32 {
        reg_read(self.pacr_base + 4 * index as u32)
    }

    fn write_pacr(&mut self, index: usize, value: u32) {
        reg_write(self.pacr_base + 4 * index as u32, value);
    }
}

impl Cpu for Armv7m {
    fn psp(&self) -> u32 {
        let sp: u32;
        unsafe { asm!("mrs {0}, psp", out(reg) sp) };
        sp
    }

    fn set_psp(&mut self, sp: u32) {
        unsafe { asm!("msr psp, {0}", in(reg) sp) };
    }

    fn msp(&self) -> u32 {
        let sp: u32;
        unsafe { asm!("mrs {0}, msp", out(reg) sp) };
        sp
    }

    fn thread_unprivileged(&self) -> bool {
        let control: u32;
        unsafe { asm!("mrs {0}, control", out(reg) control) };
        control & 1 != 0
    }

    fn set_thread_unprivileged(&mut self, unprivileged: bool) {
        unsafe {
            let mut control: u32;
            asm!("mrs {0}, control", out(reg) control);
            control = (control & !1) | unprivileged as u32;
            asm!("msr control, {0}", "isb", in(reg) control);
        }
    }

    fn mask_interrupts(&mut self) -> bool {
        let primask: u32;
        unsafe { asm!("mrs {0}, primask", "cpsid i", out(reg) primask) };
        primask & 1 != 0
    }

    fn restore_interrupts(&mut self, was_masked: bool) {
        if !was_masked {
            unsafe { asm!("cpsie i") };
        }
    }
}

impl InterruptController for Armv7m {
    fn irq_count(&self) -> usize {
        (((reg_read(ICTR) & 0xF) + 1) * 32) as usize
    }

    fn enable_irq(&mut self, irq: u32) {
        reg_write(NVIC_ISER + 4 * (irq / 32), 1 << (irq % 32));
    }

    fn disable_irq(&mut self, irq: u32) {
        reg_write(NVIC_ICER + 4 * (irq / 32), 1 << (irq % 32));
        barrier();
    }

    fn irq_enabled(&self, irq: u32) -> bool {
        reg_read(NVIC_ISER + 4 * (irq / 32)) & (1 << (irq % 32)) != 0
    }

    fn set_pending(&mut self, irq: u32) {
        reg_write(NVIC_ISPR + 4 * (irq / 32), 1 << (irq % 32));
    }

    fn clear_pending(&mut self, irq: u32) {
        reg_write(NVIC_ICPR + 4 * (irq / 32), 1 << (irq % 32));
    }

    fn is_pending(&self, irq: u32) -> bool {
        reg_read(NVIC_ISPR + 4 * (irq / 32)) & (1 << (irq % 32)) != 0
    }

    fn set_priority(&mut self, irq: u32, priority: u8) {
        let shifted = priority << (8 - Config::IRQ_PRIORITY_BITS);
        unsafe { write_volatile((NVIC_IPR + irq) as *mut u8, shifted) };
    }

    fn priority(&self, irq: u32) -> u8 {
        let raw = unsafe { read_volatile((NVIC_IPR + irq) as *const u8) };
        raw >> (8 - Config::IRQ_PRIORITY_BITS)
    }
}

fn halt_forever() -> ! {
    loop {
        unsafe { asm!("wfi") };
    }
}

/// Boot the supervisor. Returns in unprivileged thread mode running box 0.
pub fn init(board: Armv7m, info: BootInfo) {
    reg_write(SCB_CCR, reg_read(SCB_CCR) | CCR_NONBASETHRDENA);
    let (hw, supervisor) = unsafe { (BOARD.get_mut(), SUPERVISOR.get_mut()) };
    let hw = hw.insert(board);
    match Supervisor::boot(hw, info) {
        Ok(booted) => *supervisor = Some(booted),
        Err(fault) => {
            let snapshot = Snapshot {
                active_box: 0,
                depth: 0,
                psp: hw.psp(),
                msp: hw.msp(),
            };
            LogReporter.report(&fault, &snapshot);
            halt_forever();
        }
    }
}

extern "C" fn svc_dispatch(svc_sp: u32, exc_return: u32) -> u32 {
    let origin = if exc_return & 4 != 0 {
        Origin::Thread
    } else {
        Origin::Handler
    };
    let (hw, supervisor) = unsafe { (BOARD.get_mut(), SUPERVISOR.get_mut()) };
    let (Some(hw), Some(supervisor)) = (hw.as_mut(), supervisor.as_mut()) else {
        halt_forever();
    };
    match supervisor.dispatch_svc(hw, &mut LogReporter, svc_sp, origin) {
        Resume::Thread => EXC_RETURN_THREAD_PSP,
        Resume::Handler => EXC_RETURN_HANDLER_MSP,
        Resume::Halt => halt_forever(),
    }
}

/// SVC entry: pick the stack the frame was pushed to and let the
/// dispatcher choose the exception return.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst lr, #4",
        "ite eq",
        "mrseq r0, msp",
        "mrsne r0, psp",
        "mov r1, lr",
        "push {{r4, lr}}",
        "bl {dispatch}",
        "pop {{r4, lr}}",
        "bx r0",
        dispatch = sym svc_dispatch,
    );
}

/// Vector target for every box-owned interrupt line.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unvic_isr() {
    naked_asm!("svc #0x88", "svc #0x88", "bx lr");
}

/// Return address of every forged gateway frame.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gateway_thunk() {
    naked_asm!("svc #0x98", "b .");
}

#[unsafe(no_mangle)]
pub extern "C" fn MemManage() {
    let status = reg_read(SCB_MMFSR) & 0xFF;
    let addr = if status & MMFSR_MMARVALID != 0 {
        Some(reg_read(SCB_MMFAR))
    } else {
        None
    };
    // Write-one-to-clear.
    reg_write(SCB_MMFSR, status);
    let (hw, supervisor) = unsafe { (BOARD.get_mut(), SUPERVISOR.get_mut()) };
    let (Some(hw), Some(supervisor)) = (hw.as_mut(), supervisor.as_mut()) else {
        halt_forever();
    };
    if supervisor.on_memory_fault(hw, &mut LogReporter, addr) == Resume::Halt {
        halt_forever();
    }
}
