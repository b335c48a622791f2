//! The kernel state machine tying registry, switch engine, call stack and
//! interrupt table together.

use log::{info, warn};
use types::boot::BootInfo;
use types::{Bus, Cpu, Hardware};

use crate::config::Config;
use crate::context::CallStack;
use crate::fault::{Fault, FaultReporter, Snapshot};
use crate::registry::Registry;
use crate::switch::SwitchEngine;
use crate::unvic::IrqTable;

pub struct Supervisor {
    pub(crate) info: BootInfo,
    pub(crate) registry: Registry,
    pub(crate) engine: SwitchEngine,
    pub(crate) stack: CallStack,
    pub(crate) irqs: IrqTable,
    pub(crate) active: u8,
    pub(crate) halted: Option<Fault>,
}

impl Supervisor {
    /// Build every box, load box 0's protection state and drop thread mode
    /// to unprivileged.
    pub fn boot<H: Hardware + ?Sized>(hw: &mut H, info: BootInfo) -> Result<Self, Fault> {
        check_platform(hw, &info)?;

        let mut irqs = IrqTable::new(&info, hw.irq_count());
        let registry = Registry::load_boxes(hw, &info, &mut irqs)?;
        let engine = SwitchEngine::new(hw, &info)?;
        let mut supervisor = Self {
            info,
            registry,
            engine,
            stack: CallStack::new(),
            irqs,
            active: 0,
            halted: None,
        };

        supervisor.engine.switch_to(hw, &supervisor.registry, 0, 0)?;
        hw.set_protection(true);
        supervisor.publish_context(hw)?;
        hw.set_thread_unprivileged(true);

        info!(
            "supervisor up: {} boxes, {} regions, {} IRQ lines",
            supervisor.registry.box_count(),
            supervisor.registry.pool().len(),
            supervisor.irqs.lines()
        );
        Ok(supervisor)
    }

    pub fn info(&self) -> &BootInfo {
        &self.info
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn engine(&self) -> &SwitchEngine {
        &self.engine
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn irqs(&self) -> &IrqTable {
        &self.irqs
    }

    pub fn active_box(&self) -> u8 {
        self.active
    }

    /// The fault that halted the kernel, if any.
    pub fn halted(&self) -> Option<Fault> {
        self.halted
    }

    pub(crate) fn ensure_running(&self) -> Result<(), Fault> {
        match self.halted {
            Some(_) => Err(Fault::Halted),
            None => Ok(()),
        }
    }

    /// Store the active box's context pointer where boxes can read it.
    pub(crate) fn publish_context<B: Bus + ?Sized>(&self, bus: &mut B) -> Result<(), Fault> {
        let slot = self.info.box_context_slot;
        if slot == 0 {
            return Ok(());
        }
        let value = self.registry.context(self.active).unwrap_or(0);
        if bus.write_u32(slot, value) {
            Ok(())
        } else {
            Err(Fault::BusError { addr: slot })
        }
    }

    pub fn snapshot<C: Cpu + ?Sized>(&self, cpu: &C) -> Snapshot {
        Snapshot {
            active_box: self.active,
            depth: self.stack.depth(),
            psp: cpu.psp(),
            msp: cpu.msp(),
        }
    }

    /// Stop all box execution. Only the first fault is reported; once halted
    /// the kernel refuses every further request.
    pub fn halt<C, R>(&mut self, cpu: &mut C, reporter: &mut R, fault: Fault)
    where
        C: Cpu + ?Sized,
        R: FaultReporter + ?Sized,
    {
        cpu.mask_interrupts();
        if self.halted.is_some() {
            warn!("fault after halt ignored: {}", fault);
            return;
        }
        reporter.report(&fault, &self.snapshot(cpu));
        self.halted = Some(fault);
    }
}

fn check_platform<H: Hardware + ?Sized>(hw: &H, info: &BootInfo) -> Result<(), Fault> {
    if !(3..=31).contains(&info.region_floor_bits) {
        return Err(Fault::Platform("region floor out of range"));
    }
    if info.flash.is_empty() || info.sram.is_empty() {
        return Err(Fault::Platform("flash and SRAM windows must be set"));
    }
    if !info.public_flash.is_empty()
        && !info
            .flash
            .contains_range(info.public_flash.start, info.public_flash.len())
    {
        return Err(Fault::Platform("public flash outside flash"));
    }
    if !info.stack_arena.is_empty()
        && !info
            .sram
            .contains_range(info.stack_arena.start, info.stack_arena.len())
    {
        return Err(Fault::Platform("stack arena outside SRAM"));
    }
    let slots = info.peripherals.slot_count as usize;
    if slots > Config::PERIPH_MAX_SLOTS {
        return Err(Fault::Platform("too many peripheral slots"));
    }
    if slots > 0 && hw.pacr_count() * crate::periph::SLOTS_PER_PACR < slots {
        return Err(Fault::Platform("peripheral gate smaller than its window"));
    }
    if info.irq_lines as usize > Config::HW_IRQ_VECTORS {
        return Err(Fault::Platform("too many IRQ lines"));
    }
    Ok(())
}
