//! Interrupt multiplexer.
//!
//! Every hardware vector points at a small privileged stub. The stub traps
//! into the kernel, which looks up the owning box and runs its handler
//! unprivileged on that box's stack. A second trap from the handler's
//! return path restores the interrupted context.

use log::{debug, trace};
use types::boot::BootInfo;
use types::frame::{ExceptionFrame, IRQN_OFFSET};
use types::{Hardware, InterruptController};

use crate::config::Config;
use crate::context::{Crossing, SwitchState};
use crate::fault::Fault;
use crate::supervisor::Supervisor;
use crate::trampoline;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IrqVector {
    pub owner: Option<u8>,
    pub handler: u32,
}

/// Ownership and handler of every interrupt line.
pub struct IrqTable {
    vectors: [IrqVector; Config::HW_IRQ_VECTORS],
    lines: u32,
    reserved: [u32; types::boot::IRQ_WORDS],
}

impl IrqTable {
    pub fn new(boot: &BootInfo, hw_lines: usize) -> Self {
        let lines = (boot.irq_lines as usize).min(hw_lines).min(Config::HW_IRQ_VECTORS);
        Self {
            vectors: [IrqVector::default(); Config::HW_IRQ_VECTORS],
            lines: lines as u32,
            reserved: boot.reserved_irqs,
        }
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn check_line(&self, irq: u32) -> Result<usize, Fault> {
        if irq >= self.lines {
            return Err(Fault::IrqOutOfRange { irq });
        }
        if self.reserved[(irq / 32) as usize] & (1 << (irq % 32)) != 0 {
            return Err(Fault::IrqReserved { irq });
        }
        Ok(irq as usize)
    }

    pub fn vector(&self, irq: u32) -> Option<IrqVector> {
        if irq < self.lines {
            Some(self.vectors[irq as usize])
        } else {
            None
        }
    }

    /// Line must be unowned or already owned by `box_id`.
    fn check_free(&self, irq: u32, box_id: u8) -> Result<usize, Fault> {
        let line = self.check_line(irq)?;
        match self.vectors[line].owner {
            Some(owner) if owner != box_id => Err(Fault::IrqNotOwned {
                irq,
                owner,
                requester: box_id,
            }),
            _ => Ok(line),
        }
    }

    /// Line must be owned by `box_id`.
    pub fn check_owner(&self, irq: u32, box_id: u8) -> Result<usize, Fault> {
        let line = self.check_line(irq)?;
        match self.vectors[line].owner {
            Some(owner) if owner == box_id => Ok(line),
            Some(owner) => Err(Fault::IrqNotOwned {
                irq,
                owner,
                requester: box_id,
            }),
            None => Err(Fault::IrqUnclaimed {
                irq,
                requester: box_id,
            }),
        }
    }

    /// Boot-time claim from an IRQ entry of a box's ACL array.
    pub fn claim(&mut self, irq: u32, box_id: u8, handler: u32) -> Result<(), Fault> {
        let line = self.check_free(irq, box_id)?;
        self.vectors[line] = IrqVector {
            owner: Some(box_id),
            handler,
        };
        debug!("box[{}] claims IRQ {} (handler 0x{:08x})", box_id, irq, handler);
        Ok(())
    }

    /// Runtime registration. The first registrant owns the line; a null
    /// handler releases it.
    pub fn register(&mut self, irq: u32, box_id: u8, handler: u32) -> Result<(), Fault> {
        let line = self.check_free(irq, box_id)?;
        self.vectors[line] = if handler == 0 {
            IrqVector::default()
        } else {
            IrqVector {
                owner: Some(box_id),
                handler,
            }
        };
        Ok(())
    }

    /// Lines with an owner, in line order.
    pub fn owned(&self) -> impl Iterator<Item = (u32, IrqVector)> + '_ {
        self.vectors[..self.lines as usize]
            .iter()
            .enumerate()
            .filter(|(_, v)| v.owner.is_some())
            .map(|(irq, v)| (irq as u32, *v))
    }
}

impl Supervisor {
    /// Install (or with `handler == 0`, remove) `box_id`'s handler for `irq`.
    pub fn register_irq_handler<H: InterruptController + ?Sized>(
        &mut self,
        hw: &mut H,
        irq: u32,
        box_id: u8,
        handler: u32,
    ) -> Result<(), Fault> {
        self.ensure_running()?;
        if box_id as usize >= self.registry.box_count() {
            return Err(Fault::BoxOutOfRange { id: box_id });
        }
        self.irqs.register(irq, box_id, handler)?;
        if handler == 0 {
            hw.disable_irq(irq);
        }
        debug!("box[{}] IRQ {} handler 0x{:08x}", box_id, irq, handler);
        Ok(())
    }

    /// Handler the active box registered for `irq`; 0 when the line is free.
    pub fn irq_handler(&self, irq: u32) -> Result<u32, Fault> {
        self.ensure_running()?;
        let line = self.irqs.check_free(irq, self.active)?;
        Ok(self.irqs.vectors[line].handler)
    }

    fn owned_line(&self, irq: u32) -> Result<u32, Fault> {
        self.ensure_running()?;
        self.irqs.check_owner(irq, self.active)?;
        Ok(irq)
    }

    pub fn irq_enable<H: InterruptController + ?Sized>(&mut self, hw: &mut H, irq: u32) -> Result<(), Fault> {
        hw.enable_irq(self.owned_line(irq)?);
        Ok(())
    }

    pub fn irq_disable<H: InterruptController + ?Sized>(&mut self, hw: &mut H, irq: u32) -> Result<(), Fault> {
        hw.disable_irq(self.owned_line(irq)?);
        Ok(())
    }

    pub fn irq_set_pending<H: InterruptController + ?Sized>(&mut self, hw: &mut H, irq: u32) -> Result<(), Fault> {
        hw.set_pending(self.owned_line(irq)?);
        Ok(())
    }

    pub fn irq_clear_pending<H: InterruptController + ?Sized>(&mut self, hw: &mut H, irq: u32) -> Result<(), Fault> {
        hw.clear_pending(self.owned_line(irq)?);
        Ok(())
    }

    pub fn irq_is_pending<H: InterruptController + ?Sized>(&self, hw: &H, irq: u32) -> Result<bool, Fault> {
        Ok(hw.is_pending(self.owned_line(irq)?))
    }

    /// Boxes see levels `0..MAX`; hardware level 0 stays with the kernel.
    pub fn irq_set_priority<H: InterruptController + ?Sized>(
        &mut self,
        hw: &mut H,
        irq: u32,
        priority: u32,
    ) -> Result<(), Fault> {
        let irq = self.owned_line(irq)?;
        let max = (1u32 << Config::IRQ_PRIORITY_BITS) - 1;
        if priority >= max {
            return Err(Fault::IrqPriority { priority });
        }
        hw.set_priority(irq, (priority + 1) as u8);
        Ok(())
    }

    pub fn irq_priority<H: InterruptController + ?Sized>(&self, hw: &H, irq: u32) -> Result<u32, Fault> {
        let irq = self.owned_line(irq)?;
        Ok(u32::from(hw.priority(irq)).saturating_sub(1))
    }

    /// First trap of the stub: deliver the interrupt to its owner.
    ///
    /// `msp_frame` is the frame the core stacked on the kernel stack when the
    /// stub's `svc` was taken; `svc_pc` is the address of that `svc`.
    pub fn irq_enter<H: Hardware + ?Sized>(&mut self, hw: &mut H, msp_frame: u32, svc_pc: u32) -> Result<(), Fault> {
        self.ensure_running()?;
        let kframe = ExceptionFrame::read(hw, msp_frame).ok_or(Fault::FrameAccess { sp: msp_frame })?;
        let ipsr = kframe.exception_number();
        if ipsr < IRQN_OFFSET {
            return Err(Fault::NotAnInterrupt { ipsr });
        }
        let irq = ipsr - IRQN_OFFSET;
        let vector = self.irqs.vector(irq).ok_or(Fault::IrqOutOfRange { irq })?;
        let dst = match vector.owner {
            Some(owner) if vector.handler != 0 => owner,
            _ => return Err(Fault::IrqUnhandled { irq }),
        };
        if self.stack.is_full() {
            return Err(Fault::CallStackOverflow);
        }

        let src = self.active;
        let src_sp = hw.psp();
        let dst_sp = if dst == src { src_sp } else { self.registry.sp(dst) };

        // The stub's second `svc` sits right after the first.
        let exit_svc = svc_pc.wrapping_add(2);
        let frame = ExceptionFrame {
            lr: exit_svc | 1,
            pc: vector.handler & !1,
            xpsr: kframe.xpsr,
            ..ExceptionFrame::default()
        };
        let forged = trampoline::forge(dst_sp, frame);
        trampoline::install(hw, &forged)?;

        self.stack.push(SwitchState {
            kind: Crossing::Interrupt,
            src_box: src,
            dst_box: dst,
            src_sp,
            src_unprivileged: hw.thread_unprivileged(),
            return_svc: exit_svc,
        })?;
        if dst != src {
            self.registry.set_sp(src, src_sp);
            self.engine.switch_to(hw, &self.registry, src, dst)?;
            self.active = dst;
            self.publish_context(hw)?;
        }
        trace!("IRQ {} -> box[{}] handler 0x{:08x}", irq, dst, vector.handler);
        trampoline::enter_unprivileged(hw, forged.sp);
        Ok(())
    }

    /// Second trap of the stub: the handler returned.
    ///
    /// `svc_sp` is the handler's frame on the thread stack and `msp_frame`
    /// the stub's original frame on the kernel stack.
    pub fn irq_exit<H: Hardware + ?Sized>(&mut self, hw: &mut H, svc_sp: u32, msp_frame: u32) -> Result<(), Fault> {
        self.ensure_running()?;
        let current = self.active;
        let frame = ExceptionFrame::read_unprivileged(hw, svc_sp).ok_or(Fault::FrameAccess { sp: svc_sp })?;
        let state = match self.stack.peek() {
            Some(state) if state.kind == Crossing::Interrupt && state.dst_box == current => *state,
            Some(state) => {
                return Err(Fault::CallStackMismatch {
                    expected: state.dst_box,
                    found: current,
                });
            }
            None => return Err(Fault::CallStackUnderflow),
        };
        let found = frame.pc.wrapping_sub(2);
        if found != state.return_svc {
            return Err(Fault::IrqReturnAddress {
                expected: state.return_svc,
                found,
            });
        }

        // The stub resumes right after its second `svc`.
        let pc_slot = msp_frame.wrapping_add(24);
        if !hw.write_u32(pc_slot, frame.pc) {
            return Err(Fault::FrameWrite { sp: msp_frame });
        }
        self.stack.pop()?;

        if state.src_box != current {
            self.registry.set_sp(current, trampoline::discard(svc_sp, &frame));
            self.engine.switch_to(hw, &self.registry, current, state.src_box)?;
            self.active = state.src_box;
            self.publish_context(hw)?;
        }
        hw.set_psp(state.src_sp);
        hw.set_thread_unprivileged(state.src_unprivileged);
        trace!("IRQ return to box[{}]", state.src_box);
        Ok(())
    }
}
