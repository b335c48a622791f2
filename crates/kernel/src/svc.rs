//! SVC and memory-fault entry points.
//!
//! The architecture backend calls these with the stacked frame of the
//! trapping code; they route to the gateway, interrupt multiplexer or a
//! custom call and tell the backend how to resume. Any fault halts here.

use log::trace;
use types::frame::ExceptionFrame;
use types::gateway::{CustomCall, SVC_OPCODE};
use types::{Hardware, Svc};

use crate::fault::{Fault, FaultReporter};
use crate::supervisor::Supervisor;

/// Mode that executed the `svc`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Thread mode; `svc_sp` is on the process stack.
    Thread,
    /// Handler mode (the interrupt stub); `svc_sp` is on the main stack.
    Handler,
}

/// How the backend leaves the exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resume {
    /// Return to thread mode on the process stack.
    Thread,
    /// Return to handler mode on the main stack.
    Handler,
    /// The kernel halted; never return to box code.
    Halt,
}

impl Supervisor {
    pub fn dispatch_svc<H, R>(&mut self, hw: &mut H, reporter: &mut R, svc_sp: u32, origin: Origin) -> Resume
    where
        H: Hardware + ?Sized,
        R: FaultReporter + ?Sized,
    {
        match self.route_svc(hw, svc_sp, origin) {
            Ok(resume) => resume,
            Err(fault) => {
                self.halt(hw, reporter, fault);
                Resume::Halt
            }
        }
    }

    fn route_svc<H: Hardware + ?Sized>(&mut self, hw: &mut H, svc_sp: u32, origin: Origin) -> Result<Resume, Fault> {
        self.ensure_running()?;
        let frame = ExceptionFrame::read(hw, svc_sp).ok_or(Fault::FrameAccess { sp: svc_sp })?;
        let svc_pc = frame.pc.wrapping_sub(2);
        let opcode = hw.read_u16(svc_pc).ok_or(Fault::BusError { addr: svc_pc })?;
        if opcode & 0xFF00 != SVC_OPCODE {
            return Err(Fault::BusError { addr: svc_pc });
        }
        let imm = opcode as u8;
        let svc = Svc::decode(imm).ok_or(Fault::UnknownSvc { imm })?;
        trace!("svc 0x{:02x} {:?} from {:?} at 0x{:08x}", imm, svc, origin, svc_pc);

        match (svc, origin) {
            (Svc::Unvic, Origin::Handler) => {
                self.irq_enter(hw, svc_sp, svc_pc)?;
                Ok(Resume::Thread)
            }
            (Svc::Unvic, Origin::Thread) => {
                let msp = hw.msp();
                self.irq_exit(hw, svc_sp, msp)?;
                Ok(Resume::Handler)
            }
            (_, Origin::Handler) => Err(Fault::SvcOrigin { imm }),
            (Svc::SecureGateway { nargs }, Origin::Thread) => {
                self.gateway_enter(hw, svc_sp, svc_pc, nargs)?;
                Ok(Resume::Thread)
            }
            (Svc::GatewayReturn, Origin::Thread) => {
                self.gateway_return(hw, svc_sp)?;
                Ok(Resume::Thread)
            }
            (Svc::RegisterGateway, Origin::Thread) => {
                self.register_gateway(hw, svc_sp, svc_pc)?;
                Ok(Resume::Thread)
            }
            (Svc::Custom(call), Origin::Thread) => {
                self.custom_call(hw, svc_sp, &frame, call)?;
                Ok(Resume::Thread)
            }
        }
    }

    fn custom_call<H: Hardware + ?Sized>(
        &mut self,
        hw: &mut H,
        svc_sp: u32,
        frame: &ExceptionFrame,
        call: CustomCall,
    ) -> Result<(), Fault> {
        let active = self.active;
        let result = match call {
            CustomCall::IsrSet => {
                self.register_irq_handler(hw, frame.r0, active, frame.r1)?;
                None
            }
            CustomCall::IsrGet => Some(self.irq_handler(frame.r0)?),
            CustomCall::IrqEnable => {
                self.irq_enable(hw, frame.r0)?;
                None
            }
            CustomCall::IrqDisable => {
                self.irq_disable(hw, frame.r0)?;
                None
            }
            CustomCall::IrqPendClr => {
                self.irq_clear_pending(hw, frame.r0)?;
                None
            }
            CustomCall::IrqPendSet => {
                self.irq_set_pending(hw, frame.r0)?;
                None
            }
            CustomCall::IrqPendGet => Some(u32::from(self.irq_is_pending(hw, frame.r0)?)),
            CustomCall::IrqPrioSet => {
                self.irq_set_priority(hw, frame.r0, frame.r1)?;
                None
            }
            CustomCall::IrqPrioGet => Some(self.irq_priority(hw, frame.r0)?),
            CustomCall::BoxId => Some(u32::from(active)),
            CustomCall::HaltUserError => {
                return Err(Fault::UserHalt {
                    id: active,
                    reason: frame.r0,
                });
            }
        };
        if let Some(value) = result {
            if !hw.write_u32(svc_sp, value) {
                return Err(Fault::FrameWrite { sp: svc_sp });
            }
        }
        Ok(())
    }

    /// Memory-management fault from box code at `addr` (`None` when the
    /// core did not latch an address).
    pub fn on_memory_fault<H, R>(&mut self, hw: &mut H, reporter: &mut R, addr: Option<u32>) -> Resume
    where
        H: Hardware + ?Sized,
        R: FaultReporter + ?Sized,
    {
        let result = self.ensure_running().and_then(|()| {
            let active = self.active;
            let addr = addr.ok_or(Fault::AccessViolation { id: active, addr: 0 })?;
            self.engine.recover(hw, &mut self.registry, active, addr)
        });
        match result {
            Ok(_) => Resume::Thread,
            Err(fault) => {
                self.halt(hw, reporter, fault);
                Resume::Halt
            }
        }
    }
}
