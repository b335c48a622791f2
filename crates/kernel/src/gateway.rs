//! Secure gateway: synchronous cross-box calls.

use log::debug;
use types::frame::ExceptionFrame;
use types::gateway::{SECURE_GATEWAY_MAGIC, SVC_NARGS_MASK};
use types::{Bus, Hardware, SecureGateway, Svc};

use crate::config::Config;
use crate::context::{Crossing, SwitchState};
use crate::fault::Fault;
use crate::supervisor::Supervisor;
use crate::trampoline;

impl Supervisor {
    /// Validate the descriptor at `svc_pc` and read it.
    pub fn read_secure_gateway<B: Bus + ?Sized>(&self, bus: &B, svc_pc: u32) -> Result<SecureGateway, Fault> {
        let code = self.info.public_flash;
        if !code.contains_range(svc_pc, SecureGateway::SIZE) {
            return Err(Fault::GatewayOutsideFlash { addr: svc_pc });
        }
        let gateway = SecureGateway::read(bus, svc_pc).ok_or(Fault::BusError { addr: svc_pc })?;
        let expected = Svc::SecureGateway { nargs: 0 }.opcode();
        if gateway.opcode & !(SVC_NARGS_MASK as u16) != expected {
            return Err(Fault::GatewayOpcode {
                addr: svc_pc,
                opcode: gateway.opcode,
            });
        }
        if gateway.magic != SECURE_GATEWAY_MAGIC {
            return Err(Fault::GatewayMagic {
                addr: svc_pc,
                found: gateway.magic,
            });
        }
        if !code.contains(gateway.dst_fn & !1) {
            return Err(Fault::GatewayTarget {
                target: gateway.dst_fn,
            });
        }
        Ok(gateway)
    }

    /// Enter the box named by the gateway at `svc_pc`.
    ///
    /// `svc_sp` is the caller's exception frame; its argument registers are
    /// copied into a frame forged on the destination stack, which returns
    /// into the gateway thunk when the target function finishes.
    pub fn gateway_enter<H: Hardware + ?Sized>(
        &mut self,
        hw: &mut H,
        svc_sp: u32,
        svc_pc: u32,
        nargs: u8,
    ) -> Result<(), Fault> {
        self.ensure_running()?;
        if nargs > Config::GATEWAY_MAX_ARGS {
            return Err(Fault::GatewayArgs { nargs });
        }
        let gateway = self.read_secure_gateway(hw, svc_pc)?;
        let dst = self
            .registry
            .box_for_cfg_ptr(gateway.cfg_ptr)
            .ok_or(Fault::GatewayBoxPointer { ptr: gateway.cfg_ptr })?;
        let src = self.active;
        if dst == 0 {
            return Err(Fault::GatewayToKernel);
        }
        if dst == src {
            return Err(Fault::GatewaySelfCall { id: src });
        }
        let caller =
            ExceptionFrame::read_unprivileged(hw, svc_sp).ok_or(Fault::FrameAccess { sp: svc_sp })?;
        if self.stack.is_full() {
            return Err(Fault::CallStackOverflow);
        }

        let mut frame = ExceptionFrame {
            lr: self.info.gateway_thunk | 1,
            pc: gateway.dst_fn & !1,
            xpsr: caller.xpsr,
            ..ExceptionFrame::default()
        };
        for i in 0..nargs as usize {
            frame.set_arg(i, caller.arg(i));
        }
        let forged = trampoline::forge(self.registry.sp(dst), frame);
        trampoline::install(hw, &forged)?;

        self.stack.push(SwitchState {
            kind: Crossing::Gateway,
            src_box: src,
            dst_box: dst,
            src_sp: svc_sp,
            src_unprivileged: true,
            return_svc: self.info.gateway_thunk & !1,
        })?;
        self.registry.set_sp(src, svc_sp);
        self.engine.switch_to(hw, &self.registry, src, dst)?;
        self.active = dst;
        self.publish_context(hw)?;
        debug!(
            "gateway box[{}] -> box[{}] fn 0x{:08x} depth {}",
            src,
            dst,
            gateway.dst_fn,
            self.stack.depth()
        );
        trampoline::enter_unprivileged(hw, forged.sp);
        Ok(())
    }

    /// Return from the innermost gateway call, handing the callee's r0 to
    /// the caller.
    pub fn gateway_return<H: Hardware + ?Sized>(&mut self, hw: &mut H, svc_sp: u32) -> Result<(), Fault> {
        self.ensure_running()?;
        let current = self.active;
        let callee =
            ExceptionFrame::read_unprivileged(hw, svc_sp).ok_or(Fault::FrameAccess { sp: svc_sp })?;
        let state = match self.stack.peek() {
            Some(state) if state.kind == Crossing::Gateway && state.dst_box == current => *state,
            Some(state) => {
                return Err(Fault::CallStackMismatch {
                    expected: state.dst_box,
                    found: current,
                });
            }
            None => return Err(Fault::CallStackUnderflow),
        };

        if !hw.write_u32(state.src_sp, callee.r0) {
            return Err(Fault::FrameWrite { sp: state.src_sp });
        }
        self.stack.pop()?;
        self.registry.set_sp(current, trampoline::discard(svc_sp, &callee));
        self.engine.switch_to(hw, &self.registry, current, state.src_box)?;
        self.active = state.src_box;
        self.publish_context(hw)?;
        debug!(
            "gateway return box[{}] -> box[{}] r0=0x{:08x}",
            current, state.src_box, callee.r0
        );
        trampoline::enter_unprivileged(hw, state.src_sp);
        Ok(())
    }
}
