//! Forged exception frames.
//!
//! A crossing into another box is an exception return onto a frame the
//! kernel builds on the destination stack, laid out exactly as the core
//! would have stacked it.

use types::frame::{EXC_FRAME_SIZE, ExceptionFrame, XPSR_ALIGN, XPSR_IPSR_MASK, XPSR_THUMB};
use types::{Bus, Cpu};

use crate::fault::Fault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Forged {
    /// Stack pointer to hand to the core; the frame starts here.
    pub sp: u32,
    pub frame: ExceptionFrame,
}

/// Place `frame` below `dest_sp`, padding to 8 bytes and recording the pad
/// in xPSR the way the core does on exception entry.
pub fn forge(dest_sp: u32, mut frame: ExceptionFrame) -> Forged {
    let padded = dest_sp & 4 != 0;
    let pad = if padded { 4 } else { 0 };
    frame.xpsr = (frame.xpsr & !(XPSR_ALIGN | XPSR_IPSR_MASK)) | XPSR_THUMB;
    if padded {
        frame.xpsr |= XPSR_ALIGN;
    }
    Forged {
        sp: dest_sp.wrapping_sub(EXC_FRAME_SIZE + pad),
        frame,
    }
}

pub fn install<B: Bus + ?Sized>(bus: &mut B, forged: &Forged) -> Result<(), Fault> {
    if forged.frame.write(bus, forged.sp) {
        Ok(())
    } else {
        Err(Fault::FrameWrite { sp: forged.sp })
    }
}

/// Stack pointer after unwinding the frame at `sp`, pad included.
pub fn discard(sp: u32, frame: &ExceptionFrame) -> u32 {
    frame.unwound_sp(sp)
}

/// Hand the thread stack to `sp` and drop thread mode to unprivileged.
///
/// Called last, once the frame is installed and the protection state switched.
pub fn enter_unprivileged<C: Cpu + ?Sized>(cpu: &mut C, sp: u32) {
    cpu.set_psp(sp);
    cpu.set_thread_unprivileged(true);
}
