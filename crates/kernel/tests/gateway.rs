mod common;

use common::*;
use kernel::trampoline::{discard, forge};
use kernel::{Crossing, Fault, FaultClass, Resume};
use types::Bus;
use types::frame::{ExceptionFrame, XPSR_ALIGN, XPSR_THUMB};

#[test]
fn test_boot_state() {
    let rig = Rig::boot(standard());
    assert_eq!(rig.sup.active_box(), 0);
    assert_eq!(rig.sup.call_stack().depth(), 0);
    assert!(rig.hw.mpu.enabled());
    assert!(rig.hw.core.unprivileged);
    assert_eq!(rig.hw.read_u32(CONTEXT_SLOT), Some(0));
}

#[test]
fn test_forge_pads_to_eight_bytes() {
    let frame = ExceptionFrame {
        pc: 0x1001,
        xpsr: XPSR_THUMB | XPSR_ALIGN | 0x23,
        ..ExceptionFrame::default()
    };
    let aligned = forge(0x2000_8780, frame);
    assert_eq!(aligned.sp, 0x2000_8760);
    assert_eq!(aligned.frame.xpsr, XPSR_THUMB);
    assert_eq!(discard(aligned.sp, &aligned.frame), 0x2000_8780);

    let padded = forge(0x2000_8784, frame);
    assert_eq!(padded.sp, 0x2000_8760);
    assert_eq!(padded.sp % 8, 0);
    assert_eq!(padded.frame.xpsr, XPSR_THUMB | XPSR_ALIGN);
    assert_eq!(discard(padded.sp, &padded.frame), 0x2000_8784);
}

#[test]
fn test_nested_call_and_return() {
    let mut rig = Rig::boot(standard());
    let slots = rig.hw.mpu.slots().to_vec();
    let pacr: Vec<u32> = (0..PACR_COUNT).map(|i| rig.hw.aips.read(i)).collect();

    // Box 0 calls A with two arguments; the extra registers never cross.
    let a = rig.call(rig.fw.gw_to_a, [7, 9, 0xAA, 0xBB]);
    assert_eq!(rig.sup.active_box(), 1);
    assert_eq!(rig.sup.call_stack().depth(), 1);
    assert_eq!((a.r0, a.r1, a.r2, a.r3, a.r12), (7, 9, 0, 0, 0));
    assert_eq!(a.pc, rig.fw.fn_a);
    assert_eq!(a.lr, rig.fw.thunk | 1);
    assert_eq!(a.xpsr & XPSR_THUMB, XPSR_THUMB);
    assert_eq!(rig.hw.core.psp, A_STACK.end - 128);
    assert_eq!(rig.hw.read_u32(CONTEXT_SLOT), Some(A_STACK.start));

    // A calls B.
    let b = rig.call(rig.fw.gw_to_b, [1, 2, 3, 4]);
    assert_eq!(rig.sup.active_box(), 2);
    assert_eq!(rig.sup.call_stack().depth(), 2);
    assert_eq!((b.r0, b.r1, b.r2), (1, 2, 0));
    assert_eq!(b.pc, rig.fw.fn_b);
    assert_eq!(rig.hw.read_u32(CONTEXT_SLOT), Some(0));
    assert!(rig.hw.user_read(A_DATA).is_none());
    assert!(rig.hw.user_read(B_DATA).is_some());

    // B returns 42 to A.
    let back_in_a = rig.ret(42);
    assert_eq!(back_in_a.r0, 42);
    assert_eq!(back_in_a.pc, rig.fw.gw_to_b + 2);
    assert_eq!(rig.sup.active_box(), 1);
    assert_eq!(rig.sup.call_stack().depth(), 1);
    assert!(rig.hw.user_read(A_DATA).is_some());
    assert!(rig.hw.user_read(B_DATA).is_none());

    // A returns 5 to box 0.
    let back_in_0 = rig.ret(5);
    assert_eq!(back_in_0.r0, 5);
    assert_eq!(back_in_0.pc, rig.fw.gw_to_a + 2);
    assert_eq!(rig.sup.active_box(), 0);
    assert_eq!(rig.sup.call_stack().depth(), 0);
    assert_eq!(rig.hw.core.psp, BOX0_PSP);
    assert!(rig.hw.core.unprivileged);

    // Protection state is back bit for bit.
    assert_eq!(rig.hw.mpu.slots(), &slots[..]);
    assert_eq!((0..PACR_COUNT).map(|i| rig.hw.aips.read(i)).collect::<Vec<_>>(), pacr);
    assert!(rig.rec.reports.is_empty());
}

#[test]
fn test_callee_stack_pointer_is_saved_across_nested_calls() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let a_sp = rig.hw.core.psp;
    rig.call(rig.fw.gw_to_b, [0; 4]);
    // A's suspended stack pointer is its svc frame.
    assert_eq!(rig.sup.registry().sp(1), a_sp - 32);
    let entry = *rig.sup.call_stack().peek().unwrap();
    assert_eq!(entry.kind, Crossing::Gateway);
    assert_eq!((entry.src_box, entry.dst_box), (1, 2));
    assert_eq!(entry.src_sp, a_sp - 32);
}

#[test]
fn test_cross_box_stack_is_unreadable() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    assert!(rig.hw.user_read(A_STACK.end - 256).is_some());
    assert!(rig.hw.user_read(B_STACK.end - 256).is_none());
    assert!(!rig.hw.user_write(B_STACK.end - 256, 1));
}

#[test]
fn test_self_call_is_fatal() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let gw = rig.fw.gw_to_a;
    assert_eq!(rig.svc(gw, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports.len(), 1);
    assert_eq!(rig.rec.reports[0].0, Fault::GatewaySelfCall { id: 1 });
    assert_eq!(rig.rec.reports[0].1.active_box, 1);
    assert_eq!(rig.sup.halted(), Some(Fault::GatewaySelfCall { id: 1 }));
}

#[test]
fn test_call_into_box0_is_fatal() {
    let mut rig = Rig::boot(standard());
    let gw = rig.fw.gw_to_kernel;
    assert_eq!(rig.svc(gw, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::GatewayToKernel);
    assert_eq!(rig.sup.call_stack().depth(), 0);
}

#[test]
fn test_bad_descriptor_is_fatal() {
    let mut rig = Rig::boot(standard());
    let gw = rig.fw.gw_bad_magic;
    assert_eq!(rig.svc(gw, [0; 4]), Resume::Halt);
    let (fault, _) = rig.rec.reports[0];
    assert!(matches!(fault, Fault::GatewayMagic { addr, .. } if addr == gw));
    assert_eq!(fault.class(), FaultClass::Violation);
    assert_eq!(rig.sup.active_box(), 0);
}

#[test]
fn test_return_without_call_is_fatal() {
    let mut rig = Rig::boot(standard());
    let thunk = rig.fw.thunk;
    assert_eq!(rig.svc(thunk, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::CallStackUnderflow);
}

#[test]
fn test_call_depth_limit() {
    let mut rig = Rig::boot(standard());
    for depth in 1..=16 {
        let gw = if depth % 2 == 1 { rig.fw.gw_to_a } else { rig.fw.gw_to_b };
        rig.call(gw, [depth, 0, 0, 0]);
        assert_eq!(rig.sup.call_stack().depth(), depth as usize);
    }
    // B is active at depth 16; one more crossing overflows.
    assert_eq!(rig.sup.active_box(), 2);
    let gw = rig.fw.gw_to_a;
    assert_eq!(rig.svc(gw, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::CallStackOverflow);
    assert_eq!(rig.sup.call_stack().depth(), 16);
}

#[test]
fn test_unwinding_balances_stacks() {
    let mut rig = Rig::boot(standard());
    for depth in 1..=6u32 {
        let gw = if depth % 2 == 1 { rig.fw.gw_to_a } else { rig.fw.gw_to_b };
        rig.call(gw, [depth, 0, 0, 0]);
    }
    for depth in (1..=6u32).rev() {
        let frame = rig.ret(depth * 10);
        assert_eq!(frame.r0, depth * 10);
    }
    assert_eq!(rig.sup.call_stack().depth(), 0);
    assert_eq!(rig.hw.core.psp, BOX0_PSP);
    assert_eq!(rig.sup.registry().sp(1), A_STACK.end - 128);
    assert_eq!(rig.sup.registry().sp(2), B_STACK.end - 128);
}

#[test]
fn test_context_is_fenced_off_from_stack() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    // 1 KiB window: 128-byte blocks, context in the first, the second is the fence.
    assert!(rig.hw.user_write(A_STACK.start, 0x11));
    assert!(!rig.hw.user_write(A_STACK.start + 128, 0x22));
    assert!(rig.hw.user_read(A_STACK.start + 0xFC).is_none());
    assert!(rig.hw.user_write(A_STACK.start + 256, 0x33));
    assert_eq!(rig.hw.read_u32(A_STACK.start), Some(0x11));

    // A fault in the fence is not a missing region.
    let addr = A_STACK.start + 128;
    assert_eq!(rig.sup.on_memory_fault(&mut rig.hw, &mut rig.rec, Some(addr)), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::AccessViolation { id: 1, addr });
}
