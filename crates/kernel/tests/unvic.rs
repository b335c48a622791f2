mod common;

use common::*;
use kernel::{Crossing, Fault, Origin, Resume};
use types::{Bus, InterruptController};
use types::frame::XPSR_IPSR_MASK;
use types::gateway::{CustomCall, Svc};

#[test]
fn test_irq_delivered_to_owner() {
    let mut rig = Rig::boot(standard());
    let slots = rig.hw.mpu.slots().to_vec();

    let handler = rig.interrupt(IRQ_A);
    assert_eq!(rig.sup.active_box(), 1);
    assert_eq!(handler.pc, rig.fw.handler_a);
    assert_eq!(handler.lr, (rig.fw.stub + 2) | 1);
    assert_eq!(handler.xpsr & XPSR_IPSR_MASK, 0);
    assert_eq!(rig.hw.core.psp, A_STACK.end - 128);
    assert!(rig.hw.core.unprivileged);
    assert!(rig.hw.user_read(A_DATA).is_some());

    let entry = *rig.sup.call_stack().peek().unwrap();
    assert_eq!(entry.kind, Crossing::Interrupt);
    assert_eq!((entry.src_box, entry.dst_box), (0, 1));

    let resumed = rig.interrupt_return(&handler);
    assert_eq!(resumed.pc, 0x0000_2222);
    assert_eq!(rig.sup.active_box(), 0);
    assert_eq!(rig.sup.call_stack().depth(), 0);
    assert_eq!(rig.hw.core.psp, BOX0_PSP);
    assert_eq!(rig.hw.mpu.slots(), &slots[..]);
    assert!(rig.rec.reports.is_empty());
}

#[test]
fn test_irq_for_running_box_stays_on_its_stack() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let writes = rig.sup.engine().writes();
    let psp = rig.hw.core.psp;

    let handler = rig.interrupt(IRQ_A);
    assert_eq!(rig.sup.active_box(), 1);
    // The interrupted frame sits at psp - 32; the handler frame goes below it.
    assert_eq!(rig.hw.core.psp, psp - 32);
    assert_eq!(rig.sup.engine().writes(), writes);

    rig.interrupt_return(&handler);
    assert_eq!(rig.hw.core.psp, psp);
    assert_eq!(rig.sup.call_stack().depth(), 1);
}

#[test]
fn test_irq_nested_in_gateway_call() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let slots = rig.hw.mpu.slots().to_vec();
    let a_psp = rig.hw.core.psp;

    let handler = rig.interrupt(IRQ_B);
    assert_eq!(rig.sup.active_box(), 2);
    assert_eq!(handler.pc, rig.fw.handler_b);
    assert_eq!(rig.sup.call_stack().depth(), 2);
    assert!(rig.hw.user_read(B_DATA).is_some());
    assert!(rig.hw.user_read(A_DATA).is_none());

    rig.interrupt_return(&handler);
    assert_eq!(rig.sup.active_box(), 1);
    assert_eq!(rig.sup.call_stack().depth(), 1);
    assert_eq!(rig.hw.core.psp, a_psp);
    assert_eq!(rig.hw.mpu.slots(), &slots[..]);

    // The gateway call still returns normally.
    let back = rig.ret(3);
    assert_eq!(back.r0, 3);
    assert_eq!(rig.sup.call_stack().depth(), 0);
}

#[test]
fn test_unhandled_irq_is_fatal() {
    let mut rig = Rig::boot(standard());
    let stub = rig.fw.stub;
    let (_, stub_sp) = rig.hw.interrupt_stub_svc(7, 0x2222, stub);
    let resume = rig.sup.dispatch_svc(&mut rig.hw, &mut rig.rec, stub_sp, Origin::Handler);
    assert_eq!(resume, Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::IrqUnhandled { irq: 7 });
}

#[test]
fn test_runtime_registration_and_ownership() {
    let mut rig = Rig::boot(standard());
    let isr_set = rig.fw.custom(CustomCall::IsrSet);
    let isr_get = rig.fw.custom(CustomCall::IsrGet);
    let handler = rig.fw.handler_a;

    // Box 0 claims line 9 at runtime.
    assert_eq!(rig.svc(isr_set, [9, handler, 0, 0]), Resume::Thread);
    rig.hw.exception_return(true);
    assert_eq!(rig.sup.irqs().vector(9).unwrap().owner, Some(0));

    assert_eq!(rig.svc(isr_get, [9, 0, 0, 0]), Resume::Thread);
    assert_eq!(rig.hw.exception_return(true).unwrap().r0, handler);

    // Box 0's own interrupt is delivered without a switch.
    let frame = rig.interrupt(9);
    assert_eq!(frame.pc, handler);
    assert_eq!(rig.sup.active_box(), 0);
    rig.interrupt_return(&frame);

    // Box A cannot take the line over.
    rig.call(rig.fw.gw_to_a, [0; 4]);
    assert_eq!(rig.svc(isr_set, [9, rig.fw.handler_a, 0, 0]), Resume::Halt);
    assert_eq!(
        rig.rec.reports[0].0,
        Fault::IrqNotOwned {
            irq: 9,
            owner: 0,
            requester: 1
        }
    );
}

#[test]
fn test_deregistration_releases_line() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let enable = rig.fw.custom(CustomCall::IrqEnable);
    let isr_set = rig.fw.custom(CustomCall::IsrSet);

    assert_eq!(rig.svc(enable, [IRQ_A, 0, 0, 0]), Resume::Thread);
    rig.hw.exception_return(true);
    assert!(rig.hw.irq_enabled(IRQ_A));

    assert_eq!(rig.svc(isr_set, [IRQ_A, 0, 0, 0]), Resume::Thread);
    rig.hw.exception_return(true);
    assert!(!rig.hw.irq_enabled(IRQ_A));
    assert_eq!(rig.sup.irqs().vector(IRQ_A).unwrap().owner, None);
}

#[test]
fn test_irq_controls_require_ownership() {
    let mut rig = Rig::boot(standard());
    let enable = rig.fw.custom(CustomCall::IrqEnable);
    // Box 0 does not own A's line.
    assert_eq!(rig.svc(enable, [IRQ_A, 0, 0, 0]), Resume::Halt);
    assert_eq!(
        rig.rec.reports[0].0,
        Fault::IrqNotOwned {
            irq: IRQ_A,
            owner: 1,
            requester: 0
        }
    );
    assert!(!rig.hw.irq_enabled(IRQ_A));
}

#[test]
fn test_reserved_line_is_rejected() {
    let mut rig = Rig::boot(standard());
    let isr_set = rig.fw.custom(CustomCall::IsrSet);
    assert_eq!(rig.svc(isr_set, [IRQ_RESERVED, 0x101, 0, 0]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::IrqReserved { irq: IRQ_RESERVED });
}

#[test]
fn test_pending_and_priority() {
    let mut rig = Rig::boot(standard());
    rig.call(rig.fw.gw_to_a, [0; 4]);
    let fw = &rig.fw;
    let (pend_set, pend_get, pend_clr) = (
        fw.custom(CustomCall::IrqPendSet),
        fw.custom(CustomCall::IrqPendGet),
        fw.custom(CustomCall::IrqPendClr),
    );
    let (prio_set, prio_get) = (fw.custom(CustomCall::IrqPrioSet), fw.custom(CustomCall::IrqPrioGet));

    rig.svc(pend_set, [IRQ_A, 0, 0, 0]);
    rig.hw.exception_return(true);
    assert!(rig.hw.is_pending(IRQ_A));
    rig.svc(pend_get, [IRQ_A, 0, 0, 0]);
    assert_eq!(rig.hw.exception_return(true).unwrap().r0, 1);
    rig.svc(pend_clr, [IRQ_A, 0, 0, 0]);
    rig.hw.exception_return(true);
    assert!(!rig.hw.is_pending(IRQ_A));

    // Level 0 belongs to the kernel, so box levels are shifted by one.
    rig.svc(prio_set, [IRQ_A, 2, 0, 0]);
    rig.hw.exception_return(true);
    assert_eq!(rig.hw.priority(IRQ_A), 3);
    rig.svc(prio_get, [IRQ_A, 0, 0, 0]);
    assert_eq!(rig.hw.exception_return(true).unwrap().r0, 2);

    assert_eq!(rig.svc(prio_set, [IRQ_A, 15, 0, 0]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::IrqPriority { priority: 15 });
}

#[test]
fn test_handler_cannot_leave_through_its_own_svc() {
    let mut fw = standard();
    let rogue = fw.image.put_svc(Svc::Unvic.imm());
    let mut rig = Rig::boot(fw);
    rig.interrupt(IRQ_A);
    let stub_pc_slot = rig.hw.core.msp + 24;
    assert_eq!(rig.hw.read_u32(stub_pc_slot), Some(rig.fw.stub + 2));

    assert_eq!(rig.svc(rogue, [0; 4]), Resume::Halt);
    assert_eq!(
        rig.rec.reports[0].0,
        Fault::IrqReturnAddress {
            expected: rig.fw.stub + 2,
            found: rogue
        }
    );
    // The privileged frame still points into the stub.
    assert_eq!(rig.hw.read_u32(stub_pc_slot), Some(rig.fw.stub + 2));
    assert_eq!(rig.sup.call_stack().depth(), 1);
}

#[test]
fn test_handler_lookup_refused_after_halt() {
    let mut rig = Rig::boot(standard());
    let halt = rig.fw.custom(CustomCall::HaltUserError);
    assert_eq!(rig.svc(halt, [1, 0, 0, 0]), Resume::Halt);
    assert_eq!(rig.sup.irq_handler(IRQ_A), Err(Fault::Halted));
}
