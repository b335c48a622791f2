mod common;

use common::*;
use kernel::{Fault, Resume};

fn rig() -> (Rig, RegisterGateways) {
    let mut fw = standard();
    let gws = with_register_gateways(&mut fw);
    let mut rig = Rig::boot(fw);
    rig.call(rig.fw.gw_to_a, [0; 4]);
    (rig, gws)
}

#[test]
fn test_write_or_masks_value() {
    let (mut rig, gws) = rig();
    rig.hw.set_mmio(FREE_DEVICE, 0x100);
    // The slot is not granted to box A.
    assert!(rig.hw.user_read(FREE_DEVICE).is_none());
    let writes = rig.sup.engine().writes();

    assert_eq!(rig.svc(gws.write_or, [0xFFFF_FFFF; 4]), Resume::Thread);
    let frame = rig.hw.exception_return(true).unwrap();
    assert_eq!(frame.r0, 0);
    assert_eq!(rig.hw.mmio(FREE_DEVICE), 0x10F);
    // No box switch happens.
    assert_eq!(rig.sup.active_box(), 1);
    assert_eq!(rig.sup.engine().writes(), writes);
    assert_eq!(rig.sup.call_stack().depth(), 1);
}

#[test]
fn test_read_and_returns_masked_value() {
    let (mut rig, gws) = rig();
    rig.hw.set_mmio(FREE_DEVICE + 4, 0x1234);
    assert_eq!(rig.svc(gws.read_and, [0; 4]), Resume::Thread);
    assert_eq!(rig.hw.exception_return(true).unwrap().r0, 0x34);
    assert_eq!(rig.hw.mmio(FREE_DEVICE + 4), 0x1234);
}

#[test]
fn test_rom_table_read() {
    let (mut rig, gws) = rig();
    rig.hw.set_mmio(ROM_TABLE.start, 0xF000_0F00);
    assert_eq!(rig.svc(gws.rom_read, [0; 4]), Resume::Thread);
    assert_eq!(rig.hw.exception_return(true).unwrap().r0, 0xF000_0F00);
}

#[test]
fn test_gateway_of_other_box_is_refused() {
    let (mut rig, gws) = rig();
    assert_eq!(rig.svc(gws.owned_by_b, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::RegisterGatewayBox { owner: 2, active: 1 });
    assert_eq!(rig.hw.mmio(FREE_DEVICE), 0);
}

#[test]
fn test_kernel_cannot_use_box_gateway() {
    let mut fw = standard();
    let gws = with_register_gateways(&mut fw);
    let mut rig = Rig::boot(fw);
    assert_eq!(rig.svc(gws.write_or, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::RegisterGatewayBox { owner: 1, active: 0 });
}

#[test]
fn test_address_outside_device_space() {
    let (mut rig, gws) = rig();
    assert_eq!(rig.svc(gws.outside, [0; 4]), Resume::Halt);
    assert_eq!(
        rig.rec.reports[0].0,
        Fault::RegisterGatewayAddress {
            address: BOX0_RAM.start
        }
    );
}

#[test]
fn test_unknown_operation() {
    let (mut rig, gws) = rig();
    assert_eq!(rig.svc(gws.bad_op, [0; 4]), Resume::Halt);
    assert_eq!(rig.rec.reports[0].0, Fault::RegisterGatewayOp { op: 9 });
}
