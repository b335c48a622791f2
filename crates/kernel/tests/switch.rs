mod common;

use common::*;
use kernel::periph::{PACR_ALL_SUPERVISOR, pacr_for};
use kernel::{Fault, IrqTable, Registry, SwitchEngine};
use machine::Machine;
use types::Bus;

fn setup() -> (Machine, Registry, SwitchEngine) {
    init_logging();
    let fw = standard();
    let hw = machine();
    assert!(fw.image.load_into(&hw.flash));
    let info = fw.info();
    let mut irqs = IrqTable::new(&info, IRQ_LINES);
    let registry = Registry::load_boxes(&hw, &info, &mut irqs).unwrap();
    let engine = SwitchEngine::new(&hw, &info).unwrap();
    (hw, registry, engine)
}

#[test]
fn test_first_activation_programs_everything() {
    let (mut hw, registry, mut engine) = setup();
    assert_eq!(engine.loaded(), None);
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    assert_eq!(engine.loaded(), Some(0));

    // Box 0's three regions; the remaining slots already read as disabled.
    assert_eq!(hw.mpu.write_log.len(), 3);
    // Every access-control word is rewritten once.
    assert_eq!(hw.aips.write_log.len(), PACR_COUNT);
    assert!((0..PACR_COUNT).all(|i| hw.aips.read(i) == PACR_ALL_SUPERVISOR));
    assert_eq!(engine.writes(), 3 + PACR_COUNT);
}

#[test]
fn test_switch_writes_only_differences() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    let before = engine.writes();

    engine.switch_to(&mut hw, &registry, 0, 1).unwrap();
    // Two box-1 regions and the one access-control word covering slot 1.
    assert_eq!(engine.writes() - before, 3);
    assert_eq!(hw.aips.read(0), pacr_for(0b10));
    assert_eq!(hw.aips.read(0), 0x4044_4444);

    let before = engine.writes();
    engine.switch_to(&mut hw, &registry, 1, 2).unwrap();
    assert_eq!(engine.writes() - before, 3);
    assert_eq!(hw.aips.read(0), 0x4404_4444);
}

#[test]
fn test_switch_is_idempotent() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    engine.switch_to(&mut hw, &registry, 0, 2).unwrap();
    let slots = hw.mpu.slots().to_vec();
    let writes = engine.writes();

    engine.switch_to(&mut hw, &registry, 2, 2).unwrap();
    assert_eq!(engine.writes(), writes);
    assert_eq!(hw.mpu.slots(), &slots[..]);
}

#[test]
fn test_switch_round_trip_restores_state() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    let slots = hw.mpu.slots().to_vec();
    let pacr: Vec<u32> = (0..PACR_COUNT).map(|i| hw.aips.read(i)).collect();

    engine.switch_to(&mut hw, &registry, 0, 1).unwrap();
    engine.switch_to(&mut hw, &registry, 1, 2).unwrap();
    engine.switch_to(&mut hw, &registry, 2, 0).unwrap();

    assert_eq!(hw.mpu.slots(), &slots[..]);
    assert_eq!((0..PACR_COUNT).map(|i| hw.aips.read(i)).collect::<Vec<_>>(), pacr);
    assert_eq!(engine.live(), &slots[..]);
}

#[test]
fn test_switch_enforces_isolation() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    hw.mpu.set_enabled(true);
    engine.switch_to(&mut hw, &registry, 0, 1).unwrap();

    assert!(hw.user_read(A_DATA).is_some());
    assert!(hw.user_read(A_STACK.start + 0x200).is_some());
    assert!(hw.user_read(B_DATA).is_none());
    assert!(hw.user_read(B_STACK.start + 0x200).is_none());
    assert!(hw.unprivileged_read_u32(A_DEVICE).is_some());
    assert!(hw.unprivileged_read_u32(B_DEVICE).is_none());
    // Box 0's public layer stays visible.
    assert!(hw.user_read(BOX0_RAM.start).is_some());

    engine.switch_to(&mut hw, &registry, 1, 2).unwrap();
    assert!(hw.user_read(A_DATA).is_none());
    assert!(hw.user_read(B_DATA).is_some());
    assert!(hw.unprivileged_read_u32(A_DEVICE).is_none());
    assert!(hw.unprivileged_read_u32(B_DEVICE).is_some());
}

#[test]
fn test_switch_checks_source_and_destination() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    assert_eq!(
        engine.switch_to(&mut hw, &registry, 1, 2),
        Err(Fault::SwitchSource {
            expected: 0,
            found: 1
        })
    );
    assert_eq!(
        engine.switch_to(&mut hw, &registry, 0, 7),
        Err(Fault::BoxOutOfRange { id: 7 })
    );
    assert_eq!(engine.loaded(), Some(0));
}

#[test]
fn test_switch_masks_interrupts() {
    let (mut hw, registry, mut engine) = setup();
    engine.switch_to(&mut hw, &registry, 0, 0).unwrap();
    let masked = hw.core.mask_count;
    engine.switch_to(&mut hw, &registry, 0, 1).unwrap();
    assert_eq!(hw.core.mask_count, masked + 1);
    assert!(!hw.core.primask);
}
