use machine::{ImageBuilder, Machine};
use types::boot::{BootInfo, IRQ_WORDS, PeripheralWindow, Window};
use types::gateway::CustomCall;
use types::{Acl, AclEntry, RgwOp, SecureGateway};

pub const FLASH: Window = Window::new(0x0000_0000, 0x0010_0000);
pub const SRAM: Window = Window::new(0x2000_0000, 0x2001_0000);
pub const IMAGE_BASE: u32 = 0x0000_1000;

pub const BOX0_RAM: Window = Window::new(0x2000_0000, 0x2000_4000);
pub const BOX0_PSP: u32 = 0x2000_3F00;
pub const CONTEXT_SLOT: u32 = 0x2000_3FFC;
pub const A_DATA: u32 = 0x2000_4000;
pub const B_DATA: u32 = 0x2000_5000;
pub const ARENA: Window = Window::new(0x2000_8000, 0x2000_8800);

pub const A_STACK: Window = Window::new(0x2000_8400, 0x2000_8800);
pub const B_STACK: Window = Window::new(0x2000_8000, 0x2000_8400);

pub const PERIPHERALS: PeripheralWindow = PeripheralWindow {
    base: 0x4000_0000,
    slot_size: 0x1000,
    slot_count: 64,
};
pub const PACR_COUNT: usize = 8;
pub const A_DEVICE: u32 = 0x4000_1000;
pub const B_DEVICE: u32 = 0x4000_2000;
pub const FREE_DEVICE: u32 = 0x4000_3000;
pub const ROM_TABLE: Window = Window::new(0xE00F_F000, 0xE010_0000);

pub const IRQ_LINES: usize = 32;
pub const IRQ_A: u32 = 3;
pub const IRQ_B: u32 = 4;
pub const IRQ_RESERVED: u32 = 31;

pub fn machine() -> Machine {
    machine_with_slots(8)
}

pub fn machine_with_slots(slots: usize) -> Machine {
    let mut hw = Machine::new(FLASH, SRAM)
        .with_mpu_slots(slots)
        .with_peripherals(PERIPHERALS, PACR_COUNT)
        .with_mmio(ROM_TABLE)
        .with_irq_lines(IRQ_LINES);
    hw.core.psp = BOX0_PSP;
    hw
}

pub fn box0_acls() -> Vec<AclEntry> {
    vec![
        AclEntry::new(
            FLASH.start,
            FLASH.len(),
            Acl::UREAD | Acl::UEXECUTE | Acl::SREAD | Acl::SEXECUTE,
        ),
        AclEntry::new(
            BOX0_RAM.start,
            BOX0_RAM.len(),
            Acl::UREAD | Acl::UWRITE | Acl::SREAD | Acl::SWRITE,
        ),
        // Device space is opened to user mode here; the gate narrows it per slot.
        AclEntry::new(
            PERIPHERALS.base,
            PERIPHERALS.slot_size * PERIPHERALS.slot_count,
            Acl::UREAD | Acl::UWRITE | Acl::SREAD | Acl::SWRITE,
        ),
    ]
}

/// A flash image plus the addresses tests poke at.
pub struct Firmware {
    pub image: ImageBuilder,
    pub thunk: u32,
    pub stub: u32,
    pub fn_a: u32,
    pub fn_b: u32,
    pub handler_a: u32,
    pub handler_b: u32,
    /// Two-argument gateways into box 1 and box 2.
    pub gw_to_a: u32,
    pub gw_to_b: u32,
    pub gw_to_kernel: u32,
    pub gw_bad_magic: u32,
    /// `svc` sites for the custom table, indexed by call number.
    pub custom: Vec<u32>,
    pub arena: Window,
}

impl Firmware {
    pub fn info(&self) -> BootInfo {
        let mut reserved = [0u32; IRQ_WORDS];
        reserved[(IRQ_RESERVED / 32) as usize] |= 1 << (IRQ_RESERVED % 32);
        BootInfo {
            flash: FLASH,
            public_flash: FLASH,
            cfgtbl_ptr: self.image.cfgtbl(),
            sram: SRAM,
            stack_arena: self.arena,
            peripherals: PERIPHERALS,
            rom_table: ROM_TABLE,
            gateway_thunk: self.thunk,
            box_context_slot: CONTEXT_SLOT,
            mpu_reserved_slots: 0,
            region_floor_bits: 5,
            irq_lines: IRQ_LINES as u32,
            reserved_irqs: reserved,
        }
    }

    pub fn custom(&self, call: CustomCall) -> u32 {
        self.custom[call.imm() as usize]
    }
}

/// Code and gateways shared by every layout; boxes are added by the caller.
pub fn skeleton(boxes: usize) -> Firmware {
    let mut image = ImageBuilder::new(IMAGE_BASE);
    image.reserve_cfgtbl(boxes);
    let thunk = image.put_thunk();
    let stub = image.put_irq_stub();
    let fn_a = image.put_function();
    let fn_b = image.put_function();
    let handler_a = image.put_function();
    let handler_b = image.put_function();
    let gw_to_a = image.put_secure_gateway(2, fn_a | 1, 1);
    let gw_to_b = image.put_secure_gateway(2, fn_b | 1, 2);
    let gw_to_kernel = image.put_secure_gateway(0, fn_a | 1, 0);

    let mut bad = SecureGateway::new(1, fn_a | 1, image.cfg_ptr(1));
    bad.magic ^= 0x10;
    image.align(4);
    let gw_bad_magic = image.put_bytes(&bad.encode());

    let custom = (0..=CustomCall::HaltUserError.imm())
        .map(|imm| image.put_svc(imm))
        .collect();

    Firmware {
        image,
        thunk,
        stub,
        fn_a,
        fn_b,
        handler_a,
        handler_b,
        gw_to_a,
        gw_to_b,
        gw_to_kernel,
        gw_bad_magic,
        custom,
        arena: ARENA,
    }
}

/// Box 0 plus box A (1) and box B (2), each with a data region, a device
/// slot and an interrupt line.
pub fn standard() -> Firmware {
    let mut fw = skeleton(3);
    let (handler_a, handler_b) = (fw.handler_a, fw.handler_b);
    fw.image.put_box_with_acls(0, 0, 0, &box0_acls());
    fw.image.put_box_with_acls(
        1,
        736,
        32,
        &[
            AclEntry::new(A_DATA, 0x1000, Acl::DATA),
            AclEntry::new(A_DEVICE, 0x1000, Acl::PERIPH),
            AclEntry::irq(IRQ_A, handler_a),
        ],
    );
    fw.image.put_box_with_acls(
        2,
        1024,
        0,
        &[
            AclEntry::new(B_DATA, 0x1000, Acl::DATA),
            AclEntry::new(B_DEVICE, 0x1000, Acl::PERIPH),
            AclEntry::irq(IRQ_B, handler_b),
        ],
    );
    fw
}

/// Register gateways owned by box A, appended to a standard image.
pub struct RegisterGateways {
    pub write_or: u32,
    pub read_and: u32,
    pub rom_read: u32,
    pub owned_by_b: u32,
    pub outside: u32,
    pub bad_op: u32,
}

pub fn with_register_gateways(fw: &mut Firmware) -> RegisterGateways {
    let image = &mut fw.image;
    let write_or = image.put_register_gateway(1, FREE_DEVICE, RgwOp::WriteOr, 0x0F, 0xFF);
    let read_and = image.put_register_gateway(1, FREE_DEVICE + 4, RgwOp::ReadAnd, 0, 0xFF);
    let rom_read = image.put_register_gateway(1, ROM_TABLE.start, RgwOp::Read, 0, 0);
    let owned_by_b = image.put_register_gateway(2, FREE_DEVICE, RgwOp::Write, 1, 0);
    let outside = image.put_register_gateway(1, BOX0_RAM.start, RgwOp::Read, 0, 0);

    let mut raw = types::RegisterGateway::new(image.cfg_ptr(1), FREE_DEVICE, RgwOp::Read, 0, 0);
    raw.operation = 9;
    image.align(4);
    let bad_op = image.put_bytes(&raw.encode());

    RegisterGateways {
        write_or,
        read_and,
        rom_read,
        owned_by_b,
        outside,
        bad_op,
    }
}
