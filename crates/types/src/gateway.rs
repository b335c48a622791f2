//! Call-site descriptors and the SVC immediate encoding.
//!
//! Both gateway kinds start with an `svc` instruction followed by a short
//! branch over the embedded data, so execution resumes past the descriptor
//! once the kernel returns from the SVC.

use crate::hal::Bus;
use crate::{le_u16, le_u32};

/// Thumb `svc #imm` opcode base.
pub const SVC_OPCODE: u16 = 0xDF00;
/// Thumb `bx lr`.
pub const BX_LR: u16 = 0x4770;

pub const SVC_FIXED_TABLE: u8 = 0x80;
pub const SVC_NARGS_MASK: u8 = 0x07;

pub const SVC_ID_UNVIC: u8 = 1;
pub const SVC_ID_SECURE_GATEWAY: u8 = 2;
pub const SVC_ID_GATEWAY_RETURN: u8 = 3;
pub const SVC_ID_REGISTER_GATEWAY: u8 = 4;

pub const fn svc_fixed(id: u8, nargs: u8) -> u8 {
    SVC_FIXED_TABLE | (id << 3) | (nargs & SVC_NARGS_MASK)
}

pub const fn svc_opcode(imm: u8) -> u16 {
    SVC_OPCODE | imm as u16
}

/// Entries of the custom SVC table (immediates below `SVC_FIXED_TABLE`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CustomCall {
    IsrSet = 0,
    IsrGet = 1,
    IrqEnable = 2,
    IrqDisable = 3,
    IrqPendClr = 4,
    IrqPendSet = 5,
    IrqPendGet = 6,
    IrqPrioSet = 7,
    IrqPrioGet = 8,
    BoxId = 9,
    HaltUserError = 10,
}

impl CustomCall {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CustomCall::IsrSet),
            1 => Some(CustomCall::IsrGet),
            2 => Some(CustomCall::IrqEnable),
            3 => Some(CustomCall::IrqDisable),
            4 => Some(CustomCall::IrqPendClr),
            5 => Some(CustomCall::IrqPendSet),
            6 => Some(CustomCall::IrqPendGet),
            7 => Some(CustomCall::IrqPrioSet),
            8 => Some(CustomCall::IrqPrioGet),
            9 => Some(CustomCall::BoxId),
            10 => Some(CustomCall::HaltUserError),
            _ => None,
        }
    }

    pub const fn imm(self) -> u8 {
        self as u8
    }
}

/// Decoded SVC immediate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Svc {
    /// Interrupt multiplexer entry (from handler mode) or exit (from thread mode).
    Unvic,
    SecureGateway { nargs: u8 },
    GatewayReturn,
    RegisterGateway,
    Custom(CustomCall),
}

impl Svc {
    pub fn decode(imm: u8) -> Option<Self> {
        if imm & SVC_FIXED_TABLE == 0 {
            return CustomCall::from_u8(imm).map(Svc::Custom);
        }
        let nargs = imm & SVC_NARGS_MASK;
        match (imm & !SVC_FIXED_TABLE) >> 3 {
            SVC_ID_UNVIC if nargs == 0 => Some(Svc::Unvic),
            SVC_ID_SECURE_GATEWAY => Some(Svc::SecureGateway { nargs }),
            SVC_ID_GATEWAY_RETURN if nargs == 0 => Some(Svc::GatewayReturn),
            SVC_ID_REGISTER_GATEWAY if nargs == 0 => Some(Svc::RegisterGateway),
            _ => None,
        }
    }

    pub fn imm(self) -> u8 {
        match self {
            Svc::Unvic => svc_fixed(SVC_ID_UNVIC, 0),
            Svc::SecureGateway { nargs } => svc_fixed(SVC_ID_SECURE_GATEWAY, nargs),
            Svc::GatewayReturn => svc_fixed(SVC_ID_GATEWAY_RETURN, 0),
            Svc::RegisterGateway => svc_fixed(SVC_ID_REGISTER_GATEWAY, 0),
            Svc::Custom(call) => call.imm(),
        }
    }

    pub fn opcode(self) -> u16 {
        svc_opcode(self.imm())
    }
}

pub const SECURE_GATEWAY_MAGIC: u32 = 0xF7F1_A8C3;
/// `b.n` from offset 2 to the end of the 16-byte descriptor.
pub const SECURE_GATEWAY_BRANCH: u16 = 0xE005;

/// Descriptor embedded at a cross-box call site.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecureGateway {
    pub opcode: u16,
    pub branch: u16,
    pub magic: u32,
    pub dst_fn: u32,
    /// Address of the destination box's slot in the configuration-pointer table.
    pub cfg_ptr: u32,
}

impl SecureGateway {
    pub const SIZE: u32 = 16;

    pub fn new(nargs: u8, dst_fn: u32, cfg_ptr: u32) -> Self {
        Self {
            opcode: Svc::SecureGateway { nargs }.opcode(),
            branch: SECURE_GATEWAY_BRANCH,
            magic: SECURE_GATEWAY_MAGIC,
            dst_fn,
            cfg_ptr,
        }
    }

    pub fn encode(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.opcode.to_le_bytes());
        out[2..4].copy_from_slice(&self.branch.to_le_bytes());
        out[4..8].copy_from_slice(&self.magic.to_le_bytes());
        out[8..12].copy_from_slice(&self.dst_fn.to_le_bytes());
        out[12..16].copy_from_slice(&self.cfg_ptr.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE as usize {
            return None;
        }
        Some(Self {
            opcode: le_u16(bytes, 0),
            branch: le_u16(bytes, 2),
            magic: le_u32(bytes, 4),
            dst_fn: le_u32(bytes, 8),
            cfg_ptr: le_u32(bytes, 12),
        })
    }

    pub fn read<B: Bus + ?Sized>(bus: &B, addr: u32) -> Option<Self> {
        Some(Self {
            opcode: bus.read_u16(addr)?,
            branch: bus.read_u16(addr.checked_add(2)?)?,
            magic: bus.read_u32(addr.checked_add(4)?)?,
            dst_fn: bus.read_u32(addr.checked_add(8)?)?,
            cfg_ptr: bus.read_u32(addr.checked_add(12)?)?,
        })
    }
}

pub const REGISTER_GATEWAY_MAGIC: u32 = 0xF7F3_A89E;
/// `b.n` from offset 2 to the trailing `bx lr` at offset 26.
pub const REGISTER_GATEWAY_BRANCH: u16 = 0xE00A;

/// Single-register read/modify/write operations a register gateway may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgwOp {
    /// `result = *address`
    Read = 0,
    /// `result = *address & mask`
    ReadAnd = 1,
    /// `*address = value`
    Write = 2,
    /// `*address &= value | !mask`
    WriteAnd = 3,
    /// `*address |= value & mask`
    WriteOr = 4,
    /// `*address ^= value & mask`
    WriteXor = 5,
    /// `*address = (*address & !mask) | (value & mask)`
    WriteReplace = 6,
}

impl RgwOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(RgwOp::Read),
            1 => Some(RgwOp::ReadAnd),
            2 => Some(RgwOp::Write),
            3 => Some(RgwOp::WriteAnd),
            4 => Some(RgwOp::WriteOr),
            5 => Some(RgwOp::WriteXor),
            6 => Some(RgwOp::WriteReplace),
            _ => None,
        }
    }
}

/// Data-only gateway granting one operation on one register.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterGateway {
    pub opcode: u16,
    pub branch: u16,
    pub magic: u32,
    pub box_ptr: u32,
    pub address: u32,
    pub value: u32,
    pub mask: u32,
    pub operation: u16,
    pub bxlr: u16,
}

impl RegisterGateway {
    pub const SIZE: u32 = 28;

    pub fn new(box_ptr: u32, address: u32, op: RgwOp, value: u32, mask: u32) -> Self {
        Self {
            opcode: Svc::RegisterGateway.opcode(),
            branch: REGISTER_GATEWAY_BRANCH,
            magic: REGISTER_GATEWAY_MAGIC,
            box_ptr,
            address,
            value,
            mask,
            operation: op as u16,
            bxlr: BX_LR,
        }
    }

    pub fn encode(&self) -> [u8; 28] {
        let mut out = [0u8; 28];
        out[0..2].copy_from_slice(&self.opcode.to_le_bytes());
        out[2..4].copy_from_slice(&self.branch.to_le_bytes());
        out[4..8].copy_from_slice(&self.magic.to_le_bytes());
        out[8..12].copy_from_slice(&self.box_ptr.to_le_bytes());
        out[12..16].copy_from_slice(&self.address.to_le_bytes());
        out[16..20].copy_from_slice(&self.value.to_le_bytes());
        out[20..24].copy_from_slice(&self.mask.to_le_bytes());
        out[24..26].copy_from_slice(&self.operation.to_le_bytes());
        out[26..28].copy_from_slice(&self.bxlr.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE as usize {
            return None;
        }
        Some(Self {
            opcode: le_u16(bytes, 0),
            branch: le_u16(bytes, 2),
            magic: le_u32(bytes, 4),
            box_ptr: le_u32(bytes, 8),
            address: le_u32(bytes, 12),
            value: le_u32(bytes, 16),
            mask: le_u32(bytes, 20),
            operation: le_u16(bytes, 24),
            bxlr: le_u16(bytes, 26),
        })
    }

    pub fn read<B: Bus + ?Sized>(bus: &B, addr: u32) -> Option<Self> {
        Some(Self {
            opcode: bus.read_u16(addr)?,
            branch: bus.read_u16(addr.checked_add(2)?)?,
            magic: bus.read_u32(addr.checked_add(4)?)?,
            box_ptr: bus.read_u32(addr.checked_add(8)?)?,
            address: bus.read_u32(addr.checked_add(12)?)?,
            value: bus.read_u32(addr.checked_add(16)?)?,
            mask: bus.read_u32(addr.checked_add(20)?)?,
            operation: bus.read_u16(addr.checked_add(24)?)?,
            bxlr: bus.read_u16(addr.checked_add(26)?)?,
        })
    }
}
