#![no_std]

pub mod acl;
pub use acl::{Acl, AclEntry};

pub mod boxes;
pub use boxes::BoxConfig;

pub mod gateway;
pub use gateway::{RegisterGateway, RgwOp, SecureGateway, Svc};

pub mod frame;
pub use frame::ExceptionFrame;

pub mod mpu;
pub use mpu::{AccessPermission, RegionHardware, RegionRegs};

pub mod hal;
pub use hal::{Bus, Cpu, Hardware, InterruptController, PeripheralGate};

pub mod boot;
pub use boot::{BootInfo, PeripheralWindow, Window};

/// Little-endian word at `offset`; callers size their buffers so this never
/// runs past the end.
pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}
