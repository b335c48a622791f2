//! Flash image builder for host tests and tooling.
//!
//! Lays out box records, ACL arrays, gateway descriptors and stubs the way
//! a linker would place them, then copies the result into simulated flash.

use types::boot::Window;
use types::gateway::{BX_LR, SVC_OPCODE};
use types::{AclEntry, BoxConfig, RegisterGateway, RgwOp, SecureGateway, Svc};

use crate::memory::Memory;

pub struct ImageBuilder {
    base: u32,
    bytes: Vec<u8>,
    cfgtbl: Window,
}

impl ImageBuilder {
    pub fn new(base: u32) -> Self {
        Self {
            base,
            bytes: Vec::new(),
            cfgtbl: Window::empty(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Address the next item lands at.
    pub fn cursor(&self) -> u32 {
        self.base + self.bytes.len() as u32
    }

    pub fn align(&mut self, align: u32) {
        while self.cursor() % align != 0 {
            self.bytes.push(0);
        }
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> u32 {
        let addr = self.cursor();
        self.bytes.extend_from_slice(data);
        addr
    }

    pub fn put_u32(&mut self, value: u32) -> u32 {
        self.align(4);
        self.put_bytes(&value.to_le_bytes())
    }

    fn patch_u32(&mut self, addr: u32, value: u32) {
        let off = (addr - self.base) as usize;
        self.bytes[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Zeroed configuration-pointer table for `boxes` boxes.
    pub fn reserve_cfgtbl(&mut self, boxes: usize) -> Window {
        self.align(4);
        let start = self.cursor();
        for _ in 0..boxes {
            self.put_u32(0);
        }
        self.cfgtbl = Window::new(start, self.cursor());
        self.cfgtbl
    }

    pub fn cfgtbl(&self) -> Window {
        self.cfgtbl
    }

    /// Address of box `id`'s slot in the configuration-pointer table.
    pub fn cfg_ptr(&self, id: u8) -> u32 {
        self.cfgtbl.start + 4 * id as u32
    }

    pub fn put_acls(&mut self, acls: &[AclEntry]) -> u32 {
        self.align(4);
        let addr = self.cursor();
        for acl in acls {
            self.put_bytes(&acl.encode());
        }
        addr
    }

    /// Write a box record and point box `id`'s table slot at it.
    pub fn put_box(&mut self, id: u8, config: BoxConfig) -> u32 {
        self.align(4);
        let addr = self.put_bytes(&config.encode());
        let slot = self.cfg_ptr(id);
        self.patch_u32(slot, addr);
        addr
    }

    /// Box record plus its ACL array in one go.
    pub fn put_box_with_acls(&mut self, id: u8, stack_size: u32, context_size: u32, acls: &[AclEntry]) -> u32 {
        let list = if acls.is_empty() { 0 } else { self.put_acls(acls) };
        self.put_box(id, BoxConfig::new(stack_size, context_size, list, acls.len() as u32))
    }

    pub fn put_secure_gateway(&mut self, nargs: u8, dst_fn: u32, dst_box: u8) -> u32 {
        self.align(4);
        let gateway = SecureGateway::new(nargs, dst_fn, self.cfg_ptr(dst_box));
        self.put_bytes(&gateway.encode())
    }

    pub fn put_register_gateway(&mut self, owner: u8, address: u32, op: RgwOp, value: u32, mask: u32) -> u32 {
        self.align(4);
        let gateway = RegisterGateway::new(self.cfg_ptr(owner), address, op, value, mask);
        self.put_bytes(&gateway.encode())
    }

    /// Function body standing in for box code: `bx lr`.
    pub fn put_function(&mut self) -> u32 {
        self.align(4);
        let addr = self.put_bytes(&BX_LR.to_le_bytes());
        self.put_bytes(&[0, 0]);
        addr
    }

    /// Gateway return thunk: `svc GatewayReturn; b .`
    pub fn put_thunk(&mut self) -> u32 {
        self.align(4);
        let addr = self.put_bytes(&Svc::GatewayReturn.opcode().to_le_bytes());
        self.put_bytes(&0xE7FEu16.to_le_bytes());
        addr
    }

    /// Interrupt multiplexer stub: `svc Unvic; svc Unvic; bx lr`
    pub fn put_irq_stub(&mut self) -> u32 {
        self.align(4);
        let svc = Svc::Unvic.opcode().to_le_bytes();
        let addr = self.put_bytes(&svc);
        self.put_bytes(&svc);
        self.put_bytes(&BX_LR.to_le_bytes());
        self.put_bytes(&[0, 0]);
        addr
    }

    /// `svc` with a raw immediate, for custom calls.
    pub fn put_svc(&mut self, imm: u8) -> u32 {
        self.align(4);
        let addr = self.put_bytes(&(SVC_OPCODE | imm as u16).to_le_bytes());
        self.put_bytes(&BX_LR.to_le_bytes());
        addr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn load_into(&self, flash: &Memory) -> bool {
        flash.write_bytes(self.base, &self.bytes)
    }
}
