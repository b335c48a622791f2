//! Register gateway: one privileged register operation, no box switch.

use log::trace;
use types::gateway::{REGISTER_GATEWAY_MAGIC, RgwOp};
use types::{Bus, Hardware, RegisterGateway};

use crate::fault::Fault;
use crate::supervisor::Supervisor;

impl Supervisor {
    pub fn read_register_gateway<B: Bus + ?Sized>(&self, bus: &B, svc_pc: u32) -> Result<RegisterGateway, Fault> {
        if !self
            .info
            .public_flash
            .contains_range(svc_pc, RegisterGateway::SIZE)
        {
            return Err(Fault::RegisterGatewayOutsideFlash { addr: svc_pc });
        }
        let gateway = RegisterGateway::read(bus, svc_pc).ok_or(Fault::BusError { addr: svc_pc })?;
        if gateway.magic != REGISTER_GATEWAY_MAGIC {
            return Err(Fault::RegisterGatewayMagic {
                addr: svc_pc,
                found: gateway.magic,
            });
        }
        let owner = self
            .registry
            .box_for_cfg_ptr(gateway.box_ptr)
            .ok_or(Fault::RegisterGatewayBoxPointer { ptr: gateway.box_ptr })?;
        if owner != self.active {
            return Err(Fault::RegisterGatewayBox {
                owner,
                active: self.active,
            });
        }
        let target = gateway.address;
        if !self.info.peripherals.window().contains(target) && !self.info.rom_table.contains(target) {
            return Err(Fault::RegisterGatewayAddress { address: target });
        }
        Ok(gateway)
    }

    /// Perform the operation described at `svc_pc` and hand the result to
    /// the caller's r0 (0 for writes).
    pub fn register_gateway<H: Hardware + ?Sized>(&mut self, hw: &mut H, svc_sp: u32, svc_pc: u32) -> Result<(), Fault> {
        self.ensure_running()?;
        let gateway = self.read_register_gateway(hw, svc_pc)?;
        let op = RgwOp::from_u16(gateway.operation).ok_or(Fault::RegisterGatewayOp {
            op: gateway.operation,
        })?;
        let result = execute(hw, &gateway, op)?;
        trace!(
            "box[{}] register gateway {:?} 0x{:08x} -> 0x{:08x}",
            self.active, op, gateway.address, result
        );
        if !hw.write_u32(svc_sp, result) {
            return Err(Fault::FrameWrite { sp: svc_sp });
        }
        Ok(())
    }
}

fn execute<B: Bus + ?Sized>(bus: &mut B, gateway: &RegisterGateway, op: RgwOp) -> Result<u32, Fault> {
    let addr = gateway.address;
    let value = gateway.value;
    let mask = gateway.mask;
    let current = || bus_read(&*bus, addr);

    let next = match op {
        RgwOp::Read => return current(),
        RgwOp::ReadAnd => return Ok(current()? & mask),
        RgwOp::Write => value,
        RgwOp::WriteAnd => current()? & (value | !mask),
        RgwOp::WriteOr => current()? | (value & mask),
        RgwOp::WriteXor => current()? ^ (value & mask),
        RgwOp::WriteReplace => (current()? & !mask) | (value & mask),
    };
    if bus.write_u32(addr, next) {
        Ok(0)
    } else {
        Err(Fault::BusError { addr })
    }
}

fn bus_read<B: Bus + ?Sized>(bus: &B, addr: u32) -> Result<u32, Fault> {
    bus.read_u32(addr).ok_or(Fault::BusError { addr })
}
