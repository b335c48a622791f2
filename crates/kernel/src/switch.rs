//! Protection switch engine.
//!
//! Keeps a shadow of every hardware slot it manages and, on each switch,
//! writes only the slots whose contents differ from the new plan. Box 0's
//! regions are always loaded first, then the destination box's own.

use log::{debug, trace};
use types::boot::BootInfo;
use types::mpu::RegionRegs;
use types::{Cpu, PeripheralGate, RegionHardware};

use crate::config::Config;
use crate::fault::Fault;
use crate::periph::{PeripheralMap, switch_peripherals, words_for};
use crate::registry::Registry;

pub struct SwitchEngine {
    live: [RegionRegs; Config::MPU_MAX_SLOTS],
    first_slot: usize,
    slot_limit: usize,
    live_periph: PeripheralMap,
    periph_words: usize,
    loaded: Option<u8>,
    next_victim: usize,
    writes: usize,
}

impl SwitchEngine {
    pub fn new<H: RegionHardware + ?Sized>(hw: &H, boot: &BootInfo) -> Result<Self, Fault> {
        let slot_limit = hw.slot_count().min(Config::MPU_MAX_SLOTS);
        let first_slot = boot.mpu_reserved_slots as usize;
        if first_slot >= slot_limit {
            return Err(Fault::Platform("no protection slots left for boxes"));
        }
        let mut live = [RegionRegs::default(); Config::MPU_MAX_SLOTS];
        for (slot, regs) in live.iter_mut().enumerate().take(slot_limit) {
            *regs = hw.read_slot(slot);
        }
        Ok(Self {
            live,
            first_slot,
            slot_limit,
            live_periph: PeripheralMap::new(),
            periph_words: words_for(boot.peripherals.slot_count),
            loaded: None,
            next_victim: 0,
            writes: 0,
        })
    }

    /// Box whose protection state is currently programmed.
    pub fn loaded(&self) -> Option<u8> {
        self.loaded
    }

    /// Shadow of the managed slots.
    pub fn live(&self) -> &[RegionRegs] {
        &self.live[self.first_slot..self.slot_limit]
    }

    pub fn live_peripherals(&self) -> &PeripheralMap {
        &self.live_periph
    }

    /// Hardware writes issued so far (slots plus access-control words).
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn plan(&self, registry: &Registry, dst: u8) -> [RegionRegs; Config::MPU_MAX_SLOTS] {
        let mut plan = self.live;
        let own = if dst != 0 { registry.regions_of(dst) } else { &[] };
        let mut slot = self.first_slot;
        for region in registry.regions_of(0).iter().chain(own.iter()) {
            if slot >= self.slot_limit {
                // The rest are demand-loaded on fault.
                break;
            }
            plan[slot] = region.regs(slot);
            slot += 1;
        }
        for (idx, regs) in plan.iter_mut().enumerate().take(self.slot_limit).skip(slot) {
            *regs = RegionRegs::disabled(idx);
        }
        plan
    }

    /// Move the protection state from `src` to `dst`.
    ///
    /// `src` must be the box currently loaded. Switching a box onto itself
    /// does nothing once a state has been loaded.
    pub fn switch_to<H>(&mut self, hw: &mut H, registry: &Registry, src: u8, dst: u8) -> Result<(), Fault>
    where
        H: RegionHardware + PeripheralGate + Cpu + ?Sized,
    {
        if dst as usize >= registry.box_count() {
            return Err(Fault::BoxOutOfRange { id: dst });
        }
        match self.loaded {
            Some(loaded) if loaded != src => {
                return Err(Fault::SwitchSource {
                    expected: loaded,
                    found: src,
                });
            }
            Some(_) if src == dst => return Ok(()),
            _ => {}
        }

        let plan = self.plan(registry, dst);
        let periph = registry.peripherals_for(dst);
        let full = self.loaded.is_none();

        let masked = hw.mask_interrupts();
        let mut written = 0;
        for slot in self.first_slot..self.slot_limit {
            if self.live[slot] != plan[slot] {
                hw.write_slot(slot, plan[slot]);
                self.live[slot] = plan[slot];
                written += 1;
            }
        }
        written += switch_peripherals(hw, &mut self.live_periph, &periph, self.periph_words, full);
        hw.restore_interrupts(masked);

        self.writes += written;
        self.loaded = Some(dst);
        trace!("switch {} -> {}: {} writes", src, dst, written);
        Ok(())
    }

    /// Load a region of `active` (or box 0) that covers `addr` but did not
    /// fit into the hardware slots. Returns the slot used.
    pub fn recover<H>(&mut self, hw: &mut H, registry: &mut Registry, active: u8, addr: u32) -> Result<usize, Fault>
    where
        H: RegionHardware + Cpu + ?Sized,
    {
        let live = &self.live[self.first_slot..self.slot_limit];
        let candidates = registry
            .get(active)
            .map(|b| b.regions())
            .into_iter()
            .chain(registry.get(0).map(|b| b.regions()))
            .flatten();
        let mut found = None;
        for idx in candidates {
            let region = &registry.pool()[idx];
            if !region.contains(addr) {
                continue;
            }
            let wanted = region.regs(0);
            if !live.iter().any(|l| l.enabled() && l.same_region(&wanted)) {
                found = Some(idx);
                break;
            }
        }
        let idx = found.ok_or(Fault::AccessViolation { id: active, addr })?;

        let dynamic = self.slot_limit - self.first_slot;
        let slot = self.first_slot + self.next_victim % dynamic;
        self.next_victim = (self.next_victim + 1) % dynamic;

        let region = match registry.region_mut(idx) {
            Some(region) => region,
            None => return Err(Fault::AccessViolation { id: active, addr }),
        };
        region.faults = region.faults.saturating_add(1);
        let regs = region.regs(slot);

        let masked = hw.mask_interrupts();
        hw.write_slot(slot, regs);
        hw.restore_interrupts(masked);
        self.live[slot] = regs;
        self.writes += 1;
        debug!(
            "box[{}] fault at 0x{:08x}: region 0x{:08x} loaded into slot {}",
            active, addr, regs.base(), slot
        );
        Ok(slot)
    }
}
