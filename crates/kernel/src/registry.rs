//! Box registry: turns the configuration records in flash into boxes,
//! stack windows and protection regions.
//!
//! Boxes are processed in table order, so every box's regions form one
//! contiguous slice of the pool. The switch engine relies on that: a slice
//! is never reordered or interleaved once allocated.

use core::ops::Range;

use log::{debug, info, warn};
use types::boot::{BootInfo, Window};
use types::boxes::{BOX_MAGIC, BOX_VERSION};
use types::mpu::{MPU_RASR_SRD_POS, SUBREGION_MIN_BITS};
use types::{Acl, AclEntry, BoxConfig, Bus, Cpu};

use crate::config::Config;
use crate::fault::Fault;
use crate::global::FixedList;
use crate::periph::PeripheralMap;
use crate::region::{Region, RegionSource, compute_region, region_bits};
use crate::unvic::IrqTable;

/// A box as the kernel tracks it after boot.
#[derive(Clone, Copy, Debug)]
pub struct SecureBox {
    pub id: u8,
    /// Flash address of the configuration record.
    pub config_addr: u32,
    pub config: BoxConfig,
    /// Stack window including guard bands and context; empty for box 0.
    pub stack: Window,
    /// Saved stack pointer while the box is not running.
    pub sp: u32,
    pub context: Option<u32>,
    region_start: usize,
    region_count: usize,
    /// Peripheral slots this box owns.
    pub periph: PeripheralMap,
    /// Subset of `periph` declared shared.
    pub periph_shared: PeripheralMap,
}

impl SecureBox {
    pub fn regions(&self) -> Range<usize> {
        self.region_start..self.region_start + self.region_count
    }
}

#[derive(Debug)]
pub struct Registry {
    boxes: FixedList<SecureBox, { Config::MAX_BOXES }>,
    pool: FixedList<Region, { Config::REGION_POOL }>,
    cfgtbl: Window,
    floor_bits: u32,
}

impl Registry {
    /// Scan the configuration-pointer table and build every box.
    ///
    /// Box 0 keeps the stack pointer active at boot; every other box gets a
    /// window carved top-down from the stack arena, which must be used up
    /// exactly.
    pub fn load_boxes<H: Bus + Cpu + ?Sized>(
        hw: &H,
        boot: &BootInfo,
        irqs: &mut IrqTable,
    ) -> Result<Self, Fault> {
        let table = boot.cfgtbl_ptr;
        if table.is_empty() {
            return Err(Fault::NoBoxes);
        }
        if table.start % 4 != 0 || table.len() % 4 != 0 {
            return Err(Fault::ConfigTable {
                start: table.start,
                end: table.end,
            });
        }
        if !boot.flash.contains_range(table.start, table.len()) {
            return Err(Fault::OutsideFlash {
                addr: table.start,
                len: table.len(),
            });
        }
        let count = (table.len() / 4) as usize;
        if count > Config::MAX_BOXES {
            return Err(Fault::TooManyBoxes {
                count,
                max: Config::MAX_BOXES,
            });
        }

        let mut registry = Registry {
            boxes: FixedList::new(),
            pool: FixedList::new(),
            cfgtbl: table,
            floor_bits: boot.region_floor_bits,
        };
        let mut cursor = boot.stack_arena.end;

        for index in 0..count {
            let id = index as u8;
            let ptr = table.start + 4 * index as u32;
            let config_addr = hw.read_u32(ptr).ok_or(Fault::BusError { addr: ptr })?;
            if !boot.flash.contains_range(config_addr, BoxConfig::SIZE) {
                return Err(Fault::OutsideFlash {
                    addr: config_addr,
                    len: BoxConfig::SIZE,
                });
            }
            let config =
                BoxConfig::read(hw, config_addr).ok_or(Fault::BusError { addr: config_addr })?;
            if config.magic != BOX_MAGIC {
                return Err(Fault::BoxMagic {
                    id,
                    found: config.magic,
                });
            }
            if config.version != BOX_VERSION {
                return Err(Fault::BoxVersion {
                    id,
                    found: config.version,
                });
            }
            debug!(
                "box[{}] config 0x{:08x}: stack={} context={} acls={}",
                id, config_addr, config.stack_size, config.context_size, config.acl_count
            );

            let mut stack_guard = 0;
            let (stack, sp, context) = if id == 0 {
                if config.stack_size != 0 || config.context_size != 0 {
                    return Err(Fault::KernelBoxStack);
                }
                (Window::empty(), hw.psp(), None)
            } else {
                let layout = stack_window(boot, id, &config, cursor)?;
                let window = layout.window;
                stack_guard = layout.guard;
                cursor = window.start;
                let context = if config.context_size > 0 {
                    Some(window.start)
                } else {
                    None
                };
                debug!(
                    "box[{}] stack 0x{:08x}..0x{:08x}",
                    id, window.start, window.end
                );
                (window, window.end - Config::STACK_GUARD_BAND, context)
            };

            let region_start = registry.pool.len();
            registry
                .boxes
                .push(SecureBox {
                    id,
                    config_addr,
                    config,
                    stack,
                    sp,
                    context,
                    region_start,
                    region_count: 0,
                    periph: PeripheralMap::new(),
                    periph_shared: PeripheralMap::new(),
                })
                .map_err(|_| Fault::TooManyBoxes {
                    count,
                    max: Config::MAX_BOXES,
                })?;

            if id != 0 {
                let idx =
                    registry.add_region(id, stack.start, stack.len(), Acl::STACK_DEF, RegionSource::Stack)?;
                if let Some(region) = registry.region_mut(idx) {
                    region.rasr |= stack_guard;
                }
            }
            registry.load_acls(hw, boot, irqs, id, &config)?;
        }

        if cursor != boot.stack_arena.start {
            return Err(Fault::StackArenaMismatch {
                cursor,
                bottom: boot.stack_arena.start,
            });
        }

        info!(
            "registry: {} boxes, {} regions",
            registry.boxes.len(),
            registry.pool.len()
        );
        Ok(registry)
    }

    fn load_acls<H: Bus + ?Sized>(
        &mut self,
        hw: &H,
        boot: &BootInfo,
        irqs: &mut IrqTable,
        id: u8,
        config: &BoxConfig,
    ) -> Result<(), Fault> {
        if config.acl_count as usize > Config::MAX_ACLS_PER_BOX {
            return Err(Fault::TooManyAcls {
                id,
                count: config.acl_count,
                max: Config::MAX_ACLS_PER_BOX,
            });
        }
        if config.acl_count == 0 {
            return Ok(());
        }
        let len = config.acl_count * AclEntry::SIZE;
        if !boot.flash.contains_range(config.acl_list, len) {
            return Err(Fault::OutsideFlash {
                addr: config.acl_list,
                len,
            });
        }

        for i in 0..config.acl_count {
            let addr = config.acl_list + i * AclEntry::SIZE;
            let entry = AclEntry::read(hw, addr).ok_or(Fault::BusError { addr })?;
            let acl = entry.flags().ok_or(Fault::AclUnknownBits { id, acl: entry.acl })?;

            if acl.contains(Acl::IRQ) {
                irqs.claim(entry.param2, id, entry.param1)?;
            } else if entry.size() == 0 || acl.access().is_empty() {
                warn!(
                    "box[{}] acl[{}] 0x{:08x}+{} grants nothing, skipped",
                    id,
                    i,
                    entry.base(),
                    entry.size()
                );
            } else if acl.contains(Acl::PERIPHERAL) {
                self.add_peripheral(boot, id, entry.base(), entry.size(), acl)?;
            } else {
                self.add_region(id, entry.base(), entry.size(), acl, RegionSource::User)?;
            }
        }
        Ok(())
    }

    /// Translate one grant and append it to `id`'s slice of the pool.
    pub fn add_region(
        &mut self,
        id: u8,
        base: u32,
        size: u32,
        acl: Acl,
        source: RegionSource,
    ) -> Result<usize, Fault> {
        let next = match self.boxes.get(id as usize) {
            Some(owner) => owner.region_start + owner.region_count,
            None => return Err(Fault::BoxOutOfRange { id }),
        };
        if next != self.pool.len() {
            return Err(Fault::UnorderedRegion { id });
        }

        let mut region = compute_region(base, size, acl, self.floor_bits)?;
        region.owner = id;
        region.source = source;

        let conflict = self.pool.iter().find(|other| {
            other.owner != id
                && other.overlaps(&region)
                && !(other.acl.is_shared() && region.acl.is_shared())
        });
        if let Some(other) = conflict {
            return Err(Fault::RegionOverlap {
                id,
                other: other.owner,
                base: region.base,
                size: region.size,
            });
        }

        let idx = self
            .pool
            .push(region)
            .map_err(|_| Fault::RegionPoolExhausted)?;
        if let Some(owner) = self.boxes.get_mut(id as usize) {
            owner.region_count += 1;
        }
        Ok(idx)
    }

    fn add_peripheral(
        &mut self,
        boot: &BootInfo,
        id: u8,
        base: u32,
        size: u32,
        acl: Acl,
    ) -> Result<(), Fault> {
        let window = boot.peripherals;
        if window.slot_count == 0 || window.slot_size == 0 {
            return Err(Fault::PeripheralUnsupported);
        }
        if !acl.contains(Acl::UREAD | Acl::UWRITE) {
            return Err(Fault::PeripheralAccess {
                acl: acl.access().bits(),
            });
        }
        let range = Fault::PeripheralRange { addr: base, size };
        let first = window.slot_of(base).ok_or(range)?;
        if (base - window.base) % window.slot_size != 0 {
            return Err(range);
        }

        let mut slots = (size / window.slot_size) as usize;
        if size % window.slot_size != 0 {
            if acl.contains(Acl::SIZE_ROUND_UP) {
                slots += 1;
            } else if !acl.contains(Acl::SIZE_ROUND_DOWN) || slots == 0 {
                return Err(range);
            }
        }
        let last = first + slots;
        if last > window.slot_count as usize {
            return Err(range);
        }

        let shared = acl.is_shared();
        for slot in first..last {
            let conflict = self.boxes.iter().find(|other| {
                other.id != id
                    && other.periph.test(slot)
                    && !(shared && other.periph_shared.test(slot))
            });
            if let Some(other) = conflict {
                return Err(Fault::PeripheralOverlap {
                    id,
                    other: other.id,
                    slot,
                });
            }
        }

        let owner = self
            .boxes
            .get_mut(id as usize)
            .ok_or(Fault::BoxOutOfRange { id })?;
        for slot in first..last {
            owner.periph.set(slot);
            if shared {
                owner.periph_shared.set(slot);
            }
        }
        debug!(
            "box[{}] peripheral slots {}..{} (0x{:08x}+{})",
            id, first, last, base, size
        );
        Ok(())
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn boxes(&self) -> &[SecureBox] {
        self.boxes.as_slice()
    }

    pub fn get(&self, id: u8) -> Option<&SecureBox> {
        self.boxes.get(id as usize)
    }

    pub fn sp(&self, id: u8) -> u32 {
        self.get(id).map(|b| b.sp).unwrap_or(0)
    }

    pub fn set_sp(&mut self, id: u8, sp: u32) {
        if let Some(b) = self.boxes.get_mut(id as usize) {
            b.sp = sp;
        }
    }

    pub fn context(&self, id: u8) -> Option<u32> {
        self.get(id).and_then(|b| b.context)
    }

    pub fn pool(&self) -> &[Region] {
        self.pool.as_slice()
    }

    pub fn regions_of(&self, id: u8) -> &[Region] {
        match self.get(id) {
            Some(b) => &self.pool.as_slice()[b.regions()],
            None => &[],
        }
    }

    pub fn region_mut(&mut self, idx: usize) -> Option<&mut Region> {
        self.pool.get_mut(idx)
    }

    /// Slots granted while `id` is active: box 0's plus its own.
    pub fn peripherals_for(&self, id: u8) -> PeripheralMap {
        let base = self.get(0).map(|b| b.periph).unwrap_or_default();
        match self.get(id) {
            Some(b) if id != 0 => base.union(&b.periph),
            _ => base,
        }
    }

    /// Box whose slot in the configuration-pointer table is at `ptr`.
    pub fn box_for_cfg_ptr(&self, ptr: u32) -> Option<u8> {
        if !self.cfgtbl.contains(ptr) || (ptr - self.cfgtbl.start) % 4 != 0 {
            return None;
        }
        let id = (ptr - self.cfgtbl.start) / 4;
        if (id as usize) < self.boxes.len() {
            Some(id as u8)
        } else {
            None
        }
    }
}

/// A box's stack window and the subregion-disable bits that keep a
/// no-access block between its context and its stack.
struct StackLayout {
    window: Window,
    guard: u32,
}

/// Carve `id`'s stack window directly below `cursor`.
///
/// The window is split into eight subregions: the context takes the lowest
/// ones, the next is left inaccessible, the stack gets the rest.
fn stack_window(boot: &BootInfo, id: u8, config: &BoxConfig, cursor: u32) -> Result<StackLayout, Fault> {
    let min = Config::STACK_GUARD_BAND * 2 + Config::MIN_STACK_SIZE;
    if config.stack_size < min {
        return Err(Fault::StackTooSmall {
            id,
            size: config.stack_size,
            min,
        });
    }
    let exhausted = Fault::StackArenaExhausted { id };
    let context = config
        .context_size
        .checked_next_multiple_of(Config::CONTEXT_ALIGN)
        .ok_or(exhausted)?;
    let total = config.stack_size.checked_add(context).ok_or(exhausted)?;

    let mut bits = region_bits(total, boot.region_floor_bits.max(SUBREGION_MIN_BITS));
    let ctx_blocks = loop {
        if bits > 31 {
            return Err(Fault::RegionTooLarge { size: total });
        }
        let block = 1u32 << (bits - 3);
        let ctx_blocks = context.div_ceil(block);
        let stack_blocks = if ctx_blocks == 0 { 8 } else { 8u32.saturating_sub(ctx_blocks + 1) };
        if u64::from(stack_blocks) * u64::from(block) >= u64::from(config.stack_size) {
            break ctx_blocks;
        }
        bits += 1;
    };

    let size = 1u32 << bits;
    let base = cursor
        .checked_sub(size)
        .filter(|base| *base >= boot.stack_arena.start)
        .ok_or(exhausted)?;
    let guard = if ctx_blocks > 0 {
        1 << (MPU_RASR_SRD_POS + ctx_blocks)
    } else {
        0
    };
    Ok(StackLayout {
        window: Window::new(base, cursor),
        guard,
    })
}
