use types::mpu::{RegionRegs, user_access};

/// ARMv7-M protection unit model.
///
/// Only the register file and the unprivileged access decision are
/// modelled; privileged code always uses the default map.
pub struct SoftMpu {
    slots: Vec<RegionRegs>,
    enabled: bool,
    /// Every slot write in order, for tests that count hardware traffic.
    pub write_log: Vec<(usize, RegionRegs)>,
}

impl SoftMpu {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: (0..slot_count).map(RegionRegs::disabled).collect(),
            enabled: false,
            write_log: Vec::new(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[RegionRegs] {
        &self.slots
    }

    pub fn read(&self, slot: usize) -> RegionRegs {
        self.slots.get(slot).copied().unwrap_or_default()
    }

    pub fn write(&mut self, slot: usize, regs: RegionRegs) {
        if let Some(entry) = self.slots.get_mut(slot) {
            // The core forces the slot field to the selected slot.
            *entry = RegionRegs::new(regs.base(), slot, regs.rasr);
            self.write_log.push((slot, *entry));
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Unprivileged access check; everything passes while disabled.
    pub fn permits_user(&self, addr: u32, write: bool) -> bool {
        !self.enabled || user_access(self.slots.iter().copied(), addr, write)
    }
}
