use types::boot::PeripheralWindow;

/// Peripheral access gate model: one nibble per device slot, slot k of a
/// group of eight in nibble 7-k. Bit 2 of a nibble keeps the slot
/// supervisor-only.
pub struct SoftAips {
    window: PeripheralWindow,
    pacr: Vec<u32>,
    pub write_log: Vec<(usize, u32)>,
}

impl SoftAips {
    pub fn new(window: PeripheralWindow, pacr_count: usize) -> Self {
        Self {
            window,
            pacr: vec![0x4444_4444; pacr_count],
            write_log: Vec::new(),
        }
    }

    pub fn pacr_count(&self) -> usize {
        self.pacr.len()
    }

    pub fn read(&self, index: usize) -> u32 {
        self.pacr.get(index).copied().unwrap_or(0)
    }

    pub fn write(&mut self, index: usize, value: u32) {
        if let Some(word) = self.pacr.get_mut(index) {
            *word = value;
            self.write_log.push((index, value));
        }
    }

    /// Whether unprivileged code may touch device slot `slot`.
    pub fn slot_open(&self, slot: usize) -> bool {
        let word = self.read(slot / 8);
        let nibble = (word >> (4 * (7 - slot % 8))) & 0xF;
        nibble & 0x4 == 0
    }

    /// Addresses outside the gated window are not this gate's business.
    pub fn permits_user(&self, addr: u32) -> bool {
        match self.window.slot_of(addr) {
            Some(slot) => slot / 8 < self.pacr.len() && self.slot_open(slot),
            None => true,
        }
    }
}
