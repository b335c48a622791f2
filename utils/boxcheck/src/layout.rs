use anyhow::{Context, Result};
use machine::Machine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use types::boot::{BootInfo, Window};

fn default_mpu_slots() -> usize {
    8
}

/// Board description read from JSON: the kernel's link-time facts plus
/// what the host model needs to stand in for the chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub boot: BootInfo,
    #[serde(default = "default_mpu_slots")]
    pub mpu_slots: usize,
    /// Access-control words of the peripheral gate; derived from the
    /// peripheral window when absent.
    #[serde(default)]
    pub pacr_count: Option<usize>,
    /// Box 0's process stack pointer at boot; defaults to the top of the
    /// RAM above the stack arena.
    #[serde(default)]
    pub box0_psp: Option<u32>,
    /// Load address of raw binaries; defaults to the start of flash.
    #[serde(default)]
    pub image_base: Option<u32>,
}

impl Layout {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read layout file: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse layout file: {:?}", path))
    }

    pub fn image_base(&self) -> u32 {
        self.image_base.unwrap_or(self.boot.flash.start)
    }

    /// Override the configuration table with one found in the image.
    pub fn with_cfgtbl(mut self, cfgtbl: Option<Window>) -> Self {
        if let Some(cfgtbl) = cfgtbl {
            self.boot.cfgtbl_ptr = cfgtbl;
        }
        self
    }

    pub fn machine(&self) -> Machine {
        let boot = &self.boot;
        let mut hw = Machine::new(boot.flash, boot.sram)
            .with_mpu_slots(self.mpu_slots)
            .with_irq_lines(boot.irq_lines as usize);
        if boot.peripherals.slot_count > 0 {
            let pacr_count = self
                .pacr_count
                .unwrap_or_else(|| (boot.peripherals.slot_count as usize).div_ceil(8));
            hw = hw.with_peripherals(boot.peripherals, pacr_count);
        }
        if !boot.rom_table.is_empty() {
            hw = hw.with_mmio(boot.rom_table);
        }
        hw.core.psp = self.box0_psp.unwrap_or(boot.sram.end - 0x100);
        hw
    }
}
