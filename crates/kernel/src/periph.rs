//! Peripheral ownership bitmaps and the access-control word switch.
//!
//! Device space is split into equally sized slots; each box owns a bitmap
//! with one bit per slot. The gate hardware holds one nibble per slot in
//! 32-bit words of eight slots, so a 32-bit bitmap word maps onto four
//! consecutive access-control words.

use log::trace;
use types::PeripheralGate;

use crate::config::Config;

/// Nibble value that keeps a slot supervisor-only.
pub const PACR_SUPERVISOR: u32 = 0x4;
/// Every slot of a word supervisor-only.
pub const PACR_ALL_SUPERVISOR: u32 = 0x4444_4444;
pub const SLOTS_PER_PACR: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeripheralMap {
    words: [u32; Config::PERIPH_WORDS],
}

impl PeripheralMap {
    pub const fn new() -> Self {
        Self {
            words: [0; Config::PERIPH_WORDS],
        }
    }

    pub fn set(&mut self, slot: usize) {
        if slot < Config::PERIPH_MAX_SLOTS {
            self.words[slot / 32] |= 1 << (slot % 32);
        }
    }

    pub fn test(&self, slot: usize) -> bool {
        slot < Config::PERIPH_MAX_SLOTS && self.words[slot / 32] & (1 << (slot % 32)) != 0
    }

    pub fn union(&self, other: &PeripheralMap) -> PeripheralMap {
        let mut out = *self;
        for (word, extra) in out.words.iter_mut().zip(other.words.iter()) {
            *word |= *extra;
        }
        out
    }

    pub fn word(&self, index: usize) -> u32 {
        self.words[index]
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Indices of all set slots.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Config::PERIPH_MAX_SLOTS).filter(move |slot| self.test(*slot))
    }
}

/// Access-control word for a group of eight slots; bit k of `owned` is slot k.
pub fn pacr_for(owned: u8) -> u32 {
    let mut pacr = 0u32;
    for k in 0..SLOTS_PER_PACR {
        pacr <<= 4;
        if owned & (1 << k) == 0 {
            pacr |= PACR_SUPERVISOR;
        }
    }
    pacr
}

/// Number of bitmap words a gate with `slot_count` slots uses.
pub fn words_for(slot_count: u32) -> usize {
    ((slot_count as usize).div_ceil(32)).min(Config::PERIPH_WORDS)
}

/// Bring the gate from `live` to `dst`, rewriting only the access-control
/// words whose ownership changed. With `full` every word is rewritten.
///
/// Returns the number of access-control words written.
pub fn switch_peripherals<P: PeripheralGate + ?Sized>(
    gate: &mut P,
    live: &mut PeripheralMap,
    dst: &PeripheralMap,
    words: usize,
    full: bool,
) -> usize {
    let mut written = 0;
    for i in 0..words {
        let changed = if full {
            u32::MAX
        } else {
            live.words[i] ^ dst.words[i]
        };
        if changed == 0 {
            continue;
        }
        for j in 0..4 {
            if (changed >> (8 * j)) & 0xFF == 0 {
                continue;
            }
            let index = i * 4 + j;
            if index >= gate.pacr_count() {
                break;
            }
            let pacr = pacr_for((dst.words[i] >> (8 * j)) as u8);
            trace!("pacr[{}] = 0x{:08x}", index, pacr);
            gate.write_pacr(index, pacr);
            written += 1;
        }
        live.words[i] = dst.words[i];
    }
    written
}
