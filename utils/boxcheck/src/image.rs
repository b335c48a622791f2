/// Loading firmware images into the host model's flash.
///
/// ELF files are loaded by their `PT_LOAD` segments at the physical (load)
/// address, and the box configuration table is located through the linker
/// symbols that bracket it. Raw binaries are copied verbatim at a base
/// address taken from the layout.

use anyhow::{Context, Result, anyhow, bail};
use goblin::elf::Elf;
use goblin::elf::program_header::PT_LOAD;
use machine::Machine;
use types::boot::Window;

pub const CFGTBL_START: &str = "__uvisor_cfgtbl_ptr_start";
pub const CFGTBL_END: &str = "__uvisor_cfgtbl_ptr_end";

pub struct Segment {
    pub addr: u32,
    pub data: Vec<u8>,
}

pub struct FirmwareImage {
    pub segments: Vec<Segment>,
    /// Configuration-pointer table found in the symbol table, if any.
    pub cfgtbl: Option<Window>,
}

impl FirmwareImage {
    pub fn is_elf(bytes: &[u8]) -> bool {
        bytes.starts_with(b"\x7fELF")
    }

    pub fn from_raw(bytes: &[u8], base: u32) -> Self {
        Self {
            segments: vec![Segment {
                addr: base,
                data: bytes.to_vec(),
            }],
            cfgtbl: None,
        }
    }

    pub fn from_elf(bytes: &[u8]) -> Result<Self> {
        let elf = Elf::parse(bytes).context("Failed to parse ELF file")?;

        let mut segments = Vec::new();
        for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD && ph.p_filesz > 0) {
            let start = ph.p_offset as usize;
            let end = start
                .checked_add(ph.p_filesz as usize)
                .ok_or_else(|| anyhow!("segment size overflows"))?;
            let data = bytes
                .get(start..end)
                .ok_or_else(|| anyhow!("segment at 0x{:x} runs past the end of the file", ph.p_paddr))?;
            let addr = u32::try_from(ph.p_paddr).context("segment address does not fit 32 bits")?;
            segments.push(Segment {
                addr,
                data: data.to_vec(),
            });
        }
        if segments.is_empty() {
            bail!("ELF file has no loadable segments");
        }

        let symbol = |name: &str| {
            elf.syms
                .iter()
                .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
                .map(|sym| sym.st_value as u32)
        };
        let cfgtbl = match (symbol(CFGTBL_START), symbol(CFGTBL_END)) {
            (Some(start), Some(end)) => Some(Window::new(start, end)),
            _ => None,
        };

        Ok(Self { segments, cfgtbl })
    }

    /// Copy every segment into flash (or SRAM for initialised data).
    pub fn load_into(&self, hw: &Machine) -> Result<()> {
        for segment in &self.segments {
            let loaded = hw.flash.write_bytes(segment.addr, &segment.data)
                || hw.sram.write_bytes(segment.addr, &segment.data);
            if !loaded {
                bail!(
                    "segment 0x{:08x}+{} does not fit flash or SRAM",
                    segment.addr,
                    segment.data.len()
                );
            }
            log::debug!("loaded {} bytes at 0x{:08x}", segment.data.len(), segment.addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elf_magic() {
        assert!(FirmwareImage::is_elf(b"\x7fELF\x01\x01"));
        assert!(!FirmwareImage::is_elf(&[0x00, 0x20, 0x00, 0x20]));
    }

    #[test]
    fn test_raw_load() {
        let hw = Machine::new(Window::new(0, 0x1000), Window::new(0x2000_0000, 0x2000_1000));
        let image = FirmwareImage::from_raw(&[1, 2, 3, 4], 0x100);
        image.load_into(&hw).unwrap();
        assert_eq!(hw.flash.load_u32(0x100), Some(0x0403_0201));

        let too_big = FirmwareImage::from_raw(&[0; 16], 0xFF8);
        assert!(too_big.load_into(&hw).is_err());
    }

    #[test]
    fn test_garbage_is_not_elf() {
        assert!(FirmwareImage::from_elf(b"\x7fELF garbage").is_err());
    }
}
