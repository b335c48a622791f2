use std::cell::{Ref, RefCell};
use std::rc::Rc;

/// A flat byte array mapped at `base`.
///
/// Cloning shares the backing store, so a test can keep a handle on SRAM
/// while the machine owns it.
#[derive(Clone)]
pub struct Memory {
    base: u32,
    mem: Rc<RefCell<Vec<u8>>>,
}

impl Memory {
    pub fn new_with_base(size: usize, base: u32) -> Self {
        Self {
            base,
            mem: Rc::new(RefCell::new(vec![0u8; size])),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.mem.borrow().len()
    }

    pub fn mem(&self) -> Ref<'_, Vec<u8>> {
        self.mem.borrow()
    }

    /// Index of `addr` into the backing store when `len` bytes fit.
    pub fn offset(&self, addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(self.base)? as usize;
        if off.checked_add(len)? <= self.size() {
            Some(off)
        } else {
            None
        }
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.offset(addr, 1).is_some()
    }

    pub fn load_u32(&self, addr: u32) -> Option<u32> {
        let off = self.offset(addr, 4)?;
        let mem = self.mem.borrow();
        Some(u32::from_le_bytes([mem[off], mem[off + 1], mem[off + 2], mem[off + 3]]))
    }

    pub fn load_u16(&self, addr: u32) -> Option<u16> {
        let off = self.offset(addr, 2)?;
        let mem = self.mem.borrow();
        Some(u16::from_le_bytes([mem[off], mem[off + 1]]))
    }

    pub fn store_u32(&self, addr: u32, value: u32) -> bool {
        match self.offset(addr, 4) {
            Some(off) => {
                self.mem.borrow_mut()[off..off + 4].copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Copy `data` in at `addr`; `false` when it does not fit.
    pub fn write_bytes(&self, addr: u32, data: &[u8]) -> bool {
        match self.offset(addr, data.len()) {
            Some(off) => {
                self.mem.borrow_mut()[off..off + data.len()].copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    pub fn mem_slice(&self, start: u32, end: u32) -> Option<Ref<'_, [u8]>> {
        let len = end.checked_sub(start)? as usize;
        let off = self.offset(start, len)?;
        Some(Ref::map(self.mem.borrow(), move |v| &v[off..off + len]))
    }
}
