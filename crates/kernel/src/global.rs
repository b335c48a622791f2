use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

/// Minimal wrapper to store non-`Sync` types in statics.
///
/// Safety: Callers must guarantee exclusive access when mutating.
pub struct Global<T> {
    inner: UnsafeCell<T>,
}

impl<T> Global<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    /// # Safety
    /// Callers must ensure exclusive access or otherwise serialize mutations.
    pub unsafe fn get_mut(&self) -> &mut T {
        unsafe { &mut *self.inner.get() }
    }
}

unsafe impl<T> Sync for Global<T> {}

/// Fixed-capacity, append-only list backing the kernel's tables.
///
/// Entries are never removed or reordered once pushed.
pub struct FixedList<T: Copy, const N: usize> {
    len: usize,
    slots: [MaybeUninit<T>; N],
}

impl<T: Copy, const N: usize> FixedList<T, N> {
    pub const fn new() -> Self {
        Self {
            len: 0,
            slots: [const { MaybeUninit::uninit() }; N],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `item`, returning its index, or hand it back when full.
    pub fn push(&mut self, item: T) -> Result<usize, T> {
        if self.len >= N {
            return Err(item);
        }
        let idx = self.len;
        self.slots[idx].write(item);
        self.len += 1;
        Ok(idx)
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        if idx < self.len {
            Some(unsafe { self.slots[idx].assume_init_ref() })
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        if idx < self.len {
            Some(unsafe { self.slots[idx].assume_init_mut() })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        // First `len` slots are initialized.
        unsafe { core::slice::from_raw_parts(self.slots.as_ptr() as *const T, self.len) }
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Copy + core::fmt::Debug, const N: usize> core::fmt::Debug for FixedList<T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Copy, const N: usize> Default for FixedList<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
