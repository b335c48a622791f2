/// Interrupt controller state: enable, pending and priority per line.
pub struct SoftNvic {
    enabled: Vec<bool>,
    pending: Vec<bool>,
    priority: Vec<u8>,
}

impl SoftNvic {
    pub fn new(lines: usize) -> Self {
        Self {
            enabled: vec![false; lines],
            pending: vec![false; lines],
            priority: vec![0; lines],
        }
    }

    pub fn lines(&self) -> usize {
        self.enabled.len()
    }

    fn set(bits: &mut [bool], irq: u32, value: bool) {
        if let Some(bit) = bits.get_mut(irq as usize) {
            *bit = value;
        }
    }

    pub fn enable(&mut self, irq: u32, on: bool) {
        Self::set(&mut self.enabled, irq, on);
    }

    pub fn enabled(&self, irq: u32) -> bool {
        self.enabled.get(irq as usize).copied().unwrap_or(false)
    }

    pub fn pend(&mut self, irq: u32, on: bool) {
        Self::set(&mut self.pending, irq, on);
    }

    pub fn pending(&self, irq: u32) -> bool {
        self.pending.get(irq as usize).copied().unwrap_or(false)
    }

    pub fn set_priority(&mut self, irq: u32, priority: u8) {
        if let Some(p) = self.priority.get_mut(irq as usize) {
            *p = priority;
        }
    }

    pub fn priority(&self, irq: u32) -> u8 {
        self.priority.get(irq as usize).copied().unwrap_or(0)
    }
}
