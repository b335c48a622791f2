/// The core registers the supervisor reads and writes around crossings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreRegs {
    pub psp: u32,
    pub msp: u32,
    /// CONTROL.nPRIV
    pub unprivileged: bool,
    pub primask: bool,
    /// Times interrupts were masked; lets tests check critical sections ran.
    pub mask_count: usize,
}
