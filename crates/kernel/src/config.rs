/// Compile-time capacities of the kernel's preallocated tables.
///
/// Anything a box configuration asks for beyond these is rejected at boot.
pub struct Config;

impl Config {
    pub const MAX_BOXES: usize = 8;
    /// Global pool every box's regions are sliced from.
    pub const REGION_POOL: usize = 64;
    pub const MAX_ACLS_PER_BOX: usize = 32;
    /// Nested gateway calls plus de-privileged interrupts.
    pub const CONTEXT_MAX_DEPTH: usize = 16;
    /// Hardware region slots the switch engine mirrors.
    pub const MPU_MAX_SLOTS: usize = 16;

    pub const STACK_GUARD_BAND: u32 = 128;
    pub const MIN_STACK_SIZE: u32 = 256;
    /// Granularity of a box context inside its stack window.
    pub const CONTEXT_ALIGN: u32 = 32;

    pub const HW_IRQ_VECTORS: usize = types::boot::MAX_IRQ_LINES;
    pub const IRQ_PRIORITY_BITS: u32 = 4;

    pub const PERIPH_MAX_SLOTS: usize = 256;
    pub const PERIPH_WORDS: usize = Self::PERIPH_MAX_SLOTS / 32;

    pub const GATEWAY_MAX_ARGS: u8 = 4;
}
