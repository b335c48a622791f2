//! Fatal conditions and the reporting hook the board provides.
//!
//! Nothing here is recoverable: every kernel operation propagates a `Fault`
//! up to the exception-entry boundary, which reports it once and halts.

use log::error;
use thiserror::Error;

/// Which tier of the taxonomy a fault belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultClass {
    /// The box tables or platform layout are inconsistent.
    Configuration,
    /// A box asked for something it is not entitled to, or the kernel's own
    /// bookkeeping broke at run time.
    Violation,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Fault {
    #[error("platform layout rejected: {0}")]
    Platform(&'static str),
    #[error("box configuration table 0x{start:08x}..0x{end:08x} is malformed")]
    ConfigTable { start: u32, end: u32 },
    #[error("no box configuration records found")]
    NoBoxes,
    #[error("{count} boxes declared, at most {max} supported")]
    TooManyBoxes { count: usize, max: usize },
    #[error("0x{addr:08x}+{len} is not inside flash")]
    OutsideFlash { addr: u32, len: u32 },
    #[error("box {id}: bad magic 0x{found:08x}")]
    BoxMagic { id: u8, found: u32 },
    #[error("box {id}: unsupported version {found}")]
    BoxVersion { id: u8, found: u32 },
    #[error("box 0 must not declare a stack or context")]
    KernelBoxStack,
    #[error("box {id}: stack of {size} bytes is below the {min} byte minimum")]
    StackTooSmall { id: u8, size: u32, min: u32 },
    #[error("box {id}: stack arena exhausted")]
    StackArenaExhausted { id: u8 },
    #[error("stack cursor ended at 0x{cursor:08x}, arena bottom is 0x{bottom:08x}")]
    StackArenaMismatch { cursor: u32, bottom: u32 },
    #[error("box {id}: {count} ACL entries, at most {max} supported")]
    TooManyAcls { id: u8, count: u32, max: usize },
    #[error("box {id}: ACL word 0x{acl:08x} has unknown bits")]
    AclUnknownBits { id: u8, acl: u32 },

    #[error("region of {size} bytes is not a power of two and rounding is disabled")]
    RegionNotRounded { size: u32 },
    #[error("region of {size} bytes is too large")]
    RegionTooLarge { size: u32 },
    #[error("base 0x{base:08x} is not aligned to region size {size}")]
    RegionMisaligned { base: u32, size: u32 },
    #[error("ACL access 0x{requested:04x} cannot be expressed (hardware gives 0x{inferred:04x})")]
    AclNotRepresentable { requested: u32, inferred: u32 },
    #[error("box {id}: region 0x{base:08x}+{size} overlaps a grant of box {other}")]
    RegionOverlap { id: u8, other: u8, base: u32, size: u32 },
    #[error("region pool exhausted")]
    RegionPoolExhausted,
    #[error("box {id}: unordered region allocation")]
    UnorderedRegion { id: u8 },

    #[error("platform has no peripheral access gate")]
    PeripheralUnsupported,
    #[error("peripheral grant 0x{addr:08x}+{size} is outside the peripheral window or misaligned")]
    PeripheralRange { addr: u32, size: u32 },
    #[error("peripheral grants need user read/write, got 0x{acl:04x}")]
    PeripheralAccess { acl: u32 },
    #[error("box {id}: peripheral slot {slot} is already owned by box {other}")]
    PeripheralOverlap { id: u8, other: u8, slot: usize },

    #[error("box id {id} out of range")]
    BoxOutOfRange { id: u8 },
    #[error("switch from box {found} but box {expected} is loaded")]
    SwitchSource { expected: u8, found: u8 },

    #[error("switch-state stack overflow")]
    CallStackOverflow,
    #[error("switch-state stack underflow")]
    CallStackUnderflow,
    #[error("return from box {found} does not match the pending crossing into box {expected}")]
    CallStackMismatch { expected: u8, found: u8 },

    #[error("secure gateway 0x{addr:08x} is not in public flash")]
    GatewayOutsideFlash { addr: u32 },
    #[error("secure gateway 0x{addr:08x} has opcode 0x{opcode:04x}")]
    GatewayOpcode { addr: u32, opcode: u16 },
    #[error("secure gateway 0x{addr:08x} has magic 0x{found:08x}")]
    GatewayMagic { addr: u32, found: u32 },
    #[error("secure gateway target 0x{target:08x} is not in public flash")]
    GatewayTarget { target: u32 },
    #[error("0x{ptr:08x} is not a box configuration pointer")]
    GatewayBoxPointer { ptr: u32 },
    #[error("box {id} called itself through a gateway")]
    GatewaySelfCall { id: u8 },
    #[error("gateway calls into box 0 are not allowed")]
    GatewayToKernel,
    #[error("gateway declares {nargs} arguments")]
    GatewayArgs { nargs: u8 },
    #[error("exception frame at 0x{sp:08x} is not accessible")]
    FrameAccess { sp: u32 },
    #[error("cannot store exception frame at 0x{sp:08x}")]
    FrameWrite { sp: u32 },

    #[error("IRQ {irq} out of range")]
    IrqOutOfRange { irq: u32 },
    #[error("IRQ {irq} is reserved for the kernel")]
    IrqReserved { irq: u32 },
    #[error("IRQ {irq} is owned by box {owner}, not box {requester}")]
    IrqNotOwned { irq: u32, owner: u8, requester: u8 },
    #[error("IRQ {irq} is not claimed by box {requester}")]
    IrqUnclaimed { irq: u32, requester: u8 },
    #[error("IRQ {irq} fired without a registered handler")]
    IrqUnhandled { irq: u32 },
    #[error("exception {ipsr} is not an interrupt line")]
    NotAnInterrupt { ipsr: u32 },
    #[error("interrupt handler left through 0x{found:08x}, not the stub at 0x{expected:08x}")]
    IrqReturnAddress { expected: u32, found: u32 },
    #[error("IRQ priority {priority} out of range")]
    IrqPriority { priority: u32 },

    #[error("register gateway 0x{addr:08x} is not in public flash")]
    RegisterGatewayOutsideFlash { addr: u32 },
    #[error("register gateway 0x{addr:08x} has magic 0x{found:08x}")]
    RegisterGatewayMagic { addr: u32, found: u32 },
    #[error("register gateway box pointer 0x{ptr:08x} is invalid")]
    RegisterGatewayBoxPointer { ptr: u32 },
    #[error("register gateway belongs to box {owner}, active box is {active}")]
    RegisterGatewayBox { owner: u8, active: u8 },
    #[error("register gateway address 0x{address:08x} is not a peripheral or ROM table register")]
    RegisterGatewayAddress { address: u32 },
    #[error("register gateway operation {op} not recognised")]
    RegisterGatewayOp { op: u16 },

    #[error("bus error at 0x{addr:08x}")]
    BusError { addr: u32 },
    #[error("box {id}: access violation at 0x{addr:08x}")]
    AccessViolation { id: u8, addr: u32 },
    #[error("unknown SVC 0x{imm:02x}")]
    UnknownSvc { imm: u8 },
    #[error("SVC 0x{imm:02x} issued from the wrong mode")]
    SvcOrigin { imm: u8 },
    #[error("box {id} halted with reason 0x{reason:08x}")]
    UserHalt { id: u8, reason: u32 },
    #[error("kernel is halted")]
    Halted,
}

impl Fault {
    pub fn class(&self) -> FaultClass {
        match self {
            Fault::Platform(_)
            | Fault::ConfigTable { .. }
            | Fault::NoBoxes
            | Fault::TooManyBoxes { .. }
            | Fault::OutsideFlash { .. }
            | Fault::BoxMagic { .. }
            | Fault::BoxVersion { .. }
            | Fault::KernelBoxStack
            | Fault::StackTooSmall { .. }
            | Fault::StackArenaExhausted { .. }
            | Fault::StackArenaMismatch { .. }
            | Fault::TooManyAcls { .. }
            | Fault::AclUnknownBits { .. }
            | Fault::RegionNotRounded { .. }
            | Fault::RegionTooLarge { .. }
            | Fault::RegionMisaligned { .. }
            | Fault::AclNotRepresentable { .. }
            | Fault::RegionOverlap { .. }
            | Fault::RegionPoolExhausted
            | Fault::UnorderedRegion { .. }
            | Fault::PeripheralUnsupported
            | Fault::PeripheralRange { .. }
            | Fault::PeripheralAccess { .. }
            | Fault::PeripheralOverlap { .. }
            | Fault::IrqUnhandled { .. } => FaultClass::Configuration,
            _ => FaultClass::Violation,
        }
    }
}

/// Machine state captured alongside a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub active_box: u8,
    pub depth: usize,
    pub psp: u32,
    pub msp: u32,
}

/// Diagnostic channel a halt is reported through.
pub trait FaultReporter {
    fn report(&mut self, fault: &Fault, snapshot: &Snapshot);
}

/// Reporter that writes the fault to the `log` facade.
pub struct LogReporter;

impl FaultReporter for LogReporter {
    fn report(&mut self, fault: &Fault, snapshot: &Snapshot) {
        error!(
            "HALT ({:?}): {} [box {}, depth {}, psp 0x{:08x}, msp 0x{:08x}]",
            fault.class(),
            fault,
            snapshot.active_box,
            snapshot.depth,
            snapshot.psp,
            snapshot.msp
        );
    }
}
