#![no_std]

pub mod config;
pub use config::Config;
pub mod global;
pub use global::{FixedList, Global};

pub mod fault;
pub use fault::{Fault, FaultClass, FaultReporter, LogReporter, Snapshot};

pub mod region;
pub use region::{Region, RegionSource, compute_region, decode_access, map_acl};
pub mod periph;
pub use periph::PeripheralMap;
pub mod registry;
pub use registry::{Registry, SecureBox};
pub mod switch;
pub use switch::SwitchEngine;
pub mod context;
pub use context::{CallStack, Crossing, SwitchState};
pub mod trampoline;

pub mod supervisor;
pub use supervisor::Supervisor;
pub mod gateway;
pub mod register_gateway;
pub mod unvic;
pub use unvic::{IrqTable, IrqVector};
pub mod svc;
pub use svc::{Origin, Resume};

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;

pub use types::boot::BootInfo;
