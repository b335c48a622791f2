#![allow(dead_code)]

pub mod firmware;

use kernel::{Fault, FaultReporter, Origin, Resume, Snapshot, Supervisor};
use machine::Machine;
use types::ExceptionFrame;

pub use firmware::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Keeps every halt report instead of logging it.
#[derive(Default)]
pub struct Recorder {
    pub reports: Vec<(Fault, Snapshot)>,
}

impl FaultReporter for Recorder {
    fn report(&mut self, fault: &Fault, snapshot: &Snapshot) {
        self.reports.push((*fault, *snapshot));
    }
}

/// A booted machine with its supervisor and reporter.
pub struct Rig {
    pub hw: Machine,
    pub sup: Supervisor,
    pub rec: Recorder,
    pub fw: Firmware,
}

impl Rig {
    pub fn boot(fw: Firmware) -> Self {
        Self::boot_with(fw, machine())
    }

    pub fn boot_with(fw: Firmware, mut hw: Machine) -> Self {
        init_logging();
        assert!(fw.image.load_into(&hw.flash));
        let sup = Supervisor::boot(&mut hw, fw.info()).expect("boot");
        Self {
            hw,
            sup,
            rec: Recorder::default(),
            fw,
        }
    }

    /// Thread code runs the `svc` at `svc_pc` with `args`.
    pub fn svc(&mut self, svc_pc: u32, args: [u32; 4]) -> Resume {
        let sp = self.hw.svc_from_thread(svc_pc, args);
        self.sup.dispatch_svc(&mut self.hw, &mut self.rec, sp, Origin::Thread)
    }

    /// Call through a gateway and unstack the forged frame the callee starts with.
    pub fn call(&mut self, gateway: u32, args: [u32; 4]) -> ExceptionFrame {
        assert_eq!(self.svc(gateway, args), Resume::Thread);
        self.hw.exception_return(true).expect("forged frame")
    }

    /// Callee returns `r0` through the thunk; unstack what the caller resumes with.
    pub fn ret(&mut self, r0: u32) -> ExceptionFrame {
        let thunk = self.fw.thunk;
        assert_eq!(self.svc(thunk, [r0, 0, 0, 0]), Resume::Thread);
        self.hw.exception_return(true).expect("caller frame")
    }

    /// Interrupt `irq` preempts thread code; returns the handler's frame.
    pub fn interrupt(&mut self, irq: u32) -> ExceptionFrame {
        let stub = self.fw.stub;
        let (_, stub_sp) = self.hw.interrupt_stub_svc(irq, 0x0000_2222, stub);
        let resume = self.sup.dispatch_svc(&mut self.hw, &mut self.rec, stub_sp, Origin::Handler);
        assert_eq!(resume, Resume::Thread);
        self.hw.exception_return(true).expect("handler frame")
    }

    /// Handler returns into the stub; unwind back to the interrupted thread.
    pub fn interrupt_return(&mut self, handler: &ExceptionFrame) -> ExceptionFrame {
        let resume = self.svc(handler.lr & !1, [0; 4]);
        assert_eq!(resume, Resume::Handler);
        let stub = self.hw.exception_return(false).expect("stub frame");
        assert_eq!(stub.pc, self.fw.stub + 4);
        self.hw.exception_return(true).expect("interrupted frame")
    }
}
