//! Switch-state stack shared by the secure gateway and the interrupt multiplexer.

use crate::config::Config;
use crate::fault::Fault;

/// What caused a domain crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crossing {
    Gateway,
    Interrupt,
}

/// One pending crossing, popped when the destination returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchState {
    pub kind: Crossing,
    pub src_box: u8,
    pub dst_box: u8,
    /// Source stack pointer at the time of the crossing.
    pub src_sp: u32,
    /// Thread privilege of the interrupted code (interrupt crossings only).
    pub src_unprivileged: bool,
    /// The only `svc` the destination may leave through.
    pub return_svc: u32,
}

const EMPTY: SwitchState = SwitchState {
    kind: Crossing::Gateway,
    src_box: 0,
    dst_box: 0,
    src_sp: 0,
    src_unprivileged: true,
    return_svc: 0,
};

pub struct CallStack {
    entries: [SwitchState; Config::CONTEXT_MAX_DEPTH],
    depth: usize,
}

impl CallStack {
    pub const fn new() -> Self {
        Self {
            entries: [EMPTY; Config::CONTEXT_MAX_DEPTH],
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_full(&self) -> bool {
        self.depth >= Config::CONTEXT_MAX_DEPTH
    }

    pub fn push(&mut self, state: SwitchState) -> Result<(), Fault> {
        if self.is_full() {
            return Err(Fault::CallStackOverflow);
        }
        self.entries[self.depth] = state;
        self.depth += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<SwitchState, Fault> {
        if self.depth == 0 {
            return Err(Fault::CallStackUnderflow);
        }
        self.depth -= 1;
        Ok(self.entries[self.depth])
    }

    pub fn peek(&self) -> Option<&SwitchState> {
        if self.depth == 0 {
            None
        } else {
            Some(&self.entries[self.depth - 1])
        }
    }

    /// Pending crossings, oldest first.
    pub fn entries(&self) -> &[SwitchState] {
        &self.entries[..self.depth]
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}
