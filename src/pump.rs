use crate::console::Console;
use crate::runtime::{Batch, Fault, Machine};

/// Default instruction quota per frame. Bounds per-frame latency while
/// keeping the machine fast enough to feel instant.
pub const STEPS_PER_FRAME: u32 = 100_000;

/// Where the pump currently stands between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Not started, halted, faulted or reset. Nothing runs until `start`.
    Idle,
    /// A frame will execute a batch.
    Running,
    /// Parked on a blocking input read; resumed by `interrupt`.
    AwaitingInput,
}

/// What a frame did, and what the host should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frame {
    /// No runnable work; the frame was a stale no-op.
    Idle,
    /// Quota exhausted with more work; schedule another frame.
    Continue,
    /// Run bit cleared. Terminal until reset.
    Halted,
    /// Waiting on input; deliver codes and call `interrupt`.
    Waiting,
    /// Contract violation. Terminal until reset.
    Fault(Fault),
}

/// Cooperative driver for a [`Machine`].
///
/// The host owns the cadence: it calls [`Pump::frame`] once per frame
/// callback, strictly after the previous call returned. Everything here is
/// synchronous; "suspension" is just not scheduling another frame.
pub struct Pump<C> {
    machine: Machine<C>,
    phase: Phase,
    /// Set when a batch stopped on a blocking input read.
    retry: bool,
    quota: u32,
}

impl<C: Console> Pump<C> {
    pub fn new(machine: Machine<C>) -> Self {
        Self::with_quota(machine, STEPS_PER_FRAME)
    }

    pub fn with_quota(machine: Machine<C>, quota: u32) -> Self {
        Pump {
            machine,
            phase: Phase::Idle,
            retry: false,
            quota,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn machine(&self) -> &Machine<C> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine<C> {
        &mut self.machine
    }

    pub fn into_machine(self) -> Machine<C> {
        self.machine
    }

    /// Begin (or resume after load) executing from the machine's current PC.
    pub fn start(&mut self) {
        self.phase = Phase::Running;
    }

    /// Run one bounded batch.
    ///
    /// A queued frame that arrives after a halt, fault or reset reports
    /// [`Frame::Idle`] and touches nothing.
    pub fn frame(&mut self) -> Frame {
        match self.phase {
            Phase::Idle => Frame::Idle,
            Phase::AwaitingInput => Frame::Waiting,
            Phase::Running => match self.machine.run_batch(self.quota) {
                Batch::Ran => Frame::Continue,
                Batch::Halted => {
                    self.phase = Phase::Idle;
                    Frame::Halted
                }
                Batch::Blocked => {
                    self.phase = Phase::AwaitingInput;
                    self.retry = true;
                    Frame::Waiting
                }
                Batch::Fault(fault) => {
                    self.phase = Phase::Idle;
                    Frame::Fault(fault)
                }
            },
        }
    }

    /// Notify that new input arrived.
    ///
    /// Returns whether the host should schedule a frame right away.
    /// Idempotent: only a pump parked on input reacts.
    pub fn interrupt(&mut self) -> bool {
        if self.retry {
            self.retry = false;
            self.phase = Phase::Running;
            true
        } else {
            false
        }
    }

    /// Reset the machine and discard any in-flight scheduling.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.phase = Phase::Idle;
        self.retry = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::console::ScriptedConsole;
    use crate::runtime::{Flag, ADDR_MCR};

    fn pump_with(program: &[u16], quota: u32) -> Pump<ScriptedConsole> {
        let mut machine = Machine::new(ScriptedConsole::new());
        machine.splice(0x3000, program);
        Pump::with_quota(machine, quota)
    }

    // AND R0, R0, #0; STI R0, ->MCR
    const HALT: [u16; 4] = [0x5020, 0xB001, 0x0000, ADDR_MCR];

    #[test]
    fn quota_bounds_a_frame() {
        // BRnzp #-1: spin forever
        let mut pump = pump_with(&[0x0FFF], 50);
        pump.start();
        assert_eq!(pump.frame(), Frame::Continue);
        assert_eq!(pump.phase(), Phase::Running);
        assert_eq!(pump.frame(), Frame::Continue);
    }

    #[test]
    fn halt_is_terminal_until_reset() {
        let mut pump = pump_with(&HALT, 100);
        pump.start();
        assert_eq!(pump.frame(), Frame::Halted);
        assert_eq!(pump.phase(), Phase::Idle);
        // A stale queued frame is a no-op
        assert_eq!(pump.frame(), Frame::Idle);
    }

    #[test]
    fn blocked_machine_resumes_on_interrupt() {
        // TRAP GETC; STI R0, ->MCR ('x' has the run bit clear, so this halts)
        let mut pump = pump_with(&[0xF020, 0xB001, 0x0000, ADDR_MCR], 100);
        pump.start();

        assert_eq!(pump.frame(), Frame::Waiting);
        assert_eq!(pump.phase(), Phase::AwaitingInput);
        // Still waiting on the next natural frame
        assert_eq!(pump.frame(), Frame::Waiting);

        pump.machine_mut().console_mut().push_input('x' as u16);
        assert!(pump.interrupt());
        assert_eq!(pump.phase(), Phase::Running);

        assert_eq!(pump.frame(), Frame::Halted);
        assert_eq!(pump.machine().reg(0), 'x' as u16);
        assert_eq!(pump.machine().pc(), 0x3002);
    }

    #[test]
    fn interrupt_is_idempotent() {
        let mut pump = pump_with(&HALT, 100);
        // Not waiting: nothing to resume
        assert!(!pump.interrupt());
        pump.start();
        assert!(!pump.interrupt());
        assert_eq!(pump.phase(), Phase::Running);
    }

    #[test]
    fn fault_parks_the_pump() {
        // RTI
        let mut pump = pump_with(&[0x8000], 100);
        pump.start();
        assert_eq!(pump.frame(), Frame::Fault(Fault::Rti));
        assert_eq!(pump.phase(), Phase::Idle);
        assert_eq!(pump.frame(), Frame::Idle);
    }

    #[test]
    fn reset_discards_inflight_scheduling() {
        let mut pump = pump_with(&[0x0FFF], 10);
        pump.start();
        assert_eq!(pump.frame(), Frame::Continue);

        pump.reset();
        // The "already queued" frame runs against fresh state and does nothing
        assert_eq!(pump.frame(), Frame::Idle);
        assert_eq!(pump.machine().pc(), 0x3000);
        assert_eq!(pump.machine().flag(), Flag::Z);
    }
}
