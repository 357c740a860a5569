use std::cmp::Ordering;
use std::fmt;

use crate::console::Console;

/// LC3 can address 64K 16-bit words.
const MEMORY_MAX: usize = 0x10000;

/// Where user code is expected to live, and where the PC starts.
pub const ADDR_INITIAL: u16 = 0x3000;
/// Keyboard status register.
pub const ADDR_KBSR: u16 = 0xFE00;
/// Keyboard data register.
pub const ADDR_KBDR: u16 = 0xFE02;
/// Display status register.
pub const ADDR_DSR: u16 = 0xFE04;
/// Display data register.
pub const ADDR_DDR: u16 = 0xFE06;
/// Machine control register. Plain storage; high bit is the run bit.
pub const ADDR_MCR: u16 = 0xFFFE;

/// High bit, used as both "device ready" and "machine running".
pub const STATUS_BIT: u16 = 1 << 15;

const TRAP_GETC: u16 = 0x20;
const CC_MASK: u16 = 0b111;

/// Condition code, stored in the low 3 bits of the PSR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

/// Memory-mapped device registers, matched before plain storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mapped {
    Kbsr,
    Kbdr,
    Dsr,
    Ddr,
}

impl Mapped {
    fn decode(addr: u16) -> Option<Mapped> {
        match addr {
            ADDR_KBSR => Some(Mapped::Kbsr),
            ADDR_KBDR => Some(Mapped::Kbdr),
            ADDR_DSR => Some(Mapped::Dsr),
            ADDR_DDR => Some(Mapped::Ddr),
            _ => None,
        }
    }
}

/// Contract violation that ends the current run.
///
/// A correctly assembled image never triggers any of these. `Rti` and
/// `Reserved` are kept distinct so a host can tell them apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// RTI executed; the privileged-mode facilities are not implemented.
    Rti,
    /// The reserved opcode `0b1101`.
    Reserved,
    /// Store to a read-only device register (KBSR, KBDR or DSR).
    ReadOnlyWrite(u16),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Rti => write!(f, "executed RTI, which is not implemented"),
            Fault::Reserved => write!(f, "executed the reserved opcode"),
            Fault::ReadOnlyWrite(addr) => {
                write!(f, "stored to read-only device register 0x{:04X}", addr)
            }
        }
    }
}

impl std::error::Error for Fault {}

/// How a single instruction left the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Instruction completed; carry on.
    Continue,
    /// TRAP GETC with no pending input. The instruction was not consumed;
    /// the caller must rewind the PC so it re-executes once input exists.
    AwaitInput,
}

type Step = Result<Flow, Fault>;

/// Why a bounded batch of instructions stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Batch {
    /// Quota exhausted with the run bit still set; more work remains.
    Ran,
    /// MCR run bit clear before a fetch.
    Halted,
    /// Blocked on input. PC points back at the blocking instruction.
    Blocked,
    Fault(Fault),
}

/// Complete LC3 machine state plus the console it is wired to.
///
/// Instances are independent; construct as many as needed.
pub struct Machine<C> {
    /// System memory - 128KB in size.
    mem: Box<[u16; MEMORY_MAX]>,
    /// 8x 16-bit general registers
    reg: [u16; 8],
    /// Program counter
    pc: u16,
    /// Processor status register; low 3 bits are the condition code
    psr: u16,
    console: C,
}

impl<C: Console> Machine<C> {
    pub fn new(console: C) -> Self {
        let mut machine = Machine {
            mem: Box::new([0; MEMORY_MAX]),
            reg: [0; 8],
            pc: ADDR_INITIAL,
            psr: Flag::Z as u16,
            console,
        };
        machine.mem[ADDR_MCR as usize] = STATUS_BIT;
        machine
    }

    /// Return to the freshly constructed state: PC at 0x3000, condition code
    /// zero, run bit set, everything else zeroed.
    pub fn reset(&mut self) {
        self.mem.fill(0);
        self.mem[ADDR_MCR as usize] = STATUS_BIT;
        self.reg = [0; 8];
        self.pc = ADDR_INITIAL;
        self.psr = Flag::Z as u16;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn flag(&self) -> Flag {
        match self.psr & CC_MASK {
            0b100 => Flag::N,
            0b010 => Flag::Z,
            0b001 => Flag::P,
            _ => unreachable!("condition code must have exactly one flag set"),
        }
    }

    pub fn reg(&self, index: u16) -> u16 {
        self.reg[(index & 0b111) as usize]
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Read through the memory-mapped device layer.
    ///
    /// A KBDR read consumes one pending input code as a side effect.
    pub fn read(&mut self, addr: u16) -> u16 {
        match Mapped::decode(addr) {
            Some(Mapped::Kbsr) => {
                if self.console.has_char() {
                    STATUS_BIT
                } else {
                    0
                }
            }
            Some(Mapped::Kbdr) => {
                if self.console.has_char() {
                    self.console.take_char()
                } else {
                    0
                }
            }
            // Display is always ready
            Some(Mapped::Dsr) => STATUS_BIT,
            Some(Mapped::Ddr) => 0,
            None => self.mem[addr as usize],
        }
    }

    /// Write through the memory-mapped device layer.
    ///
    /// A DDR write forwards the code to the console and stores nothing.
    pub fn write(&mut self, addr: u16, val: u16) -> Result<(), Fault> {
        match Mapped::decode(addr) {
            Some(Mapped::Ddr) => {
                self.console.put_char(val);
                Ok(())
            }
            Some(Mapped::Kbsr | Mapped::Kbdr | Mapped::Dsr) => Err(Fault::ReadOnlyWrite(addr)),
            None => {
                self.mem[addr as usize] = val;
                Ok(())
            }
        }
    }

    /// Copy raw words into memory, bypassing the device layer.
    pub(crate) fn splice(&mut self, base: u16, words: &[u16]) {
        let base = base as usize;
        self.mem[base..base + words.len()].copy_from_slice(words);
    }

    const OP_TABLE: [fn(&mut Self, u16) -> Step; 16] = [
        Self::br,       // 0x0
        Self::add,      // 0x1
        Self::ld,       // 0x2
        Self::st,       // 0x3
        Self::jsr,      // 0x4
        Self::and,      // 0x5
        Self::ldr,      // 0x6
        Self::str,      // 0x7
        Self::rti,      // 0x8
        Self::not,      // 0x9
        Self::ldi,      // 0xA
        Self::sti,      // 0xB
        Self::jmp,      // 0xC
        Self::reserved, // 0xD
        Self::lea,      // 0xE
        Self::trap,     // 0xF
    ];

    /// Decode and execute one instruction word.
    ///
    /// The PC must already point past the instruction; PC-relative offsets
    /// are taken from the address of the *next* instruction.
    pub fn execute(&mut self, instr: u16) -> Step {
        Self::OP_TABLE[(instr >> 12) as usize](self, instr)
    }

    /// Execute up to `quota` instructions, stopping early on halt, blocking
    /// input or a fault.
    ///
    /// The run bit in MCR is checked before every fetch. A blocked batch
    /// leaves the PC on the blocking instruction so it re-issues.
    pub fn run_batch(&mut self, quota: u32) -> Batch {
        for _ in 0..quota {
            if self.read(ADDR_MCR) & STATUS_BIT == 0 {
                return Batch::Halted;
            }

            let instr = self.read(self.pc);
            self.pc = self.pc.wrapping_add(1);

            match self.execute(instr) {
                Ok(Flow::Continue) => {}
                Ok(Flow::AwaitInput) => {
                    self.pc = self.pc.wrapping_sub(1);
                    return Batch::Blocked;
                }
                Err(fault) => return Batch::Fault(fault),
            }
        }
        Batch::Ran
    }

    #[inline]
    fn reg_mut(&mut self, reg: u16) -> &mut u16 {
        // SAFETY: Should only be indexed with values that are & 0b111
        unsafe { self.reg.get_unchecked_mut(reg as usize) }
    }

    /// Two's-complement widening of the low `bits` bits of `val`.
    #[inline]
    fn sext(val: u16, bits: u32) -> u16 {
        debug_assert!(bits > 0 && bits < 16);
        let sign = 1u16 << (bits - 1);
        let magnitude = val & ((1u16 << bits) - 1);
        (magnitude ^ sign).wrapping_sub(sign)
    }

    #[inline]
    fn set_cc(&mut self, val: u16) {
        let flag = match (val as i16).cmp(&0) {
            Ordering::Less => Flag::N,
            Ordering::Equal => Flag::Z,
            Ordering::Greater => Flag::P,
        };
        self.psr = (self.psr & !CC_MASK) | flag as u16;
    }

    fn add(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;

        let lhs = *self.reg_mut(sr);
        let rhs = if instr & (1 << 5) != 0 {
            Self::sext(instr, 5)
        } else {
            *self.reg_mut(instr & 0b111)
        };
        let res = lhs.wrapping_add(rhs);
        *self.reg_mut(dr) = res;
        self.set_cc(res);
        Ok(Flow::Continue)
    }

    fn and(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;

        let lhs = *self.reg_mut(sr);
        let rhs = if instr & (1 << 5) != 0 {
            Self::sext(instr, 5)
        } else {
            *self.reg_mut(instr & 0b111)
        };
        let res = lhs & rhs;
        *self.reg_mut(dr) = res;
        self.set_cc(res);
        Ok(Flow::Continue)
    }

    fn br(&mut self, instr: u16) -> Step {
        let want = (instr >> 9) & CC_MASK;
        if want & self.psr & CC_MASK != 0 {
            self.pc = self.pc.wrapping_add(Self::sext(instr, 9));
        }
        Ok(Flow::Continue)
    }

    fn jmp(&mut self, instr: u16) -> Step {
        let base = (instr >> 6) & 0b111;
        self.pc = *self.reg_mut(base);
        Ok(Flow::Continue)
    }

    fn jsr(&mut self, instr: u16) -> Step {
        self.reg[7] = self.pc;
        if instr & (1 << 11) != 0 {
            // offs
            self.pc = self.pc.wrapping_add(Self::sext(instr, 11));
        } else {
            // reg
            let base = (instr >> 6) & 0b111;
            self.pc = *self.reg_mut(base);
        }
        Ok(Flow::Continue)
    }

    fn ld(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let val = self.read(self.pc.wrapping_add(Self::sext(instr, 9)));
        *self.reg_mut(dr) = val;
        self.set_cc(val);
        Ok(Flow::Continue)
    }

    fn ldi(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let ptr = self.read(self.pc.wrapping_add(Self::sext(instr, 9)));
        let val = self.read(ptr);
        *self.reg_mut(dr) = val;
        self.set_cc(val);
        Ok(Flow::Continue)
    }

    fn ldr(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let base = (instr >> 6) & 0b111;
        let ptr = *self.reg_mut(base);
        let val = self.read(ptr.wrapping_add(Self::sext(instr, 6)));
        *self.reg_mut(dr) = val;
        self.set_cc(val);
        Ok(Flow::Continue)
    }

    fn lea(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let val = self.pc.wrapping_add(Self::sext(instr, 9));
        *self.reg_mut(dr) = val;
        self.set_cc(val);
        Ok(Flow::Continue)
    }

    fn not(&mut self, instr: u16) -> Step {
        let dr = (instr >> 9) & 0b111;
        let sr = (instr >> 6) & 0b111;
        let val = !*self.reg_mut(sr);
        *self.reg_mut(dr) = val;
        self.set_cc(val);
        Ok(Flow::Continue)
    }

    fn rti(&mut self, _instr: u16) -> Step {
        Err(Fault::Rti)
    }

    fn reserved(&mut self, _instr: u16) -> Step {
        Err(Fault::Reserved)
    }

    fn st(&mut self, instr: u16) -> Step {
        let sr = (instr >> 9) & 0b111;
        let val = *self.reg_mut(sr);
        self.write(self.pc.wrapping_add(Self::sext(instr, 9)), val)?;
        Ok(Flow::Continue)
    }

    fn sti(&mut self, instr: u16) -> Step {
        let sr = (instr >> 9) & 0b111;
        let val = *self.reg_mut(sr);
        let ptr = self.read(self.pc.wrapping_add(Self::sext(instr, 9)));
        self.write(ptr, val)?;
        Ok(Flow::Continue)
    }

    fn str(&mut self, instr: u16) -> Step {
        let sr = (instr >> 9) & 0b111;
        let base = (instr >> 6) & 0b111;
        let ptr = *self.reg_mut(base);
        let val = *self.reg_mut(sr);
        self.write(ptr.wrapping_add(Self::sext(instr, 6)), val)?;
        Ok(Flow::Continue)
    }

    fn trap(&mut self, instr: u16) -> Step {
        let vect = instr & 0xFF;
        if vect == TRAP_GETC {
            // Handled here instead of by a service routine so an idle machine
            // can suspend rather than spin on KBSR.
            if self.console.has_char() {
                let code = self.console.take_char();
                *self.reg_mut(0) = code;
            } else {
                return Ok(Flow::AwaitInput);
            }
        } else {
            // Vector through the resident service routine table
            self.reg[7] = self.pc;
            self.pc = self.read(vect);
        }
        Ok(Flow::Continue)
    }
}
