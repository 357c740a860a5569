use std::path::Path;

use miette::{miette, Report, Severity};

use crate::image::LoadError;
use crate::runtime::Fault;

// Loader errors

pub fn load_failed(path: &Path, err: LoadError) -> Report {
    let path = path.display();
    match err {
        LoadError::Empty => miette!(
            severity = Severity::Error,
            code = "image::empty",
            help = "an image starts with a 2-byte big-endian base address.",
            "Image '{path}' is missing its base address word.",
        ),
        LoadError::Unaligned(len) => miette!(
            severity = Severity::Error,
            code = "image::unaligned",
            help = "images are a sequence of 2-byte big-endian words.",
            "Image '{path}' is {len} bytes, which is not aligned to 16 bits.",
        ),
        LoadError::TooLarge { base, words } => miette!(
            severity = Severity::Error,
            code = "image::too_large",
            help = "base address plus payload must stay within the 64K address space.",
            "Image '{path}' places {words} words at base 0x{base:04X}, past the top of memory.",
        ),
    }
}

// Machine faults

pub fn machine_fault(fault: Fault) -> Report {
    match fault {
        Fault::Rti => miette!(
            severity = Severity::Error,
            code = "machine::rti",
            help = "privileged-mode facilities are outside the supported subset; \
                    the image is likely built for a different runtime.",
            "Machine executed RTI, which is not implemented.",
        ),
        Fault::Reserved => miette!(
            severity = Severity::Error,
            code = "machine::reserved",
            help = "opcode 0b1101 has no defined behavior; the image may be corrupt.",
            "Machine executed the reserved opcode.",
        ),
        Fault::ReadOnlyWrite(addr) => miette!(
            severity = Severity::Error,
            code = "machine::read_only",
            help = "KBSR, KBDR and DSR are read-only device registers.",
            "Machine stored to read-only device register 0x{addr:04X}.",
        ),
    }
}
