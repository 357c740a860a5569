use std::fmt;

use crate::console::Console;
use crate::runtime::Machine;

/// Why an image byte stream could not be loaded.
///
/// A failed load leaves the machine in an unusable state; reset before
/// retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Stream is shorter than the two-byte base address word.
    Empty,
    /// Stream length is not a whole number of 16-bit words.
    Unaligned(usize),
    /// Base plus payload extends past the top of the address space.
    TooLarge { base: u16, words: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Empty => write!(f, "image is missing its base address word"),
            LoadError::Unaligned(len) => {
                write!(f, "image of {} bytes is not aligned to 16 bits", len)
            }
            LoadError::TooLarge { base, words } => write!(
                f,
                "image of {} words at base 0x{:04X} does not fit in memory",
                words, base
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Copy an image into machine memory.
///
/// The stream is a 2-byte big-endian base address followed by big-endian
/// 16-bit payload words, the persisted format for OS and user images alike.
/// Returns the base address, which hosts use to place the PC when the image
/// is a bare program.
pub fn load<C: Console>(machine: &mut Machine<C>, bytes: &[u8]) -> Result<u16, LoadError> {
    if bytes.len() % 2 != 0 {
        return Err(LoadError::Unaligned(bytes.len()));
    }
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let Some((base, payload)) = words.split_first() else {
        return Err(LoadError::Empty);
    };

    if usize::from(*base) + payload.len() > usize::from(u16::MAX) {
        return Err(LoadError::TooLarge {
            base: *base,
            words: payload.len(),
        });
    }

    machine.splice(*base, payload);
    Ok(*base)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::console::ScriptedConsole;

    fn machine() -> Machine<ScriptedConsole> {
        Machine::new(ScriptedConsole::new())
    }

    #[test]
    fn loads_payload_at_base_address() {
        let mut m = machine();
        let base = load(&mut m, &[0x30, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(base, 0x3000);
        assert_eq!(m.read(0x3000), 0x0001);
    }

    #[test]
    fn words_are_big_endian() {
        let mut m = machine();
        load(&mut m, &[0x30, 0x00, 0x12, 0x34, 0xAB, 0xCD]).unwrap();
        assert_eq!(m.read(0x3000), 0x1234);
        assert_eq!(m.read(0x3001), 0xABCD);
    }

    #[test]
    fn base_only_image_is_valid() {
        let mut m = machine();
        assert_eq!(load(&mut m, &[0x40, 0x00]), Ok(0x4000));
    }

    #[test]
    fn rejects_empty_stream() {
        let mut m = machine();
        assert_eq!(load(&mut m, &[]), Err(LoadError::Empty));
    }

    #[test]
    fn rejects_odd_length() {
        let mut m = machine();
        assert_eq!(
            load(&mut m, &[0x30, 0x00, 0x01]),
            Err(LoadError::Unaligned(3))
        );
    }

    #[test]
    fn rejects_image_past_top_of_memory() {
        let mut m = machine();
        // Base 0xFFFF plus one word would step past 0xFFFF
        assert_eq!(
            load(&mut m, &[0xFF, 0xFF, 0x00, 0x01]),
            Err(LoadError::TooLarge {
                base: 0xFFFF,
                words: 1
            })
        );
    }

    #[test]
    fn accepts_image_ending_at_top_of_memory() {
        let mut m = machine();
        load(&mut m, &[0xFF, 0xFD, 0xBE, 0xEF]).unwrap();
        assert_eq!(m.read(0xFFFD), 0xBEEF);
    }
}
