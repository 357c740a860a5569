use std::collections::VecDeque;

/// Character device behind the machine's memory-mapped keyboard and display
/// registers.
///
/// One code is one character; code 10 is the conventional newline. The core
/// performs no buffering or line-ending translation of its own.
pub trait Console {
    /// Whether an input code is waiting to be consumed.
    fn has_char(&self) -> bool;
    /// Take the next pending input code, or 0 if none is pending.
    fn take_char(&mut self) -> u16;
    /// Emit one character code on the display.
    fn put_char(&mut self, code: u16);
}

/// Console with scripted input and captured output, for tests and headless
/// embedding.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    input: VecDeque<u16>,
    output: Vec<u16>,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a single input code.
    pub fn push_input(&mut self, code: u16) {
        self.input.push_back(code);
    }

    /// Queue a string as input codes, one per character.
    pub fn type_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.input.push_back(ch as u16);
        }
    }

    /// Everything the machine has written to the display so far.
    pub fn output(&self) -> &[u16] {
        &self.output
    }

    /// Captured output decoded as text, with unrepresentable codes replaced.
    pub fn output_string(&self) -> String {
        self.output
            .iter()
            .map(|&code| char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl Console for ScriptedConsole {
    fn has_char(&self) -> bool {
        !self.input.is_empty()
    }

    fn take_char(&mut self) -> u16 {
        self.input.pop_front().unwrap_or(0)
    }

    fn put_char(&mut self, code: u16) {
        self.output.push(code);
    }
}
