use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};

use crate::console::Console;

/// Console backed by the hosting terminal.
///
/// Input codes are queued by the frame driver (from key events, or from a
/// pre-read stdin when not attached to a tty); output goes straight to
/// stdout. Newline translation for raw mode is done here, not in the core.
pub struct TermConsole {
    pending: VecDeque<u16>,
    raw: bool,
}

impl TermConsole {
    /// Console for an interactive terminal driven by key events.
    pub fn interactive() -> Self {
        TermConsole {
            pending: VecDeque::new(),
            raw: true,
        }
    }

    /// Console for piped use: all input is known up front.
    ///
    /// Carriage returns are normalized to code 10; a following line feed is
    /// kept as-is, so feed Unix line endings.
    pub fn piped(input: &[u8]) -> Self {
        let pending = input
            .iter()
            .map(|&byte| if byte == b'\r' { 10 } else { u16::from(byte) })
            .collect();
        TermConsole {
            pending,
            raw: false,
        }
    }

    /// Queue one input code for the machine.
    pub fn push_code(&mut self, code: u16) {
        self.pending.push_back(code);
    }
}

impl Console for TermConsole {
    fn has_char(&self) -> bool {
        !self.pending.is_empty()
    }

    fn take_char(&mut self) -> u16 {
        self.pending.pop_front().unwrap_or(0)
    }

    fn put_char(&mut self, code: u16) {
        let ch = char::from_u32(u32::from(code)).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut stdout = io::stdout().lock();
        let result = if self.raw && ch == '\n' {
            stdout.write_all(b"\r\n")
        } else {
            write!(stdout, "{}", ch)
        };
        result.and_then(|()| stdout.flush()).expect("failed to write to stdout");
    }
}

/// Must only be called if terminal is NOT in raw mode.
pub fn enable_raw_mode() {
    debug_assert!(
        !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should not be in raw mode to enable raw mode",
    );
    terminal::enable_raw_mode().expect("failed to enable raw terminal");
}

/// Must only be called if terminal is in raw mode.
pub fn disable_raw_mode() {
    debug_assert!(
        terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should already be in raw mode to disable raw mode",
    );
    terminal::disable_raw_mode().expect("failed to disable raw terminal");
}

/// Poll the terminal for one key code, waiting at most `timeout`.
///
/// Non-key events are discarded. Caller must ensure terminal is in raw mode.
///
/// `Ctrl+C` will always return the terminal to normal state and exit.
pub fn poll_key(timeout: Duration) -> Option<u16> {
    if !event::poll(timeout).expect("failed to poll terminal event") {
        return None;
    }
    let event = event::read().expect("failed to read terminal event");
    match event {
        Event::Key(key) => key_code(key),
        _ => None,
    }
}

/// Block until a key arrives. Caller must ensure terminal is in raw mode.
pub fn wait_key() -> u16 {
    loop {
        let event = event::read().expect("failed to read terminal event");
        if let Event::Key(key) = event {
            if let Some(code) = key_code(key) {
                return code;
            }
        }
    }
}

/// Translate a key event into a 16-bit character code.
///
/// Enter is normalized to code 10 by convention of the surrounding system.
fn key_code(event: KeyEvent) -> Option<u16> {
    if matches!(event.kind, KeyEventKind::Release) {
        return None;
    }

    if event.modifiers.contains(KeyModifiers::CONTROL) {
        // Ctrl+C
        if event.code == KeyCode::Char('c') {
            disable_raw_mode(); // Generic cleanup
            println!();
            std::process::exit(0);
        }
        return None;
    }

    match event.code {
        KeyCode::Enter | KeyCode::Char('\n') => Some(10),
        KeyCode::Backspace => Some(8),
        KeyCode::Tab => Some(9),
        KeyCode::Esc => Some(27),

        // Normal character
        KeyCode::Char(ch) => Some(ch as u16),

        _ => None,
    }
}
