// Machine core
mod runtime;
pub use runtime::{Batch, Fault, Flag, Flow, Machine};
pub use runtime::{ADDR_DDR, ADDR_DSR, ADDR_INITIAL, ADDR_KBDR, ADDR_KBSR, ADDR_MCR, STATUS_BIT};

// Cooperative scheduling
mod pump;
pub use pump::{Frame, Phase, Pump, STEPS_PER_FRAME};

// Image loading
pub mod image;
pub use image::LoadError;

// Host devices
mod console;
pub use console::{Console, ScriptedConsole};
pub mod term;

pub mod error;
