use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};

use bobbin::term::{self, TermConsole};
use bobbin::{error, image, Frame, Machine, Pump, ScriptedConsole};

/// Bobbin is a small LC3 virtual machine that runs binary images in the
/// terminal.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.lc3` or `.obj` image to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a binary `.lc3` or `.obj` image and wire it to the terminal
    Run {
        /// Image file to run
        name: PathBuf,
        /// OS image providing trap service routines, loaded first
        #[arg(short, long)]
        os: Option<PathBuf>,
        /// Instructions executed per frame
        #[arg(short, long)]
        quota: Option<u32>,
    },
    /// Check that an image loads without running it
    Check {
        /// Image file to check
        name: PathBuf,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    if let Some(command) = args.command {
        match command {
            Command::Run { name, os, quota } => run(&name, os.as_deref(), quota),
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let bytes = fs::read(&name).into_diagnostic()?;
                let mut machine = Machine::new(ScriptedConsole::new());
                let base =
                    image::load(&mut machine, &bytes).map_err(|e| error::load_failed(&name, e))?;
                let right = format!("image loads at 0x{:04X}", base);
                message(Green, "Success", &right);
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, None, None)
    } else {
        println!("\n~ bobbin v{VERSION} ~");
        println!("{SHORT_INFO}");
        Ok(())
    }
}

fn run(name: &Path, os: Option<&Path>, quota: Option<u32>) -> Result<()> {
    use MsgColor::*;

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    let console = if interactive {
        TermConsole::interactive()
    } else {
        let mut input = Vec::new();
        io::stdin().read_to_end(&mut input).into_diagnostic()?;
        TermConsole::piped(&input)
    };
    let mut machine = Machine::new(console);

    if let Some(os) = os {
        file_message(Green, "Loading", os);
        let bytes = fs::read(os).into_diagnostic()?;
        image::load(&mut machine, &bytes).map_err(|e| error::load_failed(os, e))?;
    }

    file_message(Green, "Loading", name);
    let bytes = fs::read(name).into_diagnostic()?;
    let base = image::load(&mut machine, &bytes).map_err(|e| error::load_failed(name, e))?;
    machine.set_pc(base);

    message(Green, "Running", "loaded image");
    let mut pump = match quota {
        Some(quota) => Pump::with_quota(machine, quota),
        None => Pump::new(machine),
    };
    pump.start();

    if interactive {
        term::enable_raw_mode();
    }
    let outcome = drive(&mut pump, interactive);
    if interactive {
        term::disable_raw_mode();
    }
    outcome?;

    file_message(Green, "Completed", name);
    Ok(())
}

/// Frame driver: one bounded batch per frame, key events drained in the gaps.
fn drive(pump: &mut Pump<TermConsole>, interactive: bool) -> Result<()> {
    const FRAME: Duration = Duration::from_millis(16);

    loop {
        let deadline = Instant::now() + FRAME;
        match pump.frame() {
            Frame::Continue => {
                if !interactive {
                    continue;
                }
                // Spend the rest of the frame collecting keys
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match term::poll_key(remaining) {
                        Some(code) => {
                            pump.machine_mut().console_mut().push_code(code);
                            pump.interrupt();
                        }
                        None => break,
                    }
                }
            }
            Frame::Waiting => {
                if !interactive {
                    // Piped input is exhausted; nothing will ever arrive
                    message(MsgColor::Cyan, "Stopped", "machine is waiting on input");
                    return Ok(());
                }
                let code = term::wait_key();
                pump.machine_mut().console_mut().push_code(code);
                pump.interrupt();
            }
            Frame::Halted | Frame::Idle => return Ok(()),
            Frame::Fault(fault) => return Err(error::machine_fault(fault)),
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

const SHORT_INFO: &str = r"
Welcome to bobbin, a small LC3 virtual machine for the terminal.
Provide a binary image to run it, or use `-h` or `--help` to access the
usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
