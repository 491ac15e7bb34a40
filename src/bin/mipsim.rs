//! Command-line front end for the MIPS32 simulation kernel.
//!
//! This binary is a thin external collaborator (spec.md §1): it reads
//! a file, maps exit codes, and does line-based console I/O. It
//! contains no simulation semantics of its own -- everything here
//! calls through [`mips32emu::driver::ExecutionDriver`].
//!
//! Grounded on the teacher's `src/bin/emulate.rs`: a `clap::Parser`
//! struct for arguments, a `--debug` single-step mode that prints
//! state and waits for Enter between instructions, matching the
//! teacher's `press_enter_to_continue` idiom.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use mips32emu::driver::ExecutionDriver;

/// Run a MIPS32 assembly program.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an assembly source file
    input: String,

    /// Cycle budget passed to `run` (0 means the driver's own safety bound)
    #[arg(short, long, default_value_t = 0)]
    cycles: u32,

    /// Single-step through each instruction, printing state and
    /// waiting for Enter between ticks
    #[arg(short, long)]
    debug: bool,

    /// Reject the whole program if any line fails to assemble, instead
    /// of skipping bad lines
    #[arg(short, long)]
    strict: bool,

    /// Run with the 5-stage pipeline visualization overlay enabled
    #[arg(short, long)]
    pipeline: bool,
}

// EXIT_ARGUMENT_ERROR (2) is clap's own exit code on a parse failure;
// clap::Parser::parse() exits the process directly, so this binary
// never needs to construct that code itself.
const EXIT_SUCCESS: u8 = 0;
const EXIT_IO_ERROR: u8 = 3;
const EXIT_RUNTIME_ERROR: u8 = 4;

fn press_enter_to_continue() {
    let mut stdout = io::stdout();
    let _ = write!(stdout, "Press enter to continue...");
    let _ = stdout.flush();
    let mut byte = [0u8; 1];
    let _ = io::stdin().read(&mut byte);
}

fn print_state(driver: &ExecutionDriver) {
    println!("pc={}", driver.program_counter());
    for reg in 0..32 {
        print!("r{reg}={:#010x} ", driver.read_register(reg));
        if reg % 4 == 3 {
            println!();
        }
    }
    if driver.pipeline_mode() {
        let stages = driver.pipeline_stages();
        for (name, stage) in mips32emu::pipeline::STAGE_NAMES.iter().zip(stages) {
            print!("{name}:{:?} ", stage.instruction_index);
        }
        println!();
    }
}

fn run() -> Result<u8, u8> {
    let args = Args::parse();

    let source = std::fs::read_to_string(&args.input).map_err(|err| {
        eprintln!("error reading {}: {err}", args.input);
        EXIT_IO_ERROR
    })?;

    let mut driver = ExecutionDriver::new();
    driver.set_strict_mode(args.strict);
    driver.set_pipeline_mode(args.pipeline);

    driver.load_program(&source).map_err(|err| {
        eprintln!("error assembling {}: {err}", args.input);
        EXIT_RUNTIME_ERROR
    })?;

    if args.debug {
        loop {
            print_state(&driver);
            if !driver.step() {
                break;
            }
            press_enter_to_continue();
        }
    } else {
        driver.run(args.cycles);
    }

    print!("{}", driver.console_output());
    let _ = io::stdout().flush();

    if driver.is_terminated() {
        Ok(EXIT_SUCCESS)
    } else {
        eprintln!("program did not terminate within the cycle budget");
        Err(EXIT_RUNTIME_ERROR)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(code) => ExitCode::from(code),
    }
}
