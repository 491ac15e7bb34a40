//! Execution driver: owns the machine state, the assembled program
//! and label map, and the optional pipeline overlay.
//!
//! Grounded on the teacher's `Platform` (`johnrscott-riscvemu/src/platform.rs`)
//! and root `Cpu` (`johnrscott-riscvemu/src/cpu.rs`): both own
//! registers, memory, a program counter and an instruction source, and
//! expose `step`/`run`/`reset`. This driver adds the pipeline overlay
//! and a named `DEFAULT_MAX_CYCLES` safety bound for unbounded `run`
//! calls, since neither teacher method needed one (the teacher always
//! runs to an explicit halt or exception).

use thiserror::Error;

use crate::assembler::{assemble_with_labels, LabelMap, SkippedLine};
use crate::instr::{self, Instruction};
use crate::pipeline::{Pipeline, StageInfo};
use crate::state::MachineState;

/// Safety bound applied by [`ExecutionDriver::run`] when the caller
/// passes zero (or a negative cycle count): "until termination or a
/// safety bound chosen by the driver" per spec.md §4.5.
pub const DEFAULT_MAX_CYCLES: u32 = 1_000_000;

/// Why [`ExecutionDriver::load_program`] failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("assembled program produced no instructions")]
    Empty,
    #[error("assembly failed on {} line(s)", .0.len())]
    Assembly(Vec<SkippedLine>),
}

/// Owns the architectural machine state, the program being executed,
/// and (optionally) the pipeline visualization overlay.
///
/// `tick`/`step` execute exactly one instruction; `run` loops `tick`
/// under a cycle budget. Loading a new program does not reset
/// registers or memory; call [`ExecutionDriver::reset`] first if a
/// clean slate is wanted.
#[derive(Debug)]
pub struct ExecutionDriver {
    state: MachineState,
    instructions: Vec<Instruction>,
    labels: LabelMap,
    strict: bool,
    pipeline_mode: bool,
    pipeline: Pipeline,
}

impl Default for ExecutionDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionDriver {
    pub fn new() -> Self {
        Self {
            state: MachineState::new(),
            instructions: Vec::new(),
            labels: LabelMap::new(),
            strict: false,
            pipeline_mode: false,
            pipeline: Pipeline::new(),
        }
    }

    /// Reject the whole program on any line the assembler could not
    /// parse, instead of the default lenient "skip bad lines" policy.
    pub fn set_strict_mode(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Assemble `source` and replace the current instruction list and
    /// label map. Register/memory/console state is untouched; call
    /// [`ExecutionDriver::reset`] beforehand for a clean run.
    pub fn load_program(&mut self, source: &str) -> Result<(), LoadError> {
        let (instructions, labels, skipped) = assemble_with_labels(source);
        if self.strict && !skipped.is_empty() {
            return Err(LoadError::Assembly(skipped));
        }
        if instructions.is_empty() {
            return Err(LoadError::Empty);
        }
        for line in &skipped {
            log::warn!("line {}: {}", line.line, line.error);
        }
        self.instructions = instructions;
        self.labels = labels;
        Ok(())
    }

    /// Install a word list directly (the decoder's entry point,
    /// bypassing the assembler). Clears the label map, since the
    /// binary-word path carries no source-level labels (spec.md §2,
    /// "alternative entry").
    pub fn load_words(&mut self, instructions: Vec<Instruction>) {
        self.instructions = instructions;
        self.labels = LabelMap::new();
    }

    /// Execute the instruction at the current program counter, unless
    /// already terminated. An out-of-range program counter terminates
    /// the machine rather than panicking. Returns `true` if an
    /// instruction was executed.
    pub fn tick(&mut self) -> bool {
        if self.state.is_terminated() {
            return false;
        }
        let pc = self.state.get_pc() as usize;
        let fetched = self.instructions.get(pc);

        if self.pipeline_mode {
            self.pipeline.advance(fetched.map(|_| pc as u32));
        }

        match fetched {
            Some(instruction) => {
                log::trace!("tick: pc={pc} executing {instruction}");
                instr::execute(instruction, &mut self.state, &self.labels);
                true
            }
            None => {
                log::debug!("tick: pc={pc} out of range, terminating");
                self.state.terminate();
                false
            }
        }
    }

    /// Alias for [`ExecutionDriver::tick`] matching the driver-level
    /// API name in spec.md §6.
    pub fn step(&mut self) -> bool {
        self.tick()
    }

    /// Tick repeatedly until termination or `max_cycles` ticks have
    /// run, whichever comes first. `max_cycles == 0` (or negative,
    /// when the caller passes a signed count) means "run until
    /// termination or [`DEFAULT_MAX_CYCLES`]". Returns the number of
    /// ticks actually executed.
    pub fn run(&mut self, max_cycles: u32) -> u32 {
        let bound = if max_cycles == 0 { DEFAULT_MAX_CYCLES } else { max_cycles };
        let mut executed = 0;
        while !self.state.is_terminated() && executed < bound {
            self.tick();
            executed += 1;
        }
        executed
    }

    /// Zero all architectural state and clear the pipeline overlay.
    /// The loaded program and label map are left in place.
    pub fn reset(&mut self) {
        self.state.reset();
        self.pipeline.reset();
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    pub fn read_register(&self, i: u8) -> u32 {
        self.state.read_reg(i)
    }

    pub fn write_register(&mut self, i: u8, value: u32) {
        self.state.write_reg(i, value)
    }

    pub fn read_hi(&self) -> u32 {
        self.state.read_hi()
    }

    pub fn read_lo(&self) -> u32 {
        self.state.read_lo()
    }

    pub fn read_word(&self, addr: u32) -> u32 {
        self.state.read_word(addr)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.state.write_word(addr, value)
    }

    pub fn read_half(&self, addr: u32) -> u32 {
        self.state.read_half(addr)
    }

    pub fn write_half(&mut self, addr: u32, value: u32) {
        self.state.write_half(addr, value)
    }

    pub fn read_byte(&self, addr: u32) -> u32 {
        self.state.read_byte(addr)
    }

    pub fn write_byte(&mut self, addr: u32, value: u32) {
        self.state.write_byte(addr, value)
    }

    /// The program counter, as a word index into the loaded
    /// instruction list (not a byte address -- see the glossary).
    pub fn program_counter(&self) -> u32 {
        self.state.get_pc()
    }

    pub fn console_output(&self) -> &str {
        self.state.console_output()
    }

    pub fn clear_console_output(&mut self) {
        self.state.clear_console_output()
    }

    pub fn set_console_input(&mut self, text: &str) {
        self.state.set_console_input(text)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Toggle the 5-stage pipeline visualization overlay. Toggling
    /// never changes architectural state; it only starts or stops the
    /// bookkeeping `tick` does for [`ExecutionDriver::pipeline_stages`].
    pub fn set_pipeline_mode(&mut self, enabled: bool) {
        self.pipeline_mode = enabled;
        if !enabled {
            self.pipeline.reset();
        }
    }

    pub fn pipeline_mode(&self) -> bool {
        self.pipeline_mode
    }

    /// Snapshot of which instruction word index (if any) currently
    /// occupies each of the five pipeline stages (IF, ID, EX, MEM, WB).
    pub fn pipeline_stages(&self) -> [StageInfo; 5] {
        self.pipeline.stages()
    }
}
