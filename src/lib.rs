#![forbid(unsafe_code)]

//! A MIPS32 instruction-set simulator core.
//!
//! This crate implements the simulation kernel: an architectural
//! machine state, the supported MIPS32 instruction subset, a binary
//! decoder, a two-pass text assembler, and a fetch-execute driver with
//! both single-cycle and pipelined (didactic, non-timing-accurate)
//! modes. Command-line and graphical front ends are expected to be
//! built on top of the [`driver`] module's public surface.

pub mod assembler;
pub mod decode;
pub mod driver;
pub mod instr;
pub mod pipeline;
pub mod state;

pub use assembler::{assemble, assemble_with_labels, AssembleError, LabelMap};
pub use decode::decode;
pub use driver::{ExecutionDriver, LoadError};
pub use instr::Instruction;
pub use state::MachineState;
