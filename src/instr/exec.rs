//! Execution semantics for each supported mnemonic.
//!
//! `execute` is a single free function dispatching on the
//! [`Instruction`] tag. All instructions advance the program counter
//! by one word index unless they set it explicitly (branches, jumps).
//! Arithmetic is 32-bit wrapping; there is no overflow trap (see the
//! instruction-set component of the specification).

use super::{Instruction, Target};
use crate::assembler::LabelMap;
use crate::state::MachineState;

fn resolve_target(target: &Target, labels: &LabelMap) -> u32 {
    match target {
        Target::Offset(word_index) => *word_index as u32,
        Target::Label(name) => *labels.get(name).unwrap_or(&0),
    }
}

/// Execute `instr` against `state`, resolving any label operands
/// against `labels`. This is the only place instruction semantics are
/// implemented; instructions themselves carry no behavior.
pub fn execute(instr: &Instruction, state: &mut MachineState, labels: &LabelMap) {
    match instr {
        Instruction::Add { rd, rs, rt } => {
            let value = (state.read_reg(*rs) as i32).wrapping_add(state.read_reg(*rt) as i32);
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }
        Instruction::Sub { rd, rs, rt } => {
            let value = (state.read_reg(*rs) as i32).wrapping_sub(state.read_reg(*rt) as i32);
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }
        Instruction::Addu { rd, rs, rt } => {
            let value = state.read_reg(*rs).wrapping_add(state.read_reg(*rt));
            state.write_reg(*rd, value);
            state.increment_pc_word();
        }
        Instruction::Subu { rd, rs, rt } => {
            let value = state.read_reg(*rs).wrapping_sub(state.read_reg(*rt));
            state.write_reg(*rd, value);
            state.increment_pc_word();
        }
        Instruction::And { rd, rs, rt } => {
            state.write_reg(*rd, state.read_reg(*rs) & state.read_reg(*rt));
            state.increment_pc_word();
        }
        Instruction::Or { rd, rs, rt } => {
            state.write_reg(*rd, state.read_reg(*rs) | state.read_reg(*rt));
            state.increment_pc_word();
        }
        Instruction::Xor { rd, rs, rt } => {
            state.write_reg(*rd, state.read_reg(*rs) ^ state.read_reg(*rt));
            state.increment_pc_word();
        }
        Instruction::Nor { rd, rs, rt } => {
            state.write_reg(*rd, !(state.read_reg(*rs) | state.read_reg(*rt)));
            state.increment_pc_word();
        }
        Instruction::Slt { rd, rs, rt } => {
            let value = (state.read_reg(*rs) as i32) < (state.read_reg(*rt) as i32);
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }
        Instruction::Sltu { rd, rs, rt } => {
            let value = state.read_reg(*rs) < state.read_reg(*rt);
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }

        Instruction::Sll { rd, rt, shamt } => {
            state.write_reg(*rd, state.read_reg(*rt) << shamt);
            state.increment_pc_word();
        }
        Instruction::Srl { rd, rt, shamt } => {
            state.write_reg(*rd, state.read_reg(*rt) >> shamt);
            state.increment_pc_word();
        }
        Instruction::Sra { rd, rt, shamt } => {
            let value = (state.read_reg(*rt) as i32) >> shamt;
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }
        Instruction::Sllv { rd, rt, rs } => {
            let shamt = state.read_reg(*rs) & 0x1f;
            state.write_reg(*rd, state.read_reg(*rt) << shamt);
            state.increment_pc_word();
        }
        Instruction::Srlv { rd, rt, rs } => {
            let shamt = state.read_reg(*rs) & 0x1f;
            state.write_reg(*rd, state.read_reg(*rt) >> shamt);
            state.increment_pc_word();
        }
        Instruction::Srav { rd, rt, rs } => {
            let shamt = state.read_reg(*rs) & 0x1f;
            let value = (state.read_reg(*rt) as i32) >> shamt;
            state.write_reg(*rd, value as u32);
            state.increment_pc_word();
        }

        Instruction::Mult { rs, rt } => {
            let product = (state.read_reg(*rs) as i32 as i64) * (state.read_reg(*rt) as i32 as i64);
            state.write_hi((product >> 32) as u32);
            state.write_lo(product as u32);
            state.increment_pc_word();
        }
        Instruction::Multu { rs, rt } => {
            let product = (state.read_reg(*rs) as u64) * (state.read_reg(*rt) as u64);
            state.write_hi((product >> 32) as u32);
            state.write_lo(product as u32);
            state.increment_pc_word();
        }
        Instruction::Div { rs, rt } => {
            let dividend = state.read_reg(*rs) as i32;
            let divisor = state.read_reg(*rt) as i32;
            if divisor == 0 {
                state.write_hi(0);
                state.write_lo(0);
            } else {
                state.write_lo(dividend.wrapping_div(divisor) as u32);
                state.write_hi(dividend.wrapping_rem(divisor) as u32);
            }
            state.increment_pc_word();
        }
        Instruction::Divu { rs, rt } => {
            let dividend = state.read_reg(*rs);
            let divisor = state.read_reg(*rt);
            if divisor == 0 {
                state.write_hi(0);
                state.write_lo(0);
            } else {
                state.write_lo(dividend / divisor);
                state.write_hi(dividend % divisor);
            }
            state.increment_pc_word();
        }
        Instruction::Mfhi { rd } => {
            state.write_reg(*rd, state.read_hi());
            state.increment_pc_word();
        }
        Instruction::Mflo { rd } => {
            state.write_reg(*rd, state.read_lo());
            state.increment_pc_word();
        }
        Instruction::Mthi { rs } => {
            state.write_hi(state.read_reg(*rs));
            state.increment_pc_word();
        }
        Instruction::Mtlo { rs } => {
            state.write_lo(state.read_reg(*rs));
            state.increment_pc_word();
        }

        Instruction::Addi { rt, rs, imm } => {
            let value = (state.read_reg(*rs) as i32).wrapping_add(*imm as i32);
            state.write_reg(*rt, value as u32);
            state.increment_pc_word();
        }
        Instruction::Addiu { rt, rs, imm } => {
            let value = state.read_reg(*rs).wrapping_add(*imm as i32 as u32);
            state.write_reg(*rt, value);
            state.increment_pc_word();
        }
        Instruction::Slti { rt, rs, imm } => {
            let value = (state.read_reg(*rs) as i32) < (*imm as i32);
            state.write_reg(*rt, value as u32);
            state.increment_pc_word();
        }
        Instruction::Sltiu { rt, rs, imm } => {
            let value = state.read_reg(*rs) < (*imm as i32 as u32);
            state.write_reg(*rt, value as u32);
            state.increment_pc_word();
        }
        Instruction::Andi { rt, rs, imm } => {
            state.write_reg(*rt, state.read_reg(*rs) & (*imm as u32));
            state.increment_pc_word();
        }
        Instruction::Ori { rt, rs, imm } => {
            state.write_reg(*rt, state.read_reg(*rs) | (*imm as u32));
            state.increment_pc_word();
        }
        Instruction::Xori { rt, rs, imm } => {
            state.write_reg(*rt, state.read_reg(*rs) ^ (*imm as u32));
            state.increment_pc_word();
        }
        Instruction::Llo { rt, imm } => {
            let value = (state.read_reg(*rt) & 0xffff_0000) | (*imm as u32);
            state.write_reg(*rt, value);
            state.increment_pc_word();
        }
        Instruction::Lhi { rt, imm } => {
            let value = (state.read_reg(*rt) & 0x0000_ffff) | ((*imm as u32) << 16);
            state.write_reg(*rt, value);
            state.increment_pc_word();
        }

        Instruction::Lw { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_reg(*rt, state.read_word(addr));
            state.increment_pc_word();
        }
        Instruction::Sw { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_word(addr, state.read_reg(*rt));
            state.increment_pc_word();
        }
        Instruction::Lh { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            let value = state.read_half(addr) as u16 as i16 as i32 as u32;
            state.write_reg(*rt, value);
            state.increment_pc_word();
        }
        Instruction::Lhu { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_reg(*rt, state.read_half(addr));
            state.increment_pc_word();
        }
        Instruction::Sh { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_half(addr, state.read_reg(*rt));
            state.increment_pc_word();
        }
        Instruction::Lb { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            let value = state.read_byte(addr) as u8 as i8 as i32 as u32;
            state.write_reg(*rt, value);
            state.increment_pc_word();
        }
        Instruction::Lbu { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_reg(*rt, state.read_byte(addr));
            state.increment_pc_word();
        }
        Instruction::Sb { rt, base, offset } => {
            let addr = effective_address(state, *base, *offset);
            state.write_byte(addr, state.read_reg(*rt));
            state.increment_pc_word();
        }

        Instruction::Beq { rs, rt, target } => {
            if state.read_reg(*rs) == state.read_reg(*rt) {
                let dest = match target {
                    Target::Offset(offset) => branch_destination(state, *offset),
                    Target::Label(name) => *labels.get(name).unwrap_or(&0),
                };
                state.set_pc(dest);
            } else {
                state.increment_pc_word();
            }
        }
        Instruction::Bne { rs, rt, offset } => {
            if state.read_reg(*rs) != state.read_reg(*rt) {
                state.set_pc(branch_destination(state, *offset));
            } else {
                state.increment_pc_word();
            }
        }
        Instruction::Blez { rs, offset } => {
            if (state.read_reg(*rs) as i32) <= 0 {
                state.set_pc(branch_destination(state, *offset));
            } else {
                state.increment_pc_word();
            }
        }
        Instruction::Bgtz { rs, offset } => {
            if (state.read_reg(*rs) as i32) > 0 {
                state.set_pc(branch_destination(state, *offset));
            } else {
                state.increment_pc_word();
            }
        }

        Instruction::J { target } => {
            state.set_pc(resolve_target(target, labels));
        }
        Instruction::Jal { target } => {
            let return_address = state.get_pc().wrapping_add(1).wrapping_mul(4);
            state.write_reg(31, return_address);
            state.set_pc(resolve_target(target, labels));
        }
        Instruction::Jr { rs } => {
            state.set_pc(state.read_reg(*rs) / 4);
        }
        Instruction::Jalr { rd, rs } => {
            let return_address = state.get_pc().wrapping_add(1).wrapping_mul(4);
            state.write_reg(*rd, return_address);
            state.set_pc(state.read_reg(*rs) / 4);
        }

        Instruction::Syscall => {
            execute_syscall(state);
            state.increment_pc_word();
        }
        Instruction::Trap { code } => {
            state.console_append(&format!("TRAP: {code}"));
            state.increment_pc_word();
        }
    }
}

fn effective_address(state: &MachineState, base: u8, offset: i16) -> u32 {
    (state.read_reg(base) as i32).wrapping_add(offset as i32) as u32
}

fn branch_destination(state: &MachineState, offset: i32) -> u32 {
    (state.get_pc() as i32).wrapping_add(offset) as u32
}

/// Syscall numbers dispatched on the current value of register 2 ($v0).
mod syscall {
    pub const PRINT_INT: u32 = 1;
    pub const PRINT_STRING: u32 = 4;
    pub const READ_INT: u32 = 5;
    pub const EXIT: u32 = 10;
    pub const PRINT_CHARACTER: u32 = 11;
    pub const READ_CHARACTER: u32 = 12;
}

fn execute_syscall(state: &mut MachineState) {
    const A0: u8 = 4;
    const V0: u8 = 2;

    match state.read_reg(V0) {
        syscall::PRINT_INT => {
            let value = state.read_reg(A0);
            state.console_append(&value.to_string());
        }
        syscall::PRINT_STRING => {
            let mut addr = state.read_reg(A0);
            let mut bytes = Vec::new();
            loop {
                let byte = state.read_byte(addr) as u8;
                if byte == 0 {
                    break;
                }
                bytes.push(byte);
                addr = addr.wrapping_add(1);
            }
            state.console_append(&String::from_utf8_lossy(&bytes));
        }
        syscall::READ_INT => {
            let value = state.console_read_int();
            state.write_reg(V0, value);
        }
        syscall::EXIT => {
            state.terminate();
        }
        syscall::PRINT_CHARACTER => {
            let ch = (state.read_reg(A0) & 0xff) as u8 as char;
            state.console_append(&ch.to_string());
        }
        syscall::READ_CHARACTER => {
            let value = match state.console_read_byte() {
                Some(b) => b as u32,
                None => 0xffff_ffff,
            };
            state.write_reg(V0, value);
        }
        _ => {
            log::debug!("ignoring unknown syscall number {}", state.read_reg(V0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::LabelMap;

    fn empty_labels() -> LabelMap {
        LabelMap::new()
    }

    #[test]
    fn add_computes_sum_and_advances_pc() {
        let mut state = MachineState::new();
        state.write_reg(8, 5);
        state.write_reg(9, 10);
        execute(
            &Instruction::Add { rd: 10, rs: 8, rt: 9 },
            &mut state,
            &empty_labels(),
        );
        assert_eq!(state.read_reg(10), 15);
        assert_eq!(state.get_pc(), 1);
    }

    #[test]
    fn addi_sign_extends_negative_immediate() {
        let mut state = MachineState::new();
        execute(
            &Instruction::Addi { rt: 8, rs: 0, imm: -1 },
            &mut state,
            &empty_labels(),
        );
        assert_eq!(state.read_reg(8), 0xffff_ffff);
    }

    #[test]
    fn lhi_llo_build_a_full_word() {
        let mut state = MachineState::new();
        execute(
            &Instruction::Lhi { rt: 8, imm: 0xabcd },
            &mut state,
            &empty_labels(),
        );
        execute(
            &Instruction::Llo { rt: 8, imm: 0x1234 },
            &mut state,
            &empty_labels(),
        );
        assert_eq!(state.read_reg(8), 0xabcd_1234);
    }

    #[test]
    fn divide_by_zero_is_silent() {
        let mut state = MachineState::new();
        state.write_reg(8, 10);
        state.write_reg(9, 0);
        execute(&Instruction::Div { rs: 8, rt: 9 }, &mut state, &empty_labels());
        assert_eq!(state.read_hi(), 0);
        assert_eq!(state.read_lo(), 0);
    }

    #[test]
    fn beq_label_resolves_through_label_map() {
        let mut labels = LabelMap::new();
        labels.insert("target".to_string(), 42);
        let mut state = MachineState::new();
        state.write_reg(8, 5);
        state.write_reg(9, 5);
        execute(
            &Instruction::Beq {
                rs: 8,
                rt: 9,
                target: Target::Label("target".to_string()),
            },
            &mut state,
            &labels,
        );
        assert_eq!(state.get_pc(), 42);
    }

    #[test]
    fn beq_numeric_offset_is_pc_relative_not_absolute() {
        let mut state = MachineState::new();
        state.set_pc(10);
        state.write_reg(8, 5);
        state.write_reg(9, 5);
        execute(
            &Instruction::Beq { rs: 8, rt: 9, target: Target::Offset(3) },
            &mut state,
            &empty_labels(),
        );
        assert_eq!(state.get_pc(), 13);
    }

    #[test]
    fn bne_numeric_offset_is_word_index_arithmetic() {
        let mut state = MachineState::new();
        state.set_pc(10);
        state.write_reg(8, 1);
        state.write_reg(9, 2);
        execute(
            &Instruction::Bne { rs: 8, rt: 9, offset: 3 },
            &mut state,
            &empty_labels(),
        );
        assert_eq!(state.get_pc(), 13);
    }

    #[test]
    fn syscall_print_int_appends_unsigned_decimal() {
        let mut state = MachineState::new();
        state.write_reg(2, 1);
        state.write_reg(4, 42);
        execute(&Instruction::Syscall, &mut state, &empty_labels());
        assert_eq!(state.console_output(), "42");
    }

    #[test]
    fn syscall_exit_sets_terminated() {
        let mut state = MachineState::new();
        state.write_reg(2, 10);
        execute(&Instruction::Syscall, &mut state, &empty_labels());
        assert!(state.is_terminated());
    }

    #[test]
    fn syscall_print_string_reads_until_nul() {
        let mut state = MachineState::new();
        state.write_word(0x1000, u32::from_le_bytes([b'H', b'i', 0, 0]));
        state.write_reg(2, 4);
        state.write_reg(4, 0x1000);
        execute(&Instruction::Syscall, &mut state, &empty_labels());
        assert_eq!(state.console_output(), "Hi");
    }

    #[test]
    fn trap_appends_message_and_advances_pc() {
        let mut state = MachineState::new();
        execute(&Instruction::Trap { code: 7 }, &mut state, &empty_labels());
        assert_eq!(state.console_output(), "TRAP: 7");
        assert_eq!(state.get_pc(), 1);
    }

    #[test]
    fn jalr_defaults_behave_like_jal_through_register() {
        let mut state = MachineState::new();
        state.set_pc(4);
        state.write_reg(8, 40);
        execute(&Instruction::Jalr { rd: 31, rs: 8 }, &mut state, &empty_labels());
        assert_eq!(state.read_reg(31), 20);
        assert_eq!(state.get_pc(), 10);
    }
}
