//! Binary decoder: a pure function from a 32-bit machine word to a
//! decoded [`Instruction`].
//!
//! Bit-field extraction follows the teacher's `extract_bit_range`
//! idiom (`johnrscott-riscvemu/src/fields.rs`), but sign extension uses
//! safe `as` casts rather than `mem::transmute`, consistent with this
//! crate forbidding unsafe code.

use crate::instr::{Instruction, Target};

fn extract_bit_range(word: u32, start: u32, width: u32) -> u32 {
    let mask = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
    mask & (word >> start)
}

fn opcode(word: u32) -> u32 {
    extract_bit_range(word, 26, 6)
}

fn rs(word: u32) -> u8 {
    extract_bit_range(word, 21, 5) as u8
}

fn rt(word: u32) -> u8 {
    extract_bit_range(word, 16, 5) as u8
}

fn rd(word: u32) -> u8 {
    extract_bit_range(word, 11, 5) as u8
}

fn shamt(word: u32) -> u8 {
    extract_bit_range(word, 6, 5) as u8
}

fn funct(word: u32) -> u32 {
    extract_bit_range(word, 0, 6)
}

fn imm16(word: u32) -> i16 {
    extract_bit_range(word, 0, 16) as u16 as i16
}

fn imm16u(word: u32) -> u16 {
    extract_bit_range(word, 0, 16) as u16
}

fn target26(word: u32) -> u32 {
    extract_bit_range(word, 0, 26)
}

mod opcodes {
    pub const R_TYPE: u32 = 0x00;
    pub const J: u32 = 0x02;
    pub const JAL: u32 = 0x03;
    pub const BEQ: u32 = 0x04;
    pub const BNE: u32 = 0x05;
    pub const BLEZ: u32 = 0x06;
    pub const BGTZ: u32 = 0x07;
    pub const ADDI: u32 = 0x08;
    pub const ADDIU: u32 = 0x09;
    pub const SLTI: u32 = 0x0a;
    pub const SLTIU: u32 = 0x0b;
    pub const ANDI: u32 = 0x0c;
    pub const ORI: u32 = 0x0d;
    pub const XORI: u32 = 0x0e;
    pub const LLO: u32 = 0x18;
    pub const LHI: u32 = 0x19;
    pub const TRAP: u32 = 0x1a;
    pub const LB: u32 = 0x20;
    pub const LH: u32 = 0x21;
    pub const LW: u32 = 0x23;
    pub const LBU: u32 = 0x24;
    pub const LHU: u32 = 0x25;
    pub const SB: u32 = 0x28;
    pub const SH: u32 = 0x29;
    pub const SW: u32 = 0x2b;
}

mod funct_codes {
    pub const SLL: u32 = 0x00;
    pub const SRL: u32 = 0x02;
    pub const SRA: u32 = 0x03;
    pub const SLLV: u32 = 0x04;
    pub const SRLV: u32 = 0x06;
    pub const SRAV: u32 = 0x07;
    pub const JR: u32 = 0x08;
    pub const JALR: u32 = 0x09;
    pub const SYSCALL: u32 = 0x0c;
    pub const MFHI: u32 = 0x10;
    pub const MTHI: u32 = 0x11;
    pub const MFLO: u32 = 0x12;
    pub const MTLO: u32 = 0x13;
    pub const MULT: u32 = 0x18;
    pub const MULTU: u32 = 0x19;
    pub const DIV: u32 = 0x1a;
    pub const DIVU: u32 = 0x1b;
    pub const ADD: u32 = 0x20;
    pub const ADDU: u32 = 0x21;
    pub const SUB: u32 = 0x22;
    pub const SUBU: u32 = 0x23;
    pub const AND: u32 = 0x24;
    pub const OR: u32 = 0x25;
    pub const XOR: u32 = 0x26;
    pub const NOR: u32 = 0x27;
    pub const SLT: u32 = 0x2a;
    pub const SLTU: u32 = 0x2b;
}

fn decode_r_type(word: u32) -> Option<Instruction> {
    use funct_codes::*;
    let (rs, rt, rd, shamt) = (self::rs(word), self::rt(word), self::rd(word), self::shamt(word));
    Some(match funct(word) {
        SLL => Instruction::Sll { rd, rt, shamt },
        SRL => Instruction::Srl { rd, rt, shamt },
        SRA => Instruction::Sra { rd, rt, shamt },
        SLLV => Instruction::Sllv { rd, rt, rs },
        SRLV => Instruction::Srlv { rd, rt, rs },
        SRAV => Instruction::Srav { rd, rt, rs },
        JR => Instruction::Jr { rs },
        JALR => Instruction::Jalr { rd, rs },
        SYSCALL => Instruction::Syscall,
        MFHI => Instruction::Mfhi { rd },
        MTHI => Instruction::Mthi { rs },
        MFLO => Instruction::Mflo { rd },
        MTLO => Instruction::Mtlo { rs },
        MULT => Instruction::Mult { rs, rt },
        MULTU => Instruction::Multu { rs, rt },
        DIV => Instruction::Div { rs, rt },
        DIVU => Instruction::Divu { rs, rt },
        ADD => Instruction::Add { rd, rs, rt },
        ADDU => Instruction::Addu { rd, rs, rt },
        SUB => Instruction::Sub { rd, rs, rt },
        SUBU => Instruction::Subu { rd, rs, rt },
        AND => Instruction::And { rd, rs, rt },
        OR => Instruction::Or { rd, rs, rt },
        XOR => Instruction::Xor { rd, rs, rt },
        NOR => Instruction::Nor { rd, rs, rt },
        SLT => Instruction::Slt { rd, rs, rt },
        SLTU => Instruction::Sltu { rd, rs, rt },
        _ => return None,
    })
}

/// Decode a 32-bit machine word into an [`Instruction`], or `None` if
/// the opcode/function combination is not recognized. Pure and
/// stateless: the same word always decodes the same way.
///
/// The label-form branch produced here (`beq`) carries a synthetic
/// label `label_<imm>`; it is never resolved unless the caller happens
/// to install a label map containing that exact key (per spec.md
/// §4.3 -- decode-then-execute flows do not produce label maps).
pub fn decode(word: u32) -> Option<Instruction> {
    use opcodes::*;

    match opcode(word) {
        R_TYPE => decode_r_type(word),
        J => Some(Instruction::J { target: Target::Offset(target26(word) as i32) }),
        JAL => Some(Instruction::Jal { target: Target::Offset(target26(word) as i32) }),
        BEQ => Some(Instruction::Beq {
            rs: rs(word),
            rt: rt(word),
            target: Target::Label(format!("label_{}", imm16(word))),
        }),
        BNE => Some(Instruction::Bne { rs: rs(word), rt: rt(word), offset: imm16(word) as i32 }),
        BLEZ => Some(Instruction::Blez { rs: rs(word), offset: imm16(word) as i32 }),
        BGTZ => Some(Instruction::Bgtz { rs: rs(word), offset: imm16(word) as i32 }),
        ADDI => Some(Instruction::Addi { rt: rt(word), rs: rs(word), imm: imm16(word) }),
        ADDIU => Some(Instruction::Addiu { rt: rt(word), rs: rs(word), imm: imm16(word) }),
        SLTI => Some(Instruction::Slti { rt: rt(word), rs: rs(word), imm: imm16(word) }),
        SLTIU => Some(Instruction::Sltiu { rt: rt(word), rs: rs(word), imm: imm16(word) }),
        ANDI => Some(Instruction::Andi { rt: rt(word), rs: rs(word), imm: imm16u(word) }),
        ORI => Some(Instruction::Ori { rt: rt(word), rs: rs(word), imm: imm16u(word) }),
        XORI => Some(Instruction::Xori { rt: rt(word), rs: rs(word), imm: imm16u(word) }),
        LLO => Some(Instruction::Llo { rt: rt(word), imm: imm16u(word) }),
        LHI => Some(Instruction::Lhi { rt: rt(word), imm: imm16u(word) }),
        TRAP => Some(Instruction::Trap { code: target26(word) }),
        LB => Some(Instruction::Lb { rt: rt(word), base: rs(word), offset: imm16(word) }),
        LH => Some(Instruction::Lh { rt: rt(word), base: rs(word), offset: imm16(word) }),
        LW => Some(Instruction::Lw { rt: rt(word), base: rs(word), offset: imm16(word) }),
        LBU => Some(Instruction::Lbu { rt: rt(word), base: rs(word), offset: imm16(word) }),
        LHU => Some(Instruction::Lhu { rt: rt(word), base: rs(word), offset: imm16(word) }),
        SB => Some(Instruction::Sb { rt: rt(word), base: rs(word), offset: imm16(word) }),
        SH => Some(Instruction::Sh { rt: rt(word), base: rs(word), offset: imm16(word) }),
        SW => Some(Instruction::Sw { rt: rt(word), base: rs(word), offset: imm16(word) }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r_type(funct: u32, rs: u32, rt: u32, rd: u32, shamt: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | (shamt << 6) | funct
    }

    fn i_type(opcode: u32, rs: u32, rt: u32, imm: u16) -> u32 {
        (opcode << 26) | (rs << 21) | (rt << 16) | (imm as u32)
    }

    #[test]
    fn decodes_add() {
        let word = r_type(funct_codes::ADD, 8, 9, 10, 0);
        let instr = decode(word).expect("should decode");
        assert_eq!(instr.name(), "add");
        assert_eq!(instr, Instruction::Add { rd: 10, rs: 8, rt: 9 });
    }

    #[test]
    fn decodes_addi_with_sign_extension() {
        let word = i_type(opcodes::ADDI, 0, 8, 0xffff);
        let instr = decode(word).unwrap();
        assert_eq!(instr, Instruction::Addi { rt: 8, rs: 0, imm: -1 });
    }

    #[test]
    fn decodes_sll_shift_amount() {
        let word = r_type(funct_codes::SLL, 0, 9, 10, 4);
        let instr = decode(word).unwrap();
        assert_eq!(instr, Instruction::Sll { rd: 10, rt: 9, shamt: 4 });
    }

    #[test]
    fn unknown_opcode_returns_none() {
        let word = 0b111111u32 << 26;
        assert_eq!(decode(word), None);
    }

    #[test]
    fn unknown_r_type_funct_returns_none() {
        let word = r_type(0x3f, 0, 0, 0, 0);
        assert_eq!(decode(word), None);
    }

    #[test]
    fn decodes_j_target() {
        let word = (opcodes::J << 26) | 0x123;
        let instr = decode(word).unwrap();
        assert_eq!(instr, Instruction::J { target: Target::Offset(0x123) });
    }

    #[test]
    fn decodes_beq_as_synthetic_label() {
        let word = i_type(opcodes::BEQ, 1, 2, 5);
        let instr = decode(word).unwrap();
        assert_eq!(
            instr,
            Instruction::Beq { rs: 1, rt: 2, target: Target::Label("label_5".to_string()) }
        );
    }
}
