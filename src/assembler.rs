//! Two-pass text assembler: turns MIPS32 assembly source into a
//! vector of [`Instruction`]s plus a label -> word-index map.
//!
//! The first pass walks the source recording which lines are
//! instructions and which labels point at which word index (or at
//! data, in which case they do not consume an instruction slot). The
//! second pass parses each recorded instruction line in isolation.
//!
//! This assembler is lenient (see DESIGN.md): a malformed line yields
//! no instruction and assembly continues with the remaining lines.
//! `assemble_with_labels` reports the line number and cause of every
//! line it skipped so a strict-mode caller (the execution driver, or
//! ultimately the CLI) can reject the whole program if it wants to.

use std::collections::HashMap;

use thiserror::Error;

use crate::instr::{Instruction, Target};

/// Label name -> word index of the instruction the label addresses.
pub type LabelMap = HashMap<String, u32>;

/// A contiguous run of bytes to be installed at a labeled data
/// address when the program is loaded, built from `.word`/`.byte`/
/// `.asciiz` directives. Data *contents* are a supplement over the
/// core's distilled scope (see SPEC_FULL.md §4.4); the core spec only
/// requires that labels pointing at data not consume an instruction
/// slot, which the first pass below handles independently of this type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSegment {
    pub bytes: Vec<u8>,
}

/// Parse the `.word`/`.byte`/`.asciiz` directives in `source` into one
/// [`DataSegment`] per preceding label, in source order. A directive
/// with no label above it (and nothing after the previous one) is
/// dropped; this mirrors the first pass, which only tracks labels, not
/// anonymous data.
///
/// Malformed directive arguments are skipped individually rather than
/// failing the whole segment, consistent with the assembler's lenient
/// policy.
pub fn parse_data_segments(source: &str) -> Vec<(String, DataSegment)> {
    let mut segments = Vec::new();
    let mut current_label: Option<String> = None;

    for raw_line in source.lines() {
        let line = normalize(raw_line);
        if line.is_empty() {
            continue;
        }
        if let Some(label) = line.strip_suffix(':') {
            current_label = Some(label.trim().to_string());
            continue;
        }
        let Some(label) = current_label.clone() else { continue };
        let mut tokens = tokenize(line).into_iter();
        let directive = match tokens.next() {
            Some(d) => d,
            None => continue,
        };
        let rest: Vec<&str> = tokens.collect();
        let bytes = match directive {
            ".word" => rest
                .iter()
                .filter_map(|tok| parse_immediate(strip_comma(tok)))
                .flat_map(|v| (v as u32).to_le_bytes())
                .collect(),
            ".byte" => rest
                .iter()
                .filter_map(|tok| parse_immediate(strip_comma(tok)))
                .map(|v| v as u8)
                .collect(),
            ".asciiz" => {
                let joined = rest.join(" ");
                let literal = joined.trim().trim_matches('"');
                let mut bytes: Vec<u8> = literal.bytes().collect();
                bytes.push(0);
                bytes
            }
            _ => continue,
        };
        let entry = segments
            .iter_mut()
            .find(|(name, _): &&mut (String, DataSegment)| *name == label);
        match entry {
            Some((_, segment)) => segment.bytes.extend(bytes),
            None => segments.push((label, DataSegment { bytes })),
        }
    }

    segments
}

/// Why a single assembly line failed to produce an instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),
    #[error("bad register operand '{0}'")]
    BadRegister(String),
    #[error("bad immediate operand '{0}'")]
    BadImmediate(String),
    #[error("shift amount '{0}' is out of range 0..31")]
    BadShiftAmount(String),
    #[error("missing operand in '{0}'")]
    MissingOperand(String),
}

/// A source line skipped during lenient assembly, with its 1-indexed
/// line number and the reason it could not be assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub error: AssembleError,
}

fn normalize(line: &str) -> &str {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    without_comment.trim()
}

fn is_data_directive(line: &str) -> bool {
    const DIRECTIVES: [&str; 3] = [".word", ".byte", ".asciiz"];
    DIRECTIVES.iter().any(|directive| {
        line.strip_prefix(directive)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}

struct RecordedLine {
    line_number: usize,
    text: String,
}

/// First pass: walk normalized, non-blank lines, building the label
/// map and the list of lines that will be parsed as instructions in
/// the second pass.
fn first_pass(source: &str) -> (Vec<RecordedLine>, LabelMap) {
    let mut instructions = Vec::new();
    let mut labels = LabelMap::new();
    let mut instruction_index: u32 = 0;

    let normalized: Vec<(usize, &str)> = source
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, normalize(line)))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    for &(line_number, line) in normalized.iter() {
        if let Some(label) = line.strip_suffix(':') {
            // A label always addresses the current instruction_index,
            // whether that slot ends up holding an instruction or data;
            // the data-directive check below is what suppresses the
            // *increment* so data labels don't eat an instruction slot.
            labels.entry(label.trim().to_string()).or_insert(instruction_index);
            continue;
        }
        if is_data_directive(line) {
            continue;
        }
        instructions.push(RecordedLine { line_number, text: line.to_string() });
        instruction_index += 1;
    }

    (instructions, labels)
}

const REGISTER_NAMES: &[(&str, u8)] = &[
    ("$zero", 0),
    ("$at", 1),
    ("$v0", 2),
    ("$v1", 3),
    ("$a0", 4),
    ("$a1", 5),
    ("$a2", 6),
    ("$a3", 7),
    ("$t0", 8),
    ("$t1", 9),
    ("$t2", 10),
    ("$t3", 11),
    ("$t4", 12),
    ("$t5", 13),
    ("$t6", 14),
    ("$t7", 15),
    ("$s0", 16),
    ("$s1", 17),
    ("$s2", 18),
    ("$s3", 19),
    ("$s4", 20),
    ("$s5", 21),
    ("$s6", 22),
    ("$s7", 23),
    ("$t8", 24),
    ("$t9", 25),
    ("$k0", 26),
    ("$k1", 27),
    ("$gp", 28),
    ("$sp", 29),
    ("$fp", 30),
    ("$ra", 31),
];

fn parse_register(token: &str) -> Option<u8> {
    REGISTER_NAMES
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, index)| *index)
}

fn parse_immediate(token: &str) -> Option<i64> {
    let (sign, rest) = match token.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        rest.parse::<i64>().ok()?
    };
    Some(sign * magnitude)
}

fn strip_comma(token: &str) -> &str {
    token.trim_end_matches(',')
}

/// Split a load/store memory operand of the form `imm(reg)` into its
/// immediate and register parts.
fn parse_memory_operand(token: &str) -> Option<(i64, &str)> {
    let open = token.find('(')?;
    let close = token.find(')')?;
    if close <= open {
        return None;
    }
    let imm_text = &token[..open];
    let imm = if imm_text.is_empty() { 0 } else { parse_immediate(imm_text)? };
    let reg_text = &token[open + 1..close];
    Some((imm, reg_text))
}

struct Operands<'a> {
    tokens: Vec<&'a str>,
}

impl<'a> Operands<'a> {
    fn new(tokens: Vec<&'a str>) -> Self {
        Self { tokens }
    }

    fn reg(&self, idx: usize, whole_line: &str) -> Result<u8, AssembleError> {
        let token = self
            .tokens
            .get(idx)
            .ok_or_else(|| AssembleError::MissingOperand(whole_line.to_string()))?;
        parse_register(strip_comma(token)).ok_or_else(|| AssembleError::BadRegister(token.to_string()))
    }

    fn imm(&self, idx: usize, whole_line: &str) -> Result<i64, AssembleError> {
        let token = self
            .tokens
            .get(idx)
            .ok_or_else(|| AssembleError::MissingOperand(whole_line.to_string()))?;
        let clean = strip_comma(token);
        parse_immediate(clean).ok_or_else(|| AssembleError::BadImmediate(token.to_string()))
    }

    fn label_or_offset(&self, idx: usize, whole_line: &str) -> Result<Target, AssembleError> {
        let token = self
            .tokens
            .get(idx)
            .ok_or_else(|| AssembleError::MissingOperand(whole_line.to_string()))?;
        let clean = strip_comma(token);
        match parse_immediate(clean) {
            Some(value) => Ok(Target::Offset(value as i32)),
            None => Ok(Target::Label(clean.to_string())),
        }
    }

    fn memory(&self, idx: usize, whole_line: &str) -> Result<(i16, u8), AssembleError> {
        let token = self
            .tokens
            .get(idx)
            .ok_or_else(|| AssembleError::MissingOperand(whole_line.to_string()))?;
        let clean = strip_comma(token);
        let (imm, reg_text) = parse_memory_operand(clean)
            .ok_or_else(|| AssembleError::MissingOperand(token.to_string()))?;
        let reg = parse_register(reg_text).ok_or_else(|| AssembleError::BadRegister(reg_text.to_string()))?;
        Ok((imm as i16, reg))
    }
}

/// Split a line into tokens on whitespace *and* commas, so that both
/// `addi $t0,$zero,5` (no space after the comma, as in spec.md's seed
/// scenarios) and `addi $t0, $zero, 5` tokenize into the same operand
/// list. Memory operands (`4($sp)`) have no comma inside them, so they
/// survive as a single token.
fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .collect()
}

fn parse_line(line: &str) -> Result<Instruction, AssembleError> {
    let mut tokens = tokenize(line).into_iter();
    let mnemonic = tokens.next().ok_or_else(|| AssembleError::MissingOperand(line.to_string()))?;
    let operands = Operands::new(tokens.collect());

    macro_rules! rrr {
        ($variant:ident) => {{
            Ok(Instruction::$variant {
                rd: operands.reg(0, line)?,
                rs: operands.reg(1, line)?,
                rt: operands.reg(2, line)?,
            })
        }};
    }
    macro_rules! shift_const {
        ($variant:ident) => {{
            let rd = operands.reg(0, line)?;
            let rt = operands.reg(1, line)?;
            let shamt = operands.imm(2, line)?;
            if !(0..=31).contains(&shamt) {
                return Err(AssembleError::BadShiftAmount(shamt.to_string()));
            }
            Ok(Instruction::$variant { rd, rt, shamt: shamt as u8 })
        }};
    }
    macro_rules! shift_var {
        ($variant:ident) => {{
            Ok(Instruction::$variant {
                rd: operands.reg(0, line)?,
                rt: operands.reg(1, line)?,
                rs: operands.reg(2, line)?,
            })
        }};
    }
    macro_rules! muldiv {
        ($variant:ident) => {{
            Ok(Instruction::$variant { rs: operands.reg(0, line)?, rt: operands.reg(1, line)? })
        }};
    }
    macro_rules! itype_signed {
        ($variant:ident) => {{
            let rt = operands.reg(0, line)?;
            let rs = operands.reg(1, line)?;
            let imm = operands.imm(2, line)?;
            Ok(Instruction::$variant { rt, rs, imm: imm as i16 })
        }};
    }
    macro_rules! itype_unsigned {
        ($variant:ident) => {{
            let rt = operands.reg(0, line)?;
            let rs = operands.reg(1, line)?;
            let imm = operands.imm(2, line)?;
            Ok(Instruction::$variant { rt, rs, imm: imm as u16 })
        }};
    }
    macro_rules! load_store {
        ($variant:ident) => {{
            let rt = operands.reg(0, line)?;
            let (offset, base) = operands.memory(1, line)?;
            Ok(Instruction::$variant { rt, base, offset })
        }};
    }

    match mnemonic {
        "add" => rrr!(Add),
        "sub" => rrr!(Sub),
        "addu" => rrr!(Addu),
        "subu" => rrr!(Subu),
        "and" => rrr!(And),
        "or" => rrr!(Or),
        "xor" => rrr!(Xor),
        "nor" => rrr!(Nor),
        "slt" => rrr!(Slt),
        "sltu" => rrr!(Sltu),

        "sll" => shift_const!(Sll),
        "srl" => shift_const!(Srl),
        "sra" => shift_const!(Sra),
        "sllv" => shift_var!(Sllv),
        "srlv" => shift_var!(Srlv),
        "srav" => shift_var!(Srav),

        "mult" => muldiv!(Mult),
        "multu" => muldiv!(Multu),
        "div" => muldiv!(Div),
        "divu" => muldiv!(Divu),
        "mfhi" => Ok(Instruction::Mfhi { rd: operands.reg(0, line)? }),
        "mflo" => Ok(Instruction::Mflo { rd: operands.reg(0, line)? }),
        "mthi" => Ok(Instruction::Mthi { rs: operands.reg(0, line)? }),
        "mtlo" => Ok(Instruction::Mtlo { rs: operands.reg(0, line)? }),

        "addi" => itype_signed!(Addi),
        "addiu" => itype_signed!(Addiu),
        "slti" => itype_signed!(Slti),
        "sltiu" => itype_signed!(Sltiu),
        "andi" => itype_unsigned!(Andi),
        "ori" => itype_unsigned!(Ori),
        "xori" => itype_unsigned!(Xori),
        "llo" => {
            let rt = operands.reg(0, line)?;
            let imm = operands.imm(1, line)?;
            Ok(Instruction::Llo { rt, imm: imm as u16 })
        }
        "lhi" => {
            let rt = operands.reg(0, line)?;
            let imm = operands.imm(1, line)?;
            Ok(Instruction::Lhi { rt, imm: imm as u16 })
        }

        "lw" => load_store!(Lw),
        "sw" => load_store!(Sw),
        "lh" => load_store!(Lh),
        "lhu" => load_store!(Lhu),
        "sh" => load_store!(Sh),
        "lb" => load_store!(Lb),
        "lbu" => load_store!(Lbu),
        "sb" => load_store!(Sb),

        "beq" => {
            let rs = operands.reg(0, line)?;
            let rt = operands.reg(1, line)?;
            let target = operands.label_or_offset(2, line)?;
            Ok(Instruction::Beq { rs, rt, target })
        }
        "bne" => {
            let rs = operands.reg(0, line)?;
            let rt = operands.reg(1, line)?;
            let offset = operands.imm(2, line)?;
            Ok(Instruction::Bne { rs, rt, offset: offset as i32 })
        }
        "blez" => {
            let rs = operands.reg(0, line)?;
            let offset = operands.imm(1, line)?;
            Ok(Instruction::Blez { rs, offset: offset as i32 })
        }
        "bgtz" => {
            let rs = operands.reg(0, line)?;
            let offset = operands.imm(1, line)?;
            Ok(Instruction::Bgtz { rs, offset: offset as i32 })
        }

        "j" => Ok(Instruction::J { target: operands.label_or_offset(0, line)? }),
        "jal" => Ok(Instruction::Jal { target: operands.label_or_offset(0, line)? }),
        "jr" => Ok(Instruction::Jr { rs: operands.reg(0, line)? }),
        "jalr" => {
            if operands.tokens.len() >= 2 {
                let rd = operands.reg(0, line)?;
                let rs = operands.reg(1, line)?;
                Ok(Instruction::Jalr { rd, rs })
            } else {
                Ok(Instruction::Jalr { rd: 31, rs: operands.reg(0, line)? })
            }
        }

        "syscall" => Ok(Instruction::Syscall),
        "trap" => {
            let code = operands.imm(0, line)?;
            Ok(Instruction::Trap { code: code as u32 })
        }

        other => Err(AssembleError::UnknownMnemonic(other.to_string())),
    }
}

/// Assemble `source`, returning every instruction that parsed
/// successfully along with the label map built by the first pass, and
/// the lines skipped due to a parse failure. This is the operation the
/// execution driver consumes.
pub fn assemble_with_labels(source: &str) -> (Vec<Instruction>, LabelMap, Vec<SkippedLine>) {
    let (recorded, labels) = first_pass(source);
    let mut instructions = Vec::with_capacity(recorded.len());
    let mut skipped = Vec::new();

    for line in recorded {
        match parse_line(&line.text) {
            Ok(instr) => instructions.push(instr),
            Err(error) => {
                log::warn!("skipping line {}: {error}", line.line_number);
                skipped.push(SkippedLine { line: line.line_number, error });
            }
        }
    }

    (instructions, labels, skipped)
}

/// Assemble `source`, discarding the label map and any skipped-line
/// diagnostics. A convenience wrapper over [`assemble_with_labels`].
pub fn assemble(source: &str) -> Vec<Instruction> {
    assemble_with_labels(source).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_seed_scenario_one() {
        let source = "addi $t0,$zero,5\naddi $t1,$zero,10\nadd $t2,$t0,$t1\n";
        let instructions = assemble(source);
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[2].name(), "add");
    }

    #[test]
    fn labels_address_the_next_instruction() {
        let source = "target:\naddi $t0,$zero,1\n";
        let (_, labels, _) = assemble_with_labels(source);
        assert_eq!(labels.get("target"), Some(&0));
    }

    #[test]
    fn labels_before_data_directives_do_not_consume_a_slot() {
        let source = "addi $t0,$zero,1\ndata_label:\n.word 5\naddi $t1,$zero,2\n";
        let (instructions, labels, _) = assemble_with_labels(source);
        assert_eq!(instructions.len(), 2);
        assert_eq!(labels.get("data_label"), Some(&1));
    }

    #[test]
    fn directive_lookalike_mnemonic_is_not_mistaken_for_data() {
        // ".wordlist" merely starts with ".word" but is not the directive;
        // it must fall through to the second pass and fail as an unknown
        // mnemonic instead of being silently dropped with no diagnostic.
        let source = ".wordlist 5\naddi $t0,$zero,1\n";
        let (instructions, _, skipped) = assemble_with_labels(source);
        assert_eq!(instructions.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 1);
        assert!(matches!(skipped[0].error, AssembleError::UnknownMnemonic(_)));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let source = "# a comment\n\naddi $t0,$zero,1 # trailing\n";
        let instructions = assemble(source);
        assert_eq!(instructions.len(), 1);
    }

    #[test]
    fn unknown_mnemonic_is_skipped_leniently() {
        let source = "frobnicate $t0,$t1,$t2\naddi $t0,$zero,1\n";
        let (instructions, _, skipped) = assemble_with_labels(source);
        assert_eq!(instructions.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 1);
    }

    #[test]
    fn out_of_range_shift_amount_is_skipped() {
        let source = "sll $t0,$t1,40\n";
        let (instructions, _, skipped) = assemble_with_labels(source);
        assert!(instructions.is_empty());
        assert_eq!(skipped.len(), 1);
        assert!(matches!(skipped[0].error, AssembleError::BadShiftAmount(_)));
    }

    #[test]
    fn hex_and_negative_immediates_parse() {
        let source = "lhi $t0,0xABCD\naddi $t1,$zero,-1\n";
        let instructions = assemble(source);
        assert_eq!(
            instructions[0],
            Instruction::Lhi { rt: 8, imm: 0xABCD }
        );
        assert_eq!(instructions[1], Instruction::Addi { rt: 9, rs: 0, imm: -1 });
    }

    #[test]
    fn memory_operand_form_parses_offset_and_base() {
        let source = "sw $t0,4($sp)\n";
        let instructions = assemble(source);
        assert_eq!(instructions[0], Instruction::Sw { rt: 8, base: 29, offset: 4 });
    }

    #[test]
    fn beq_with_label_operand_stores_label_target() {
        let source = "beq $t0,$t1,target\n";
        let instructions = assemble(source);
        assert_eq!(
            instructions[0],
            Instruction::Beq { rs: 8, rt: 9, target: Target::Label("target".to_string()) }
        );
    }

    #[test]
    fn jalr_defaults_rd_to_ra_when_omitted() {
        let source = "jalr $t0\n";
        let instructions = assemble(source);
        assert_eq!(instructions[0], Instruction::Jalr { rd: 31, rs: 8 });
    }

    #[test]
    fn bad_register_token_is_skipped() {
        let source = "add $t0,$bogus,$t1\n";
        let (instructions, _, skipped) = assemble_with_labels(source);
        assert!(instructions.is_empty());
        assert!(matches!(skipped[0].error, AssembleError::BadRegister(_)));
    }

    #[test]
    fn data_segment_parses_asciiz_with_nul_terminator() {
        let source = "greeting:\n.asciiz \"Hi\"\n";
        let segments = parse_data_segments(source);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, "greeting");
        assert_eq!(segments[0].1.bytes, vec![b'H', b'i', 0]);
    }

    #[test]
    fn data_segment_parses_word_list_little_endian() {
        let source = "values:\n.word 0xDEADBEEF\n";
        let segments = parse_data_segments(source);
        assert_eq!(segments[0].1.bytes, 0xDEADBEEFu32.to_le_bytes().to_vec());
    }
}
