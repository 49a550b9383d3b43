use crate::errors::{ZError, ZResult};
use crate::opcode_tables::{
    self, Opcode, OP0_OPCODES, OP1_OPCODES, OP2_OPCODES, VAR_OPCODES,
};
use crate::story::Story;
use crate::text;
use crate::util::signed_word;
use log::trace;

/// Operand types as encoded in the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

/// Instruction forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Variable,
}

/// Operand count categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
}

/// A variable reference: the evaluation stack, a routine local, or a
/// global. Stack reads pop; stack writes push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRef {
    Stack,
    /// Local variable, 1..15.
    Local(u8),
    /// Global variable, numbered 16..255.
    Global(u8),
}

impl VarRef {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => VarRef::Stack,
            1..=15 => VarRef::Local(byte),
            _ => VarRef::Global(byte),
        }
    }
}

/// A decoded operand. `Large` holds a `u32` because munged jump and call
/// operands are absolute byte addresses, which exceed 16 bits in files
/// larger than 64K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Large(u32),
    Small(u8),
    Variable(VarRef),
}

/// Where a taken branch transfers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget {
    ReturnFalse,
    ReturnTrue,
    Address(u32),
}

/// Branch specification: branch when the condition equals `sense`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub sense: bool,
    pub target: BranchTarget,
}

/// A decoded instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    /// Address of the opcode byte
    pub address: u32,
    /// Total length in bytes, including store, branch and inline text
    pub length: usize,
    pub operands: Vec<Operand>,
    pub store: Option<VarRef>,
    pub branch: Option<Branch>,
    /// Decoded inline text for print and print_ret
    pub text: Option<String>,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        opcode_tables::name(self.opcode)
    }

    /// Address of the instruction that follows this one in memory.
    pub fn next_address(&self) -> u32 {
        self.address + self.length as u32
    }
}

impl Story {
    /// Decode the instruction at `addr`.
    pub fn decode_instruction(&self, addr: u32) -> ZResult<Instruction> {
        decode_instruction(self, addr)
    }
}

/// Raw branch data before the total length is known; the final target is
/// resolved relative to the end of the whole instruction.
enum RawBranch {
    ReturnFalse(bool),
    ReturnTrue(bool),
    Offset(bool, i16),
}

/// Decode the instruction at `addr`.
pub fn decode_instruction(story: &Story, addr: u32) -> ZResult<Instruction> {
    let opcode_byte = story.read_byte(addr)?;
    let mut offset = addr + 1;

    // form from the top two bits
    let form = match opcode_byte >> 6 {
        0b11 => InstructionForm::Variable,
        0b10 => InstructionForm::Short,
        _ => InstructionForm::Long,
    };

    let (opcode, operand_count) = match form {
        InstructionForm::Long => (OP2_OPCODES[(opcode_byte & 0x1F) as usize], OperandCount::OP2),
        InstructionForm::Short => {
            if (opcode_byte >> 4) & 0x03 == 0x03 {
                (OP0_OPCODES[(opcode_byte & 0x0F) as usize], OperandCount::OP0)
            } else {
                (OP1_OPCODES[(opcode_byte & 0x0F) as usize], OperandCount::OP1)
            }
        }
        InstructionForm::Variable => {
            if opcode_byte & 0x20 == 0 {
                (OP2_OPCODES[(opcode_byte & 0x1F) as usize], OperandCount::OP2)
            } else {
                (VAR_OPCODES[(opcode_byte & 0x1F) as usize], OperandCount::VAR)
            }
        }
    };

    // operand types
    let mut operand_types = Vec::new();
    match form {
        InstructionForm::Long => {
            // one bit each: 0 = small constant, 1 = variable
            for bit in [0x40, 0x20] {
                operand_types.push(if opcode_byte & bit != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                });
            }
        }
        InstructionForm::Short => {
            if operand_count == OperandCount::OP1 {
                operand_types.push(OperandType::from_bits((opcode_byte >> 4) & 0x03));
            }
        }
        InstructionForm::Variable => {
            let type_byte = story.read_byte(offset)?;
            offset += 1;
            let mut omitted_seen = false;
            for i in 0..4 {
                let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
                if op_type == OperandType::Omitted {
                    omitted_seen = true;
                } else if omitted_seen {
                    return Err(ZError::BadOperandShape {
                        addr,
                        reason: "operand present after an omitted type field",
                    });
                } else {
                    operand_types.push(op_type);
                }
            }
        }
    }

    // operand values
    let mut operands = Vec::with_capacity(operand_types.len());
    for op_type in &operand_types {
        match op_type {
            OperandType::LargeConstant => {
                operands.push(Operand::Large(story.read_word(offset)? as u32));
                offset += 2;
            }
            OperandType::SmallConstant => {
                operands.push(Operand::Small(story.read_byte(offset)?));
                offset += 1;
            }
            OperandType::Variable => {
                operands.push(Operand::Variable(VarRef::from_byte(story.read_byte(offset)?)));
                offset += 1;
            }
            OperandType::Omitted => unreachable!("omitted types are never collected"),
        }
    }

    // store target
    let store = if opcode_tables::has_store(opcode) {
        let byte = story.read_byte(offset)?;
        offset += 1;
        Some(VarRef::from_byte(byte))
    } else {
        None
    };

    // branch bytes; target resolution waits for the total length
    let raw_branch = if opcode_tables::has_branch(opcode) {
        let first = story.read_byte(offset)?;
        offset += 1;
        let sense = first & 0x80 != 0;
        let branch_offset = if first & 0x40 != 0 {
            // short form: six unsigned bits
            (first & 0x3F) as i16
        } else {
            // long form: fourteen signed bits
            let second = story.read_byte(offset)?;
            offset += 1;
            let value = (((first & 0x3F) as i16) << 8) | second as i16;
            if value >= 8192 {
                value - 16384
            } else {
                value
            }
        };
        Some(match branch_offset {
            0 => RawBranch::ReturnFalse(sense),
            1 => RawBranch::ReturnTrue(sense),
            n => RawBranch::Offset(sense, n),
        })
    } else {
        None
    };

    // inline text
    let text = if opcode_tables::has_text(opcode) {
        let decoded = text::decode_string(story, offset)?;
        offset += decoded.length as u32;
        Some(decoded.text)
    } else {
        None
    };

    let length = (offset - addr) as usize;

    let branch = raw_branch.map(|raw| match raw {
        RawBranch::ReturnFalse(sense) => Branch {
            sense,
            target: BranchTarget::ReturnFalse,
        },
        RawBranch::ReturnTrue(sense) => Branch {
            sense,
            target: BranchTarget::ReturnTrue,
        },
        RawBranch::Offset(sense, n) => Branch {
            sense,
            target: BranchTarget::Address(
                (addr as i64 + length as i64 + n as i64 - 2) as u32,
            ),
        },
    });

    let operands = munge_operands(addr, length, opcode, operands)?;

    let instruction = Instruction {
        opcode,
        form,
        operand_count,
        address: addr,
        length,
        operands,
        store,
        branch,
        text,
    };
    trace!("decoded {} at {addr:#06x}, length {length}", instruction.name());
    Ok(instruction)
}

/// Post-decode operand fixups: a jump's large operand becomes the absolute
/// target address, and a call's large routine operand is unpacked.
fn munge_operands(
    addr: u32,
    length: usize,
    opcode: Opcode,
    mut operands: Vec<Operand>,
) -> ZResult<Vec<Operand>> {
    if opcode == Opcode::Jump {
        let target = match operands.as_slice() {
            [Operand::Large(w)] => *w,
            _ => {
                return Err(ZError::BadOperandShape {
                    addr,
                    reason: "jump needs a single large-constant operand",
                })
            }
        };
        let relative = signed_word(target as i32) as i64;
        operands[0] = Operand::Large((addr as i64 + length as i64 + relative - 2) as u32);
    } else if opcode_tables::is_call(opcode) && !operands.is_empty() {
        if let Operand::Large(packed) = operands[0] {
            operands[0] = Operand::Large(packed * 2);
        }
    }
    Ok(operands)
}
