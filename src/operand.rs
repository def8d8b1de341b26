use thiserror::Error;

use crate::insn::{Constant, Instruction};
use crate::opcodes;

/// Raised when an instruction expected to push an integer has another shape.
/// Passes check [`is_int_push`] first, so this signals a mis-identified site.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum OperandError {
    #[error("unsupported integer encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Integer pushed by `instruction`, whichever encoding it uses.
pub(crate) fn extract_int(instruction: &Instruction) -> Result<i32, OperandError> {
    match instruction {
        Instruction::Op(opcode @ opcodes::ICONST_M1..=opcodes::ICONST_5) => {
            Ok(*opcode as i32 - opcodes::ICONST_0 as i32)
        }
        Instruction::Int {
            opcode: opcodes::BIPUSH | opcodes::SIPUSH,
            operand,
        } => Ok(*operand),
        Instruction::Ldc(Constant::Integer(value)) => Ok(*value),
        other => Err(OperandError::UnsupportedEncoding(format!("{other:?}"))),
    }
}

pub(crate) fn is_int_push(instruction: &Instruction) -> bool {
    extract_int(instruction).is_ok()
}
