// instruction decoding: a wire message becomes exactly one of the three
// instruction shapes, each semantically checked before it reaches a register

pub mod block; // swap / controlled-swap blocks
pub mod core_instr; // primitive register operations
pub mod qml; // feature map / q-network blocks

use crate::error::{QsimError, QsimResult};
use crate::qasm::message::QasmMessage;
use crate::qasm::{FunctionClass, FunctionType, MessageId, TAG_F_TYPE};
use serde::{Deserialize, Serialize};

pub use self::block::BlockInstruction;
pub use self::core_instr::{CoreInstruction, StateSetup, Transform};
pub use self::qml::{QmlBlockInstruction, QmlSubtype};

pub const KIND_CORE: &str = "core instruction";
pub const KIND_BLOCK: &str = "block instruction";
pub const KIND_QML: &str = "QML block instruction";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Core,
    Block,
    Qml,
}

impl InstructionKind {
    pub fn label(self) -> &'static str {
        match self {
            InstructionKind::Core => KIND_CORE,
            InstructionKind::Block => KIND_BLOCK,
            InstructionKind::Qml => KIND_QML,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Core(CoreInstruction),
    Block(BlockInstruction),
    Qml(QmlBlockInstruction),
}

impl Instruction {
    pub fn kind(&self) -> InstructionKind {
        match self {
            Instruction::Core(_) => InstructionKind::Core,
            Instruction::Block(_) => InstructionKind::Block,
            Instruction::Qml(_) => InstructionKind::Qml,
        }
    }
}

// transform messages are split by function type range, everything else is core
pub fn classify(msg: &QasmMessage) -> QsimResult<InstructionKind> {
    if !msg.is_instruction() {
        return Err(QsimError::Syntax(format!(
            "message id [{}] is not an instruction",
            msg.id.code()
        )));
    }
    if msg.id != MessageId::Transform {
        return Ok(InstructionKind::Core);
    }
    let code: i32 = msg.param_as(TAG_F_TYPE)?;
    let ftype = FunctionType::from_code(code)
        .ok_or_else(|| QsimError::Syntax(format!("unhandled function type [{}]", code)))?;
    Ok(match ftype.class() {
        FunctionClass::Q1 | FunctionClass::Q2 | FunctionClass::Qn => InstructionKind::Core,
        FunctionClass::Block => InstructionKind::Block,
        FunctionClass::Qml => InstructionKind::Qml,
    })
}

// decode and validate in one step
pub fn parse_instruction(msg: &QasmMessage) -> QsimResult<Instruction> {
    match classify(msg)? {
        InstructionKind::Core => CoreInstruction::from_message(msg).map(Instruction::Core),
        InstructionKind::Block => BlockInstruction::from_message(msg).map(Instruction::Block),
        InstructionKind::Qml => QmlBlockInstruction::from_message(msg).map(Instruction::Qml),
    }
}

// any decode failure of an instruction counts as a validation failure of that kind
pub(crate) fn as_invalid(kind: &'static str, err: QsimError) -> QsimError {
    match err {
        QsimError::Validation { .. } => err,
        other => QsimError::validation(kind, other.to_string()),
    }
}

// log2 of an exact power of two
pub(crate) fn exact_log2(size: i64) -> Option<u32> {
    if size >= 1 && (size & (size - 1)) == 0 {
        Some(size.trailing_zeros())
    } else {
        None
    }
}
