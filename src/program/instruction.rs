//=====================================================
// File: program/instruction.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton instruction set
// Objective: Opcode numbering, operand layout, and typed instructions
//=====================================================

use std::convert::TryFrom;

use crate::error::ProgramError;
use crate::program::StrId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SourceLine = 0,
    SourceFile = 1,
    Discard = 2,
    LoadNull = 3,
    LoadInt = 4,
    LoadFloat = 5,
    LoadString = 6,
    LoadTuple = 7,
    LoadObject = 8,
    LoadArray = 9,
    LoadTupleMember = 10,
    LoadObjectMember = 11,
    LoadArrayElement = 12,
    LoadGlobal = 13,
    LoadLocal = 14,
    Add = 15,
    Subtract = 16,
    Multiply = 17,
    Divide = 18,
    Remainder = 19,
    Negate = 20,
    LessThan = 21,
    LessThanEqual = 22,
    GreaterThan = 23,
    GreaterThanEqual = 24,
    Equal = 25,
    NotEqual = 26,
    And = 27,
    Or = 28,
    Not = 29,
    StoreGlobal = 30,
    PushLocal = 31,
    StoreLocal = 32,
    StoreObjectMember = 33,
    StoreArrayElement = 34,
    If = 35,
    Loop = 36,
    Tick = 37,
    Continue = 38,
    Break = 39,
    Call = 40,
    CallBuiltin = 41,
    Return = 42,
}

impl Opcode {
    const TABLE: [Opcode; 43] = [
        Opcode::SourceLine,
        Opcode::SourceFile,
        Opcode::Discard,
        Opcode::LoadNull,
        Opcode::LoadInt,
        Opcode::LoadFloat,
        Opcode::LoadString,
        Opcode::LoadTuple,
        Opcode::LoadObject,
        Opcode::LoadArray,
        Opcode::LoadTupleMember,
        Opcode::LoadObjectMember,
        Opcode::LoadArrayElement,
        Opcode::LoadGlobal,
        Opcode::LoadLocal,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Remainder,
        Opcode::Negate,
        Opcode::LessThan,
        Opcode::LessThanEqual,
        Opcode::GreaterThan,
        Opcode::GreaterThanEqual,
        Opcode::Equal,
        Opcode::NotEqual,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::StoreGlobal,
        Opcode::PushLocal,
        Opcode::StoreLocal,
        Opcode::StoreObjectMember,
        Opcode::StoreArrayElement,
        Opcode::If,
        Opcode::Loop,
        Opcode::Tick,
        Opcode::Continue,
        Opcode::Break,
        Opcode::Call,
        Opcode::CallBuiltin,
        Opcode::Return,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::SourceLine => "SOURCE_LINE",
            Opcode::SourceFile => "SOURCE_FILE",
            Opcode::Discard => "DISCARD",
            Opcode::LoadNull => "LOAD_NULL",
            Opcode::LoadInt => "LOAD_INT",
            Opcode::LoadFloat => "LOAD_FLOAT",
            Opcode::LoadString => "LOAD_STRING",
            Opcode::LoadTuple => "LOAD_TUPLE",
            Opcode::LoadObject => "LOAD_OBJECT",
            Opcode::LoadArray => "LOAD_ARRAY",
            Opcode::LoadTupleMember => "LOAD_TUPLE_MEMBER",
            Opcode::LoadObjectMember => "LOAD_OBJECT_MEMBER",
            Opcode::LoadArrayElement => "LOAD_ARRAY_ELEMENT",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::Add => "ADD",
            Opcode::Subtract => "SUBTRACT",
            Opcode::Multiply => "MULTIPLY",
            Opcode::Divide => "DIVIDE",
            Opcode::Remainder => "REMAINDER",
            Opcode::Negate => "NEGATE",
            Opcode::LessThan => "LESS_THAN",
            Opcode::LessThanEqual => "LESS_THAN_EQUAL",
            Opcode::GreaterThan => "GREATER_THAN",
            Opcode::GreaterThanEqual => "GREATER_THAN_EQUAL",
            Opcode::Equal => "EQUAL",
            Opcode::NotEqual => "NOT_EQUAL",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::PushLocal => "PUSH_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::StoreObjectMember => "STORE_OBJECT_MEMBER",
            Opcode::StoreArrayElement => "STORE_ARRAY_ELEMENT",
            Opcode::If => "IF",
            Opcode::Loop => "LOOP",
            Opcode::Tick => "TICK",
            Opcode::Continue => "CONTINUE",
            Opcode::Break => "BREAK",
            Opcode::Call => "CALL",
            Opcode::CallBuiltin => "CALL_BUILTIN",
            Opcode::Return => "RETURN",
        }
    }

    /// Encoded operand size in bytes following the opcode byte.
    pub fn operand_size(self) -> usize {
        match self {
            Opcode::LoadInt | Opcode::LoadFloat | Opcode::If => 8,
            Opcode::SourceLine
            | Opcode::SourceFile
            | Opcode::LoadString
            | Opcode::LoadTuple
            | Opcode::LoadObject
            | Opcode::LoadArray
            | Opcode::LoadTupleMember
            | Opcode::LoadObjectMember
            | Opcode::LoadGlobal
            | Opcode::LoadLocal
            | Opcode::StoreGlobal
            | Opcode::StoreLocal
            | Opcode::StoreObjectMember
            | Opcode::Loop
            | Opcode::Tick
            | Opcode::Call
            | Opcode::CallBuiltin => 4,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProgramError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Opcode::TABLE
            .get(usize::from(value))
            .copied()
            .ok_or(ProgramError::UnknownOpcode {
                opcode: value,
                index: 0,
            })
    }
}

/// A decoded instruction with its operands.
///
/// Body lengths (`If`, `Loop`, `Tick`) count instructions, not bytes, and the
/// body starts at the instruction right after the opening one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    SourceLine(u32),
    SourceFile(StrId),
    Discard,
    LoadNull,
    LoadInt(i64),
    LoadFloat(f64),
    LoadString(StrId),
    LoadTuple(u32),
    LoadObject(u32),
    LoadArray(u32),
    LoadTupleMember(u32),
    LoadObjectMember(StrId),
    LoadArrayElement,
    LoadGlobal(u32),
    LoadLocal(u32),
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Negate,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Not,
    StoreGlobal(u32),
    PushLocal,
    StoreLocal(u32),
    StoreObjectMember(StrId),
    StoreArrayElement,
    If { if_len: u32, else_len: u32 },
    Loop(u32),
    Tick(u32),
    Continue,
    Break,
    Call(u32),
    CallBuiltin(u32),
    Return,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::SourceLine(_) => Opcode::SourceLine,
            Instruction::SourceFile(_) => Opcode::SourceFile,
            Instruction::Discard => Opcode::Discard,
            Instruction::LoadNull => Opcode::LoadNull,
            Instruction::LoadInt(_) => Opcode::LoadInt,
            Instruction::LoadFloat(_) => Opcode::LoadFloat,
            Instruction::LoadString(_) => Opcode::LoadString,
            Instruction::LoadTuple(_) => Opcode::LoadTuple,
            Instruction::LoadObject(_) => Opcode::LoadObject,
            Instruction::LoadArray(_) => Opcode::LoadArray,
            Instruction::LoadTupleMember(_) => Opcode::LoadTupleMember,
            Instruction::LoadObjectMember(_) => Opcode::LoadObjectMember,
            Instruction::LoadArrayElement => Opcode::LoadArrayElement,
            Instruction::LoadGlobal(_) => Opcode::LoadGlobal,
            Instruction::LoadLocal(_) => Opcode::LoadLocal,
            Instruction::Add => Opcode::Add,
            Instruction::Subtract => Opcode::Subtract,
            Instruction::Multiply => Opcode::Multiply,
            Instruction::Divide => Opcode::Divide,
            Instruction::Remainder => Opcode::Remainder,
            Instruction::Negate => Opcode::Negate,
            Instruction::LessThan => Opcode::LessThan,
            Instruction::LessThanEqual => Opcode::LessThanEqual,
            Instruction::GreaterThan => Opcode::GreaterThan,
            Instruction::GreaterThanEqual => Opcode::GreaterThanEqual,
            Instruction::Equal => Opcode::Equal,
            Instruction::NotEqual => Opcode::NotEqual,
            Instruction::And => Opcode::And,
            Instruction::Or => Opcode::Or,
            Instruction::Not => Opcode::Not,
            Instruction::StoreGlobal(_) => Opcode::StoreGlobal,
            Instruction::PushLocal => Opcode::PushLocal,
            Instruction::StoreLocal(_) => Opcode::StoreLocal,
            Instruction::StoreObjectMember(_) => Opcode::StoreObjectMember,
            Instruction::StoreArrayElement => Opcode::StoreArrayElement,
            Instruction::If { .. } => Opcode::If,
            Instruction::Loop(_) => Opcode::Loop,
            Instruction::Tick(_) => Opcode::Tick,
            Instruction::Continue => Opcode::Continue,
            Instruction::Break => Opcode::Break,
            Instruction::Call(_) => Opcode::Call,
            Instruction::CallBuiltin(_) => Opcode::CallBuiltin,
            Instruction::Return => Opcode::Return,
        }
    }

    pub fn encode(&self, bytes: &mut Vec<u8>) {
        bytes.push(self.opcode() as u8);
        match *self {
            Instruction::LoadInt(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Instruction::LoadFloat(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Instruction::If { if_len, else_len } => {
                bytes.extend_from_slice(&if_len.to_le_bytes());
                bytes.extend_from_slice(&else_len.to_le_bytes());
            }
            Instruction::SourceFile(id)
            | Instruction::LoadString(id)
            | Instruction::LoadObjectMember(id)
            | Instruction::StoreObjectMember(id) => bytes.extend_from_slice(&id.0.to_le_bytes()),
            Instruction::SourceLine(operand)
            | Instruction::LoadTuple(operand)
            | Instruction::LoadObject(operand)
            | Instruction::LoadArray(operand)
            | Instruction::LoadTupleMember(operand)
            | Instruction::LoadGlobal(operand)
            | Instruction::LoadLocal(operand)
            | Instruction::StoreGlobal(operand)
            | Instruction::StoreLocal(operand)
            | Instruction::Loop(operand)
            | Instruction::Tick(operand)
            | Instruction::Call(operand)
            | Instruction::CallBuiltin(operand) => bytes.extend_from_slice(&operand.to_le_bytes()),
            _ => {}
        }
    }

    /// Decodes the operands of `opcode` from exactly `operand_size` bytes.
    pub(crate) fn decode(opcode: Opcode, operands: &[u8]) -> Instruction {
        let word = |at: usize| {
            operands
                .get(at..at + 4)
                .and_then(|slice| slice.try_into().ok())
                .map(u32::from_le_bytes)
                .unwrap_or_default()
        };
        let wide = || {
            operands
                .get(..8)
                .and_then(|slice| slice.try_into().ok())
                .unwrap_or([0u8; 8])
        };
        match opcode {
            Opcode::SourceLine => Instruction::SourceLine(word(0)),
            Opcode::SourceFile => Instruction::SourceFile(StrId(word(0))),
            Opcode::Discard => Instruction::Discard,
            Opcode::LoadNull => Instruction::LoadNull,
            Opcode::LoadInt => Instruction::LoadInt(i64::from_le_bytes(wide())),
            Opcode::LoadFloat => Instruction::LoadFloat(f64::from_le_bytes(wide())),
            Opcode::LoadString => Instruction::LoadString(StrId(word(0))),
            Opcode::LoadTuple => Instruction::LoadTuple(word(0)),
            Opcode::LoadObject => Instruction::LoadObject(word(0)),
            Opcode::LoadArray => Instruction::LoadArray(word(0)),
            Opcode::LoadTupleMember => Instruction::LoadTupleMember(word(0)),
            Opcode::LoadObjectMember => Instruction::LoadObjectMember(StrId(word(0))),
            Opcode::LoadArrayElement => Instruction::LoadArrayElement,
            Opcode::LoadGlobal => Instruction::LoadGlobal(word(0)),
            Opcode::LoadLocal => Instruction::LoadLocal(word(0)),
            Opcode::Add => Instruction::Add,
            Opcode::Subtract => Instruction::Subtract,
            Opcode::Multiply => Instruction::Multiply,
            Opcode::Divide => Instruction::Divide,
            Opcode::Remainder => Instruction::Remainder,
            Opcode::Negate => Instruction::Negate,
            Opcode::LessThan => Instruction::LessThan,
            Opcode::LessThanEqual => Instruction::LessThanEqual,
            Opcode::GreaterThan => Instruction::GreaterThan,
            Opcode::GreaterThanEqual => Instruction::GreaterThanEqual,
            Opcode::Equal => Instruction::Equal,
            Opcode::NotEqual => Instruction::NotEqual,
            Opcode::And => Instruction::And,
            Opcode::Or => Instruction::Or,
            Opcode::Not => Instruction::Not,
            Opcode::StoreGlobal => Instruction::StoreGlobal(word(0)),
            Opcode::PushLocal => Instruction::PushLocal,
            Opcode::StoreLocal => Instruction::StoreLocal(word(0)),
            Opcode::StoreObjectMember => Instruction::StoreObjectMember(StrId(word(0))),
            Opcode::StoreArrayElement => Instruction::StoreArrayElement,
            Opcode::If => Instruction::If {
                if_len: word(0),
                else_len: word(4),
            },
            Opcode::Loop => Instruction::Loop(word(0)),
            Opcode::Tick => Instruction::Tick(word(0)),
            Opcode::Continue => Instruction::Continue,
            Opcode::Break => Instruction::Break,
            Opcode::Call => Instruction::Call(word(0)),
            Opcode::CallBuiltin => Instruction::CallBuiltin(word(0)),
            Opcode::Return => Instruction::Return,
        }
    }
}
