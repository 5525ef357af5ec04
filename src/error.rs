//=====================================================
// File: error.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Error types for program loading and execution
// Objective: Separate malformed-program failures from the persistent
//            runtime error flag and give the flag stable numeric codes
//=====================================================

use serde::Serialize;
use thiserror::Error;

/// Failure while parsing a raw program buffer.
///
/// Any of these aborts runtime creation; no partially built runtime exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("invalid program header")]
    InvalidHeader,
    #[error("unsupported program version {0}")]
    UnsupportedVersion(u16),
    #[error("unexpected end of program at byte {0}")]
    UnexpectedEof(usize),
    #[error("program range {offset}+{length} exceeds buffer of {available} bytes")]
    RangeOutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },
    #[error("constant string {0} is not valid utf-8")]
    InvalidUtf8(u32),
    #[error("unknown opcode {opcode} at instruction {index}")]
    UnknownOpcode { opcode: u8, index: u32 },
    #[error("{kind} reference {id} out of range (count {count})")]
    InvalidReference {
        kind: &'static str,
        id: u32,
        count: u32,
    },
    #[error("{what} spans instructions {start}..{end} but program has {count}")]
    BodyOutOfRange {
        what: &'static str,
        start: u64,
        end: u64,
        count: u32,
    },
    #[error("{0} trailing bytes after program")]
    TrailingBytes(usize),
}

/// Code stored in the runtime error flag.
///
/// The discriminants are part of the host contract and never change.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum ErrorCode {
    #[error("integer division by zero")]
    IntDivisionByZero = 1,
    #[error("error raised by program")]
    ByProgram = 2,
    #[error("tuple index out of bounds")]
    TupleIndexOob = 3,
    #[error("object has no such member")]
    InvalidObjectMember = 4,
    #[error("array index out of bounds")]
    ArrayIndexOob = 5,
    #[error("operands are not numbers of the same type")]
    OperandsNotNumbers = 6,
    #[error("operand is not an integer")]
    OperandNotInteger = 7,
    #[error("operand is not a tuple")]
    OperandNotTuple = 8,
    #[error("operand is not an object")]
    OperandNotObject = 9,
    #[error("operand is not an array")]
    OperandNotArray = 10,
    #[error("exceeded maximum call depth")]
    ExceededMaximumCallDepth = 11,
    #[error("tuple exceeds maximum size")]
    TupleTooBig = 12,
    #[error("exceeded memory usage limit")]
    ExceededMemoryLimit = 13,
    #[error("operand stack is empty")]
    StackEmpty = 14,
    #[error("local variable index out of bounds")]
    LocalIdxOob = 15,
    #[error("global variable reference is invalid")]
    GlobalVarRefInvalid = 16,
    #[error("instruction counter left the program")]
    InstrCounterOob = 17,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 17] = [
        ErrorCode::IntDivisionByZero,
        ErrorCode::ByProgram,
        ErrorCode::TupleIndexOob,
        ErrorCode::InvalidObjectMember,
        ErrorCode::ArrayIndexOob,
        ErrorCode::OperandsNotNumbers,
        ErrorCode::OperandNotInteger,
        ErrorCode::OperandNotTuple,
        ErrorCode::OperandNotObject,
        ErrorCode::OperandNotArray,
        ErrorCode::ExceededMaximumCallDepth,
        ErrorCode::TupleTooBig,
        ErrorCode::ExceededMemoryLimit,
        ErrorCode::StackEmpty,
        ErrorCode::LocalIdxOob,
        ErrorCode::GlobalVarRefInvalid,
        ErrorCode::InstrCounterOob,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|candidate| candidate.code() == code)
    }

    /// Resource-limit breaches, as opposed to program faults.
    pub fn is_limit(self) -> bool {
        matches!(
            self,
            ErrorCode::ExceededMaximumCallDepth
                | ErrorCode::TupleTooBig
                | ErrorCode::ExceededMemoryLimit
        )
    }
}
