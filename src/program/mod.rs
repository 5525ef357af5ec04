//=====================================================
// File: program/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Immutable compiled program view
// Objective: Hold the decoded constant pool, shape declarations, function
//            and builtin tables, and instruction stream borrowed from the
//            caller's buffer
//=====================================================

mod disasm;
mod instruction;
mod loader;
mod writer;

use std::fmt;

use serde::Serialize;

use crate::error::ProgramError;

pub use instruction::{Instruction, Opcode};
pub use writer::ProgramWriter;

pub const MAGIC: &[u8; 4] = b"BGTN";
pub const VERSION: u16 = 1;

/// Index into the constant string pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StrId(pub u32);

impl fmt::Display for StrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub file: StrId,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: StrId,
    pub decl: SourcePos,
    pub start: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDecl {
    pub name: StrId,
    /// Extra budget units charged when the program calls this builtin.
    pub cost: u32,
}

/// Decoded program. Constant strings borrow from the source buffer.
#[derive(Debug, Clone)]
pub struct Program<'a> {
    pub(crate) unknown_str: StrId,
    pub(crate) num_globals: u32,
    pub(crate) global_start: u32,
    pub(crate) global_length: u32,
    pub(crate) strings: Vec<&'a str>,
    pub(crate) shapes: Vec<Box<[StrId]>>,
    pub(crate) functions: Vec<FunctionDecl>,
    pub(crate) builtins: Vec<BuiltinDecl>,
    pub(crate) instructions: Vec<Instruction>,
}

impl<'a> Program<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProgramError> {
        loader::parse(bytes)
    }

    /// Parses `length` bytes starting at `offset` inside `buffer`.
    pub fn parse_range(
        buffer: &'a [u8],
        offset: usize,
        length: usize,
    ) -> Result<Self, ProgramError> {
        let slice = offset
            .checked_add(length)
            .and_then(|end| buffer.get(offset..end))
            .ok_or(ProgramError::RangeOutOfBounds {
                offset,
                length,
                available: buffer.len(),
            })?;
        loader::parse(slice)
    }

    pub fn unknown_str(&self) -> StrId {
        self.unknown_str
    }

    pub fn num_globals(&self) -> u32 {
        self.num_globals
    }

    pub fn global_body(&self) -> (u32, u32) {
        (self.global_start, self.global_length)
    }

    pub fn const_string(&self, id: StrId) -> Option<&'a str> {
        self.strings.get(id.0 as usize).copied()
    }

    pub fn const_string_count(&self) -> u32 {
        self.strings.len() as u32
    }

    /// Resolves a constant string, falling back to `"?"` for bad ids.
    pub(crate) fn str_or_unknown(&self, id: StrId) -> &'a str {
        self.const_string(id).unwrap_or("?")
    }

    /// Looks up a constant string id by content.
    pub fn find_const_string(&self, text: &str) -> Option<StrId> {
        self.strings
            .iter()
            .position(|candidate| *candidate == text)
            .map(|index| StrId(index as u32))
    }

    pub fn shape_count(&self) -> u32 {
        self.shapes.len() as u32
    }

    pub fn shape_props(&self, id: u32) -> Option<&[StrId]> {
        self.shapes.get(id as usize).map(|props| &props[..])
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn function(&self, id: u32) -> Option<&FunctionDecl> {
        self.functions.get(id as usize)
    }

    pub fn builtin_count(&self) -> u32 {
        self.builtins.len() as u32
    }

    pub fn builtin(&self, id: u32) -> Option<&BuiltinDecl> {
        self.builtins.get(id as usize)
    }

    pub fn builtin_name(&self, id: u32) -> Option<&'a str> {
        self.builtin(id)
            .and_then(|builtin| self.const_string(builtin.name))
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, index: u32) -> Option<&Instruction> {
        self.instructions.get(index as usize)
    }
}
