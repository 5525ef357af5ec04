//=====================================================
// File: program/loader.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton program decoder
// Objective: Parse and validate the binary program format without
//            copying constant string bytes out of the caller's buffer
//=====================================================

use std::convert::TryFrom;

use crate::error::ProgramError;
use crate::program::{
    BuiltinDecl, FunctionDecl, Instruction, MAGIC, Opcode, Program, SourcePos, StrId, VERSION,
};

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProgramError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ProgramError::UnexpectedEof(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ProgramError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ProgramError> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, ProgramError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a section count and bounds the preallocation by what is left.
    fn read_count(&mut self, min_entry_size: usize) -> Result<(u32, usize), ProgramError> {
        let count = self.read_u32()?;
        let capacity = (count as usize).min(self.remaining() / min_entry_size.max(1));
        Ok((count, capacity))
    }
}

pub(super) fn parse(bytes: &[u8]) -> Result<Program<'_>, ProgramError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.take(MAGIC.len()).map_err(|_| ProgramError::InvalidHeader)?;
    if magic != MAGIC {
        return Err(ProgramError::InvalidHeader);
    }
    let version = reader.read_u16()?;
    if version != VERSION {
        return Err(ProgramError::UnsupportedVersion(version));
    }

    let unknown_str = StrId(reader.read_u32()?);
    let num_globals = reader.read_u32()?;
    let global_start = reader.read_u32()?;
    let global_length = reader.read_u32()?;

    let strings = read_strings(&mut reader)?;
    let shapes = read_shapes(&mut reader)?;
    let functions = read_functions(&mut reader)?;
    let builtins = read_builtins(&mut reader)?;
    let instructions = read_instructions(&mut reader)?;

    if reader.remaining() > 0 {
        return Err(ProgramError::TrailingBytes(reader.remaining()));
    }

    let program = Program {
        unknown_str,
        num_globals,
        global_start,
        global_length,
        strings,
        shapes,
        functions,
        builtins,
        instructions,
    };
    validate(&program)?;
    Ok(program)
}

fn read_strings<'a>(reader: &mut Reader<'a>) -> Result<Vec<&'a str>, ProgramError> {
    let (count, capacity) = reader.read_count(4)?;
    let mut strings = Vec::with_capacity(capacity);
    for id in 0..count {
        let len = reader.read_u32()? as usize;
        let bytes = reader.take(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| ProgramError::InvalidUtf8(id))?;
        strings.push(text);
    }
    Ok(strings)
}

fn read_shapes(reader: &mut Reader<'_>) -> Result<Vec<Box<[StrId]>>, ProgramError> {
    let (count, capacity) = reader.read_count(4)?;
    let mut shapes = Vec::with_capacity(capacity);
    for _ in 0..count {
        let (prop_count, prop_capacity) = reader.read_count(4)?;
        let mut props = Vec::with_capacity(prop_capacity);
        for _ in 0..prop_count {
            props.push(StrId(reader.read_u32()?));
        }
        shapes.push(props.into_boxed_slice());
    }
    Ok(shapes)
}

fn read_functions(reader: &mut Reader<'_>) -> Result<Vec<FunctionDecl>, ProgramError> {
    let (count, capacity) = reader.read_count(20)?;
    let mut functions = Vec::with_capacity(capacity);
    for _ in 0..count {
        let name = StrId(reader.read_u32()?);
        let file = StrId(reader.read_u32()?);
        let line = reader.read_u32()?;
        let start = reader.read_u32()?;
        let length = reader.read_u32()?;
        functions.push(FunctionDecl {
            name,
            decl: SourcePos { file, line },
            start,
            length,
        });
    }
    Ok(functions)
}

fn read_builtins(reader: &mut Reader<'_>) -> Result<Vec<BuiltinDecl>, ProgramError> {
    let (count, capacity) = reader.read_count(8)?;
    let mut builtins = Vec::with_capacity(capacity);
    for _ in 0..count {
        let name = StrId(reader.read_u32()?);
        let cost = reader.read_u32()?;
        builtins.push(BuiltinDecl { name, cost });
    }
    Ok(builtins)
}

fn read_instructions(reader: &mut Reader<'_>) -> Result<Vec<Instruction>, ProgramError> {
    let (count, capacity) = reader.read_count(1)?;
    let mut instructions = Vec::with_capacity(capacity);
    for index in 0..count {
        let byte = reader.read_u8()?;
        let opcode = Opcode::try_from(byte).map_err(|_| ProgramError::UnknownOpcode {
            opcode: byte,
            index,
        })?;
        let operands = reader.take(opcode.operand_size())?;
        instructions.push(Instruction::decode(opcode, operands));
    }
    Ok(instructions)
}

fn check_ref(kind: &'static str, id: u32, count: u32) -> Result<(), ProgramError> {
    if id < count {
        Ok(())
    } else {
        Err(ProgramError::InvalidReference { kind, id, count })
    }
}

fn check_body(what: &'static str, start: u32, length: u32, count: u32) -> Result<(), ProgramError> {
    let end = u64::from(start) + u64::from(length);
    if end <= u64::from(count) {
        Ok(())
    } else {
        Err(ProgramError::BodyOutOfRange {
            what,
            start: u64::from(start),
            end,
            count,
        })
    }
}

fn validate(program: &Program<'_>) -> Result<(), ProgramError> {
    let strings = program.const_string_count();
    let shapes = program.shape_count();
    let functions = program.functions.len() as u32;
    let builtins = program.builtin_count();
    let instrs = program.instructions.len() as u32;

    check_ref("string", program.unknown_str.0, strings)?;
    check_body(
        "global body",
        program.global_start,
        program.global_length,
        instrs,
    )?;
    for props in &program.shapes {
        for prop in props.iter() {
            check_ref("string", prop.0, strings)?;
        }
    }
    for function in &program.functions {
        check_ref("string", function.name.0, strings)?;
        check_ref("string", function.decl.file.0, strings)?;
        check_body("function body", function.start, function.length, instrs)?;
    }
    for builtin in &program.builtins {
        check_ref("string", builtin.name.0, strings)?;
    }
    for instruction in &program.instructions {
        match *instruction {
            Instruction::SourceFile(id)
            | Instruction::LoadString(id)
            | Instruction::LoadObjectMember(id)
            | Instruction::StoreObjectMember(id) => check_ref("string", id.0, strings)?,
            Instruction::LoadObject(shape) => check_ref("shape", shape, shapes)?,
            Instruction::Call(function) => check_ref("function", function, functions)?,
            Instruction::CallBuiltin(builtin) => check_ref("builtin", builtin, builtins)?,
            _ => {}
        }
    }
    Ok(())
}
