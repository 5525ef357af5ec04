//=====================================================
// File: program/writer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton program encoder
// Objective: Assemble instruction streams with structured bodies and
//            emit the binary format the loader accepts
//=====================================================

use crate::program::{BuiltinDecl, FunctionDecl, Instruction, MAGIC, SourcePos, StrId, VERSION};

pub const UNKNOWN_FILE: &str = "<unknown>";

/// Builder for binary programs.
///
/// String constants are deduplicated. Structured bodies (`emit_if`,
/// `emit_loop`, `emit_tick`, `define_function`) back-patch their lengths once
/// the body closure returns. Without an explicit `global_body` call the whole
/// instruction stream outside function bodies is expected to be global code
/// starting at index 0.
#[derive(Debug, Clone, Default)]
pub struct ProgramWriter {
    strings: Vec<String>,
    shapes: Vec<Vec<StrId>>,
    functions: Vec<FunctionDecl>,
    builtins: Vec<BuiltinDecl>,
    instructions: Vec<Instruction>,
    num_globals: u32,
    global: Option<(u32, u32)>,
}

impl ProgramWriter {
    pub fn new() -> Self {
        let mut writer = Self::default();
        writer.string(UNKNOWN_FILE);
        writer
    }

    pub fn string(&mut self, text: &str) -> StrId {
        if let Some(index) = self.strings.iter().position(|existing| existing == text) {
            return StrId(index as u32);
        }
        self.strings.push(text.to_owned());
        StrId(self.strings.len() as u32 - 1)
    }

    /// Declares a shape. Duplicate declarations are kept; the runtime interns
    /// them.
    pub fn shape(&mut self, props: &[&str]) -> u32 {
        let ids = props.iter().map(|prop| self.string(prop)).collect();
        self.shapes.push(ids);
        self.shapes.len() as u32 - 1
    }

    pub fn builtin(&mut self, name: &str, cost: u32) -> u32 {
        let name = self.string(name);
        self.builtins.push(BuiltinDecl { name, cost });
        self.builtins.len() as u32 - 1
    }

    pub fn globals(&mut self, count: u32) -> &mut Self {
        self.num_globals = count;
        self
    }

    pub fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    pub fn emit(&mut self, instruction: Instruction) -> u32 {
        self.instructions.push(instruction);
        self.position() - 1
    }

    pub fn emit_all(&mut self, instructions: &[Instruction]) {
        self.instructions.extend_from_slice(instructions);
    }

    fn body(&mut self, build: impl FnOnce(&mut Self)) -> u32 {
        let start = self.position();
        build(self);
        self.position() - start
    }

    pub fn emit_if(
        &mut self,
        then_body: impl FnOnce(&mut Self),
        else_body: impl FnOnce(&mut Self),
    ) {
        let at = self.emit(Instruction::If {
            if_len: 0,
            else_len: 0,
        });
        let if_len = self.body(then_body);
        let else_len = self.body(else_body);
        self.instructions[at as usize] = Instruction::If { if_len, else_len };
    }

    pub fn emit_loop(&mut self, body: impl FnOnce(&mut Self)) {
        let at = self.emit(Instruction::Loop(0));
        let len = self.body(body);
        self.instructions[at as usize] = Instruction::Loop(len);
    }

    pub fn emit_tick(&mut self, body: impl FnOnce(&mut Self)) {
        let at = self.emit(Instruction::Tick(0));
        let len = self.body(body);
        self.instructions[at as usize] = Instruction::Tick(len);
    }

    /// Declares a function whose body is supplied later by `define_function`.
    pub fn declare_function(&mut self, name: &str, file: &str, line: u32) -> u32 {
        let name = self.string(name);
        let file = self.string(file);
        self.functions.push(FunctionDecl {
            name,
            decl: SourcePos { file, line },
            start: 0,
            length: 0,
        });
        self.functions.len() as u32 - 1
    }

    /// Emits the body of a declared function at the current position.
    pub fn define_function(&mut self, id: u32, body: impl FnOnce(&mut Self)) {
        let start = self.position();
        let length = self.body(body);
        if let Some(function) = self.functions.get_mut(id as usize) {
            function.start = start;
            function.length = length;
        }
    }

    /// Emits the global body at the current position.
    pub fn global_body(&mut self, body: impl FnOnce(&mut Self)) {
        let start = self.position();
        let length = self.body(body);
        self.global = Some((start, length));
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        let (global_start, global_length) = self.global.unwrap_or((0, self.position()));
        for word in [0, self.num_globals, global_start, global_length] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        push_len(&mut bytes, self.strings.len());
        for text in &self.strings {
            push_len(&mut bytes, text.len());
            bytes.extend_from_slice(text.as_bytes());
        }

        push_len(&mut bytes, self.shapes.len());
        for shape in &self.shapes {
            push_len(&mut bytes, shape.len());
            for prop in shape {
                bytes.extend_from_slice(&prop.0.to_le_bytes());
            }
        }

        push_len(&mut bytes, self.functions.len());
        for function in &self.functions {
            for word in [
                function.name.0,
                function.decl.file.0,
                function.decl.line,
                function.start,
                function.length,
            ] {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
        }

        push_len(&mut bytes, self.builtins.len());
        for builtin in &self.builtins {
            bytes.extend_from_slice(&builtin.name.0.to_le_bytes());
            bytes.extend_from_slice(&builtin.cost.to_le_bytes());
        }

        push_len(&mut bytes, self.instructions.len());
        for instruction in &self.instructions {
            instruction.encode(&mut bytes);
        }
        bytes
    }
}

fn push_len(bytes: &mut Vec<u8>, len: usize) {
    bytes.extend_from_slice(&(len as u32).to_le_bytes());
}
