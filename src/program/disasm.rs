//=====================================================
// File: program/disasm.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Human-readable program listing
// Objective: Render the constant pool, declarations, and instruction
//            bodies with resolved names
//=====================================================

use std::fmt;

use crate::program::{Instruction, Program};

impl Program<'_> {
    pub fn format_instruction(&self, instruction: &Instruction) -> String {
        let name = instruction.opcode().name();
        match *instruction {
            Instruction::SourceFile(id)
            | Instruction::LoadString(id)
            | Instruction::LoadObjectMember(id)
            | Instruction::StoreObjectMember(id) => {
                format!("{name} {id} ({:?})", self.str_or_unknown(id))
            }
            Instruction::LoadInt(value) => format!("{name} {value}"),
            Instruction::LoadFloat(value) => format!("{name} {value:?}"),
            Instruction::LoadObject(shape) => {
                let props = self
                    .shape_props(shape)
                    .map(|props| {
                        props
                            .iter()
                            .map(|prop| self.str_or_unknown(*prop))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                format!("{name} {shape} {{{props}}}")
            }
            Instruction::If { if_len, else_len } => format!("{name} {if_len} else {else_len}"),
            Instruction::Call(function) => {
                let callee = self
                    .function(function)
                    .map(|decl| self.str_or_unknown(decl.name))
                    .unwrap_or("<unknown>");
                format!("{name} {function} ({callee})")
            }
            Instruction::CallBuiltin(builtin) => {
                let callee = self.builtin_name(builtin).unwrap_or("<builtin>");
                format!("{name} {builtin} ({callee})")
            }
            Instruction::SourceLine(operand)
            | Instruction::LoadTuple(operand)
            | Instruction::LoadArray(operand)
            | Instruction::LoadTupleMember(operand)
            | Instruction::LoadGlobal(operand)
            | Instruction::LoadLocal(operand)
            | Instruction::StoreGlobal(operand)
            | Instruction::StoreLocal(operand)
            | Instruction::Loop(operand)
            | Instruction::Tick(operand) => format!("{name} {operand}"),
            _ => name.to_string(),
        }
    }

    fn write_body(&self, f: &mut fmt::Formatter<'_>, start: u32, length: u32) -> fmt::Result {
        let mut depth_ends: Vec<u32> = Vec::new();
        for index in start..start.saturating_add(length) {
            depth_ends.retain(|end| *end > index);
            let Some(instruction) = self.instruction(index) else {
                break;
            };
            let indent = "  ".repeat(depth_ends.len() + 1);
            writeln!(f, "{index:05}{indent}{}", self.format_instruction(instruction))?;
            match *instruction {
                Instruction::If { if_len, else_len } => {
                    let end = index.saturating_add(1).saturating_add(if_len);
                    depth_ends.push(end.saturating_add(else_len));
                }
                Instruction::Loop(len) | Instruction::Tick(len) => {
                    depth_ends.push(index.saturating_add(1).saturating_add(len));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "bigton program: {} instructions, {} globals",
            self.instructions.len(),
            self.num_globals
        )?;

        writeln!(f, "strings ({}):", self.strings.len())?;
        for (index, text) in self.strings.iter().enumerate() {
            writeln!(f, "  #{index}: {text:?}")?;
        }

        writeln!(f, "shapes ({}):", self.shapes.len())?;
        for (index, props) in self.shapes.iter().enumerate() {
            let names: Vec<_> = props.iter().map(|id| self.str_or_unknown(*id)).collect();
            writeln!(f, "  {index}: {{{}}}", names.join(", "))?;
        }

        writeln!(f, "builtins ({}):", self.builtins.len())?;
        for (index, builtin) in self.builtins.iter().enumerate() {
            writeln!(
                f,
                "  {index}: {} (cost {})",
                self.str_or_unknown(builtin.name),
                builtin.cost
            )?;
        }

        for (index, function) in self.functions.iter().enumerate() {
            writeln!(
                f,
                "\nfunction {index}: {} ({}:{})",
                self.str_or_unknown(function.name),
                self.str_or_unknown(function.decl.file),
                function.decl.line
            )?;
            self.write_body(f, function.start, function.length)?;
        }

        writeln!(f, "\nglobal:")?;
        self.write_body(f, self.global_start, self.global_length)
    }
}
