//=====================================================
// File: diagnostics.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime log and call trace
// Objective: Append-only log of string values and owned snapshots of the
//            active call frames
//=====================================================

use serde::Serialize;

use crate::error::ErrorCode;
use crate::program::StrId;
use crate::value::heap::MEMBER_SIZE;
use crate::value::{Handle, Value};
use crate::vm::Runtime;

/// Snapshot of one active call.
///
/// Names are constant string ids of the program, each paired with its text
/// borrowed from the program buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEntry<'a> {
    pub name_id: StrId,
    pub name: &'a str,
    pub decl_file_id: StrId,
    pub decl_file: &'a str,
    pub decl_line: u32,
    pub from_file_id: StrId,
    pub from_file: &'a str,
    pub from_line: u32,
}

impl<'a> Runtime<'a> {
    /// Appends a string value to the log. Other value types are ignored.
    ///
    /// Each entry counts against the memory limit; an append past it fails
    /// and sets `ExceededMemoryLimit`.
    pub fn append_log(&mut self, line: &Handle) -> bool {
        match self.resolve(line) {
            Some(value @ Value::String(_)) => {
                if !self.heap.charge(MEMBER_SIZE) {
                    self.set_error(ErrorCode::ExceededMemoryLimit);
                    return false;
                }
                self.heap.retain(value);
                self.log.push(value);
                true
            }
            _ => false,
        }
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn log_line(&self, index: usize) -> Option<&str> {
        let value = *self.log.get(index)?;
        self.heap.str(value)
    }

    pub fn log_lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.log.iter().filter_map(|value| self.heap.str(*value))
    }

    /// Number of active calls.
    pub fn trace_len(&self) -> usize {
        self.trace.len()
    }

    /// Call at depth `index`; 0 is the outermost call.
    pub fn trace_entry(&self, index: usize) -> Option<TraceEntry<'a>> {
        let frame = self.trace.get(index)?;
        let decl = self.program.function(frame.function)?;
        Some(TraceEntry {
            name_id: decl.name,
            name: self.program.str_or_unknown(decl.name),
            decl_file_id: decl.decl.file,
            decl_file: self.program.str_or_unknown(decl.decl.file),
            decl_line: decl.decl.line,
            from_file_id: frame.called_from.file,
            from_file: self.program.str_or_unknown(frame.called_from.file),
            from_line: frame.called_from.line,
        })
    }

    pub fn trace_entries(&self) -> Vec<TraceEntry<'a>> {
        (0..self.trace.len())
            .filter_map(|index| self.trace_entry(index))
            .collect()
    }
}
