//=====================================================
// File: vm/exec.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Instruction dispatch
// Objective: Execute one instruction or scope transition per step and
//            report suspension points back to the batch loop
//=====================================================

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::program::{Instruction, StrId};
use crate::value::heap::{HeapData, MEMBER_SIZE};
use crate::value::{HeapRef, Value};

use super::ops::{self, ArithOp, CmpOp};
use super::scope::{Frame, Scope, ScopeKind};
use super::{Budget, ExecStatus, Runtime};

impl<'a> Runtime<'a> {
    /// Advances execution by one step. `Some` ends the batch.
    pub(super) fn step(&mut self, budget: &mut Budget) -> Option<ExecStatus> {
        let Some(scope) = self.scopes.last().copied() else {
            return Some(self.finish());
        };
        if self.ip >= scope.end {
            return self.leave_scope(scope, budget);
        }
        if budget.exhausted() {
            return Some(ExecStatus::Continue);
        }
        let Some(instruction) = self.program.instruction(self.ip).copied() else {
            self.set_error(ErrorCode::InstrCounterOob);
            return None;
        };
        budget.charge(1);
        self.execute(instruction)
    }

    fn leave_scope(&mut self, scope: Scope, budget: &mut Budget) -> Option<ExecStatus> {
        match scope.kind {
            ScopeKind::Global => {
                self.pop_scope();
                Some(self.finish())
            }
            ScopeKind::Function => {
                self.pop_scope();
                self.trace.pop();
                self.ip = scope.after;
                self.stack_push(Value::Null);
                None
            }
            ScopeKind::If => {
                self.pop_scope();
                self.ip = scope.after;
                None
            }
            ScopeKind::Loop => {
                if budget.exhausted() {
                    return Some(ExecStatus::Continue);
                }
                budget.charge(1);
                self.restart_loop(scope);
                None
            }
            ScopeKind::Tick => {
                self.restart_loop(scope);
                Some(self.suspend_for_tick())
            }
        }
    }

    fn restart_loop(&mut self, scope: Scope) {
        self.release_locals(scope.num_locals);
        if let Some(current) = self.scopes.last_mut() {
            current.num_locals = 0;
        }
        self.ip = scope.start;
    }

    /// Pops `If` scopes until the innermost loop, returning it without
    /// popping. Nothing is unwound when no loop encloses the current
    /// function or global body.
    fn unwind_to_loop(&mut self) -> Option<Scope> {
        let depth = self
            .scopes
            .iter()
            .rev()
            .take_while(|scope| !scope.kind.is_boundary())
            .position(|scope| scope.kind.is_loop())?;
        for _ in 0..depth {
            self.pop_scope();
        }
        self.scopes.last().copied()
    }

    fn execute(&mut self, instruction: Instruction) -> Option<ExecStatus> {
        match instruction {
            Instruction::SourceLine(line) => self.source.line = line,
            Instruction::SourceFile(file) => self.source.file = file,
            Instruction::Discard => {
                let value = self.stack_pop();
                self.heap.release(value);
            }

            Instruction::LoadNull => self.stack_push(Value::Null),
            Instruction::LoadInt(value) => self.stack_push(Value::Int(value)),
            Instruction::LoadFloat(value) => self.stack_push(Value::Float(value)),
            Instruction::LoadString(id) => self.load_string(id),
            Instruction::LoadTuple(length) => self.load_tuple(length),
            Instruction::LoadObject(shape) => self.load_object(shape),
            Instruction::LoadArray(length) => {
                let members = self.pop_members(length as usize);
                self.alloc_onto_stack(HeapData::Array(members), Value::Array);
            }

            Instruction::LoadTupleMember(index) => {
                let tuple = self.stack_pop();
                self.load_tuple_member(tuple, index as usize);
                self.heap.release(tuple);
            }
            Instruction::LoadObjectMember(name) => {
                let object = self.stack_pop();
                if let Some(slot) = self.member_slot(object, name) {
                    self.load_member(object, slot);
                }
                self.heap.release(object);
            }
            Instruction::LoadArrayElement => {
                let index = self.stack_pop();
                let array = self.stack_pop();
                if let Some(slot) = self.element_slot(array, index) {
                    self.load_member(array, slot);
                }
                self.heap.release(array);
            }
            Instruction::LoadGlobal(slot) => match self.globals.get(slot as usize).copied() {
                Some(value) => {
                    self.heap.retain(value);
                    self.stack_push(value);
                }
                None => self.set_error(ErrorCode::GlobalVarRefInvalid),
            },
            Instruction::LoadLocal(relative) => match self.local_index(relative) {
                Some(index) => {
                    let value = self.locals[index];
                    self.heap.retain(value);
                    self.stack_push(value);
                }
                None => self.set_error(ErrorCode::LocalIdxOob),
            },

            Instruction::Add => self.arithmetic(ArithOp::Add),
            Instruction::Subtract => self.arithmetic(ArithOp::Subtract),
            Instruction::Multiply => self.arithmetic(ArithOp::Multiply),
            Instruction::Divide => self.arithmetic(ArithOp::Divide),
            Instruction::Remainder => self.arithmetic(ArithOp::Remainder),
            Instruction::Negate => {
                let value = self.stack_pop();
                match ops::negate(value) {
                    Ok(result) => self.stack_push(result),
                    Err(code) => self.set_error(code),
                }
                self.heap.release(value);
            }

            Instruction::LessThan => self.comparison(CmpOp::LessThan),
            Instruction::LessThanEqual => self.comparison(CmpOp::LessThanEqual),
            Instruction::GreaterThan => self.comparison(CmpOp::GreaterThan),
            Instruction::GreaterThanEqual => self.comparison(CmpOp::GreaterThanEqual),
            Instruction::Equal | Instruction::NotEqual => {
                let rhs = self.stack_pop();
                let lhs = self.stack_pop();
                let equal = ops::values_equal(&self.heap, lhs, rhs);
                let expected = matches!(instruction, Instruction::Equal);
                self.stack_push(ops::bool_value(equal == expected));
                self.heap.release(lhs);
                self.heap.release(rhs);
            }

            Instruction::And | Instruction::Or => {
                let rhs = self.stack_pop();
                let lhs = self.stack_pop();
                let pick_lhs = match instruction {
                    Instruction::And => !lhs.is_truthy(),
                    _ => lhs.is_truthy(),
                };
                let (kept, dropped) = if pick_lhs { (lhs, rhs) } else { (rhs, lhs) };
                self.stack_push(kept);
                self.heap.release(dropped);
            }
            Instruction::Not => {
                let value = self.stack_pop();
                self.stack_push(ops::bool_value(!value.is_truthy()));
                self.heap.release(value);
            }

            Instruction::StoreGlobal(slot) => {
                let value = self.stack_pop();
                match self.globals.get_mut(slot as usize) {
                    Some(global) => {
                        let old = std::mem::replace(global, value);
                        self.heap.release(old);
                    }
                    None => {
                        self.heap.release(value);
                        self.set_error(ErrorCode::GlobalVarRefInvalid);
                    }
                }
            }
            Instruction::PushLocal => {
                let value = self.stack_pop();
                if !self.heap.charge(MEMBER_SIZE) {
                    self.heap.release(value);
                    self.set_error(ErrorCode::ExceededMemoryLimit);
                    return None;
                }
                self.locals.push(value);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.num_locals += 1;
                }
            }
            Instruction::StoreLocal(relative) => {
                let value = self.stack_pop();
                match self.local_index(relative) {
                    Some(index) => {
                        let old = std::mem::replace(&mut self.locals[index], value);
                        self.heap.release(old);
                    }
                    None => {
                        self.heap.release(value);
                        self.set_error(ErrorCode::LocalIdxOob);
                    }
                }
            }
            Instruction::StoreObjectMember(name) => {
                let value = self.stack_pop();
                let object = self.stack_pop();
                match self.member_slot(object, name) {
                    Some(slot) => self.store_member(object, slot, value),
                    None => self.heap.release(value),
                }
                self.heap.release(object);
            }
            Instruction::StoreArrayElement => {
                let value = self.stack_pop();
                let index = self.stack_pop();
                let array = self.stack_pop();
                match self.element_slot(array, index) {
                    Some(slot) => self.store_member(array, slot, value),
                    None => self.heap.release(value),
                }
                self.heap.release(array);
            }

            Instruction::If { if_len, else_len } => {
                let condition = self.stack_pop();
                let taken = condition.is_truthy();
                self.heap.release(condition);
                let then_start = self.ip.saturating_add(1);
                let else_start = then_start.saturating_add(if_len);
                let else_end = else_start.saturating_add(else_len);
                let (start, end) = if taken {
                    (then_start, else_start)
                } else {
                    (else_start, else_end)
                };
                self.push_scope(Scope::new(ScopeKind::If, start, end, else_end));
                self.ip = start;
                return None;
            }
            Instruction::Loop(length) | Instruction::Tick(length) => {
                let kind = match instruction {
                    Instruction::Loop(_) => ScopeKind::Loop,
                    _ => ScopeKind::Tick,
                };
                let start = self.ip.saturating_add(1);
                let end = start.saturating_add(length);
                self.push_scope(Scope::new(kind, start, end, end));
            }
            Instruction::Continue => {
                if let Some(target) = self.unwind_to_loop() {
                    self.ip = target.end;
                    return None;
                }
            }
            Instruction::Break => {
                if let Some(target) = self.unwind_to_loop() {
                    self.pop_scope();
                    self.ip = target.after;
                    return None;
                }
            }
            Instruction::Call(function) => return self.call(function),
            Instruction::CallBuiltin(builtin) => {
                let cost = self
                    .program
                    .builtin(builtin)
                    .map(|decl| u64::from(decl.cost))
                    .unwrap_or_default();
                self.ip += 1;
                return Some(self.suspend_for_builtin(builtin, cost));
            }
            Instruction::Return => return self.return_from_function(),
        }
        self.ip += 1;
        None
    }

    fn call(&mut self, function: u32) -> Option<ExecStatus> {
        if self.trace.len() as u64 + 1 > u64::from(self.settings.max_call_depth) {
            self.set_error(ErrorCode::ExceededMaximumCallDepth);
            return None;
        }
        let Some(decl) = self.program.function(function).copied() else {
            self.set_error(ErrorCode::InstrCounterOob);
            return None;
        };
        self.trace.push(Frame {
            function,
            called_from: self.source,
        });
        let end = decl.start.saturating_add(decl.length);
        self.push_scope(Scope::new(
            ScopeKind::Function,
            decl.start,
            end,
            self.ip.saturating_add(1),
        ));
        self.ip = decl.start;
        None
    }

    /// Unwinds to the innermost function scope, leaving the return value on
    /// the operand stack. At global level this ends the program.
    fn return_from_function(&mut self) -> Option<ExecStatus> {
        while let Some(scope) = self.scopes.last().copied() {
            match scope.kind {
                ScopeKind::Function => {
                    self.pop_scope();
                    self.trace.pop();
                    self.ip = scope.after;
                    return None;
                }
                ScopeKind::Global => {
                    let value = self.stack_pop();
                    self.heap.release(value);
                    self.pop_scope();
                    return Some(self.finish());
                }
                ScopeKind::Loop | ScopeKind::Tick | ScopeKind::If => {
                    self.pop_scope();
                }
            }
        }
        Some(self.finish())
    }

    fn local_index(&self, relative: u32) -> Option<usize> {
        let relative = relative as usize;
        (relative < self.locals.len()).then(|| self.locals.len() - 1 - relative)
    }

    fn arithmetic(&mut self, op: ArithOp) {
        let rhs = self.stack_pop();
        let lhs = self.stack_pop();
        match ops::arithmetic(op, lhs, rhs) {
            Ok(result) => self.stack_push(result),
            Err(code) => self.set_error(code),
        }
        self.heap.release(lhs);
        self.heap.release(rhs);
    }

    fn comparison(&mut self, op: CmpOp) {
        let rhs = self.stack_pop();
        let lhs = self.stack_pop();
        match ops::compare(op, lhs, rhs) {
            Ok(result) => self.stack_push(result),
            Err(code) => self.set_error(code),
        }
        self.heap.release(lhs);
        self.heap.release(rhs);
    }

    /// Pops `count` values; the first popped becomes the last member.
    fn pop_members(&mut self, count: usize) -> Box<[Value]> {
        let mut members = vec![Value::Null; count];
        for slot in members.iter_mut().rev() {
            *slot = self.stack_pop();
        }
        members.into_boxed_slice()
    }

    fn alloc_onto_stack(&mut self, data: HeapData<'a>, wrap: fn(HeapRef) -> Value) {
        match self.heap.alloc(data) {
            Some(r) => self.stack_push(wrap(r)),
            None => self.set_error(ErrorCode::ExceededMemoryLimit),
        }
    }

    fn load_string(&mut self, id: StrId) {
        let Some(text) = self.program.const_string(id) else {
            self.set_error(ErrorCode::InstrCounterOob);
            return;
        };
        self.alloc_onto_stack(HeapData::ConstString(text), Value::String);
    }

    fn load_tuple(&mut self, length: u32) {
        let members = self.pop_members(length as usize);
        let flat_length = self.flat_length_of(&members);
        if flat_length > u64::from(self.settings.max_tuple_size) {
            for member in members.iter() {
                self.heap.release(*member);
            }
            self.set_error(ErrorCode::TupleTooBig);
            return;
        }
        self.alloc_onto_stack(
            HeapData::Tuple {
                members,
                flat_length: flat_length as u32,
            },
            Value::Tuple,
        );
    }

    pub(crate) fn flat_length_of(&self, members: &[Value]) -> u64 {
        members
            .iter()
            .map(|member| match (member, member.heap_ref().and_then(|r| self.heap.get(r))) {
                (Value::Tuple(_), Some(HeapData::Tuple { flat_length, .. })) => {
                    u64::from(*flat_length)
                }
                _ => 1,
            })
            .sum()
    }

    fn load_object(&mut self, shape_id: u32) {
        let Some(shape) = self.program_shapes.get(shape_id as usize).map(Arc::clone) else {
            self.set_error(ErrorCode::InstrCounterOob);
            return;
        };
        let members = self.pop_members(shape.len());
        self.alloc_onto_stack(HeapData::Object { shape, members }, Value::Object);
    }

    fn load_tuple_member(&mut self, tuple: Value, index: usize) {
        let Value::Tuple(r) = tuple else {
            self.set_error(ErrorCode::OperandNotTuple);
            return;
        };
        let member = self
            .heap
            .get(r)
            .and_then(|data| data.members().get(index).copied());
        match member {
            Some(value) => {
                self.heap.retain(value);
                self.stack_push(value);
            }
            None => self.set_error(ErrorCode::TupleIndexOob),
        }
    }

    fn member_slot(&mut self, object: Value, name: StrId) -> Option<usize> {
        let Value::Object(r) = object else {
            self.set_error(ErrorCode::OperandNotObject);
            return None;
        };
        let slot = match self.heap.get(r) {
            Some(HeapData::Object { shape, .. }) => shape.slot_of(name),
            _ => None,
        };
        if slot.is_none() {
            self.set_error(ErrorCode::InvalidObjectMember);
        }
        slot
    }

    fn element_slot(&mut self, array: Value, index: Value) -> Option<usize> {
        let Value::Array(r) = array else {
            self.heap.release(index);
            self.set_error(ErrorCode::OperandNotArray);
            return None;
        };
        let Value::Int(index) = index else {
            self.heap.release(index);
            self.set_error(ErrorCode::OperandNotInteger);
            return None;
        };
        let length = self.heap.get(r).map_or(0, |data| data.members().len());
        match usize::try_from(index) {
            Ok(slot) if slot < length => Some(slot),
            _ => {
                self.set_error(ErrorCode::ArrayIndexOob);
                None
            }
        }
    }

    fn load_member(&mut self, container: Value, slot: usize) {
        let member = container
            .heap_ref()
            .and_then(|r| self.heap.get(r))
            .and_then(|data| data.members().get(slot).copied())
            .unwrap_or(Value::Null);
        self.heap.retain(member);
        self.stack_push(member);
    }

    fn store_member(&mut self, container: Value, slot: usize, value: Value) {
        let Some(r) = container.heap_ref() else {
            self.heap.release(value);
            return;
        };
        match self.heap.replace_member(r, slot, value) {
            Ok(old) | Err(old) => self.heap.release(old),
        }
    }
}
