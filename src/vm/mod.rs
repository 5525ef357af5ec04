//=====================================================
// File: vm/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton runtime instance
// Objective: Own all per-runtime execution state and drive the tick
//            protocol in budget-bounded batches
//=====================================================

mod exec;
pub(crate) mod ops;
pub(crate) mod scope;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::error::{ErrorCode, ProgramError};
use crate::program::{Program, SourcePos, StrId};
use crate::settings::Settings;
use crate::shape::{Shape, ShapeTable};
use crate::value::heap::{Heap, MEMBER_SIZE};
use crate::value::{Handle, Value};
use scope::{Frame, Scope, ScopeKind};

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

/// Result of one `execute_batch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    /// Budget exhausted; call `execute_batch` again.
    Continue,
    /// The program called a host builtin, see `Runtime::awaiting_builtin`.
    ExecBuiltinFun,
    /// End of a tick loop body; call `start_tick` before continuing.
    AwaitTick,
    Complete,
    Error,
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecStatus::Continue => "continue",
            ExecStatus::ExecBuiltinFun => "exec_builtin_fun",
            ExecStatus::AwaitTick => "await_tick",
            ExecStatus::Complete => "complete",
            ExecStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    AwaitingTick,
    Complete,
}

/// Instruction budget of the batch in progress.
#[derive(Debug)]
pub(crate) struct Budget {
    limit: u64,
    used: u64,
    executed: u64,
}

impl Budget {
    /// Every batch gets to execute at least one instruction.
    fn exhausted(&self) -> bool {
        self.executed > 0 && self.used >= self.limit
    }

    fn charge(&mut self, cost: u64) {
        self.used = self.used.saturating_add(cost);
        self.executed += 1;
    }
}

/// A loaded program together with its heap and execution state.
///
/// Handles issued by a runtime are only meaningful to that runtime. Dropping
/// the runtime reclaims all heap storage, including storage still referenced
/// by outstanding handles.
pub struct Runtime<'a> {
    pub(crate) id: u64,
    pub(crate) settings: Settings,
    pub(crate) program: Program<'a>,
    pub(crate) heap: Heap<'a>,
    pub(crate) shapes: ShapeTable,
    pub(crate) program_shapes: Vec<Arc<Shape>>,
    pub(crate) stack: Vec<Value>,
    pub(crate) locals: Vec<Value>,
    pub(crate) globals: Vec<Value>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) trace: Vec<Frame>,
    pub(crate) log: Vec<Value>,
    pub(crate) source: SourcePos,
    pub(crate) ip: u32,
    awaiting_builtin: Option<u32>,
    carried_cost: u64,
    error: Option<ErrorCode>,
    state: RunState,
}

impl<'a> Runtime<'a> {
    /// Parses `bytes` and creates a runtime ready for its first tick.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn new(settings: &Settings, bytes: &'a [u8]) -> Result<Self, ProgramError> {
        let program = Program::parse(bytes).inspect_err(|err| {
            debug!(%err, "program rejected");
        })?;
        Ok(Self::with_program(settings, program))
    }

    /// Creates a runtime from `length` bytes at `offset` inside `buffer`.
    pub fn from_range(
        settings: &Settings,
        buffer: &'a [u8],
        offset: usize,
        length: usize,
    ) -> Result<Self, ProgramError> {
        let program = Program::parse_range(buffer, offset, length)?;
        Ok(Self::with_program(settings, program))
    }

    #[instrument(skip_all, fields(instructions = program.instructions().len()))]
    pub fn with_program(settings: &Settings, program: Program<'a>) -> Self {
        let mut shapes = ShapeTable::new();
        let program_shapes = program.shapes.iter().map(|props| shapes.intern(props)).collect();
        let (global_start, global_length) = program.global_body();
        let global_end = global_start.saturating_add(global_length);
        let id = NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            runtime = id,
            globals = program.num_globals(),
            shapes = shapes.len(),
            "runtime created"
        );
        Self {
            id,
            settings: *settings,
            heap: Heap::new(settings.memory_usage_limit),
            shapes,
            program_shapes,
            stack: Vec::new(),
            locals: Vec::new(),
            globals: vec![Value::Null; program.num_globals() as usize],
            scopes: vec![Scope::new(
                ScopeKind::Global,
                global_start,
                global_end,
                global_end,
            )],
            trace: Vec::new(),
            log: Vec::new(),
            source: SourcePos {
                file: program.unknown_str(),
                line: 0,
            },
            ip: global_start,
            awaiting_builtin: None,
            carried_cost: 0,
            error: None,
            state: RunState::Running,
            program,
        }
    }

    pub fn program(&self) -> &Program<'a> {
        &self.program
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Begins a new tick: releases a pending `AwaitTick` and resets the budget.
    pub fn start_tick(&mut self) {
        if self.state == RunState::AwaitingTick {
            self.state = RunState::Running;
        }
        self.carried_cost = 0;
        trace!(runtime = self.id, "tick started");
    }

    /// Runs instructions until the budget is spent or execution suspends.
    pub fn execute_batch(&mut self) -> ExecStatus {
        if self.error.is_some() {
            return ExecStatus::Error;
        }
        match self.state {
            RunState::Complete => return ExecStatus::Complete,
            RunState::AwaitingTick => return ExecStatus::AwaitTick,
            RunState::Running => {}
        }
        self.awaiting_builtin = None;
        let mut budget = Budget {
            limit: self.settings.tick_instruction_limit,
            used: std::mem::take(&mut self.carried_cost),
            executed: 0,
        };
        loop {
            let status = self.step(&mut budget);
            if self.error.is_some() {
                return ExecStatus::Error;
            }
            if let Some(status) = status {
                return status;
            }
        }
    }

    pub(crate) fn suspend_for_builtin(&mut self, builtin: u32, cost: u64) -> ExecStatus {
        self.awaiting_builtin = Some(builtin);
        self.carried_cost = cost;
        trace!(
            runtime = self.id,
            builtin,
            name = self.program.builtin_name(builtin).unwrap_or("?"),
            "awaiting builtin"
        );
        ExecStatus::ExecBuiltinFun
    }

    pub(crate) fn suspend_for_tick(&mut self) -> ExecStatus {
        self.state = RunState::AwaitingTick;
        ExecStatus::AwaitTick
    }

    pub(crate) fn finish(&mut self) -> ExecStatus {
        self.state = RunState::Complete;
        debug!(runtime = self.id, "program complete");
        ExecStatus::Complete
    }

    /// Index of the builtin the last `ExecBuiltinFun` batch is waiting on.
    pub fn awaiting_builtin(&self) -> Option<u32> {
        self.awaiting_builtin
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<ErrorCode> {
        self.error
    }

    /// Sets the error flag unless an earlier error is already recorded.
    pub fn set_error(&mut self, code: ErrorCode) {
        if self.error.is_none() {
            debug!(
                runtime = self.id,
                code = code.code(),
                error = %code,
                file = self.current_file(),
                line = self.source.line,
                "runtime error"
            );
            self.error = Some(code);
        }
    }

    pub fn current_source(&self) -> SourcePos {
        self.source
    }

    pub fn current_file(&self) -> &'a str {
        self.program.str_or_unknown(self.source.file)
    }

    pub fn current_line(&self) -> u32 {
        self.source.line
    }

    pub fn used_memory(&self) -> usize {
        self.heap.used()
    }

    pub fn live_objects(&self) -> usize {
        self.heap.live_objects()
    }

    pub fn const_string(&self, id: StrId) -> Option<&'a str> {
        self.program.const_string(id)
    }

    pub fn const_string_count(&self) -> u32 {
        self.program.const_string_count()
    }

    /// Pushes a copy of `handle` onto the operand stack.
    ///
    /// Returns `false` and leaves the stack unchanged for handles that do not
    /// belong to this runtime or refer to freed storage. A push past the
    /// memory limit also fails and sets `ExceededMemoryLimit`.
    pub fn push(&mut self, handle: &Handle) -> bool {
        let Some(value) = self.resolve(handle) else {
            return false;
        };
        if !self.heap.charge(MEMBER_SIZE) {
            self.set_error(ErrorCode::ExceededMemoryLimit);
            return false;
        }
        self.heap.retain(value);
        self.stack.push(value);
        true
    }

    /// Pops the top of the operand stack. The returned handle owns the
    /// reference the stack held.
    pub fn pop(&mut self) -> Option<Handle> {
        let value = self.stack.pop()?;
        self.heap.refund(MEMBER_SIZE);
        Some(self.wrap(value))
    }

    /// Copy of the stack entry at `index`, counted from the bottom.
    pub fn stack_get(&mut self, index: usize) -> Option<Handle> {
        let value = *self.stack.get(index)?;
        self.heap.retain(value);
        Some(self.wrap(value))
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Copy of global variable `index`.
    pub fn global(&mut self, index: u32) -> Option<Handle> {
        let value = *self.globals.get(index as usize)?;
        self.heap.retain(value);
        Some(self.wrap(value))
    }

    /// Moves `value` onto the operand stack. Past the memory limit the value
    /// is released instead.
    pub(crate) fn stack_push(&mut self, value: Value) {
        if self.heap.charge(MEMBER_SIZE) {
            self.stack.push(value);
        } else {
            self.heap.release(value);
            self.set_error(ErrorCode::ExceededMemoryLimit);
        }
    }

    pub(crate) fn stack_pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => {
                self.heap.refund(MEMBER_SIZE);
                value
            }
            None => {
                self.set_error(ErrorCode::StackEmpty);
                Value::Null
            }
        }
    }

    pub(crate) fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    pub(crate) fn pop_scope(&mut self) -> Option<Scope> {
        let scope = self.scopes.pop()?;
        self.release_locals(scope.num_locals);
        Some(scope)
    }

    pub(crate) fn release_locals(&mut self, count: u32) {
        for _ in 0..count {
            if let Some(value) = self.locals.pop() {
                self.heap.refund(MEMBER_SIZE);
                self.heap.release(value);
            }
        }
    }
}

impl fmt::Debug for Runtime<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("ip", &self.ip)
            .field("stack", &self.stack.len())
            .field("scopes", &self.scopes.len())
            .field("used_memory", &self.heap.used())
            .finish()
    }
}
