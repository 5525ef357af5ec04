//=====================================================
// File: lib.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton runtime library root
// Objective: Expose the program loader, tick-driven runtime, value
//            handles, and diagnostics
//=====================================================

//! Cooperatively scheduled, resource-bounded runtime for Bigton bytecode.
//!
//! A host loads a program with [`Runtime::new`], then drives it tick by tick:
//!
//! ```no_run
//! use bigton_runtime::{ExecStatus, Runtime, Settings};
//!
//! # fn drive(bytes: &[u8]) -> Result<(), bigton_runtime::ProgramError> {
//! let mut runtime = Runtime::new(&Settings::default(), bytes)?;
//! runtime.start_tick();
//! loop {
//!     match runtime.execute_batch() {
//!         ExecStatus::Continue => continue,
//!         ExecStatus::ExecBuiltinFun => {
//!             // pop arguments, run the builtin, push one result
//!             runtime.push(&bigton_runtime::Handle::null());
//!         }
//!         ExecStatus::AwaitTick => runtime.start_tick(),
//!         ExecStatus::Complete | ExecStatus::Error => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod program;
pub mod settings;
pub mod shape;
pub mod value;
pub mod vm;

pub use diagnostics::TraceEntry;
pub use error::{ErrorCode, ProgramError};
pub use program::{Instruction, Opcode, Program, ProgramWriter, SourcePos, StrId};
pub use settings::Settings;
pub use value::heap::{ALLOC_HEADER_SIZE, MEMBER_SIZE};
pub use value::{Handle, ValueType};
pub use vm::{ExecStatus, Runtime};
