//=====================================================
// File: settings.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Runtime resource limits
// Objective: Copyable configuration bundle shared by any number of
//            runtimes, loadable from TOML
//=====================================================

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Resource limits applied to a runtime.
///
/// A `Settings` value has no tie to any runtime; each runtime keeps its own
/// copy taken at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Instructions executed per batch before yielding `Continue`.
    ///
    /// A batch always executes at least one instruction, so a limit of 0
    /// behaves like 1.
    pub tick_instruction_limit: u64,
    /// Upper bound in bytes on heap allocations together with the operand
    /// stack, local and log slots.
    pub memory_usage_limit: usize,
    pub max_call_depth: u32,
    pub max_tuple_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_instruction_limit: 10_000,
            memory_usage_limit: 1 << 20,
            max_call_depth: 256,
            max_tuple_size: 256,
        }
    }
}

impl Settings {
    pub fn new(
        tick_instruction_limit: u64,
        memory_usage_limit: usize,
        max_call_depth: u32,
        max_tuple_size: u32,
    ) -> Self {
        Self {
            tick_instruction_limit,
            memory_usage_limit,
            max_call_depth,
            max_tuple_size,
        }
    }

    /// Settings with every limit raised to its maximum.
    pub fn unbounded() -> Self {
        Self {
            tick_instruction_limit: u64::MAX,
            memory_usage_limit: usize::MAX,
            max_call_depth: u32::MAX,
            max_tuple_size: u32::MAX,
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid runtime settings")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml_str(&source)
    }
}
