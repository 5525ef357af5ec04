//=====================================================
// File: bin/bigton_disasm.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Bigton program disassembler
// Objective: Print the tables and instruction listing of a compiled program
//=====================================================

use anyhow::{Context, Result, anyhow};
use bigton_runtime::Program;
use std::{env, fs};

fn main() -> Result<()> {
    let input = env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("no input file provided"))?;
    let data = fs::read(&input).with_context(|| format!("failed to read {input}"))?;
    let program = Program::parse(&data).with_context(|| format!("failed to load {input}"))?;
    print!("{program}");
    Ok(())
}
