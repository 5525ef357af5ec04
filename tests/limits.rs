// Bigton resource limit tests
// Covers: memory limit, call depth, tuple size

use bigton_runtime::{
    ALLOC_HEADER_SIZE, ErrorCode, ExecStatus, Handle, Instruction, MEMBER_SIZE, ProgramWriter,
    Runtime, Settings,
};

fn run(runtime: &mut Runtime<'_>) -> ExecStatus {
    runtime.start_tick();
    loop {
        match runtime.execute_batch() {
            ExecStatus::Continue => {}
            ExecStatus::AwaitTick => runtime.start_tick(),
            status => return status,
        }
    }
}

#[test]
fn growing_structure_stops_at_the_memory_limit() {
    let mut writer = ProgramWriter::new();
    writer.globals(1);
    writer.emit_loop(|w| {
        w.emit_all(&[
            Instruction::LoadGlobal(0),
            Instruction::LoadArray(1),
            Instruction::StoreGlobal(0),
        ]);
    });
    let bytes = writer.encode();
    let limit = 256;
    let limits = Settings::new(1_000, limit, 16, 16);
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    assert_eq!(run(&mut runtime), ExecStatus::Error);
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMemoryLimit));
    let array_size = ALLOC_HEADER_SIZE + MEMBER_SIZE;
    assert_eq!(runtime.used_memory(), (limit / array_size) * array_size);
    assert!(runtime.used_memory() <= limit);
}

#[test]
fn growing_operand_stack_stops_at_the_memory_limit() {
    let mut writer = ProgramWriter::new();
    writer.emit_loop(|w| {
        w.emit(Instruction::LoadInt(1));
    });
    let bytes = writer.encode();
    let limit = 256;
    let limits = Settings::new(1_000, limit, 16, 16);
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    assert_eq!(run(&mut runtime), ExecStatus::Error);
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMemoryLimit));
    assert_eq!(runtime.stack_len(), limit / MEMBER_SIZE);
    assert_eq!(runtime.used_memory(), limit);
}

#[test]
fn locals_count_against_the_memory_limit() {
    let mut writer = ProgramWriter::new();
    for value in 0..10 {
        writer.emit_all(&[Instruction::LoadInt(value), Instruction::PushLocal]);
    }
    let bytes = writer.encode();
    let limit = 8 * MEMBER_SIZE;
    let limits = Settings::new(1_000, limit, 16, 16);
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    assert_eq!(run(&mut runtime), ExecStatus::Error);
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMemoryLimit));
    assert_eq!(runtime.stack_len(), 0);
    assert_eq!(runtime.used_memory(), limit);
}

#[test]
fn host_pushes_and_log_entries_count_against_the_memory_limit() {
    let mut writer = ProgramWriter::new();
    writer.emit(Instruction::LoadNull);
    let bytes = writer.encode();
    let limit = ALLOC_HEADER_SIZE + 2 + 5 * MEMBER_SIZE;
    let limits = Settings {
        memory_usage_limit: limit,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    let line = runtime.create_string(b"ab").expect("string");
    for _ in 0..3 {
        assert!(runtime.append_log(&line));
    }
    assert!(runtime.push(&Handle::int(1)));
    assert!(runtime.push(&line));
    assert!(!runtime.push(&Handle::int(2)));
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMemoryLimit));
    assert!(!runtime.append_log(&line));
    assert_eq!(runtime.log_len(), 3);
    assert_eq!(runtime.stack_len(), 2);
    assert_eq!(runtime.used_memory(), limit);

    let top = runtime.pop().expect("string");
    assert_eq!(runtime.used_memory(), limit - MEMBER_SIZE);
    runtime.free(top);
    runtime.free(line);
}

#[test]
fn host_allocation_respects_the_memory_limit() {
    let mut writer = ProgramWriter::new();
    writer.emit(Instruction::LoadNull);
    let bytes = writer.encode();
    let limits = Settings {
        memory_usage_limit: 128,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    let small = runtime.create_array(2).expect("fits");
    assert!(runtime.create_array(100).is_none());
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMemoryLimit));
    assert_eq!(runtime.used_memory(), ALLOC_HEADER_SIZE + 2 * MEMBER_SIZE);
    runtime.free(small);
}

#[test]
fn recursion_stops_at_the_call_depth_limit() {
    let mut writer = ProgramWriter::new();
    let recurse = writer.declare_function("recurse", "deep.bg", 1);
    writer.global_body(|w| {
        w.emit(Instruction::Call(recurse));
    });
    writer.define_function(recurse, |w| {
        w.emit(Instruction::Call(recurse));
    });
    let bytes = writer.encode();
    let limits = Settings {
        max_call_depth: 8,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    assert_eq!(run(&mut runtime), ExecStatus::Error);
    assert_eq!(runtime.error(), Some(ErrorCode::ExceededMaximumCallDepth));
    assert_eq!(runtime.trace_len(), 8);
}

#[test]
fn call_depth_limit_allows_exactly_the_limit() {
    let mut writer = ProgramWriter::new();
    writer.globals(1);
    let leaf = writer.declare_function("leaf", "leaf.bg", 1);
    let middle = writer.declare_function("middle", "leaf.bg", 5);
    writer.global_body(|w| {
        w.emit_all(&[Instruction::Call(middle), Instruction::StoreGlobal(0)]);
    });
    writer.define_function(middle, |w| {
        w.emit_all(&[Instruction::Call(leaf), Instruction::Return]);
    });
    writer.define_function(leaf, |w| {
        w.emit_all(&[Instruction::LoadInt(3), Instruction::Return]);
    });
    let bytes = writer.encode();
    let limits = Settings {
        max_call_depth: 2,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    assert_eq!(run(&mut runtime), ExecStatus::Complete);
    assert_eq!(
        runtime.global(0).and_then(|value| value.as_int()),
        Some(3)
    );
}

#[test]
fn nested_tuples_count_their_leaves() {
    let mut writer = ProgramWriter::new();
    writer.emit_all(&[
        Instruction::LoadInt(1),
        Instruction::LoadInt(2),
        Instruction::LoadTuple(2),
        Instruction::LoadInt(3),
        Instruction::LoadTuple(2),
    ]);
    let bytes = writer.encode();

    let tight = Settings {
        max_tuple_size: 2,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&tight, &bytes).expect("load");
    assert_eq!(run(&mut runtime), ExecStatus::Error);
    assert_eq!(runtime.error(), Some(ErrorCode::TupleTooBig));
    assert_eq!(runtime.used_memory(), 0);

    let roomy = Settings {
        max_tuple_size: 3,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&roomy, &bytes).expect("load");
    assert_eq!(run(&mut runtime), ExecStatus::Complete);
    let tuple = runtime.pop().expect("tuple");
    assert_eq!(runtime.tuple_flat_len(&tuple), Some(3));
    runtime.free(tuple);
}
