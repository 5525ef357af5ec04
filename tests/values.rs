// Bigton host value API tests
// Covers: handle ownership, heap accounting, tuples, arrays, objects, shapes

use bigton_runtime::{
    ALLOC_HEADER_SIZE, ErrorCode, ExecStatus, Handle, Instruction, MEMBER_SIZE, ProgramWriter,
    Runtime, Settings, ValueType,
};

fn program_with_names(names: &[&str]) -> Vec<u8> {
    let mut writer = ProgramWriter::new();
    for name in names {
        writer.string(name);
    }
    writer.emit(Instruction::LoadNull);
    writer.encode()
}

#[test]
fn immediates_need_no_runtime() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let number = Handle::int(12);
    assert_eq!(number.value_type(), ValueType::Int);
    assert_eq!(number.as_float(), None);
    assert!(runtime.push(&number));
    assert!(runtime.push(&Handle::float(0.5)));
    assert_eq!(runtime.used_memory(), 2 * MEMBER_SIZE);
    assert_eq!(runtime.live_objects(), 0);

    let top = runtime.pop().expect("float");
    assert_eq!(top.as_float(), Some(0.5));
    assert_eq!(runtime.used_memory(), MEMBER_SIZE);
    let copy = runtime.copy(&top);
    assert_eq!(copy.as_float(), Some(0.5));
}

#[test]
fn strings_are_accounted_by_length() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let text = runtime.create_string(b"abcd").expect("string");
    assert_eq!(runtime.get_string(&text), Some("abcd"));
    assert_eq!(runtime.used_memory(), ALLOC_HEADER_SIZE + 4);

    assert!(runtime.create_string(&[0xff, 0xfe]).is_none());
    assert!(!runtime.has_error());

    runtime.free(text);
    assert_eq!(runtime.used_memory(), 0);
}

#[test]
fn copies_keep_the_value_alive() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let original = runtime.create_string(b"shared").expect("string");
    let copy = runtime.copy(&original);
    runtime.free(original);
    assert_eq!(runtime.get_string(&copy), Some("shared"));
    assert_eq!(runtime.live_objects(), 1);

    runtime.free(copy);
    assert_eq!(runtime.live_objects(), 0);
}

#[test]
fn stack_holds_its_own_reference() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let array = runtime.create_array(3).expect("array");
    assert_eq!(
        runtime.used_memory(),
        ALLOC_HEADER_SIZE + 3 * MEMBER_SIZE
    );
    assert!(runtime.push(&array));
    runtime.free(array);
    assert_eq!(runtime.live_objects(), 1);
    assert_eq!(
        runtime.used_memory(),
        ALLOC_HEADER_SIZE + 4 * MEMBER_SIZE
    );

    let peeked = runtime.stack_get(0).expect("bottom");
    assert_eq!(runtime.array_len(&peeked), Some(3));
    runtime.free(peeked);

    let popped = runtime.pop().expect("array");
    runtime.free(popped);
    assert_eq!(runtime.used_memory(), 0);
    assert!(runtime.pop().is_none());
}

#[test]
fn handles_from_another_runtime_are_rejected() {
    let bytes = program_with_names(&[]);
    let mut first = Runtime::new(&Settings::default(), &bytes).expect("load");
    let mut second = Runtime::new(&Settings::default(), &bytes).expect("load");

    let text = first.create_string(b"mine").expect("string");
    assert!(!second.push(&text));
    assert_eq!(second.get_string(&text), None);
    assert_eq!(second.stack_len(), 0);
    second.free(text);
    assert_eq!(first.live_objects(), 1);
}

#[test]
fn handles_may_outlive_their_runtime() {
    let bytes = program_with_names(&[]);
    let orphan = {
        let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
        runtime.create_array(2).expect("array")
    };
    assert_eq!(orphan.value_type(), ValueType::Array);

    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
    assert_eq!(runtime.array_len(&orphan), None);
    runtime.free(orphan);
}

#[test]
fn array_elements_can_be_replaced() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let array = runtime.create_array(2).expect("array");
    let text = runtime.create_string(b"member").expect("string");
    assert!(runtime.set_array_element(&array, 1, &text));
    assert!(!runtime.set_array_element(&array, 2, &text));
    runtime.free(text);

    let member = runtime.array_element(&array, 1).expect("member");
    assert_eq!(runtime.get_string(&member), Some("member"));
    runtime.free(member);

    assert!(runtime.set_array_element(&array, 1, &Handle::int(3)));
    assert_eq!(runtime.live_objects(), 1);
    let first = runtime.array_element(&array, 0).expect("first");
    assert!(first.is_null());
    runtime.free(array);
    assert_eq!(runtime.used_memory(), 0);
}

#[test]
fn member_handles_alias_the_stored_value() {
    let bytes = program_with_names(&["inner"]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
    let name = runtime.program().find_const_string("inner").expect("name");

    let outer = runtime.create_array(1).expect("outer");
    let inner = runtime.create_array(2).expect("inner");
    assert!(runtime.set_array_element(&outer, 0, &inner));
    runtime.free(inner);

    let fetched = runtime.array_element(&outer, 0).expect("element");
    assert!(runtime.set_array_element(&fetched, 1, &Handle::int(7)));
    runtime.free(fetched);
    let again = runtime.array_element(&outer, 0).expect("element");
    let member = runtime.array_element(&again, 1).expect("member");
    assert_eq!(member.as_int(), Some(7));
    runtime.free(again);

    let alias = runtime.copy(&outer);
    assert!(runtime.set_array_element(&alias, 0, &Handle::int(3)));
    let replaced = runtime.array_element(&outer, 0).expect("element");
    assert_eq!(replaced.as_int(), Some(3));
    runtime.free(alias);
    runtime.free(outer);

    let object = runtime.create_object(&[name]).expect("object");
    let tuple = runtime.create_tuple(1).expect("tuple");
    assert!(runtime.set_object_member(&object, 0, &tuple));
    let stored = runtime.object_member(&object, 0).expect("stored");
    assert!(runtime.set_tuple_member(&stored, 0, &Handle::float(1.5)));
    let seen = runtime.tuple_member(&tuple, 0).expect("seen");
    assert_eq!(seen.as_float(), Some(1.5));
    for handle in [stored, tuple, object] {
        runtime.free(handle);
    }
    assert_eq!(runtime.live_objects(), 0);
}

#[test]
fn separately_created_composites_stay_independent() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let first = runtime.create_tuple(2).expect("first");
    let second = runtime.create_tuple(2).expect("second");
    for tuple in [&first, &second] {
        assert!(runtime.set_tuple_member(tuple, 0, &Handle::int(1)));
    }
    assert!(runtime.values_equal(&first, &second));

    assert!(runtime.set_tuple_member(&first, 0, &Handle::int(2)));
    let untouched = runtime.tuple_member(&second, 0).expect("member");
    assert_eq!(untouched.as_int(), Some(1));
    assert!(!runtime.values_equal(&first, &second));

    let left = runtime.create_array(1).expect("left");
    let right = runtime.create_array(1).expect("right");
    assert!(runtime.set_array_element(&left, 0, &Handle::int(5)));
    let other = runtime.array_element(&right, 0).expect("element");
    assert!(other.is_null());

    for handle in [first, second, left, right] {
        runtime.free(handle);
    }
    assert_eq!(runtime.live_objects(), 0);
}

#[test]
fn cyclic_tuples_compare_equal_without_hanging() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let first = runtime.create_tuple(1).expect("first");
    let second = runtime.create_tuple(1).expect("second");
    assert!(runtime.set_tuple_member(&first, 0, &first));
    assert!(runtime.set_tuple_member(&second, 0, &second));
    runtime.update_tuple_info(&first);
    runtime.update_tuple_info(&second);

    assert!(runtime.values_equal(&first, &second));
    assert!(!runtime.values_equal(&first, &Handle::null()));
}

#[test]
fn equal_instruction_terminates_on_cyclic_tuples() {
    let mut writer = ProgramWriter::new();
    writer.globals(1);
    writer.emit_all(&[Instruction::Equal, Instruction::StoreGlobal(0)]);
    let bytes = writer.encode();
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    for _ in 0..2 {
        let tuple = runtime.create_tuple(1).expect("tuple");
        assert!(runtime.set_tuple_member(&tuple, 0, &tuple));
        assert!(runtime.push(&tuple));
        runtime.free(tuple);
    }
    runtime.start_tick();
    assert_eq!(runtime.execute_batch(), ExecStatus::Complete);
    assert_eq!(runtime.global(0).and_then(|value| value.as_int()), Some(1));
}

#[test]
fn tuple_info_counts_nested_leaves() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let inner = runtime.create_tuple(3).expect("inner");
    let outer = runtime.create_tuple(2).expect("outer");
    assert_eq!(runtime.tuple_flat_len(&outer), Some(2));

    assert!(runtime.set_tuple_member(&outer, 0, &inner));
    assert!(runtime.set_tuple_member(&outer, 1, &Handle::int(9)));
    runtime.update_tuple_info(&outer);
    assert_eq!(runtime.tuple_len(&outer), Some(2));
    assert_eq!(runtime.tuple_flat_len(&outer), Some(4));

    let nested = runtime.tuple_member(&outer, 0).expect("nested");
    assert_eq!(runtime.tuple_len(&nested), Some(3));
    runtime.free(nested);
    runtime.free(inner);
    runtime.free(outer);
    assert_eq!(runtime.live_objects(), 0);
}

#[test]
fn tuple_creation_honours_the_size_limit() {
    let bytes = program_with_names(&[]);
    let limits = Settings {
        max_tuple_size: 4,
        ..Settings::default()
    };
    let mut runtime = Runtime::new(&limits, &bytes).expect("load");

    let fits = runtime.create_tuple(4).expect("tuple");
    runtime.free(fits);
    assert!(runtime.create_tuple(5).is_none());
    assert_eq!(runtime.error(), Some(ErrorCode::TupleTooBig));
}

#[test]
fn objects_with_equal_layouts_share_a_shape() {
    let bytes = program_with_names(&["x", "y", "z"]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
    let program = runtime.program();
    let x = program.find_const_string("x").expect("x");
    let y = program.find_const_string("y").expect("y");
    let z = program.find_const_string("z").expect("z");

    let first = runtime.create_object(&[x, y]).expect("first");
    let second = runtime.create_object(&[x, y]).expect("second");
    let swapped = runtime.create_object(&[y, x]).expect("swapped");
    assert!(runtime.shares_shape(&first, &second));
    assert!(!runtime.shares_shape(&first, &swapped));
    assert_eq!(runtime.object_size(&first), Some(2));
    assert_eq!(runtime.object_prop_name(&swapped, 0), Some(y));

    assert_eq!(runtime.find_object_prop_dyn(&first, "y"), Some(1));
    assert_eq!(runtime.find_object_prop_dyn(&first, "w"), None);
    assert!(!runtime.has_error());

    assert!(runtime.set_object_member(&first, 1, &Handle::int(5)));
    let slot = runtime.find_object_prop_const(&first, y).expect("slot");
    let member = runtime.object_member(&first, slot).expect("member");
    assert_eq!(member.as_int(), Some(5));

    assert_eq!(runtime.find_object_prop_const(&first, z), None);
    assert_eq!(runtime.error(), Some(ErrorCode::InvalidObjectMember));

    for object in [first, second, swapped] {
        runtime.free(object);
    }
}

#[test]
fn object_names_must_be_constants() {
    let bytes = program_with_names(&["x"]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
    let count = runtime.const_string_count();
    assert!(
        runtime
            .create_object(&[bigton_runtime::StrId(count)])
            .is_none()
    );
    assert_eq!(runtime.live_objects(), 0);
}

#[test]
fn equality_matches_the_instruction_rules() {
    let bytes = program_with_names(&[]);
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");

    let left = runtime.create_string(b"same").expect("left");
    let right = runtime.create_string(b"same").expect("right");
    assert!(runtime.values_equal(&left, &right));

    let array = runtime.create_array(0).expect("array");
    let other = runtime.create_array(0).expect("other");
    let alias = runtime.copy(&array);
    assert!(runtime.values_equal(&array, &alias));
    assert!(!runtime.values_equal(&array, &other));
    assert!(runtime.values_equal(&Handle::int(2), &Handle::int(2)));
    assert!(!runtime.values_equal(&Handle::int(2), &Handle::float(2.0)));

    for handle in [left, right, array, other, alias] {
        runtime.free(handle);
    }
}

#[test]
fn globals_are_readable_after_execution() {
    let mut writer = ProgramWriter::new();
    let greeting = writer.string("hi");
    writer.globals(2);
    writer.emit_all(&[
        Instruction::LoadString(greeting),
        Instruction::StoreGlobal(1),
    ]);
    let bytes = writer.encode();
    let mut runtime = Runtime::new(&Settings::default(), &bytes).expect("load");
    runtime.start_tick();
    assert_eq!(runtime.execute_batch(), ExecStatus::Complete);

    let unset = runtime.global(0).expect("global 0");
    assert!(unset.is_null());
    let stored = runtime.global(1).expect("global 1");
    assert_eq!(runtime.get_string(&stored), Some("hi"));
    assert_eq!(runtime.used_memory(), ALLOC_HEADER_SIZE);
    runtime.free(stored);
    assert!(runtime.global(2).is_none());
}

#[test]
fn runtimes_can_move_between_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<Runtime<'static>>();
    assert_send::<Handle>();
}
