//=====================================================
// File: value/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Tagged Bigton values
// Objective: Inline immediates and generation-checked references into the
//            runtime heap
//=====================================================

mod handle;
pub(crate) mod heap;

use serde::Serialize;

pub use handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Null,
    Int,
    Float,
    String,
    Tuple,
    Object,
    Array,
}

/// Reference to a heap slot. Stale when the slot's generation moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(HeapRef),
    Tuple(HeapRef),
    Object(HeapRef),
    Array(HeapRef),
}

impl Value {
    pub(crate) fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Tuple(_) => ValueType::Tuple,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
        }
    }

    pub(crate) fn heap_ref(&self) -> Option<HeapRef> {
        match *self {
            Value::String(r) | Value::Tuple(r) | Value::Object(r) | Value::Array(r) => Some(r),
            Value::Null | Value::Int(_) | Value::Float(_) => None,
        }
    }

    pub(crate) fn is_truthy(&self) -> bool {
        match *self {
            Value::Null => false,
            Value::Int(value) => value != 0,
            Value::Float(value) => value != 0.0 && !value.is_nan(),
            Value::String(_) | Value::Tuple(_) | Value::Object(_) | Value::Array(_) => true,
        }
    }
}
