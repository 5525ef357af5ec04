//=====================================================
// File: value/handle.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Host-facing value handles
// Objective: Explicitly owned references into a runtime heap plus the
//            creation, access, and mutation API the host uses with them
//=====================================================

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::program::StrId;
use crate::shape::Shape;
use crate::value::heap::HeapData;
use crate::value::{HeapRef, Value, ValueType};
use crate::vm::{Runtime, ops};

const IMMEDIATE: u64 = 0;

/// A value owned by the host.
///
/// Composite handles hold one reference on their runtime's heap and must be
/// returned through `Runtime::free`. Handles are plain data: dropping one
/// without freeing only leaks until the runtime itself is dropped.
#[derive(Debug)]
#[must_use]
pub struct Handle {
    pub(crate) value: Value,
    pub(crate) runtime: u64,
}

impl Handle {
    pub fn null() -> Self {
        Self::immediate(Value::Null)
    }

    pub fn int(value: i64) -> Self {
        Self::immediate(Value::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::immediate(Value::Float(value))
    }

    fn immediate(value: Value) -> Self {
        Self {
            value,
            runtime: IMMEDIATE,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            Value::Float(value) => Some(value),
            _ => None,
        }
    }
}

impl<'a> Runtime<'a> {
    pub(crate) fn wrap(&self, value: Value) -> Handle {
        let runtime = if value.heap_ref().is_some() {
            self.id
        } else {
            IMMEDIATE
        };
        Handle { value, runtime }
    }

    /// The handle's value if it is usable with this runtime.
    pub(crate) fn resolve(&self, handle: &Handle) -> Option<Value> {
        if handle.value.heap_ref().is_none() {
            return Some(handle.value);
        }
        (handle.runtime == self.id && self.heap.is_live(handle.value)).then_some(handle.value)
    }

    fn alloc_handle(&mut self, data: HeapData<'a>, wrap: fn(HeapRef) -> Value) -> Option<Handle> {
        match self.heap.alloc(data) {
            Some(r) => Some(self.wrap(wrap(r))),
            None => {
                self.set_error(ErrorCode::ExceededMemoryLimit);
                None
            }
        }
    }

    /// Creates a dynamic string. Invalid UTF-8 yields `None` without touching
    /// the error flag.
    pub fn create_string(&mut self, bytes: &[u8]) -> Option<Handle> {
        let text = std::str::from_utf8(bytes).ok()?;
        self.alloc_handle(HeapData::String(text.into()), Value::String)
    }

    /// Creates a tuple of `length` null members.
    pub fn create_tuple(&mut self, length: usize) -> Option<Handle> {
        if length as u64 > u64::from(self.settings.max_tuple_size) {
            self.set_error(ErrorCode::TupleTooBig);
            return None;
        }
        let data = HeapData::Tuple {
            members: vec![Value::Null; length].into_boxed_slice(),
            flat_length: length as u32,
        };
        self.alloc_handle(data, Value::Tuple)
    }

    /// Creates an array of `length` null elements.
    pub fn create_array(&mut self, length: usize) -> Option<Handle> {
        self.alloc_handle(
            HeapData::Array(vec![Value::Null; length].into_boxed_slice()),
            Value::Array,
        )
    }

    /// Creates an object with null members whose shape is the interned
    /// layout of `props`. Every name must be a constant string of the
    /// program.
    pub fn create_object(&mut self, props: &[StrId]) -> Option<Handle> {
        let count = self.program.const_string_count();
        if props.iter().any(|prop| prop.0 >= count) {
            return None;
        }
        let shape = self.shapes.intern(props);
        let members = vec![Value::Null; shape.len()].into_boxed_slice();
        self.alloc_handle(HeapData::Object { shape, members }, Value::Object)
    }

    /// Returns a second owned handle to the same value.
    pub fn copy(&mut self, handle: &Handle) -> Handle {
        if let Some(value) = self.resolve(handle) {
            self.heap.retain(value);
        }
        Handle {
            value: handle.value,
            runtime: handle.runtime,
        }
    }

    /// Releases the reference held by `handle`.
    pub fn free(&mut self, handle: Handle) {
        if let Some(value) = self.resolve(&handle) {
            self.heap.release(value);
        }
    }

    pub fn get_string(&self, handle: &Handle) -> Option<&str> {
        let value = self.resolve(handle)?;
        self.heap.str(value)
    }

    fn data_of(&self, handle: &Handle, expected: ValueType) -> Option<&HeapData<'a>> {
        let value = self.resolve(handle)?;
        if value.value_type() != expected {
            return None;
        }
        self.heap.get(value.heap_ref()?)
    }

    fn member_of(&mut self, handle: &Handle, expected: ValueType, index: usize) -> Option<Handle> {
        let member = *self.data_of(handle, expected)?.members().get(index)?;
        self.heap.retain(member);
        Some(self.wrap(member))
    }

    fn set_member_of(
        &mut self,
        handle: &Handle,
        expected: ValueType,
        index: usize,
        value: &Handle,
    ) -> bool {
        let in_range = self
            .data_of(handle, expected)
            .is_some_and(|data| index < data.members().len());
        let (Some(container), Some(value)) = (self.resolve(handle), self.resolve(value)) else {
            return false;
        };
        let Some(r) = container.heap_ref().filter(|_| in_range) else {
            return false;
        };
        self.heap.retain(value);
        match self.heap.replace_member(r, index, value) {
            Ok(old) => {
                self.heap.release(old);
                true
            }
            Err(value) => {
                self.heap.release(value);
                false
            }
        }
    }

    pub fn tuple_len(&self, handle: &Handle) -> Option<usize> {
        self.data_of(handle, ValueType::Tuple)
            .map(|data| data.members().len())
    }

    pub fn tuple_member(&mut self, handle: &Handle, index: usize) -> Option<Handle> {
        self.member_of(handle, ValueType::Tuple, index)
    }

    /// Replaces a tuple member. Call `update_tuple_info` once a series of
    /// member updates is done.
    pub fn set_tuple_member(&mut self, handle: &Handle, index: usize, value: &Handle) -> bool {
        self.set_member_of(handle, ValueType::Tuple, index, value)
    }

    /// Recomputes the cached flat length of a tuple from its members.
    pub fn update_tuple_info(&mut self, handle: &Handle) {
        let Some(Value::Tuple(r)) = self.resolve(handle) else {
            return;
        };
        let Some(members) = self.heap.get(r).map(|data| data.members().to_vec()) else {
            return;
        };
        let updated = u32::try_from(self.flat_length_of(&members)).unwrap_or(u32::MAX);
        if let Some(HeapData::Tuple { flat_length, .. }) = self.heap.get_mut(r) {
            *flat_length = updated;
        }
    }

    /// Cached number of non-tuple leaves, as last computed.
    pub fn tuple_flat_len(&self, handle: &Handle) -> Option<u32> {
        match self.data_of(handle, ValueType::Tuple)? {
            HeapData::Tuple { flat_length, .. } => Some(*flat_length),
            _ => None,
        }
    }

    pub fn array_len(&self, handle: &Handle) -> Option<usize> {
        self.data_of(handle, ValueType::Array)
            .map(|data| data.members().len())
    }

    pub fn array_element(&mut self, handle: &Handle, index: usize) -> Option<Handle> {
        self.member_of(handle, ValueType::Array, index)
    }

    pub fn set_array_element(&mut self, handle: &Handle, index: usize, value: &Handle) -> bool {
        self.set_member_of(handle, ValueType::Array, index, value)
    }

    pub fn object_size(&self, handle: &Handle) -> Option<usize> {
        self.data_of(handle, ValueType::Object)
            .map(|data| data.members().len())
    }

    pub fn object_member(&mut self, handle: &Handle, slot: usize) -> Option<Handle> {
        self.member_of(handle, ValueType::Object, slot)
    }

    pub fn set_object_member(&mut self, handle: &Handle, slot: usize, value: &Handle) -> bool {
        self.set_member_of(handle, ValueType::Object, slot, value)
    }

    fn shape_of(&self, handle: &Handle) -> Option<&Arc<Shape>> {
        match self.data_of(handle, ValueType::Object)? {
            HeapData::Object { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// Slot of the property named by constant `name`.
    ///
    /// A miss on a live object sets `InvalidObjectMember`.
    pub fn find_object_prop_const(&mut self, handle: &Handle, name: StrId) -> Option<usize> {
        let shape = self.shape_of(handle)?;
        let slot = shape.slot_of(name);
        if slot.is_none() {
            self.set_error(ErrorCode::InvalidObjectMember);
        }
        slot
    }

    /// Slot of the property whose name equals `name`; `None` when absent.
    pub fn find_object_prop_dyn(&self, handle: &Handle, name: &str) -> Option<usize> {
        let shape = self.shape_of(handle)?;
        shape
            .props()
            .iter()
            .position(|prop| self.program.const_string(*prop) == Some(name))
    }

    pub fn object_prop_name(&self, handle: &Handle, slot: usize) -> Option<StrId> {
        self.shape_of(handle)?.prop_at(slot)
    }

    /// Whether both objects were built with the same interned shape.
    pub fn shares_shape(&self, a: &Handle, b: &Handle) -> bool {
        match (self.shape_of(a), self.shape_of(b)) {
            (Some(left), Some(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }

    /// Equality as the `EQUAL` instruction defines it.
    pub fn values_equal(&self, a: &Handle, b: &Handle) -> bool {
        match (self.resolve(a), self.resolve(b)) {
            (Some(left), Some(right)) => ops::values_equal(&self.heap, left, right),
            _ => false,
        }
    }
}
