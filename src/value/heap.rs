//=====================================================
// File: value/heap.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Reference-counted runtime heap
// Objective: Generation-checked slot arena with per-allocation counts,
//            byte accounting against the memory limit, and iterative
//            release of member graphs
//=====================================================

use std::sync::Arc;

use crate::shape::Shape;
use crate::value::{HeapRef, Value};

/// Bytes charged for every allocation regardless of payload.
pub const ALLOC_HEADER_SIZE: usize = 32;
/// Bytes charged per value slot: composite members and the entries of the
/// operand stack, locals and log.
pub const MEMBER_SIZE: usize = 16;

#[derive(Debug)]
pub(crate) enum HeapData<'a> {
    /// Borrowed from the program's constant pool.
    ConstString(&'a str),
    String(Box<str>),
    Tuple {
        members: Box<[Value]>,
        flat_length: u32,
    },
    Object {
        shape: Arc<Shape>,
        members: Box<[Value]>,
    },
    Array(Box<[Value]>),
}

impl<'a> HeapData<'a> {
    pub(crate) fn byte_size(&self) -> usize {
        let payload = match self {
            HeapData::ConstString(_) => 0,
            HeapData::String(text) => text.len(),
            HeapData::Tuple { members, .. }
            | HeapData::Object { members, .. }
            | HeapData::Array(members) => members.len().saturating_mul(MEMBER_SIZE),
        };
        ALLOC_HEADER_SIZE.saturating_add(payload)
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            HeapData::ConstString(text) => Some(text),
            HeapData::String(text) => Some(text),
            _ => None,
        }
    }

    pub(crate) fn members(&self) -> &[Value] {
        match self {
            HeapData::Tuple { members, .. }
            | HeapData::Object { members, .. }
            | HeapData::Array(members) => members,
            HeapData::ConstString(_) | HeapData::String(_) => &[],
        }
    }

    fn into_members(self) -> Box<[Value]> {
        match self {
            HeapData::Tuple { members, .. }
            | HeapData::Object { members, .. }
            | HeapData::Array(members) => members,
            HeapData::ConstString(_) | HeapData::String(_) => Box::default(),
        }
    }
}

#[derive(Debug)]
struct Entry<'a> {
    count: u32,
    size: usize,
    data: HeapData<'a>,
}

#[derive(Debug)]
struct Slot<'a> {
    generation: u32,
    entry: Option<Entry<'a>>,
}

/// Arena of heap composites owned by one runtime.
///
/// Dropping the heap reclaims every slot regardless of outstanding counts.
#[derive(Debug)]
pub(crate) struct Heap<'a> {
    slots: Vec<Slot<'a>>,
    free: Vec<u32>,
    used: usize,
    limit: usize,
    live: usize,
}

impl<'a> Heap<'a> {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            used: 0,
            limit,
            live: 0,
        }
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    pub(crate) fn live_objects(&self) -> usize {
        self.live
    }

    /// Counts `bytes` of runtime buffer space against the limit.
    pub(crate) fn charge(&mut self, bytes: usize) -> bool {
        match self.used.checked_add(bytes) {
            Some(total) if total <= self.limit => {
                self.used = total;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn refund(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    /// Stores `data` with a count of one.
    ///
    /// `data` owns one reference to each of its members. When the allocation
    /// would exceed the limit those references are released and `None` is
    /// returned.
    pub(crate) fn alloc(&mut self, data: HeapData<'a>) -> Option<HeapRef> {
        let size = data.byte_size();
        let fits = self
            .used
            .checked_add(size)
            .is_some_and(|total| total <= self.limit);
        let index = match self.free.last() {
            Some(index) => Some(*index),
            None => u32::try_from(self.slots.len()).ok(),
        };
        let Some(index) = index.filter(|_| fits) else {
            for member in data.into_members().iter() {
                self.release(*member);
            }
            return None;
        };

        let entry = Entry {
            count: 1,
            size,
            data,
        };
        let generation = match self.slots.get_mut(index as usize) {
            Some(slot) => {
                self.free.pop();
                slot.entry = Some(entry);
                slot.generation
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                0
            }
        };
        self.used += size;
        self.live += 1;
        Some(HeapRef { index, generation })
    }

    fn entry(&self, r: HeapRef) -> Option<&Entry<'a>> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, r: HeapRef) -> Option<&mut Entry<'a>> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation != r.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub(crate) fn get(&self, r: HeapRef) -> Option<&HeapData<'a>> {
        self.entry(r).map(|entry| &entry.data)
    }

    pub(crate) fn get_mut(&mut self, r: HeapRef) -> Option<&mut HeapData<'a>> {
        self.entry_mut(r).map(|entry| &mut entry.data)
    }

    pub(crate) fn is_live(&self, value: Value) -> bool {
        match value.heap_ref() {
            Some(r) => self.entry(r).is_some(),
            None => true,
        }
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self, r: HeapRef) -> Option<u32> {
        self.entry(r).map(|entry| entry.count)
    }

    pub(crate) fn str(&self, value: Value) -> Option<&str> {
        match value {
            Value::String(r) => self.get(r)?.as_str(),
            _ => None,
        }
    }

    /// Adds one reference to a composite. Immediates and stale refs are ignored.
    pub(crate) fn retain(&mut self, value: Value) {
        if let Some(entry) = value.heap_ref().and_then(|r| self.entry_mut(r)) {
            entry.count = entry.count.saturating_add(1);
        }
    }

    /// Drops one reference, freeing slots whose count reaches zero.
    pub(crate) fn release(&mut self, value: Value) {
        let mut pending = vec![value];
        while let Some(value) = pending.pop() {
            let Some(r) = value.heap_ref() else {
                continue;
            };
            let Some(slot) = self.slots.get_mut(r.index as usize) else {
                continue;
            };
            if slot.generation != r.generation {
                continue;
            }
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            entry.count -= 1;
            if entry.count > 0 {
                continue;
            }
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(r.index);
                self.used -= entry.size;
                self.live -= 1;
                pending.extend(entry.data.into_members().iter().copied());
            }
        }
    }

    /// Replaces a member slot of a composite, returning the old member.
    ///
    /// The new value's reference is moved in; the caller owns the returned one.
    pub(crate) fn replace_member(
        &mut self,
        container: HeapRef,
        index: usize,
        value: Value,
    ) -> Result<Value, Value> {
        let Some(data) = self.get_mut(container) else {
            return Err(value);
        };
        let members = match data {
            HeapData::Tuple { members, .. }
            | HeapData::Object { members, .. }
            | HeapData::Array(members) => members,
            HeapData::ConstString(_) | HeapData::String(_) => return Err(value),
        };
        match members.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(value),
        }
    }
}
