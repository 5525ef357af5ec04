//=====================================================
// File: shape.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Object layouts
// Objective: Map property names to member slots and intern layouts so
//            equal property lists share one shape per runtime
//=====================================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::program::StrId;

/// Ordered property layout of an object.
#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    props: Box<[StrId]>,
    slots: HashMap<StrId, usize>,
}

impl Shape {
    fn new(props: &[StrId]) -> Self {
        let mut slots = HashMap::with_capacity(props.len());
        for (slot, prop) in props.iter().enumerate() {
            // the first declaration of a repeated name owns it
            slots.entry(*prop).or_insert(slot);
        }
        Self {
            props: props.into(),
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn props(&self) -> &[StrId] {
        &self.props
    }

    pub fn slot_of(&self, name: StrId) -> Option<usize> {
        self.slots.get(&name).copied()
    }

    pub fn prop_at(&self, slot: usize) -> Option<StrId> {
        self.props.get(slot).copied()
    }
}

/// Per-runtime interning table for shapes.
#[derive(Debug, Default)]
pub struct ShapeTable {
    interned: HashMap<Box<[StrId]>, Arc<Shape>>,
}

impl ShapeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, props: &[StrId]) -> Arc<Shape> {
        if let Some(shape) = self.interned.get(props) {
            return Arc::clone(shape);
        }
        let shape = Arc::new(Shape::new(props));
        self.interned.insert(props.into(), Arc::clone(&shape));
        shape
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_sequences_share_a_shape() {
        let mut table = ShapeTable::new();
        let a = table.intern(&[StrId(1), StrId(2)]);
        let b = table.intern(&[StrId(1), StrId(2)]);
        let c = table.intern(&[StrId(2), StrId(1)]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn slot_lookup_both_directions() {
        let mut table = ShapeTable::new();
        let shape = table.intern(&[StrId(4), StrId(7), StrId(4)]);
        assert_eq!(shape.slot_of(StrId(7)), Some(1));
        assert_eq!(shape.slot_of(StrId(4)), Some(0));
        assert_eq!(shape.slot_of(StrId(9)), None);
        assert_eq!(shape.prop_at(2), Some(StrId(4)));
        assert_eq!(shape.prop_at(3), None);
    }
}
