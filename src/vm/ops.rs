//=====================================================
// File: vm/ops.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Operator semantics
// Objective: Arithmetic, comparison, and equality over tagged values
//=====================================================

use std::collections::HashSet;

use crate::error::ErrorCode;
use crate::value::Value;
use crate::value::heap::{Heap, HeapData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

pub(crate) fn arithmetic(op: ArithOp, lhs: Value, rhs: Value) -> Result<Value, ErrorCode> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => integer_arithmetic(op, a, b).map(Value::Int),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_arithmetic(op, a, b))),
        _ => Err(ErrorCode::OperandsNotNumbers),
    }
}

fn integer_arithmetic(op: ArithOp, lhs: i64, rhs: i64) -> Result<i64, ErrorCode> {
    match op {
        ArithOp::Add => Ok(lhs.wrapping_add(rhs)),
        ArithOp::Subtract => Ok(lhs.wrapping_sub(rhs)),
        ArithOp::Multiply => Ok(lhs.wrapping_mul(rhs)),
        ArithOp::Divide | ArithOp::Remainder if rhs == 0 => Err(ErrorCode::IntDivisionByZero),
        ArithOp::Divide => Ok(lhs.wrapping_div(rhs)),
        ArithOp::Remainder => Ok(lhs.wrapping_rem(rhs)),
    }
}

fn float_arithmetic(op: ArithOp, lhs: f64, rhs: f64) -> f64 {
    match op {
        ArithOp::Add => lhs + rhs,
        ArithOp::Subtract => lhs - rhs,
        ArithOp::Multiply => lhs * rhs,
        ArithOp::Divide => lhs / rhs,
        ArithOp::Remainder => lhs % rhs,
    }
}

pub(crate) fn negate(value: Value) -> Result<Value, ErrorCode> {
    match value {
        Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
        Value::Float(v) => Ok(Value::Float(-v)),
        _ => Err(ErrorCode::OperandsNotNumbers),
    }
}

pub(crate) fn compare(op: CmpOp, lhs: Value, rhs: Value) -> Result<Value, ErrorCode> {
    let result = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => match op {
            CmpOp::LessThan => a < b,
            CmpOp::LessThanEqual => a <= b,
            CmpOp::GreaterThan => a > b,
            CmpOp::GreaterThanEqual => a >= b,
        },
        (Value::Float(a), Value::Float(b)) => match op {
            CmpOp::LessThan => a < b,
            CmpOp::LessThanEqual => a <= b,
            CmpOp::GreaterThan => a > b,
            CmpOp::GreaterThanEqual => a >= b,
        },
        _ => return Err(ErrorCode::OperandsNotNumbers),
    };
    Ok(bool_value(result))
}

pub(crate) fn bool_value(flag: bool) -> Value {
    Value::Int(i64::from(flag))
}

/// Structural equality for strings and tuples, identity for objects and
/// arrays. Nested tuples are compared with an explicit worklist; a tuple
/// pair met again while already under comparison counts as equal, so cyclic
/// tuples terminate.
pub(crate) fn values_equal(heap: &Heap<'_>, lhs: Value, rhs: Value) -> bool {
    let mut pending = vec![(lhs, rhs)];
    let mut seen = HashSet::new();
    while let Some((a, b)) = pending.pop() {
        let same = match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::String(x), Value::String(y)) => {
                x == y || matches!((heap.str(a), heap.str(b)), (Some(p), Some(q)) if p == q)
            }
            (Value::Tuple(x), Value::Tuple(y)) if x == y || !seen.insert((x, y)) => true,
            (Value::Tuple(x), Value::Tuple(y)) => match (heap.get(x), heap.get(y)) {
                (
                    Some(HeapData::Tuple {
                        members: left,
                        flat_length: left_flat,
                    }),
                    Some(HeapData::Tuple {
                        members: right,
                        flat_length: right_flat,
                    }),
                ) if left.len() == right.len() && left_flat == right_flat => {
                    pending.extend(left.iter().copied().zip(right.iter().copied()));
                    true
                }
                _ => false,
            },
            (Value::Object(x), Value::Object(y)) | (Value::Array(x), Value::Array(y)) => x == y,
            _ => false,
        };
        if !same {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        assert_eq!(
            arithmetic(ArithOp::Add, Value::Int(i64::MAX), Value::Int(1)),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(
            arithmetic(ArithOp::Divide, Value::Int(i64::MIN), Value::Int(-1)),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(negate(Value::Int(i64::MIN)), Ok(Value::Int(i64::MIN)));
    }

    #[test]
    fn integer_division_by_zero() {
        for op in [ArithOp::Divide, ArithOp::Remainder] {
            assert_eq!(
                arithmetic(op, Value::Int(4), Value::Int(0)),
                Err(ErrorCode::IntDivisionByZero)
            );
        }
        assert!(matches!(
            arithmetic(ArithOp::Divide, Value::Float(1.0), Value::Float(0.0)),
            Ok(Value::Float(v)) if v.is_infinite()
        ));
    }

    #[test]
    fn float_remainder_is_truncating() {
        assert_eq!(
            arithmetic(ArithOp::Remainder, Value::Float(-7.5), Value::Float(2.0)),
            Ok(Value::Float(-1.5))
        );
    }

    #[test]
    fn mixed_operands_are_rejected() {
        assert_eq!(
            arithmetic(ArithOp::Add, Value::Int(1), Value::Float(1.0)),
            Err(ErrorCode::OperandsNotNumbers)
        );
        assert_eq!(
            compare(CmpOp::LessThan, Value::Null, Value::Int(1)),
            Err(ErrorCode::OperandsNotNumbers)
        );
        assert_eq!(negate(Value::Null), Err(ErrorCode::OperandsNotNumbers));
    }

    #[test]
    fn comparisons_yield_integers() {
        assert_eq!(
            compare(CmpOp::GreaterThanEqual, Value::Int(3), Value::Int(3)),
            Ok(Value::Int(1))
        );
        assert_eq!(
            compare(CmpOp::LessThan, Value::Float(f64::NAN), Value::Float(1.0)),
            Ok(Value::Int(0))
        );
    }

    #[test]
    fn equality_of_strings_and_tuples() {
        let mut heap = Heap::new(usize::MAX);
        let a = heap.alloc(HeapData::ConstString("ab")).expect("alloc");
        let b = heap.alloc(HeapData::String("ab".into())).expect("alloc");
        assert!(values_equal(&heap, Value::String(a), Value::String(b)));

        let t1 = heap
            .alloc(HeapData::Tuple {
                members: vec![Value::Int(1), Value::String(a)].into_boxed_slice(),
                flat_length: 2,
            })
            .expect("alloc");
        let t2 = heap
            .alloc(HeapData::Tuple {
                members: vec![Value::Int(1), Value::String(b)].into_boxed_slice(),
                flat_length: 2,
            })
            .expect("alloc");
        assert!(values_equal(&heap, Value::Tuple(t1), Value::Tuple(t2)));
        assert!(!values_equal(&heap, Value::Tuple(t1), Value::Int(1)));
        assert!(!values_equal(&heap, Value::Int(1), Value::Float(1.0)));
    }

    fn self_referencing_tuple(heap: &mut Heap<'_>, tail: Value) -> Value {
        let r = heap
            .alloc(HeapData::Tuple {
                members: vec![Value::Null, tail].into_boxed_slice(),
                flat_length: 2,
            })
            .expect("alloc");
        let tuple = Value::Tuple(r);
        heap.retain(tuple);
        let old = heap.replace_member(r, 0, tuple).expect("member slot");
        heap.release(old);
        tuple
    }

    #[test]
    fn cyclic_tuples_compare_without_looping() {
        let mut heap = Heap::new(usize::MAX);
        let a = self_referencing_tuple(&mut heap, Value::Int(1));
        let b = self_referencing_tuple(&mut heap, Value::Int(1));
        let c = self_referencing_tuple(&mut heap, Value::Int(2));
        assert!(values_equal(&heap, a, b));
        assert!(!values_equal(&heap, a, c));
    }

    #[test]
    fn stale_flat_length_breaks_equality() {
        let mut heap = Heap::new(usize::MAX);
        let t1 = heap
            .alloc(HeapData::Tuple {
                members: vec![Value::Null].into_boxed_slice(),
                flat_length: 1,
            })
            .expect("alloc");
        let t2 = heap
            .alloc(HeapData::Tuple {
                members: vec![Value::Null].into_boxed_slice(),
                flat_length: 7,
            })
            .expect("alloc");
        assert!(!values_equal(&heap, Value::Tuple(t1), Value::Tuple(t2)));
    }
}
