// smartquery -- an embeddable expression language
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Evaluating expressions results in values.
//!
//! Values are dynamically typed; arithmetic and comparison are defined per
//! kind. Containers are shared behind reference counting so that mutating
//! intrinsics (`push`, `__setitem__`, ...) act on the same cells the host
//! handed in. Isolation, where the language wants it, happens through an
//! explicit deep copy at the store sites, never through the values
//! themselves. Built-in functions, host closures and user lambdas are all
//! callable values, giving the evaluator a single call path.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use smartquery_core::Decimal;

use crate::ast::Op;
use crate::error::EvalResult;
use crate::vm::VmState;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Signature shared by every built-in function.
pub type BuiltinFn = fn(&mut VmState, Vec<Value>) -> EvalResult<Value>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(Decimal),
    Str(Rc<str>),
    List(ListRef),
    Map(MapRef),
    /// A slice descriptor produced by `a[x:y:z]` bracket contents.
    Slice(SliceBounds),
    /// A built-in function.
    Builtin(BuiltinOp),
    /// A callable provided by the host application.
    HostFn(HostFn),
    /// A user lambda.
    Lambda(Rc<Lambda>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    /// Smart constructor wrapping a host closure into a callable value.
    pub fn host_fn<F>(f: F) -> Value
    where
        F: Fn(&mut VmState, Vec<Value>) -> EvalResult<Value> + 'static,
    {
        Value::HostFn(HostFn(Rc::new(f)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Slice(_) => "slice",
            Value::Builtin(_) | Value::HostFn(_) | Value::Lambda(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => !n.is_zero(),
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Map(map) => !map.borrow().is_empty(),
            Value::Slice(_) | Value::Builtin(_) | Value::HostFn(_) | Value::Lambda(_) => true,
        }
    }

    /// Recursively copy containers; immutable kinds are shared as-is.
    ///
    /// This is the isolation mechanism behind assignment: a stored value
    /// must not change when the host later mutates what it originally
    /// passed in.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => {
                Value::list(items.borrow().iter().map(Value::deep_copy).collect())
            }
            Value::Map(map) => Value::map(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Quoted, machine-readable rendering (strings keep their quotes).
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    fn write_repr(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Num(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Str(s) => {
                let _ = write!(out, "{:?}", &**s);
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out);
                }
                out.push(']');
            }
            Value::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{:?}: ", key);
                    value.write_repr(out);
                }
                out.push('}');
            }
            Value::Slice(bounds) => {
                let _ = write!(out, "{}", bounds);
            }
            Value::Builtin(_) => out.push_str("<built-in function>"),
            Value::HostFn(_) => out.push_str("<host function>"),
            Value::Lambda(_) => out.push_str("<lambda>"),
        }
    }
}

/// Natural string form: strings render bare, everything else like
/// [`Value::repr`].
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Slice(a), Value::Slice(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::HostFn(a), Value::HostFn(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Ordering is defined within a kind: numbers numerically, strings and
/// booleans naturally, lists lexicographically. Mixed kinds do not order.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_cmp(y)? {
                        Ordering::Equal => continue,
                        unequal => return Some(unequal),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Num(Decimal::from(v))
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Value {
        Value::Num(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Str(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Str(v.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::list(v)
    }
}

/// The three bracket fields of a slice, each an integer or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBounds {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl fmt::Display for SliceBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(value: Option<i64>) -> String {
            match value {
                Some(v) => v.to_string(),
                None => "None".to_string(),
            }
        }
        write!(
            f,
            "slice({}, {}, {})",
            field(self.start),
            field(self.stop),
            field(self.step)
        )
    }
}

/// A built-in operation exposed to the language.
#[derive(Clone, Copy)]
pub struct BuiltinOp(pub BuiltinFn);

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ptr = self.0 as *const ();
        write!(f, "BuiltinOp({:p})", ptr)
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        let self_ptr = self.0 as *const ();
        let other_ptr = other.0 as *const ();
        self_ptr == other_ptr
    }
}
impl Eq for BuiltinOp {}

/// A callable supplied by the host, closing over arbitrary host state.
#[derive(Clone)]
pub struct HostFn(Rc<dyn Fn(&mut VmState, Vec<Value>) -> EvalResult<Value>>);

impl HostFn {
    pub fn call(&self, state: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
        (self.0)(state, args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFn({:p})", Rc::as_ptr(&self.0))
    }
}

impl PartialEq for HostFn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A lambda is a parameter list plus a shared pointer into the tree it was
/// parsed from. Closures resolve free names against the scope stack that is
/// live when they are *called*; see the evaluator's call path.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Rc<Op>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(Value::from(-1).is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn deep_copy_detaches_containers() {
        let original = Value::list(vec![Value::from(1), Value::from(2)]);
        let copy = original.deep_copy();
        if let Value::List(items) = &original {
            items.borrow_mut().push(Value::from(3));
        }
        assert_eq!(copy, Value::list(vec![Value::from(1), Value::from(2)]));
        assert_ne!(copy, original);
    }

    #[test]
    fn list_ordering_is_lexicographic() {
        let a = Value::list(vec![Value::from(1), Value::from(2)]);
        let b = Value::list(vec![Value::from(1), Value::from(3)]);
        assert!(a < b);
        let shorter = Value::list(vec![Value::from(1)]);
        assert!(shorter < a);
    }

    #[test]
    fn mixed_kinds_do_not_order() {
        assert_eq!(
            Value::from(1).partial_cmp(&Value::from("1")),
            None
        );
    }

    #[test]
    fn repr_forms() {
        assert_eq!(Value::Null.repr(), "None");
        assert_eq!(Value::from(true).repr(), "True");
        assert_eq!(Value::from("a").repr(), "\"a\"");
        assert_eq!(
            Value::list(vec![Value::from(1), Value::from("a")]).repr(),
            "[1, \"a\"]"
        );
        assert_eq!(Value::from("a").to_string(), "a");
    }
}
