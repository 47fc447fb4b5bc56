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

//! Walking the tree.
//!
//! Evaluation is a synchronous recursive traversal. Every node entry ticks
//! the op budget first, so runaway programs die by accounting rather than
//! by wall clock. Names resolve through the scope stack; calls go through
//! one path regardless of whether the callee is a built-in, a host closure
//! or a lambda.

use std::cmp::Ordering;
use std::collections::HashMap;

use smartquery_core::Decimal;

use crate::ast::{BinOpKind, Op, UnaryOpKind};
use crate::error::{Error, ErrorInfo, EvalResult};
use crate::value::{Lambda, SliceBounds, Value};
use crate::vm::VmState;

impl Op {
    pub fn eval(&self, state: &mut VmState) -> EvalResult<Value> {
        state.tick()?;
        match self {
            Op::NoOp => Ok(Value::Null),
            Op::Value(value) => Ok(value.clone()),
            Op::Name(name) => state
                .names
                .lookup(name)
                .ok_or_else(|| Error::new(ErrorInfo::UndefinedName(name.clone()))),
            Op::Code(lines) => {
                let mut result = Value::Null;
                for line in lines {
                    result = line.eval(state)?;
                }
                Ok(result)
            }
            Op::BinOp { op, lhs, rhs } => eval_binop(*op, lhs, rhs, state),
            Op::UnaryOp { op, operand } => {
                let value = operand.eval(state)?;
                match op {
                    UnaryOpKind::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOpKind::Neg => match value {
                        Value::Num(n) => Ok(Value::Num(-n)),
                        other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                            "cannot negate a {}",
                            other.type_name()
                        )))),
                    },
                }
            }
            Op::Assign { name, value } => {
                let value = value.eval(state)?;
                state.names.set(name, value.deep_copy());
                Ok(Value::Null)
            }
            Op::ShortOp { name, op, value } => {
                let rhs = value.eval(state)?.deep_copy();
                let current = state
                    .names
                    .lookup(name)
                    .ok_or_else(|| Error::new(ErrorInfo::UndefinedName(name.clone())))?;
                let updated = arith(op.binop(), current, rhs)?;
                state.names.update(name, updated);
                Ok(Value::Null)
            }
            Op::IfExpr {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(state)?.is_truthy() {
                    then.eval(state)
                } else {
                    otherwise.eval(state)
                }
            }
            Op::Slice { start, stop, step } => Ok(Value::Slice(SliceBounds {
                start: optional_index(start.eval(state)?)?,
                stop: optional_index(stop.eval(state)?)?,
                step: optional_index(step.eval(state)?)?,
            })),
            Op::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.eval(state)?);
                }
                let callee = state
                    .names
                    .lookup(name)
                    .ok_or_else(|| Error::new(ErrorInfo::UndefinedName(name.clone())))?;
                call_value(&callee, values, state)
            }
            Op::Dict { pairs } => {
                let mut entries = indexmap::IndexMap::new();
                for (key, value) in pairs {
                    let key = map_key(&key.eval(state)?);
                    let value = value.eval(state)?;
                    entries.insert(key, value);
                }
                Ok(Value::map(entries))
            }
            Op::Lambda { params, body } => Ok(Value::Lambda(std::rc::Rc::new(Lambda {
                params: params.clone(),
                body: body.clone(),
            }))),
        }
    }
}

/// Apply a callable to already-evaluated arguments.
///
/// Lambdas get a fresh scope frame binding parameters to arguments
/// (surplus arguments are dropped, missing parameters stay unbound); the
/// frame is popped again whichever way the body exits.
pub fn call_value(callee: &Value, args: Vec<Value>, state: &mut VmState) -> EvalResult<Value> {
    match callee {
        Value::Builtin(op) => (op.0)(state, args),
        Value::HostFn(f) => f.call(state, args),
        Value::Lambda(lambda) => {
            let mut frame = HashMap::new();
            for (param, arg) in lambda.params.iter().zip(args) {
                frame.insert(param.clone(), arg);
            }
            state.in_scope(frame, |state| lambda.body.eval(state))
        }
        other => Err(Error::new(ErrorInfo::Uncallable(other.type_name()))),
    }
}

/// The mapping-key rule: any value used as a mapping key becomes a string,
/// for JSON compatibility. `{1: "a"}` and `{"1": "a"}` are the same value.
pub fn map_key(value: &Value) -> String {
    value.to_string()
}

fn eval_binop(op: BinOpKind, lhs: &Op, rhs: &Op, state: &mut VmState) -> EvalResult<Value> {
    let left = lhs.eval(state)?;
    match op {
        // Short-circuiting: the right operand is reached only when the left
        // does not decide; the deciding operand is returned as-is.
        BinOpKind::And => {
            if left.is_truthy() {
                rhs.eval(state)
            } else {
                Ok(left)
            }
        }
        BinOpKind::Or => {
            if left.is_truthy() {
                Ok(left)
            } else {
                rhs.eval(state)
            }
        }
        BinOpKind::Eq => {
            let right = rhs.eval(state)?;
            Ok(Value::Bool(left == right))
        }
        BinOpKind::Ne => {
            let right = rhs.eval(state)?;
            Ok(Value::Bool(left != right))
        }
        BinOpKind::In | BinOpKind::NotIn => {
            let right = rhs.eval(state)?;
            let found = contains(&right, &left)?;
            Ok(Value::Bool(if op == BinOpKind::In {
                found
            } else {
                !found
            }))
        }
        BinOpKind::Lt | BinOpKind::Le | BinOpKind::Gt | BinOpKind::Ge => {
            let right = rhs.eval(state)?;
            let ordering = left
                .partial_cmp(&right)
                .ok_or_else(|| unsupported(op, &left, &right))?;
            let truth = match op {
                BinOpKind::Lt => ordering == Ordering::Less,
                BinOpKind::Le => ordering != Ordering::Greater,
                BinOpKind::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(truth))
        }
        BinOpKind::Add
        | BinOpKind::Sub
        | BinOpKind::Mul
        | BinOpKind::Div
        | BinOpKind::Pow => {
            let right = rhs.eval(state)?;
            arith(op, left, right)
        }
    }
}

/// Arithmetic shared by binary operators, compound assignment and
/// `__setitem_with_op__`.
pub(crate) fn arith(op: BinOpKind, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        BinOpKind::Add => add_values(left, right),
        BinOpKind::Sub => match (left, right) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a - b)),
            (l, r) => Err(unsupported(op, &l, &r)),
        },
        BinOpKind::Mul => match (left, right) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a * b)),
            _ => Err(Error::new(ErrorInfo::UnsupportedOp(
                "can't multiply non-numbers".into(),
            ))),
        },
        BinOpKind::Div => match (left, right) {
            (Value::Num(a), Value::Num(b)) => {
                if b.is_zero() {
                    Err(Error::new(ErrorInfo::DivisionByZero))
                } else {
                    Ok(Value::Num(a / b))
                }
            }
            (l, r) => Err(unsupported(op, &l, &r)),
        },
        // Both operands go through the decimal kind so that exponentiation
        // cannot blow up into huge exact integers.
        BinOpKind::Pow => {
            let base = to_decimal(&left).ok_or_else(|| unsupported(op, &left, &right))?;
            let exp = to_decimal(&right).ok_or_else(|| unsupported(op, &left, &right))?;
            base.pow(&exp).map(Value::Num).ok_or_else(|| {
                Error::new(ErrorInfo::UnsupportedOp(
                    "`**` result is out of range".into(),
                ))
            })
        }
        other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
            "`{}` is not an arithmetic operator",
            other
        )))),
    }
}

fn add_values(left: Value, right: Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b).into())),
        // A string on the left stringifies whatever is on the right.
        (Value::Str(a), other) => Ok(Value::Str(format!("{}{}", a, other).into())),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (l, r) => Err(unsupported(BinOpKind::Add, &l, &r)),
    }
}

/// Membership: elements of a list, substrings of a string, keys of a
/// mapping.
fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                "`in` needs a string to search a string, got a {}",
                other.type_name()
            )))),
        },
        Value::Map(map) => match item {
            Value::Str(key) => Ok(map.borrow().contains_key(&**key)),
            _ => Ok(false),
        },
        other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
            "a {} is not a container",
            other.type_name()
        )))),
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Num(n) => Some(n.clone()),
        Value::Bool(true) => Some(Decimal::one()),
        Value::Bool(false) => Some(Decimal::zero()),
        Value::Str(s) => s.parse().ok(),
        _ => None,
    }
}

fn optional_index(value: Value) -> EvalResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Num(n) => n.to_index().map(Some).ok_or_else(|| {
            Error::new(ErrorInfo::UnsupportedOp("slice index out of range".into()))
        }),
        other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
            "slice indices must be numbers, got a {}",
            other.type_name()
        )))),
    }
}

fn unsupported(op: BinOpKind, left: &Value, right: &Value) -> Error {
    Error::new(ErrorInfo::UnsupportedOp(format!(
        "`{}` between a {} and a {}",
        op,
        left.type_name(),
        right.type_name()
    )))
}
