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

//! Built-in functions.
//!
//! These populate the bottom scope frame, so the host can override any of
//! them by supplying its own binding of the same name. Method-style and
//! pipe-style invocations arrive here as ordinary calls with the receiver
//! as the first argument, and so do the indexing forms, lowered to the
//! `__getitem__` family by the parser.

use std::collections::HashMap;
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::{Regex, RegexBuilder};
use smartquery_core::Decimal;

use crate::ast::{BinOpKind, ShortOpKind};
use crate::error::{Error, ErrorInfo, EvalResult};
use crate::eval::{arith, call_value, map_key};
use crate::value::{BuiltinFn, BuiltinOp, ListRef, MapRef, SliceBounds, Value};
use crate::vm::VmState;

/// Containers refuse to grow past this many entries.
pub const MAX_ARRAY_SIZE: usize = 10_000;

/// Compiled-size cap for user-supplied patterns. The regex engine scans in
/// linear time, so bounding the automaton size bounds the total cost.
const REGEX_SIZE_LIMIT: usize = 1 << 18;

/// The intrinsic table forming the outermost scope frame.
pub fn table() -> HashMap<String, Value> {
    let entries: Vec<(&str, BuiltinFn)> = vec![
        ("len", len),
        ("int", int),
        ("float", float),
        ("str", str),
        ("dict", dict),
        ("list", list),
        // strings
        ("startswith", startswith),
        ("endswith", endswith),
        ("lower", lower),
        ("upper", upper),
        ("strip", strip),
        ("replace", replace),
        // regular expressions
        ("match", match_),
        ("match_groups", match_groups),
        ("match_all", match_all),
        // mappings
        ("pretty", pretty),
        ("keys", keys),
        ("values", values),
        ("items", items),
        ("sum", sum),
        ("get", get),
        ("__getitem__", getitem),
        ("__delitem__", delitem),
        ("__setitem__", setitem),
        ("__setitem_with_op__", setitem_with_op),
        // collections
        ("map", map),
        ("filter", filter),
        ("reduce", reduce),
        ("join", join),
        ("split", split),
        // math
        ("round", round),
        ("floor", floor),
        ("ceil", ceil),
        ("abs", abs),
        ("min", min),
        ("max", max),
        ("rand", rand_),
        // list ops
        ("push", push),
        ("pop", pop),
        ("insert", insert),
        ("remove", remove),
        ("sorted", sorted),
        ("reversed", reversed),
        ("enumerate", enumerate),
        ("shuffle", shuffle),
        ("index_of", index_of),
    ];

    entries
        .into_iter()
        .map(|(name, f)| (name.to_string(), Value::Builtin(BuiltinOp(f))))
        .collect()
}

/// Helper for taking apart the argument list of a call.
struct Args {
    name: &'static str,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn new(name: &'static str, values: Vec<Value>) -> Self {
        Self {
            name,
            values: values.into_iter(),
        }
    }

    fn remaining(&self) -> usize {
        self.values.len()
    }

    /// The next argument; failing when the caller passed too few.
    fn value(&mut self) -> EvalResult<Value> {
        self.values
            .next()
            .ok_or_else(|| Error::new(ErrorInfo::NotEnoughArguments(self.name)))
    }

    fn opt(&mut self) -> Option<Value> {
        self.values.next()
    }

    /// End of the argument list; there must be nothing left.
    fn done(&mut self) -> EvalResult<()> {
        if self.values.next().is_some() {
            Err(Error::new(ErrorInfo::TooManyArguments(self.name)))
        } else {
            Ok(())
        }
    }

    fn mismatch(&self, expected: &str, got: &Value) -> Error {
        Error::new(ErrorInfo::IncompatibleArguments(
            self.name,
            format!("expected {}, got a {}", expected, got.type_name()),
        ))
    }

    fn str(&mut self) -> EvalResult<Rc<str>> {
        match self.value()? {
            Value::Str(s) => Ok(s),
            other => Err(self.mismatch("a string", &other)),
        }
    }

    fn num(&mut self) -> EvalResult<Decimal> {
        match self.value()? {
            Value::Num(n) => Ok(n),
            other => Err(self.mismatch("a number", &other)),
        }
    }

    fn int(&mut self) -> EvalResult<i64> {
        let n = self.num()?;
        n.to_index().ok_or_else(|| {
            Error::new(ErrorInfo::IncompatibleArguments(
                self.name,
                "index out of range".into(),
            ))
        })
    }

    fn list(&mut self) -> EvalResult<ListRef> {
        match self.value()? {
            Value::List(items) => Ok(items),
            other => Err(self.mismatch("a list", &other)),
        }
    }

    fn mapping(&mut self) -> EvalResult<MapRef> {
        match self.value()? {
            Value::Map(entries) => Ok(entries),
            other => Err(self.mismatch("a dict", &other)),
        }
    }

    fn callable(&mut self) -> EvalResult<Value> {
        let value = self.value()?;
        match value {
            Value::Builtin(_) | Value::HostFn(_) | Value::Lambda(_) => Ok(value),
            other => Err(self.mismatch("a function", &other)),
        }
    }

    /// An optional trailing string; an explicit null counts as absent.
    fn opt_str(&mut self) -> EvalResult<Option<Rc<str>>> {
        match self.opt() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.mismatch("a string", &other)),
        }
    }

    fn opt_int(&mut self) -> EvalResult<Option<i64>> {
        match self.opt() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Num(n)) => n.to_index().map(Some).ok_or_else(|| {
                Error::new(ErrorInfo::IncompatibleArguments(
                    self.name,
                    "index out of range".into(),
                ))
            }),
            Some(other) => Err(self.mismatch("a number", &other)),
        }
    }
}

// ==================== conversions and introspection ====================

fn len(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("len", args);
    let value = args.value()?;
    args.done()?;
    let count = match &value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        other => {
            return Err(args.mismatch("a string, list or dict", other));
        }
    };
    Ok(Value::from(count as i64))
}

fn int(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("int", args);
    let value = args.value()?;
    args.done()?;
    match value {
        Value::Num(n) => Ok(Value::Num(n.trunc())),
        Value::Bool(b) => Ok(Value::from(b as i64)),
        Value::Str(s) => match s.trim().parse::<Decimal>() {
            Ok(n) => Ok(Value::Num(n.trunc())),
            Err(_) => Err(Error::new(ErrorInfo::IncompatibleArguments(
                "int",
                format!("cannot parse {:?} as a number", &*s),
            ))),
        },
        other => Err(args.mismatch("a number, string or bool", &other)),
    }
}

fn float(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("float", args);
    let value = args.value()?;
    args.done()?;
    match value {
        Value::Num(n) => Ok(Value::Num(n)),
        Value::Bool(b) => Ok(Value::from(b as i64)),
        Value::Str(s) => match s.trim().parse::<Decimal>() {
            Ok(n) => Ok(Value::Num(n)),
            Err(_) => Err(Error::new(ErrorInfo::IncompatibleArguments(
                "float",
                format!("cannot parse {:?} as a number", &*s),
            ))),
        },
        other => Err(args.mismatch("a number, string or bool", &other)),
    }
}

fn str(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("str", args);
    let value = args.value()?;
    args.done()?;
    Ok(Value::from(value.to_string()))
}

fn dict(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("dict", args);
    args.done()?;
    Ok(Value::map(indexmap::IndexMap::new()))
}

/// Variadic: every argument becomes an element. List literals lower to
/// calls of this.
fn list(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::list(args))
}

// ==================== strings ====================

fn startswith(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("startswith", args);
    let s = args.str()?;
    let prefix = args.str()?;
    args.done()?;
    Ok(Value::Bool(s.starts_with(&*prefix)))
}

fn endswith(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("endswith", args);
    let s = args.str()?;
    let suffix = args.str()?;
    args.done()?;
    Ok(Value::Bool(s.ends_with(&*suffix)))
}

fn lower(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("lower", args);
    let s = args.str()?;
    args.done()?;
    Ok(Value::from(s.to_lowercase()))
}

fn upper(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("upper", args);
    let s = args.str()?;
    args.done()?;
    Ok(Value::from(s.to_uppercase()))
}

fn strip(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("strip", args);
    let s = args.str()?;
    args.done()?;
    Ok(Value::from(s.trim()))
}

fn replace(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("replace", args);
    let s = args.str()?;
    let old = args.str()?;
    let new = args.str()?;
    let count = args.opt_int()?.unwrap_or(-1);
    args.done()?;
    let replaced = if count < 0 {
        s.replace(&*old, &new)
    } else {
        s.replacen(&*old, &new, count as usize)
    };
    Ok(Value::from(replaced))
}

// ==================== regular expressions ====================

/// Flags: `i` case-insensitive, `m` multi-line, `s` dot-matches-newline.
fn compile_pattern(pattern: &str, flags: Option<Rc<str>>) -> EvalResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    if let Some(flags) = flags {
        for flag in flags.to_lowercase().chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                _ => {}
            }
        }
    }
    builder
        .build()
        .map_err(|err| Error::new(ErrorInfo::BadPattern(err.to_string())))
}

/// First match of the pattern, or null.
fn match_(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("match", args);
    let haystack = args.str()?;
    let pattern = args.str()?;
    let flags = args.opt_str()?;
    args.done()?;
    let re = compile_pattern(&pattern, flags)?;
    Ok(match re.find(&haystack) {
        Some(found) => Value::from(found.as_str()),
        None => Value::Null,
    })
}

/// `[full, group1, …]` of the first match, or null. Unmatched groups come
/// out as null.
fn match_groups(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("match_groups", args);
    let haystack = args.str()?;
    let pattern = args.str()?;
    let flags = args.opt_str()?;
    args.done()?;
    let re = compile_pattern(&pattern, flags)?;
    Ok(match re.captures(&haystack) {
        Some(caps) => Value::list(
            caps.iter()
                .map(|group| match group {
                    Some(m) => Value::from(m.as_str()),
                    None => Value::Null,
                })
                .collect(),
        ),
        None => Value::Null,
    })
}

/// Every match of the pattern, as strings.
fn match_all(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("match_all", args);
    let haystack = args.str()?;
    let pattern = args.str()?;
    let flags = args.opt_str()?;
    args.done()?;
    let re = compile_pattern(&pattern, flags)?;
    Ok(Value::list(
        re.find_iter(&haystack)
            .map(|found| Value::from(found.as_str()))
            .collect(),
    ))
}

// ==================== mappings ====================

fn pretty(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("pretty", args);
    let value = args.value()?;
    let sep = args.opt_str()?;
    args.done()?;
    let text = match &value {
        Value::Map(entries) => {
            let sep = sep.as_deref().unwrap_or("\n");
            entries
                .borrow()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join(sep)
        }
        Value::List(items) => {
            let sep = sep.as_deref().unwrap_or(", ");
            items
                .borrow()
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(sep)
        }
        Value::Num(n) => group_digits(&n.to_string(), sep.as_deref().unwrap_or(" ")),
        other => other.to_string(),
    };
    Ok(Value::from(text))
}

/// Group the textual form in threes from the right; short forms (up to
/// four characters, sign excluded) come back unchanged.
fn group_digits(text: &str, sep: &str) -> String {
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    if body.len() < 5 {
        return text.to_string();
    }
    let chars: Vec<char> = body.chars().collect();
    let mut chunks: Vec<String> = Vec::new();
    let mut end = chars.len();
    while end > 0 {
        let start = end.saturating_sub(3);
        chunks.insert(0, chars[start..end].iter().collect());
        end = start;
    }
    format!("{}{}", sign, chunks.join(sep))
}

fn keys(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("keys", args);
    let entries = args.mapping()?;
    args.done()?;
    let result = entries
        .borrow()
        .keys()
        .map(|k| Value::from(k.as_str()))
        .collect();
    Ok(Value::list(result))
}

fn values(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("values", args);
    let entries = args.mapping()?;
    args.done()?;
    let result = entries.borrow().values().cloned().collect();
    Ok(Value::list(result))
}

fn items(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("items", args);
    let entries = args.mapping()?;
    args.done()?;
    let result = entries
        .borrow()
        .iter()
        .map(|(k, v)| Value::list(vec![Value::from(k.as_str()), v.clone()]))
        .collect();
    Ok(Value::list(result))
}

/// Sum of a list's elements; anything else passes through unchanged.
fn sum(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("sum", args);
    let value = args.value()?;
    args.done()?;
    match value {
        Value::List(items) => {
            let snapshot: Vec<Value> = items.borrow().clone();
            let mut acc = Value::from(0);
            for item in snapshot {
                acc = arith(BinOpKind::Add, acc, item)?;
            }
            Ok(acc)
        }
        other => Ok(other),
    }
}

/// Mapping lookup with a default instead of an error on a miss. The key
/// goes through the mapping-key coercion.
fn get(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("get", args);
    let entries = args.mapping()?;
    let key = map_key(&args.value()?);
    let default = args.opt().unwrap_or(Value::Null);
    args.done()?;
    let result = entries.borrow().get(&key).cloned().unwrap_or(default);
    Ok(result)
}

// ==================== indexing ====================

fn getitem(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("__getitem__", args);
    let container = args.value()?;
    let key = args.value()?;
    args.done()?;
    match container {
        Value::Map(entries) => {
            let key = map_key(&key);
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::new(ErrorInfo::KeyError(key)))
        }
        Value::List(items) => match key {
            Value::Slice(bounds) => {
                let items = items.borrow();
                let picked = resolve_slice(&bounds, items.len())?
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::list(picked))
            }
            other => {
                let index = value_index("__getitem__", &other)?;
                let items = items.borrow();
                let at = wrap_index(index, items.len())
                    .ok_or_else(|| Error::new(ErrorInfo::KeyError(index.to_string())))?;
                Ok(items[at].clone())
            }
        },
        Value::Str(s) => match key {
            Value::Slice(bounds) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = resolve_slice(&bounds, chars.len())?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                Ok(Value::from(picked))
            }
            other => {
                let index = value_index("__getitem__", &other)?;
                let chars: Vec<char> = s.chars().collect();
                let at = wrap_index(index, chars.len())
                    .ok_or_else(|| Error::new(ErrorInfo::KeyError(index.to_string())))?;
                Ok(Value::from(chars[at].to_string()))
            }
        },
        other => Err(Error::new(ErrorInfo::UnsupportedOp(format!(
            "a {} is not indexable",
            other.type_name()
        )))),
    }
}

fn setitem(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("__setitem__", args);
    let container = args.value()?;
    let key = args.value()?;
    let value = args.value()?;
    args.done()?;
    check_size(&container)?;
    match &container {
        Value::Map(entries) => {
            entries.borrow_mut().insert(map_key(&key), value.deep_copy());
        }
        Value::List(items) => {
            let index = value_index("__setitem__", &key)?;
            let mut items = items.borrow_mut();
            let at = wrap_index(index, items.len())
                .ok_or_else(|| Error::new(ErrorInfo::KeyError(index.to_string())))?;
            items[at] = value.deep_copy();
        }
        other => {
            return Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                "cannot assign into a {}",
                other.type_name()
            ))));
        }
    }
    Ok(value)
}

fn setitem_with_op(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("__setitem_with_op__", args);
    let container = args.value()?;
    let key = args.value()?;
    let op_text = args.str()?;
    let value = args.value()?;
    args.done()?;
    let op = ShortOpKind::from_symbol(&op_text).ok_or_else(|| {
        Error::new(ErrorInfo::UnsupportedOp(format!(
            "unknown in-place operator `{}`",
            op_text
        )))
    })?;
    check_size(&container)?;
    let value = value.deep_copy();
    match &container {
        Value::Map(entries) => {
            let key = map_key(&key);
            let current = entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::new(ErrorInfo::KeyError(key.clone())))?;
            let updated = arith(op.binop(), current, value.clone())?;
            entries.borrow_mut().insert(key, updated);
        }
        Value::List(items) => {
            let index = value_index("__setitem_with_op__", &key)?;
            let at = wrap_index(index, items.borrow().len())
                .ok_or_else(|| Error::new(ErrorInfo::KeyError(index.to_string())))?;
            let current = items.borrow()[at].clone();
            let updated = arith(op.binop(), current, value.clone())?;
            items.borrow_mut()[at] = updated;
        }
        other => {
            return Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                "cannot assign into a {}",
                other.type_name()
            ))));
        }
    }
    // In-place index updates evaluate to their right-hand side.
    Ok(value)
}

fn delitem(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("__delitem__", args);
    let container = args.value()?;
    let key = args.value()?;
    args.done()?;
    match container {
        Value::Map(entries) => {
            let key = map_key(&key);
            entries.borrow_mut().shift_remove(&key);
        }
        Value::List(items) => {
            let index = value_index("__delitem__", &key)?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            // Past-the-end deletes are silently ignored; an index that is
            // still negative after wrapping is not.
            if index < len {
                let wrapped = if index < 0 { index + len } else { index };
                if wrapped < 0 {
                    return Err(Error::new(ErrorInfo::KeyError(index.to_string())));
                }
                items.remove(wrapped as usize);
            }
        }
        other => {
            return Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                "cannot delete from a {}",
                other.type_name()
            ))));
        }
    }
    Ok(Value::Null)
}

fn value_index(name: &'static str, value: &Value) -> EvalResult<i64> {
    match value {
        Value::Num(n) => n
            .to_index()
            .ok_or_else(|| Error::new(ErrorInfo::KeyError(n.to_string()))),
        Value::Bool(b) => Ok(*b as i64),
        other => Err(Error::new(ErrorInfo::IncompatibleArguments(
            name,
            format!("a {} is not a list index", other.type_name()),
        ))),
    }
}

/// End-relative translation of a single index.
fn wrap_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let wrapped = if index < 0 { index + len } else { index };
    if (0..len).contains(&wrapped) {
        Some(wrapped as usize)
    } else {
        None
    }
}

/// The index sequence a slice selects: clamped bounds, optional fields,
/// negative steps walking backwards.
fn resolve_slice(bounds: &SliceBounds, len: usize) -> EvalResult<Vec<usize>> {
    let len = len as i64;
    let step = bounds.step.unwrap_or(1);
    if step == 0 {
        return Err(Error::new(ErrorInfo::UnsupportedOp(
            "slice step cannot be zero".into(),
        )));
    }
    let clamp = |value: i64, low: i64, high: i64| value.max(low).min(high);
    let (start, stop) = if step > 0 {
        let start = match bounds.start {
            None => 0,
            Some(v) if v < 0 => clamp(v + len, 0, len),
            Some(v) => clamp(v, 0, len),
        };
        let stop = match bounds.stop {
            None => len,
            Some(v) if v < 0 => clamp(v + len, 0, len),
            Some(v) => clamp(v, 0, len),
        };
        (start, stop)
    } else {
        let start = match bounds.start {
            None => len - 1,
            Some(v) if v < 0 => clamp(v + len, -1, len - 1),
            Some(v) => clamp(v, -1, len - 1),
        };
        let stop = match bounds.stop {
            None => -1,
            Some(v) if v < 0 => clamp(v + len, -1, len - 1),
            Some(v) => clamp(v, -1, len - 1),
        };
        (start, stop)
    };
    let mut indices = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i as usize);
        i += step;
    }
    Ok(indices)
}

fn check_size(container: &Value) -> EvalResult<()> {
    let size = match container {
        Value::List(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        _ => return Ok(()),
    };
    if size >= MAX_ARRAY_SIZE {
        Err(Error::new(ErrorInfo::ArraySizeOverflow(MAX_ARRAY_SIZE)))
    } else {
        Ok(())
    }
}

// ==================== collections ====================

/// `f(v)` over a list or string, `f(k, v)` over a mapping.
fn map(state: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("map", args);
    let container = args.value()?;
    let f = args.callable()?;
    args.done()?;
    let mapped = match &container {
        Value::List(items) => {
            let snapshot: Vec<Value> = items.borrow().clone();
            let mut mapped = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                mapped.push(call_value(&f, vec![item], state)?);
            }
            mapped
        }
        Value::Str(s) => {
            let mut mapped = Vec::new();
            for ch in s.chars() {
                mapped.push(call_value(&f, vec![Value::from(ch.to_string())], state)?);
            }
            mapped
        }
        Value::Map(entries) => {
            let snapshot: Vec<(String, Value)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut mapped = Vec::with_capacity(snapshot.len());
            for (k, v) in snapshot {
                mapped.push(call_value(&f, vec![Value::from(k), v], state)?);
            }
            mapped
        }
        other => {
            return Err(Error::new(ErrorInfo::UnsupportedOp(format!(
                "a {} is not a string, list or dict",
                other.type_name()
            ))));
        }
    };
    Ok(Value::list(mapped))
}

fn filter(state: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("filter", args);
    let items = args.list()?;
    let f = args.callable()?;
    args.done()?;
    let snapshot: Vec<Value> = items.borrow().clone();
    let mut kept = Vec::new();
    for item in snapshot {
        if call_value(&f, vec![item.clone()], state)?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::list(kept))
}

/// Left fold without an initial accumulator; the empty list is an error.
fn reduce(state: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("reduce", args);
    let items = args.list()?;
    let f = args.callable()?;
    args.done()?;
    let snapshot: Vec<Value> = items.borrow().clone();
    let mut iter = snapshot.into_iter();
    let mut acc = iter.next().ok_or_else(|| {
        Error::new(ErrorInfo::IncompatibleArguments(
            "reduce",
            "reduce of an empty list".into(),
        ))
    })?;
    for item in iter {
        acc = call_value(&f, vec![acc, item], state)?;
    }
    Ok(acc)
}

fn join(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("join", args);
    let items = args.list()?;
    let sep = args.opt_str()?;
    args.done()?;
    let joined = items
        .borrow()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep.as_deref().unwrap_or("\n"));
    Ok(Value::from(joined))
}

fn split(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("split", args);
    let s = args.str()?;
    let sep = args.opt_str()?;
    let max_split = args.opt_int()?.unwrap_or(-1);
    args.done()?;
    let sep = sep.as_deref().unwrap_or(" ");
    let parts: Vec<Value> = if max_split < 0 {
        s.split(sep).map(Value::from).collect()
    } else {
        s.splitn(max_split as usize + 1, sep).map(Value::from).collect()
    };
    Ok(Value::list(parts))
}

// ==================== math ====================

fn round(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("round", args);
    let n = args.num()?;
    let digits = args.opt_int()?.unwrap_or(0);
    args.done()?;
    Ok(Value::Num(n.round_digits(digits)))
}

fn floor(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("floor", args);
    let n = args.num()?;
    args.done()?;
    Ok(Value::Num(n.floor()))
}

fn ceil(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("ceil", args);
    let n = args.num()?;
    args.done()?;
    Ok(Value::Num(n.ceil()))
}

fn abs(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("abs", args);
    let n = args.num()?;
    args.done()?;
    Ok(Value::Num(n.abs()))
}

fn min(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    extremum("min", args, std::cmp::Ordering::Less)
}

fn max(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    extremum("max", args, std::cmp::Ordering::Greater)
}

/// Variadic smallest/largest; a single list argument compares its elements.
fn extremum(
    name: &'static str,
    args: Vec<Value>,
    want: std::cmp::Ordering,
) -> EvalResult<Value> {
    let mut args = Args::new(name, args);
    let first = args.value()?;
    let candidates: Vec<Value> = if args.remaining() == 0 {
        match first {
            Value::List(items) => items.borrow().clone(),
            other => vec![other],
        }
    } else {
        let mut all = vec![first];
        while let Some(v) = args.opt() {
            all.push(v);
        }
        all
    };
    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        Error::new(ErrorInfo::IncompatibleArguments(
            name,
            "empty sequence".into(),
        ))
    })?;
    for candidate in iter {
        let ordering = candidate.partial_cmp(&best).ok_or_else(|| {
            Error::new(ErrorInfo::IncompatibleArguments(
                name,
                "values do not compare".into(),
            ))
        })?;
        if ordering == want {
            best = candidate;
        }
    }
    Ok(best)
}

/// `rand()` → decimal in [0, 1); `rand(list)` → random element;
/// `rand(a, b)` → integer between `a` and `b` inclusive.
fn rand_(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("rand", args);
    let mut rng = rand::thread_rng();
    match args.remaining() {
        0 => Decimal::from_f64(rng.gen::<f64>())
            .map(Value::Num)
            .ok_or_else(|| {
                Error::new(ErrorInfo::IncompatibleArguments(
                    "rand",
                    "random draw failed".into(),
                ))
            }),
        1 => match args.value()? {
            Value::List(items) => {
                let items = items.borrow();
                items.as_slice().choose(&mut rng).cloned().ok_or_else(|| {
                    Error::new(ErrorInfo::IncompatibleArguments(
                        "rand",
                        "cannot pick from an empty list".into(),
                    ))
                })
            }
            other => Err(args.mismatch("a list", &other)),
        },
        2 => {
            let low = args.int()?;
            let high = args.int()?;
            if low > high {
                return Err(Error::new(ErrorInfo::IncompatibleArguments(
                    "rand",
                    "empty range".into(),
                )));
            }
            Ok(Value::from(rng.gen_range(low..=high)))
        }
        _ => Err(Error::new(ErrorInfo::TooManyArguments("rand"))),
    }
}

// ==================== list ops ====================

fn push(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("push", args);
    let items = args.list()?;
    let value = args.value()?;
    args.done()?;
    if items.borrow().len() >= MAX_ARRAY_SIZE {
        return Err(Error::new(ErrorInfo::ArraySizeOverflow(MAX_ARRAY_SIZE)));
    }
    items.borrow_mut().push(value);
    Ok(Value::Null)
}

fn pop(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("pop", args);
    let items = args.list()?;
    let index = args.opt_int()?;
    args.done()?;
    let mut items = items.borrow_mut();
    let at = match index {
        None => {
            if items.is_empty() {
                return Err(Error::new(ErrorInfo::IncompatibleArguments(
                    "pop",
                    "pop from an empty list".into(),
                )));
            }
            items.len() - 1
        }
        Some(i) => wrap_index(i, items.len())
            .ok_or_else(|| Error::new(ErrorInfo::KeyError(i.to_string())))?,
    };
    Ok(items.remove(at))
}

fn insert(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("insert", args);
    let items = args.list()?;
    let index = args.int()?;
    let value = args.value()?;
    args.done()?;
    let mut items = items.borrow_mut();
    if items.len() >= MAX_ARRAY_SIZE {
        return Err(Error::new(ErrorInfo::ArraySizeOverflow(MAX_ARRAY_SIZE)));
    }
    let len = items.len() as i64;
    // Out-of-range insertion positions clamp to the ends.
    let at = if index < 0 {
        (index + len).max(0)
    } else {
        index.min(len)
    } as usize;
    items.insert(at, value);
    Ok(Value::Null)
}

/// On a list, drop the first occurrence of the value (silently doing
/// nothing when it is absent); on a mapping, delete the key if present.
fn remove(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("remove", args);
    let container = args.value()?;
    let value = args.value()?;
    args.done()?;
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            if let Some(found) = items.iter().position(|item| item == &value) {
                items.remove(found);
            }
        }
        Value::Map(entries) => {
            if let Value::Str(key) = &value {
                entries.borrow_mut().shift_remove(&**key);
            }
        }
        other => {
            return Err(args.mismatch("a list or dict", &other));
        }
    }
    Ok(Value::Null)
}

/// Sort a list, or a mapping by key. A callable key receives the element
/// (for lists) or the `(k, v)` pair (for mappings).
fn sorted(state: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("sorted", args);
    let container = args.value()?;
    let key = match args.opt() {
        None | Some(Value::Null) => None,
        Some(f @ (Value::Builtin(_) | Value::HostFn(_) | Value::Lambda(_))) => Some(f),
        Some(other) => return Err(args.mismatch("a function", &other)),
    };
    let reverse = args.opt().map(|v| v.is_truthy()).unwrap_or(false);
    args.done()?;
    match container {
        Value::List(items) => {
            let snapshot: Vec<Value> = items.borrow().clone();
            let mut decorated: Vec<(Value, Value)> = Vec::with_capacity(snapshot.len());
            for item in snapshot {
                let sort_key = match &key {
                    Some(f) => call_value(f, vec![item.clone()], state)?,
                    None => item.clone(),
                };
                decorated.push((sort_key, item));
            }
            sort_decorated(&mut decorated, reverse);
            Ok(Value::list(decorated.into_iter().map(|(_, v)| v).collect()))
        }
        Value::Map(entries) => {
            let snapshot: Vec<(String, Value)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut decorated: Vec<(Value, (String, Value))> =
                Vec::with_capacity(snapshot.len());
            for (k, v) in snapshot {
                let sort_key = match &key {
                    Some(f) => call_value(f, vec![Value::from(k.as_str()), v.clone()], state)?,
                    None => Value::from(k.as_str()),
                };
                decorated.push((sort_key, (k, v)));
            }
            sort_decorated(&mut decorated, reverse);
            Ok(Value::map(
                decorated.into_iter().map(|(_, pair)| pair).collect(),
            ))
        }
        other => Err(args.mismatch("a list or dict", &other)),
    }
}

fn sort_decorated<T>(decorated: &mut Vec<(Value, T)>, reverse: bool) {
    decorated.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if reverse {
        decorated.reverse();
    }
}

fn reversed(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("reversed", args);
    let value = args.value()?;
    args.done()?;
    match value {
        Value::List(items) => {
            let mut items = items.borrow().clone();
            items.reverse();
            Ok(Value::list(items))
        }
        Value::Str(s) => Ok(Value::from(s.chars().rev().collect::<String>())),
        other => Err(args.mismatch("a list or string", &other)),
    }
}

fn enumerate(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("enumerate", args);
    let items = args.list()?;
    args.done()?;
    let result = items
        .borrow()
        .iter()
        .enumerate()
        .map(|(i, v)| Value::list(vec![Value::from(i as i64), v.clone()]))
        .collect();
    Ok(Value::list(result))
}

/// A shuffled shallow copy; the input list is untouched.
fn shuffle(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("shuffle", args);
    let items = args.list()?;
    args.done()?;
    let mut shuffled: Vec<Value> = items.borrow().clone();
    shuffled.as_mut_slice().shuffle(&mut rand::thread_rng());
    Ok(Value::list(shuffled))
}

fn index_of(_: &mut VmState, args: Vec<Value>) -> EvalResult<Value> {
    let mut args = Args::new("index_of", args);
    let items = args.list()?;
    let value = args.value()?;
    args.done()?;
    let found = items.borrow().iter().position(|item| item == &value);
    Ok(match found {
        Some(i) => Value::from(i as i64),
        None => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn eval_str(source: &str) -> Value {
        Engine::new()
            .evaluate(source, &mut HashMap::new())
            .unwrap()
    }

    fn num(text: &str) -> Value {
        Value::Num(text.parse().unwrap())
    }

    fn nums(texts: &[&str]) -> Value {
        Value::list(texts.iter().map(|t| num(t)).collect())
    }

    #[test]
    fn digit_grouping() {
        assert_eq!(group_digits("1234", " "), "1234");
        assert_eq!(group_digits("-1234", " "), "-1234");
        assert_eq!(group_digits("12345", " "), "12 345");
        assert_eq!(group_digits("123456789", " "), "123 456 789");
        assert_eq!(group_digits("-123456789", " "), "-123 456 789");
        assert_eq!(group_digits("12345", "_"), "12_345");
    }

    #[test]
    fn slice_resolution() {
        let full = SliceBounds {
            start: None,
            stop: None,
            step: None,
        };
        assert_eq!(resolve_slice(&full, 3).unwrap(), vec![0, 1, 2]);
        let rev = SliceBounds {
            start: None,
            stop: None,
            step: Some(-1),
        };
        assert_eq!(resolve_slice(&rev, 3).unwrap(), vec![2, 1, 0]);
        let clamped = SliceBounds {
            start: Some(-100),
            stop: Some(100),
            step: None,
        };
        assert_eq!(resolve_slice(&clamped, 2).unwrap(), vec![0, 1]);
        let zero = SliceBounds {
            start: None,
            stop: None,
            step: Some(0),
        };
        assert!(resolve_slice(&zero, 3).is_err());
    }

    #[test]
    fn index_wrapping() {
        assert_eq!(wrap_index(0, 3), Some(0));
        assert_eq!(wrap_index(-1, 3), Some(2));
        assert_eq!(wrap_index(3, 3), None);
        assert_eq!(wrap_index(-4, 3), None);
    }

    #[test]
    fn conversions() {
        assert_eq!(eval_str("int(\"5\")"), num("5"));
        assert_eq!(eval_str("int(5.9)"), num("5"));
        assert_eq!(eval_str("float(\"1.5\")"), num("1.5"));
        assert_eq!(eval_str("str(10)"), Value::from("10"));
        assert_eq!(eval_str("str(True)"), Value::from("True"));
    }

    #[test]
    fn string_helpers() {
        assert_eq!(
            eval_str("\"a b c\" | split"),
            Value::list(vec![Value::from("a"), Value::from("b"), Value::from("c")])
        );
        assert_eq!(
            eval_str("\"a,b,c\" | split(\",\", 1)"),
            Value::list(vec![Value::from("a"), Value::from("b,c")])
        );
        assert_eq!(
            eval_str("\"aaa\" | replace(\"a\", \"b\", 2)"),
            Value::from("bba")
        );
        assert_eq!(eval_str("\"  x \" | strip"), Value::from("x"));
        assert_eq!(eval_str("\"abc\" | reversed"), Value::from("cba"));
    }

    #[test]
    fn mapping_helpers() {
        assert_eq!(
            eval_str("{'a': 1, 'b': 2} | keys"),
            Value::list(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(eval_str("{'a': 1, 'b': 2} | values"), nums(&["1", "2"]));
        assert_eq!(
            eval_str("{'a': 1} | items"),
            Value::list(vec![Value::list(vec![Value::from("a"), num("1")])])
        );
        assert_eq!(eval_str("get({\"a\": 1}, \"a\")"), num("1"));
        assert_eq!(eval_str("get({}, \"a\")"), Value::Null);
        assert_eq!(eval_str("get({}, \"a\", 5)"), num("5"));
        assert_eq!(eval_str("get({\"1\": \"x\"}, 1)"), Value::from("x"));
    }

    #[test]
    fn aggregation() {
        assert_eq!(eval_str("sum([1, 2, 3])"), num("6"));
        assert_eq!(eval_str("sum(5)"), num("5"));
        assert_eq!(eval_str("min(1, 2)"), num("1"));
        assert_eq!(eval_str("max(1, 2)"), num("2"));
        assert_eq!(eval_str("max([1, 5, 3])"), num("5"));
        assert_eq!(eval_str("min([2, 1, 3])"), num("1"));
    }

    #[test]
    fn numeric_helpers() {
        assert_eq!(eval_str("floor(2.7)"), num("2"));
        assert_eq!(eval_str("ceil(2.1)"), num("3"));
        assert_eq!(eval_str("abs(0 - 5)"), num("5"));
        assert_eq!(eval_str("round(2.5)"), num("2"));
    }

    #[test]
    fn list_mutation() {
        assert_eq!(
            eval_str("arr = [1, 2, 3]\narr.pop()\narr"),
            nums(&["1", "2"])
        );
        assert_eq!(
            eval_str("arr = [1, 3]\narr.insert(1, 2)\narr"),
            nums(&["1", "2", "3"])
        );
        assert_eq!(
            eval_str("arr = [1, 2, 3]\narr.remove(2)\narr"),
            nums(&["1", "3"])
        );
        // removing an absent element is a silent no-op
        assert_eq!(
            eval_str("arr = [1, 2]\narr.remove(9)\narr"),
            nums(&["1", "2"])
        );
        assert_eq!(
            eval_str("d = {'a': 1, 'b': 2}\nd.remove('a')\nd | keys"),
            Value::list(vec![Value::from("b")])
        );
    }

    #[test]
    fn sorting() {
        assert_eq!(eval_str("sorted([3, 1, 2])"), nums(&["1", "2", "3"]));
        assert_eq!(
            eval_str("sorted([3, 1, 2], None, True)"),
            nums(&["3", "2", "1"])
        );
        assert_eq!(
            eval_str("sorted([[2, 'b'], [1, 'a']], p => p[0])"),
            Value::list(vec![
                Value::list(vec![num("1"), Value::from("a")]),
                Value::list(vec![num("2"), Value::from("b")]),
            ])
        );
        assert_eq!(
            eval_str("sorted({'b': 2, 'a': 1}) | keys"),
            Value::list(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn filtering() {
        assert_eq!(
            eval_str("[1, 2, 3, 4] | filter(v => v > 2)"),
            nums(&["3", "4"])
        );
    }

    #[test]
    fn array_size_cap() {
        let big = Value::list(vec![Value::Null; MAX_ARRAY_SIZE]);
        let mut names = HashMap::new();
        names.insert("big".to_string(), big);
        let err = Engine::new()
            .evaluate("big.push(1)", &mut names)
            .unwrap_err();
        assert_eq!(err.info(), &ErrorInfo::ArraySizeOverflow(MAX_ARRAY_SIZE));
        let err = Engine::new()
            .evaluate("big[0] = 1", &mut names)
            .unwrap_err();
        assert_eq!(err.info(), &ErrorInfo::ArraySizeOverflow(MAX_ARRAY_SIZE));
    }

    #[test]
    fn string_indexing() {
        assert_eq!(eval_str("\"abc\"[0]"), Value::from("a"));
        assert_eq!(eval_str("\"abc\"[-1]"), Value::from("c"));
        assert_eq!(eval_str("\"abcd\"[1:3]"), Value::from("bc"));
    }

    #[test]
    fn bad_patterns_are_rejected() {
        let err = Engine::new()
            .evaluate(r#""x" | match(r"(unclosed")"#, &mut HashMap::new())
            .unwrap_err();
        assert!(matches!(err.info(), ErrorInfo::BadPattern(_)));
    }
}
