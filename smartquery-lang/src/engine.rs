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

//! The host-facing entry point: parse, inspect and evaluate programs.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::Op;
use crate::builtins;
use crate::error::EvalResult;
use crate::lexer;
use crate::parser::Parser;
use crate::scope::ScopedNames;
use crate::value::Value;
use crate::vm::{VmState, DEFAULT_MAX_OPS};

/// Parses and evaluates programs against host-supplied names.
///
/// The engine owns the intrinsic table (the outermost scope frame of every
/// evaluation) and, optionally, a cache of parsed programs keyed by their
/// source text.
pub struct Engine {
    builtins: HashMap<String, Value>,
    parse_cache: Option<RefCell<HashMap<String, Rc<Op>>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            builtins: builtins::table(),
            parse_cache: None,
        }
    }

    /// An engine that memoizes parsed programs. Worthwhile for hosts that
    /// evaluate the same rule texts over and over.
    pub fn with_cache() -> Self {
        Self {
            builtins: builtins::table(),
            parse_cache: Some(RefCell::new(HashMap::new())),
        }
    }

    /// Parse a program. Trailing whitespace is insignificant and trimmed
    /// before the cache is consulted.
    pub fn parse(&self, source: &str) -> EvalResult<Rc<Op>> {
        let source = source.trim_end();
        if let Some(cache) = &self.parse_cache {
            if let Some(ast) = cache.borrow().get(source) {
                return Ok(ast.clone());
            }
        }
        let ast = Rc::new(Parser::parse(source)?);
        if let Some(cache) = &self.parse_cache {
            cache
                .borrow_mut()
                .insert(source.to_string(), ast.clone());
        }
        Ok(ast)
    }

    /// Every name the program mentions, in source order, duplicates
    /// included. Hosts use this to pre-bind required variables.
    pub fn list_names(&self, source: &str) -> EvalResult<Vec<String>> {
        lexer::names(source)
    }

    /// Evaluate with the default op budget. See [`Engine::evaluate_with`].
    pub fn evaluate(
        &self,
        source: &str,
        names: &mut HashMap<String, Value>,
    ) -> EvalResult<Value> {
        self.evaluate_with(source, names, &HashMap::new(), DEFAULT_MAX_OPS)
    }

    /// Evaluate a program.
    ///
    /// The scope is built from the intrinsic table at the bottom and the
    /// host's `names` frame above it, so host bindings shadow built-ins of
    /// the same name. Each entry of `ast_names` (pre-compiled trees,
    /// typically lambdas) is evaluated in that scope and bound before the
    /// program runs. The `names` frame, including any new top-level
    /// bindings, is handed back whether evaluation succeeded or not.
    pub fn evaluate_with(
        &self,
        source: &str,
        names: &mut HashMap<String, Value>,
        ast_names: &HashMap<String, Rc<Op>>,
        max_ops: usize,
    ) -> EvalResult<Value> {
        let ast = self.parse(source)?;
        let mut scoped = ScopedNames::new(self.builtins.clone());
        scoped.push_scope(std::mem::take(names));
        let mut state = VmState::new(scoped, max_ops);
        let result = run(&ast, ast_names, &mut state);
        *names = state.names.pop_scope().unwrap_or_default();
        result
    }
}

fn run(
    ast: &Op,
    ast_names: &HashMap<String, Rc<Op>>,
    state: &mut VmState,
) -> EvalResult<Value> {
    for (name, op) in ast_names {
        let value = op.eval(state)?;
        state.names.set(name, value);
    }
    ast.eval(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_returns_the_same_tree() {
        let engine = Engine::with_cache();
        let first = engine.parse("1 + 1").unwrap();
        let second = engine.parse("1 + 1  ").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn without_cache_every_parse_is_fresh() {
        let engine = Engine::new();
        let first = engine.parse("1 + 1").unwrap();
        let second = engine.parse("1 + 1").unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn list_names_keeps_order_and_duplicates() {
        let engine = Engine::new();
        assert_eq!(
            engine.list_names("x + %y% * x").unwrap(),
            vec!["x", "%y%", "x"]
        );
    }

    #[test]
    fn names_survive_errors() {
        let engine = Engine::new();
        let mut names = HashMap::new();
        names.insert("x".to_string(), Value::from(1));
        let result = engine.evaluate("x / 0", &mut names);
        assert!(result.is_err());
        assert_eq!(names["x"], Value::from(1));
    }

    #[test]
    fn empty_program_evaluates_to_null() {
        let engine = Engine::new();
        assert_eq!(
            engine.evaluate("", &mut HashMap::new()).unwrap(),
            Value::Null
        );
    }
}
