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

//! An embeddable expression language for predicates and data shaping over
//! host-supplied values: tokenizer, precedence parser, and a sandboxed
//! tree-walking evaluator with pluggable functions.

pub mod ast;
pub mod builtins;
pub mod engine;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod line_map;
pub mod parser;
pub mod scope;
pub mod value;
pub mod vm;

pub use engine::Engine;
pub use error::{Error, ErrorInfo, EvalResult};
pub use value::Value;
