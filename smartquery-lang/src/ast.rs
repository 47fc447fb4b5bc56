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

//! The tree the parser produces and the evaluator walks.
//!
//! Method calls, pipes, indexing and the container literals are already
//! lowered by the parser, so the evaluator only ever sees the node kinds
//! below. The tree is immutable once built; evaluation never rewrites it,
//! which is what makes caching parsed programs safe.

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// A literal.
    Value(Value),
    /// Variable lookup.
    Name(String),
    /// Statements in sequence; evaluates to the last one, or null if empty.
    Code(Vec<Op>),
    /// Produces null.
    NoOp,
    BinOp {
        op: BinOpKind,
        lhs: Box<Op>,
        rhs: Box<Op>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Op>,
    },
    /// Bind a name in the innermost scope; evaluates to null.
    Assign {
        name: String,
        value: Box<Op>,
    },
    /// In-place update of an existing binding; evaluates to null.
    ShortOp {
        name: String,
        op: ShortOpKind,
        value: Box<Op>,
    },
    /// Ternary `then if cond else otherwise`.
    IfExpr {
        cond: Box<Op>,
        then: Box<Op>,
        otherwise: Box<Op>,
    },
    /// Bracket contents with colons; each field evaluates to an integer or
    /// null (missing fields are `Value(Null)` nodes).
    Slice {
        start: Box<Op>,
        stop: Box<Op>,
        step: Box<Op>,
    },
    /// Call the named binding with evaluated arguments. Also the lowered
    /// form of method calls, pipes, list literals and the indexing family.
    Call {
        name: String,
        args: Vec<Op>,
    },
    /// Dict literal; keys are coerced to strings when the node evaluates.
    Dict {
        pairs: Vec<(Op, Op)>,
    },
    /// Anonymous function; the body is shared with the closures it produces.
    Lambda {
        params: Vec<String>,
        body: Rc<Op>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
    And,
    Or,
}

impl BinOpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::Pow => "**",
            BinOpKind::Eq => "==",
            BinOpKind::Ne => "!=",
            BinOpKind::Gt => ">",
            BinOpKind::Lt => "<",
            BinOpKind::Ge => ">=",
            BinOpKind::Le => "<=",
            BinOpKind::In => "in",
            BinOpKind::NotIn => "not in",
            BinOpKind::And => "and",
            BinOpKind::Or => "or",
        }
    }
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Compound assignment operators (`+=`, `-=`, `*=`, `/=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortOpKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl ShortOpKind {
    /// The token text, e.g. `"+="`. Also the wire form used when an
    /// in-place index update travels through `__setitem_with_op__`.
    pub fn symbol(self) -> &'static str {
        match self {
            ShortOpKind::Add => "+=",
            ShortOpKind::Sub => "-=",
            ShortOpKind::Mul => "*=",
            ShortOpKind::Div => "/=",
        }
    }

    pub fn from_symbol(text: &str) -> Option<ShortOpKind> {
        match text {
            "+=" => Some(ShortOpKind::Add),
            "-=" => Some(ShortOpKind::Sub),
            "*=" => Some(ShortOpKind::Mul),
            "/=" => Some(ShortOpKind::Div),
            _ => None,
        }
    }

    /// The underlying binary operation.
    pub fn binop(self) -> BinOpKind {
        match self {
            ShortOpKind::Add => BinOpKind::Add,
            ShortOpKind::Sub => BinOpKind::Sub,
            ShortOpKind::Mul => BinOpKind::Mul,
            ShortOpKind::Div => BinOpKind::Div,
        }
    }
}

impl fmt::Display for ShortOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
