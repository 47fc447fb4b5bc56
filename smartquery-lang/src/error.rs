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

//! The single error kind every failure of the language surfaces as: lexer,
//! parser, evaluator and built-in failures all become an [`Error`] carrying
//! a message and, for source-level problems, a position.

use std::fmt;

use crate::line_map::Pos;

pub type EvalResult<T> = Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pos: Option<Pos>,
    info: ErrorInfo,
}

impl Error {
    pub fn new(info: ErrorInfo) -> Self {
        Self { pos: None, info }
    }

    pub fn at(pos: Pos, info: ErrorInfo) -> Self {
        Self {
            pos: Some(pos),
            info,
        }
    }

    /// Source position, available for errors raised while the source text is
    /// still at hand (lexing and parsing).
    pub fn pos(&self) -> Option<Pos> {
        self.pos
    }

    pub fn info(&self) -> &ErrorInfo {
        &self.info
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{} at {}", self.info, pos),
            None => write!(f, "{}", self.info),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorInfo {
    /// A character the tokenizer does not know.
    IllegalChar(char),
    /// Malformed source reported by the parser.
    Syntax(String),
    /// A keyword that is reserved but carries no behavior yet.
    ReservedWord(String),
    /// Name lookup failed.
    UndefinedName(String),
    /// Tried to call a value that is not a function.
    Uncallable(&'static str),
    /// An operation applied to values it is not defined for.
    UnsupportedOp(String),
    /// Missing mapping key or list index out of range.
    KeyError(String),
    DivisionByZero,
    /// A container refused to grow past the size cap.
    ArraySizeOverflow(usize),
    /// The evaluation visited more nodes than the budget allows.
    OpsLimitExceeded(usize),
    NotEnoughArguments(&'static str),
    TooManyArguments(&'static str),
    IncompatibleArguments(&'static str, String),
    BadPattern(String),
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorInfo::IllegalChar(ch) => write!(f, "illegal character `{}`", ch),
            ErrorInfo::Syntax(msg) => write!(f, "syntax error: {}", msg),
            ErrorInfo::ReservedWord(word) => write!(f, "`{}` is a reserved keyword", word),
            ErrorInfo::UndefinedName(name) => write!(f, "undefined name `{}`", name),
            ErrorInfo::Uncallable(kind) => write!(f, "a {} is not callable", kind),
            ErrorInfo::UnsupportedOp(msg) => write!(f, "unsupported operation: {}", msg),
            ErrorInfo::KeyError(key) => write!(f, "key error `{}`", key),
            ErrorInfo::DivisionByZero => write!(f, "division by zero"),
            ErrorInfo::ArraySizeOverflow(limit) => write!(f, "array size overflow: {}", limit),
            ErrorInfo::OpsLimitExceeded(limit) => {
                write!(f, "ops execution limit exceeded: {}", limit)
            }
            ErrorInfo::NotEnoughArguments(name) => {
                write!(f, "not enough arguments in call to `{}`", name)
            }
            ErrorInfo::TooManyArguments(name) => {
                write!(f, "too many arguments in call to `{}`", name)
            }
            ErrorInfo::IncompatibleArguments(name, why) => {
                write!(f, "incompatible arguments to `{}`: {}", name, why)
            }
            ErrorInfo::BadPattern(msg) => write!(f, "invalid regex: {}", msg),
        }
    }
}
