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

//! Precedence-climbing parser from the token stream to the tree.
//!
//! Statements are separated by newlines (or `;`); assignment, compound
//! assignment and `del` only exist at statement level. Everything the
//! evaluator does not want to know about (method and pipe sugar, list and
//! dict literals, the indexing forms) is lowered here into plain calls.

use std::rc::Rc;

use crate::ast::{BinOpKind, Op, ShortOpKind, UnaryOpKind};
use crate::error::{Error, ErrorInfo, EvalResult};
use crate::lexer::{self, Span, Token};
use crate::line_map::LineMap;
use crate::value::Value;

#[cfg(test)]
mod expect_tests;

/// Binding strength, strongest last. Mirrors the operator table of the
/// language: ternary binds loosest, subscripting tightest.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Prec(u16);

impl Prec {
    const LOWEST: Prec = Prec(0);
    const TERNARY: Prec = Prec(1);
    const DISJUNCTIVE: Prec = Prec(2);
    const CONJUNCTIVE: Prec = Prec(3);
    const COMPARISON: Prec = Prec(4);
    const ADDITIVE: Prec = Prec(5);
    const MULTIPLICATIVE: Prec = Prec(6);
    const EXPONENT: Prec = Prec(7);
    const PIPE: Prec = Prec(8);
    const METHOD: Prec = Prec(9);
    const PREFIX: Prec = Prec(10);
    const UNARY: Prec = Prec(11);
    const INDEX: Prec = Prec(12);
    const HIGHEST: Prec = Prec(13);

    pub fn succ(self) -> Prec {
        // this would be a parser bug:
        assert!(self < Self::HIGHEST);
        Prec(self.0 + 1)
    }
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    line_map: LineMap<'a>,
}

impl<'a> Parser<'a> {
    // Public interface
    pub fn parse(source: &'a str) -> EvalResult<Op> {
        let mut parser = Parser::new(source)?;
        parser.parse_program()
    }

    // Private helpers

    fn new(source: &'a str) -> EvalResult<Self> {
        Ok(Parser {
            source,
            tokens: lexer::tokens(source)?,
            pos: 0,
            line_map: LineMap::new(source),
        })
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(token, _)| *token)
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).map(|(token, _)| *token)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.clone())
            .unwrap_or_else(|| self.eof())
    }

    fn consume(&mut self) -> Option<(Token, Span)> {
        let current = self.tokens.get(self.pos).cloned();
        if current.is_some() {
            self.pos += 1;
        }
        current
    }

    fn eof(&self) -> Span {
        self.source.len()..self.source.len()
    }

    fn slice(&self, span: &Span) -> &'a str {
        &self.source[span.clone()]
    }

    fn expect(&mut self, expected: Token) -> EvalResult<Span> {
        match self.consume() {
            Some((token, span)) if token == expected => Ok(span),
            Some((token, span)) => Err(self.expected_but_got(span, &[expected], token)),
            None => Err(self.unexpected_eof(&[expected])),
        }
    }

    fn error_at(&self, span: Span, info: ErrorInfo) -> Error {
        Error::at(self.line_map.offset_to_pos(span.start), info)
    }

    fn syntax_error(&self, span: Span, message: String) -> Error {
        self.error_at(span, ErrorInfo::Syntax(message))
    }

    fn expected_but_got(&self, span: Span, expected: &[Token], got: Token) -> Error {
        self.syntax_error(
            span,
            format!("expected one of {:?}, but got {:?}", expected, got),
        )
    }

    fn expected_str_but_got(&self, span: Span, expected: &str, got: Token) -> Error {
        self.syntax_error(span, format!("expected {}, but got {:?}", expected, got))
    }

    fn unexpected_eof(&self, expected: &[Token]) -> Error {
        self.syntax_error(
            self.eof(),
            format!("expected one of {:?}, but reached end of input", expected),
        )
    }

    fn unexpected_str_eof(&self, expected: &str) -> Error {
        self.syntax_error(
            self.eof(),
            format!("expected {}, but reached end of input", expected),
        )
    }

    fn reserved_unused(token: Token) -> Option<&'static str> {
        match token {
            Token::For => Some("for"),
            Token::While => Some("while"),
            Token::Break => Some("break"),
            Token::Continue => Some("continue"),
            Token::Def => Some("def"),
            Token::Raise => Some("raise"),
            Token::Elif => Some("elif"),
            _ => None,
        }
    }

    fn comparison_kind(token: Token) -> Option<BinOpKind> {
        match token {
            Token::Eq => Some(BinOpKind::Eq),
            Token::Ne => Some(BinOpKind::Ne),
            Token::Gt => Some(BinOpKind::Gt),
            Token::Lt => Some(BinOpKind::Lt),
            Token::Ge => Some(BinOpKind::Ge),
            Token::Le => Some(BinOpKind::Le),
            Token::In => Some(BinOpKind::In),
            _ => None,
        }
    }

    // Parse rules

    fn parse_program(&mut self) -> EvalResult<Op> {
        let mut lines = Vec::new();
        loop {
            while self.peek() == Some(Token::Newline) {
                self.consume();
            }
            if self.peek().is_none() {
                break;
            }
            lines.push(self.parse_statement()?);
            match self.peek() {
                Some(Token::Newline) | None => {}
                Some(got) => {
                    let span = self.peek_span();
                    return Err(self.expected_str_but_got(span, "end of statement", got));
                }
            }
        }
        Ok(Op::Code(lines))
    }

    fn parse_statement(&mut self) -> EvalResult<Op> {
        if self.peek() == Some(Token::Del) {
            self.consume();
            let span = self.peek_span();
            let target = self.parse_expr()?;
            return match target {
                Op::Call { name, args } if name == "__getitem__" => Ok(Op::Call {
                    name: "__delitem__".to_string(),
                    args,
                }),
                _ => Err(self.syntax_error(span, "`del` needs an index expression".to_string())),
            };
        }

        let target = self.parse_expr()?;
        match self.peek() {
            Some(Token::Assign) => {
                let span = self.expect(Token::Assign)?;
                let value = self.parse_expr()?;
                self.lower_assignment(span, target, None, value)
            }
            Some(Token::ShortOp) => {
                let span = self.expect(Token::ShortOp)?;
                let op = match ShortOpKind::from_symbol(self.slice(&span)) {
                    Some(op) => op,
                    None => {
                        let text = self.slice(&span).to_string();
                        return Err(
                            self.syntax_error(span, format!("unknown operator `{}`", text))
                        );
                    }
                };
                let value = self.parse_expr()?;
                self.lower_assignment(span, target, Some(op), value)
            }
            _ => Ok(target),
        }
    }

    /// Assignments rewrite their left-hand side: a plain name becomes an
    /// `Assign`/`ShortOp` node, an index expression becomes a call to the
    /// matching `__setitem__` flavor. Nothing else can be assigned to, and
    /// since assignment is a statement, chains like `x = y = 10` never
    /// parse.
    fn lower_assignment(
        &self,
        span: Span,
        target: Op,
        op: Option<ShortOpKind>,
        value: Op,
    ) -> EvalResult<Op> {
        match target {
            Op::Name(name) => Ok(match op {
                None => Op::Assign {
                    name,
                    value: Box::new(value),
                },
                Some(op) => Op::ShortOp {
                    name,
                    op,
                    value: Box::new(value),
                },
            }),
            Op::Call { name, mut args } if name == "__getitem__" => match op {
                None => {
                    args.push(value);
                    Ok(Op::Call {
                        name: "__setitem__".to_string(),
                        args,
                    })
                }
                Some(op) => {
                    args.push(Op::Value(Value::Str(op.symbol().into())));
                    args.push(value);
                    Ok(Op::Call {
                        name: "__setitem_with_op__".to_string(),
                        args,
                    })
                }
            },
            _ => Err(self.syntax_error(span, "cannot assign to this expression".to_string())),
        }
    }

    fn parse_expr(&mut self) -> EvalResult<Op> {
        self.parse_prec_expr(Prec::LOWEST)
    }

    fn parse_prec_expr(&mut self, min_prec: Prec) -> EvalResult<Op> {
        // Prefix rules
        let mut left = self.parse_prefix_expr()?;

        // Infix/postfix rules
        loop {
            let token = match self.peek() {
                None => break,
                Some(token) => token,
            };

            left = match token {
                Token::If if min_prec <= Prec::TERNARY => self.parse_ternary(left)?,
                Token::Or if min_prec <= Prec::DISJUNCTIVE => {
                    self.parse_binary(left, BinOpKind::Or, Prec::DISJUNCTIVE.succ())?
                }
                Token::And if min_prec <= Prec::CONJUNCTIVE => {
                    self.parse_binary(left, BinOpKind::And, Prec::CONJUNCTIVE.succ())?
                }
                // Infix `not` is only ever the start of `not in`.
                Token::Not if min_prec <= Prec::COMPARISON => {
                    self.parse_comparison(left, BinOpKind::NotIn)?
                }
                _ if min_prec <= Prec::COMPARISON && Self::comparison_kind(token).is_some() => {
                    match Self::comparison_kind(token) {
                        Some(op) => self.parse_comparison(left, op)?,
                        None => break,
                    }
                }
                Token::Plus if min_prec <= Prec::ADDITIVE => {
                    self.parse_binary(left, BinOpKind::Add, Prec::ADDITIVE.succ())?
                }
                Token::Minus if min_prec <= Prec::ADDITIVE => {
                    self.parse_binary(left, BinOpKind::Sub, Prec::ADDITIVE.succ())?
                }
                Token::Star if min_prec <= Prec::MULTIPLICATIVE => {
                    self.parse_binary(left, BinOpKind::Mul, Prec::MULTIPLICATIVE.succ())?
                }
                Token::Slash if min_prec <= Prec::MULTIPLICATIVE => {
                    self.parse_binary(left, BinOpKind::Div, Prec::MULTIPLICATIVE.succ())?
                }
                // right-associative: the right side parses at the same level
                Token::Power if min_prec <= Prec::EXPONENT => {
                    self.parse_binary(left, BinOpKind::Pow, Prec::EXPONENT)?
                }
                Token::Pipe if min_prec <= Prec::PIPE => self.parse_pipe(left)?,
                Token::Dot if min_prec <= Prec::METHOD => self.parse_method(left)?,
                Token::LBracket if min_prec <= Prec::INDEX => self.parse_index(left)?,
                // any unexpected token is not consumed, this is a problem for the caller
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_binary(&mut self, left: Op, op: BinOpKind, right_prec: Prec) -> EvalResult<Op> {
        // assumes that the caller did not consume the operator yet
        self.consume();
        let right = self.parse_prec_expr(right_prec)?;
        Ok(Op::BinOp {
            op,
            lhs: Box::new(left),
            rhs: Box::new(right),
        })
    }

    /// Comparisons are non-associative: `a < b < c` is rejected rather
    /// than parsed as `(a < b) < c`.
    fn parse_comparison(&mut self, left: Op, op: BinOpKind) -> EvalResult<Op> {
        if op == BinOpKind::NotIn {
            self.consume();
            self.expect(Token::In)?;
        } else {
            self.consume();
        }
        let right = self.parse_prec_expr(Prec::COMPARISON.succ())?;
        if let Some(next) = self.peek() {
            if Self::comparison_kind(next).is_some() || next == Token::Not {
                let span = self.peek_span();
                return Err(
                    self.syntax_error(span, "comparison operators cannot be chained".to_string())
                );
            }
        }
        Ok(Op::BinOp {
            op,
            lhs: Box::new(left),
            rhs: Box::new(right),
        })
    }

    fn parse_ternary(&mut self, then: Op) -> EvalResult<Op> {
        self.expect(Token::If)?;
        let cond = self.parse_prec_expr(Prec::TERNARY.succ())?;
        self.expect(Token::Else)?;
        let otherwise = self.parse_prec_expr(Prec::TERNARY)?;
        Ok(Op::IfExpr {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// `e | f(a, b)` and bare `e | f` become `f(e, a, b)` / `f(e)`.
    fn parse_pipe(&mut self, left: Op) -> EvalResult<Op> {
        self.expect(Token::Pipe)?;
        let name = self.parse_name()?;
        let mut args = vec![left];
        if self.peek() == Some(Token::LParen) {
            args.extend(self.parse_expr_list(Token::LParen, Token::RParen)?);
        }
        Ok(Op::Call { name, args })
    }

    /// `e.f(a)` becomes `f(e, a)`; unlike pipes, methods always take an
    /// argument list.
    fn parse_method(&mut self, left: Op) -> EvalResult<Op> {
        self.expect(Token::Dot)?;
        let name = self.parse_name()?;
        let mut args = vec![left];
        args.extend(self.parse_expr_list(Token::LParen, Token::RParen)?);
        Ok(Op::Call { name, args })
    }

    /// Bracket contents: a single key, or a colon-separated slice with any
    /// fields empty. Missing slice fields become null literals so the
    /// runtime sees clean integer-or-null bounds.
    fn parse_index(&mut self, left: Op) -> EvalResult<Op> {
        let open = self.expect(Token::LBracket)?;
        let mut fields: Vec<Option<Op>> = Vec::new();
        let mut current: Option<Op> = None;
        let mut colons = 0;
        loop {
            match self.peek() {
                Some(Token::RBracket) => break,
                Some(Token::Colon) => {
                    let span = self.expect(Token::Colon)?;
                    if colons == 2 {
                        return Err(
                            self.syntax_error(span, "too many `:` in subscript".to_string())
                        );
                    }
                    colons += 1;
                    fields.push(current.take());
                }
                Some(got) => {
                    if current.is_some() {
                        let span = self.peek_span();
                        return Err(self.expected_but_got(
                            span,
                            &[Token::Colon, Token::RBracket],
                            got,
                        ));
                    }
                    current = Some(self.parse_expr()?);
                }
                None => return Err(self.unexpected_eof(&[Token::RBracket])),
            }
        }
        fields.push(current.take());
        self.expect(Token::RBracket)?;

        if colons == 0 {
            match fields.pop().flatten() {
                Some(key) => Ok(Op::Call {
                    name: "__getitem__".to_string(),
                    args: vec![left, key],
                }),
                None => Err(self.syntax_error(open, "empty subscript".to_string())),
            }
        } else {
            while fields.len() < 3 {
                fields.push(None);
            }
            let null = || Op::Value(Value::Null);
            let step = fields.pop().flatten().unwrap_or_else(null);
            let stop = fields.pop().flatten().unwrap_or_else(null);
            let start = fields.pop().flatten().unwrap_or_else(null);
            Ok(Op::Call {
                name: "__getitem__".to_string(),
                args: vec![
                    left,
                    Op::Slice {
                        start: Box::new(start),
                        stop: Box::new(stop),
                        step: Box::new(step),
                    },
                ],
            })
        }
    }

    fn parse_prefix_expr(&mut self) -> EvalResult<Op> {
        let (token, span) = match self.peek() {
            None => return Err(self.unexpected_str_eof("an expression")),
            Some(token) => (token, self.peek_span()),
        };
        if let Some(word) = Self::reserved_unused(token) {
            return Err(self.error_at(span, ErrorInfo::ReservedWord(word.to_string())));
        }
        match token {
            Token::Minus => {
                self.consume();
                let operand = self.parse_prec_expr(Prec::UNARY)?;
                Ok(Op::UnaryOp {
                    op: UnaryOpKind::Neg,
                    operand: Box::new(operand),
                })
            }
            Token::Not => {
                self.consume();
                let operand = self.parse_prec_expr(Prec::PREFIX)?;
                Ok(Op::UnaryOp {
                    op: UnaryOpKind::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Number => self.parse_number_expr(),
            Token::Str => self.parse_string_expr(),
            Token::True => {
                self.consume();
                Ok(Op::Value(Value::Bool(true)))
            }
            Token::False => {
                self.consume();
                Ok(Op::Value(Value::Bool(false)))
            }
            Token::None => {
                self.consume();
                Ok(Op::Value(Value::Null))
            }
            Token::Name => self.parse_name_expr(),
            Token::LParen => self.parse_paren_expr(),
            Token::LBracket => {
                let items = self.parse_expr_list(Token::LBracket, Token::RBracket)?;
                Ok(Op::Call {
                    name: "list".to_string(),
                    args: items,
                })
            }
            Token::LBrace => self.parse_dict_expr(),
            _ => Err(self.expected_str_but_got(span, "an expression", token)),
        }
    }

    fn parse_name(&mut self) -> EvalResult<String> {
        match self.consume() {
            Some((Token::Name, span)) => Ok(self.slice(&span).to_string()),
            Some((token, span)) => Err(self.expected_str_but_got(span, "a name", token)),
            None => Err(self.unexpected_str_eof("a name")),
        }
    }

    /// A name in expression position: the start of a lambda (`x => e`), a
    /// call (`f(…)`), or a plain variable reference.
    fn parse_name_expr(&mut self) -> EvalResult<Op> {
        let name = self.parse_name()?;
        match self.peek() {
            Some(Token::Arrow) => {
                self.consume();
                let body = self.parse_expr()?;
                Ok(Op::Lambda {
                    params: vec![name],
                    body: Rc::new(body),
                })
            }
            Some(Token::LParen) => {
                let args = self.parse_expr_list(Token::LParen, Token::RParen)?;
                Ok(Op::Call { name, args })
            }
            _ => Ok(Op::Name(name)),
        }
    }

    fn parse_paren_expr(&mut self) -> EvalResult<Op> {
        if self.lambda_params_ahead() {
            self.expect(Token::LParen)?;
            let mut params = vec![self.parse_name()?];
            while self.peek() == Some(Token::Comma) {
                self.consume();
                params.push(self.parse_name()?);
            }
            self.expect(Token::RParen)?;
            self.expect(Token::Arrow)?;
            let body = self.parse_expr()?;
            Ok(Op::Lambda {
                params,
                body: Rc::new(body),
            })
        } else {
            self.expect(Token::LParen)?;
            let inner = self.parse_expr()?;
            self.expect(Token::RParen)?;
            Ok(inner)
        }
    }

    /// `(a, b) => …` needs unbounded lookahead to tell apart from a
    /// parenthesized expression, so scan ahead without consuming.
    fn lambda_params_ahead(&self) -> bool {
        let mut offset = 1; // past the `(`
        loop {
            match self.peek_at(offset) {
                Some(Token::Name) => offset += 1,
                _ => return false,
            }
            match self.peek_at(offset) {
                Some(Token::Comma) => offset += 1,
                Some(Token::RParen) => return self.peek_at(offset + 1) == Some(Token::Arrow),
                _ => return false,
            }
        }
    }

    fn parse_dict_expr(&mut self) -> EvalResult<Op> {
        self.expect(Token::LBrace)?;
        if self.peek() == Some(Token::RBrace) {
            self.consume();
            // `{}` builds through the same constructor as `dict()`
            return Ok(Op::Call {
                name: "dict".to_string(),
                args: Vec::new(),
            });
        }
        let mut pairs = Vec::new();
        loop {
            let key = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let value = self.parse_expr()?;
            pairs.push((key, value));
            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                    if self.peek() == Some(Token::RBrace) {
                        break;
                    }
                }
                Some(Token::RBrace) => break,
                Some(got) => {
                    let span = self.peek_span();
                    return Err(self.expected_but_got(span, &[Token::Comma, Token::RBrace], got));
                }
                None => return Err(self.unexpected_eof(&[Token::RBrace])),
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Op::Dict { pairs })
    }

    /// Comma-separated expressions between `start` and `end`, allowing a
    /// trailing comma.
    fn parse_expr_list(&mut self, start: Token, end: Token) -> EvalResult<Vec<Op>> {
        self.expect(start)?;
        let mut items = Vec::new();
        while self.peek() != Some(end) {
            items.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.consume();
                }
                Some(token) if token == end => break,
                Some(got) => {
                    let span = self.peek_span();
                    return Err(self.expected_but_got(span, &[Token::Comma, end], got));
                }
                None => return Err(self.unexpected_eof(&[Token::Comma, end])),
            }
        }
        self.expect(end)?;
        Ok(items)
    }

    fn parse_number_expr(&mut self) -> EvalResult<Op> {
        let span = self.expect(Token::Number)?;
        match self.slice(&span).parse() {
            Ok(number) => Ok(Op::Value(Value::Num(number))),
            Err(err) => Err(self.syntax_error(span, format!("{}", err))),
        }
    }

    fn parse_string_expr(&mut self) -> EvalResult<Op> {
        let span = self.expect(Token::Str)?;
        let text = self.slice(&span);
        let (raw, body) = if let Some(rest) = text.strip_prefix('r') {
            (true, &rest[1..rest.len() - 1])
        } else {
            (false, &text[1..text.len() - 1])
        };
        let value = if raw { body.to_string() } else { unescape(body) };
        Ok(Op::Value(Value::Str(value.into())))
    }
}

/// Escape handling for cooked strings: `\n`, `\t`, `\'` and `\"` are
/// translated, any other escape keeps its backslash.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
