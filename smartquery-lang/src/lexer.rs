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

use logos::Logos;

use crate::error::{Error, ErrorInfo, EvalResult};
use crate::line_map::LineMap;

// Re-exports
pub use logos::Span;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    // Operators
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=>")]
    Arrow,
    #[token("=")]
    Assign,
    #[regex(r"[+\-*/]=")]
    ShortOp,
    #[token("**")]
    Power,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("|")]
    Pipe,

    // Grouping
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    /// Statement separator: a physical line break or `;`.
    #[regex(r"\r\n|\n|;")]
    Newline,

    // Keywords
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("in")]
    In,
    #[token("not")]
    Not,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("del")]
    Del,

    // Reserved keywords without behavior; the parser rejects every one
    // of them so they stay available for future statements.
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("def")]
    Def,
    #[token("raise")]
    Raise,
    #[token("elif")]
    Elif,

    // Entities
    /// A bare identifier, or a `%…%`-quoted one whose body may contain
    /// anything but `%` (dots, spaces, non-ASCII letters). Both shapes are
    /// equally first-class; quoted names keep their delimiters.
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*")]
    #[regex(r"%[^%\n]*%")]
    Name,

    // Literals
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,
    /// Single- or double-quoted; an `r` prefix keeps the body verbatim.
    #[regex(r#"r?"([^"\\\n]|\\.)*""#)]
    #[regex(r"r?'([^'\\\n]|\\.)*'")]
    Str,

    #[error]
    #[regex(r"[ \t]+", logos::skip)]
    #[regex(r"#[^\n]*", logos::skip)]
    Error,
}

/// Token stream over a source text.
///
/// Wraps the generated tokenizer with the stateful part the derive cannot
/// express: a bracket-nesting counter that swallows physical line breaks
/// inside `()`/`[]`/`{}` so multi-line literals and argument lists read
/// naturally. `;` separates statements regardless of nesting.
pub struct Lexer<'a> {
    source: &'a str,
    stream: logos::SpannedIter<'a, Token>,
    line_map: LineMap<'a>,
    paren_count: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            stream: Token::lexer(source).spanned(),
            line_map: LineMap::new(source),
            paren_count: 0,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = EvalResult<(Token, Span)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (token, span) = self.stream.next()?;
            match token {
                Token::Error => {
                    let offending = self.source[span.start..].chars().next().unwrap_or('?');
                    let pos = self.line_map.offset_to_pos(span.start);
                    return Some(Err(Error::at(pos, ErrorInfo::IllegalChar(offending))));
                }
                Token::Newline => {
                    if self.paren_count == 0 || &self.source[span.clone()] == ";" {
                        return Some(Ok((token, span)));
                    }
                }
                Token::LParen | Token::LBracket | Token::LBrace => {
                    self.paren_count += 1;
                    return Some(Ok((token, span)));
                }
                Token::RParen | Token::RBracket | Token::RBrace => {
                    self.paren_count = self.paren_count.saturating_sub(1);
                    return Some(Ok((token, span)));
                }
                _ => return Some(Ok((token, span))),
            }
        }
    }
}

/// Lex the whole input up front, as the parser consumes it.
pub fn tokens(source: &str) -> EvalResult<Vec<(Token, Span)>> {
    Lexer::new(source).collect()
}

/// Every `NAME` occurrence in source order, duplicates included. Hosts use
/// this to learn which variables an expression needs before evaluating it.
pub fn names(source: &str) -> EvalResult<Vec<String>> {
    let mut found = Vec::new();
    for item in Lexer::new(source) {
        let (token, span) = item?;
        if token == Token::Name {
            found.push(source[span].to_string());
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    fn check(input: &str, output: Expect) {
        let tokens: Vec<Token> = Lexer::new(input)
            .collect::<EvalResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect();
        output.assert_eq(&format!("{:?}", tokens));
    }

    #[test]
    fn arithmetic() {
        check(
            "5 * 5 + 5 / 5",
            expect![[r#"[Number, Star, Number, Plus, Number, Slash, Number]"#]],
        );
    }

    #[test]
    fn operators() {
        check(
            "a == b != c <= d ** e",
            expect![[r#"[Name, Eq, Name, Ne, Name, Le, Name, Power, Name]"#]],
        );
        check("a += 2", expect![[r#"[Name, ShortOp, Number]"#]]);
        check("x => x", expect![[r#"[Name, Arrow, Name]"#]]);
    }

    #[test]
    fn keywords() {
        check(
            "True and not None",
            expect![[r#"[True, And, Not, None]"#]],
        );
        check("raise x", expect![[r#"[Raise, Name]"#]]);
    }

    #[test]
    fn quoted_names() {
        check(
            "%имя%.lower()",
            expect![[r#"[Name, Dot, Name, LParen, RParen]"#]],
        );
    }

    #[test]
    fn strings() {
        check(r#""hello" 'world'"#, expect![[r#"[Str, Str]"#]]);
        check(r#"r"\d+""#, expect![[r#"[Str]"#]]);
        check(r#""with \"escape\"""#, expect![[r#"[Str]"#]]);
    }

    #[test]
    fn comments_are_dropped() {
        check("10  # trailing", expect![[r#"[Number]"#]]);
    }

    #[test]
    fn newlines_between_statements() {
        check(
            "x = 1\ny = 2",
            expect![[r#"[Name, Assign, Number, Newline, Name, Assign, Number]"#]],
        );
        check("a; b", expect![[r#"[Name, Newline, Name]"#]]);
    }

    #[test]
    fn newlines_inside_brackets_are_swallowed() {
        check(
            "len(\n  [1, 2],\n)",
            expect![[r#"[Name, LParen, LBracket, Number, Comma, Number, RBracket, Comma, RParen]"#]],
        );
        check(
            "{\n'a': 1\n}",
            expect![[r#"[LBrace, Str, Colon, Number, RBrace]"#]],
        );
    }

    #[test]
    fn semicolon_separates_even_inside_brackets() {
        check(
            "[1;\n2]",
            expect![[r#"[LBracket, Number, Newline, Number, RBracket]"#]],
        );
    }

    #[test]
    fn illegal_character() {
        let err = Lexer::new("10 @ 20")
            .collect::<EvalResult<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.info(), &ErrorInfo::IllegalChar('@'));
        assert_eq!(err.pos().unwrap().column, 4);
    }

    #[test]
    fn bare_percent_is_illegal() {
        let err = Lexer::new("10 % 20")
            .collect::<EvalResult<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.info(), &ErrorInfo::IllegalChar('%'));
    }

    #[test]
    fn name_listing() {
        assert_eq!(
            names("x + %долг.всего% * x").unwrap(),
            vec!["x", "%долг.всего%", "x"]
        );
        // keywords are not names
        assert_eq!(names("True and flag").unwrap(), vec!["flag"]);
    }
}
