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

use super::Parser;
use expect_test::{expect, Expect};

fn check(input: &str, output: Expect) {
    let result = Parser::parse(input);
    output.assert_eq(&format!("{:?}", result));
}

#[test]
fn parse_empty() {
    check("", expect![[r#"Ok(Code([]))"#]]);
}

#[test]
fn parse_literal() {
    check("26", expect![[r#"Ok(Code([Value(Num(Decimal(26)))]))"#]]);
}

#[test]
fn parse_arithmetic_precedence() {
    check(
        "5 * 5 + 5 / 5",
        expect![[
            r#"Ok(Code([BinOp { op: Add, lhs: BinOp { op: Mul, lhs: Value(Num(Decimal(5))), rhs: Value(Num(Decimal(5))) }, rhs: BinOp { op: Div, lhs: Value(Num(Decimal(5))), rhs: Value(Num(Decimal(5))) } }]))"#
        ]],
    );
}

#[test]
fn parse_power_is_right_associative() {
    check(
        "2 ** 3 ** 2",
        expect![[
            r#"Ok(Code([BinOp { op: Pow, lhs: Value(Num(Decimal(2))), rhs: BinOp { op: Pow, lhs: Value(Num(Decimal(3))), rhs: Value(Num(Decimal(2))) } }]))"#
        ]],
    );
}

#[test]
fn parse_assignment() {
    check(
        "x = 10",
        expect![[r#"Ok(Code([Assign { name: "x", value: Value(Num(Decimal(10))) }]))"#]],
    );
}

#[test]
fn parse_compound_assignment() {
    check(
        "x += 2",
        expect![[r#"Ok(Code([ShortOp { name: "x", op: Add, value: Value(Num(Decimal(2))) }]))"#]],
    );
}

#[test]
fn parse_pipe_lowers_to_call() {
    check(
        "x | f",
        expect![[r#"Ok(Code([Call { name: "f", args: [Name("x")] }]))"#]],
    );
    check(
        "x | f(1)",
        expect![[r#"Ok(Code([Call { name: "f", args: [Name("x"), Value(Num(Decimal(1)))] }]))"#]],
    );
}

#[test]
fn parse_method_lowers_to_call() {
    check(
        "x.f(1)",
        expect![[r#"Ok(Code([Call { name: "f", args: [Name("x"), Value(Num(Decimal(1)))] }]))"#]],
    );
}

#[test]
fn parse_method_requires_arguments() {
    check(
        "x.f",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 4 }), info: Syntax("expected one of [LParen], but reached end of input") })"#
        ]],
    );
}

#[test]
fn parse_list_literal_lowers_to_call() {
    check(
        "[1, 2, 3,]",
        expect![[
            r#"Ok(Code([Call { name: "list", args: [Value(Num(Decimal(1))), Value(Num(Decimal(2))), Value(Num(Decimal(3)))] }]))"#
        ]],
    );
}

#[test]
fn parse_dict_literal() {
    check(
        "{'a': 1}",
        expect![[r#"Ok(Code([Dict { pairs: [(Value(Str("a")), Value(Num(Decimal(1))))] }]))"#]],
    );
    check("{}", expect![[r#"Ok(Code([Call { name: "dict", args: [] }]))"#]]);
}

#[test]
fn parse_indexing() {
    check(
        "x[k]",
        expect![[r#"Ok(Code([Call { name: "__getitem__", args: [Name("x"), Name("k")] }]))"#]],
    );
}

#[test]
fn parse_slices() {
    check(
        "arr[1:]",
        expect![[
            r#"Ok(Code([Call { name: "__getitem__", args: [Name("arr"), Slice { start: Value(Num(Decimal(1))), stop: Value(Null), step: Value(Null) }] }]))"#
        ]],
    );
    check(
        "arr[::-1]",
        expect![[
            r#"Ok(Code([Call { name: "__getitem__", args: [Name("arr"), Slice { start: Value(Null), stop: Value(Null), step: UnaryOp { op: Neg, operand: Value(Num(Decimal(1))) } }] }]))"#
        ]],
    );
}

#[test]
fn parse_setitem_forms() {
    check(
        "x[k] = 1",
        expect![[
            r#"Ok(Code([Call { name: "__setitem__", args: [Name("x"), Name("k"), Value(Num(Decimal(1)))] }]))"#
        ]],
    );
    check(
        "x[k] += 1",
        expect![[
            r#"Ok(Code([Call { name: "__setitem_with_op__", args: [Name("x"), Name("k"), Value(Str("+=")), Value(Num(Decimal(1)))] }]))"#
        ]],
    );
    check(
        "del x[k]",
        expect![[r#"Ok(Code([Call { name: "__delitem__", args: [Name("x"), Name("k")] }]))"#]],
    );
}

#[test]
fn parse_lambdas() {
    check(
        "v => v * 2",
        expect![[
            r#"Ok(Code([Lambda { params: ["v"], body: BinOp { op: Mul, lhs: Name("v"), rhs: Value(Num(Decimal(2))) } }]))"#
        ]],
    );
    check(
        "(a, b) => a + b",
        expect![[
            r#"Ok(Code([Lambda { params: ["a", "b"], body: BinOp { op: Add, lhs: Name("a"), rhs: Name("b") } }]))"#
        ]],
    );
}

#[test]
fn parse_ternary() {
    check(
        "a if c else b",
        expect![[r#"Ok(Code([IfExpr { cond: Name("c"), then: Name("a"), otherwise: Name("b") }]))"#]],
    );
}

#[test]
fn parse_membership() {
    check(
        "a not in b",
        expect![[r#"Ok(Code([BinOp { op: NotIn, lhs: Name("a"), rhs: Name("b") }]))"#]],
    );
}

#[test]
fn parse_statement_sequence() {
    check(
        "x = 10\ny = 20\n\nx + y",
        expect![[
            r#"Ok(Code([Assign { name: "x", value: Value(Num(Decimal(10))) }, Assign { name: "y", value: Value(Num(Decimal(20))) }, BinOp { op: Add, lhs: Name("x"), rhs: Name("y") }]))"#
        ]],
    );
}

#[test]
fn parse_reserved_keyword() {
    check(
        "raise Exception",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 1 }), info: ReservedWord("raise") })"#
        ]],
    );
}

#[test]
fn parse_chained_assignment_is_rejected() {
    check(
        "x = y = 10",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 7 }), info: Syntax("expected end of statement, but got Assign") })"#
        ]],
    );
}

#[test]
fn parse_chained_comparison_is_rejected() {
    check(
        "a < b < c",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 7 }), info: Syntax("comparison operators cannot be chained") })"#
        ]],
    );
}

#[test]
fn parse_empty_subscript_is_rejected() {
    check(
        "x[]",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 2 }), info: Syntax("empty subscript") })"#
        ]],
    );
}

#[test]
fn parse_double_plus_is_rejected() {
    check(
        "10 ++ 20",
        expect![[
            r#"Err(Error { pos: Some(Pos { line: 1, column: 5 }), info: Syntax("expected an expression, but got Plus") })"#
        ]],
    );
}
