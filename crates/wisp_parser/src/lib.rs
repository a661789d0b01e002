mod ast;
mod error;
mod parser;

pub use ast::{BlockStatement, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
pub use error::ParseError;
pub use parser::Parser;

use wisp_lexer::LexError;

pub fn parse(source: &str) -> (Program, Vec<LexError>, Vec<ParseError>) {
    let (tokens, lex_errors) = wisp_lexer::tokenize(source);
    let (program, parse_errors) = Parser::new(tokens).parse_program();
    (program, lex_errors, parse_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        let (program, lex_errors, parse_errors) = parse(src);
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        program
    }

    fn first_stmt(src: &str) -> StmtKind {
        parse_ok(src).statements.into_iter().next().unwrap().kind
    }

    fn first_expr(src: &str) -> ExprKind {
        match first_stmt(src) {
            StmtKind::Expr { value } => value.kind,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn t_let_statement() {
        match first_stmt("let x = 5;") {
            StmtKind::Let { name, value } => {
                assert_eq!(name, "x");
                assert_eq!(value.kind, ExprKind::IntegerLiteral(5));
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn t_return_statement() {
        match first_stmt("return 10;") {
            StmtKind::Return { value } => assert_eq!(value.kind, ExprKind::IntegerLiteral(10)),
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn t_identifier_expression() {
        assert_eq!(first_expr("foobar;"), ExprKind::Identifier("foobar".into()));
    }

    #[test]
    fn t_integer_literal() {
        assert_eq!(first_expr("5;"), ExprKind::IntegerLiteral(5));
    }

    #[test]
    fn t_string_literal() {
        assert_eq!(first_expr("\"hello\";"), ExprKind::StringLiteral("hello".into()));
    }

    #[test]
    fn t_boolean_literals() {
        assert_eq!(first_expr("true;"), ExprKind::Boolean(true));
        assert_eq!(first_expr("false;"), ExprKind::Boolean(false));
    }

    #[test]
    fn t_prefix_bang() {
        match first_expr("!true;") {
            ExprKind::Prefix { op, right } => {
                assert_eq!(op, PrefixOp::Bang);
                assert_eq!(right.kind, ExprKind::Boolean(true));
            }
            other => panic!("expected prefix, got {:?}", other),
        }
    }

    #[test]
    fn t_prefix_minus() {
        match first_expr("-5;") {
            ExprKind::Prefix { op, right } => {
                assert_eq!(op, PrefixOp::Minus);
                assert_eq!(right.kind, ExprKind::IntegerLiteral(5));
            }
            other => panic!("expected prefix, got {:?}", other),
        }
    }

    #[test]
    fn t_infix_precedence_mul_over_add() {
        match first_expr("1 + 2 * 3;") {
            ExprKind::Infix { op, left, right } => {
                assert_eq!(op, InfixOp::Add);
                assert_eq!(left.kind, ExprKind::IntegerLiteral(1));
                match right.kind {
                    ExprKind::Infix { op, .. } => assert_eq!(op, InfixOp::Mul),
                    other => panic!("expected nested infix, got {:?}", other),
                }
            }
            other => panic!("expected infix, got {:?}", other),
        }
    }

    #[test]
    fn t_grouped_expression_overrides_precedence() {
        match first_expr("(1 + 2) * 3;") {
            ExprKind::Infix { op, left, .. } => {
                assert_eq!(op, InfixOp::Mul);
                assert!(matches!(left.kind, ExprKind::Infix { op: InfixOp::Add, .. }));
            }
            other => panic!("expected infix, got {:?}", other),
        }
    }

    #[test]
    fn t_if_expression() {
        match first_expr("if (x < y) { x } else { y }") {
            ExprKind::If { consequence, alternative, .. } => {
                assert_eq!(consequence.statements.len(), 1);
                assert!(alternative.is_some());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn t_function_literal_params() {
        match first_expr("fn(x, y) { x + y; }") {
            ExprKind::FunctionLiteral { params, body, .. } => {
                assert_eq!(params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(body.statements.len(), 1);
            }
            other => panic!("expected function literal, got {:?}", other),
        }
    }

    #[test]
    fn t_let_bound_function_literal_is_named() {
        match first_stmt("let add = fn(x, y) { x + y; };") {
            StmtKind::Let { value, .. } => match value.kind {
                ExprKind::FunctionLiteral { name, .. } => assert_eq!(name, Some("add".to_string())),
                other => panic!("expected function literal, got {:?}", other),
            },
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn t_call_expression_args() {
        match first_expr("add(1, 2 * 3, 4 + 5);") {
            ExprKind::Call { args, .. } => assert_eq!(args.len(), 3),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn t_array_literal() {
        match first_expr("[1, 2 * 2, 3 + 3]") {
            ExprKind::ArrayLiteral(elements) => assert_eq!(elements.len(), 3),
            other => panic!("expected array literal, got {:?}", other),
        }
    }

    #[test]
    fn t_index_expression() {
        match first_expr("myArray[1 + 1]") {
            ExprKind::Index { index, .. } => assert!(matches!(index.kind, ExprKind::Infix { .. })),
            other => panic!("expected index, got {:?}", other),
        }
    }

    #[test]
    fn t_hash_literal_string_keys() {
        match first_expr(r#"{"one": 1, "two": 2}"#) {
            ExprKind::HashLiteral(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn t_empty_hash_literal() {
        match first_expr("{}") {
            ExprKind::HashLiteral(pairs) => assert!(pairs.is_empty()),
            other => panic!("expected hash literal, got {:?}", other),
        }
    }

    #[test]
    fn t_missing_semicolon_is_not_required_between_statements_in_block() {
        let program = parse_ok("if (true) { 5 } else { 10 }");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn t_parse_error_on_missing_rparen() {
        let (_, _, errors) = parse("(1 + 2;");
        assert!(!errors.is_empty());
    }
}
