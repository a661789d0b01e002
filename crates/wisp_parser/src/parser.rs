use wisp_lexer::{Span, Token, TokenKind};

use crate::ast::{BlockStatement, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Prec {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn infix_prec(kind: &TokenKind) -> Option<Prec> {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Some(Prec::Equals),
        TokenKind::Lt | TokenKind::Gt => Some(Prec::LessGreater),
        TokenKind::Plus | TokenKind::Minus => Some(Prec::Sum),
        TokenKind::Slash | TokenKind::Asterisk => Some(Prec::Product),
        TokenKind::LParen => Some(Prec::Call),
        TokenKind::LBracket => Some(Prec::Index),
        _ => None,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new() }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn expect_peek_kind(&mut self, expected: TokenKind, label: &str) -> bool {
        if self.peek().kind == expected {
            self.advance();
            true
        } else {
            self.errors.push(ParseError::UnexpectedToken {
                expected: label.to_string(),
                found: format!("{:?}", self.peek().kind),
                span: self.peek().span,
            });
            false
        }
    }

    /// Advances onto the next token and returns its identifier name, or records an error.
    fn expect_peek_ident(&mut self) -> Option<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Some(name)
            }
            other => {
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "identifier".to_string(),
                    found: format!("{:?}", other),
                    span: self.peek().span,
                });
                None
            }
        }
    }

    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        while self.current().kind != TokenKind::Eof {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.advance();
        }
        (Program { statements }, self.errors)
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.current().kind {
            TokenKind::Let => self.parse_let_statement(),
            TokenKind::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Option<Stmt> {
        let span = self.current_span();
        let name = self.expect_peek_ident()?;
        if !self.expect_peek_kind(TokenKind::Assign, "=") {
            return None;
        }
        self.advance();
        let value = self.parse_expression(Prec::Lowest)?;
        let value = stamp_function_name(value, &name);
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Some(Stmt { kind: StmtKind::Let { name, value }, span })
    }

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        let span = self.current_span();
        self.advance();
        let value = self.parse_expression(Prec::Lowest)?;
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Some(Stmt { kind: StmtKind::Return { value }, span })
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let span = self.current_span();
        let value = self.parse_expression(Prec::Lowest)?;
        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        }
        Some(Stmt { kind: StmtKind::Expr { value }, span })
    }

    fn parse_expression(&mut self, prec: Prec) -> Option<Expr> {
        let mut left = self.parse_prefix()?;
        while self.peek().kind != TokenKind::Semicolon {
            match infix_prec(&self.peek().kind) {
                Some(p) if p > prec => {}
                _ => break,
            }
            self.advance();
            left = match self.current().kind.clone() {
                TokenKind::LParen => self.parse_call_expression(left)?,
                TokenKind::LBracket => self.parse_index_expression(left)?,
                _ => self.parse_infix_expression(left)?,
            };
        }
        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        let span = self.current_span();
        match self.current().kind.clone() {
            TokenKind::Ident(name) => Some(Expr { kind: ExprKind::Identifier(name), span }),
            TokenKind::Int(value) => Some(Expr { kind: ExprKind::IntegerLiteral(value), span }),
            TokenKind::Str(value) => Some(Expr { kind: ExprKind::StringLiteral(value), span }),
            TokenKind::True => Some(Expr { kind: ExprKind::Boolean(true), span }),
            TokenKind::False => Some(Expr { kind: ExprKind::Boolean(false), span }),
            TokenKind::Bang => self.parse_prefix_expression(PrefixOp::Bang),
            TokenKind::Minus => self.parse_prefix_expression(PrefixOp::Minus),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::Fn => self.parse_function_literal(),
            other => {
                self.errors.push(ParseError::NoPrefixParseFn { found: format!("{:?}", other), span });
                None
            }
        }
    }

    fn parse_prefix_expression(&mut self, op: PrefixOp) -> Option<Expr> {
        let span = self.current_span();
        self.advance();
        let right = self.parse_expression(Prec::Prefix)?;
        Some(Expr { kind: ExprKind::Prefix { op, right: Box::new(right) }, span })
    }

    fn parse_infix_expression(&mut self, left: Expr) -> Option<Expr> {
        let span = self.current_span();
        let op = match self.current().kind {
            TokenKind::Plus => InfixOp::Add,
            TokenKind::Minus => InfixOp::Sub,
            TokenKind::Asterisk => InfixOp::Mul,
            TokenKind::Slash => InfixOp::Div,
            TokenKind::Eq => InfixOp::Eq,
            TokenKind::NotEq => InfixOp::NotEq,
            TokenKind::Lt => InfixOp::Lt,
            TokenKind::Gt => InfixOp::Gt,
            _ => unreachable!("infix_prec only admits operator tokens"),
        };
        let prec = infix_prec(&self.current().kind).unwrap();
        self.advance();
        let right = self.parse_expression(prec)?;
        Some(Expr { kind: ExprKind::Infix { op, left: Box::new(left), right: Box::new(right) }, span })
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.advance();
        let expr = self.parse_expression(Prec::Lowest)?;
        if !self.expect_peek_kind(TokenKind::RParen, ")") {
            return None;
        }
        Some(expr)
    }

    fn parse_if_expression(&mut self) -> Option<Expr> {
        let span = self.current_span();
        if !self.expect_peek_kind(TokenKind::LParen, "(") {
            return None;
        }
        self.advance();
        let condition = self.parse_expression(Prec::Lowest)?;
        if !self.expect_peek_kind(TokenKind::RParen, ")") {
            return None;
        }
        if !self.expect_peek_kind(TokenKind::LBrace, "{") {
            return None;
        }
        let consequence = self.parse_block_statement();
        let alternative = if self.peek().kind == TokenKind::Else {
            self.advance();
            if !self.expect_peek_kind(TokenKind::LBrace, "{") {
                return None;
            }
            Some(self.parse_block_statement())
        } else {
            None
        };
        Some(Expr {
            kind: ExprKind::If { condition: Box::new(condition), consequence, alternative },
            span,
        })
    }

    fn parse_block_statement(&mut self) -> BlockStatement {
        let span = self.current_span();
        let mut statements = Vec::new();
        self.advance();
        while self.current().kind != TokenKind::RBrace && self.current().kind != TokenKind::Eof {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.advance();
        }
        BlockStatement { statements, span }
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        let span = self.current_span();
        if !self.expect_peek_kind(TokenKind::LParen, "(") {
            return None;
        }
        let params = self.parse_function_parameters()?;
        if !self.expect_peek_kind(TokenKind::LBrace, "{") {
            return None;
        }
        let body = self.parse_block_statement();
        Some(Expr { kind: ExprKind::FunctionLiteral { name: None, params, body }, span })
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();
        if self.peek().kind == TokenKind::RParen {
            self.advance();
            return Some(params);
        }
        params.push(self.expect_peek_ident()?);
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            params.push(self.expect_peek_ident()?);
        }
        if !self.expect_peek_kind(TokenKind::RParen, ")") {
            return None;
        }
        Some(params)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let span = self.current_span();
        let args = self.parse_expression_list(TokenKind::RParen)?;
        Some(Expr { kind: ExprKind::Call { function: Box::new(function), args }, span })
    }

    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        let span = self.current_span();
        self.advance();
        let index = self.parse_expression(Prec::Lowest)?;
        if !self.expect_peek_kind(TokenKind::RBracket, "]") {
            return None;
        }
        Some(Expr { kind: ExprKind::Index { left: Box::new(left), index: Box::new(index) }, span })
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let span = self.current_span();
        let elements = self.parse_expression_list(TokenKind::RBracket)?;
        Some(Expr { kind: ExprKind::ArrayLiteral(elements), span })
    }

    fn parse_hash_literal(&mut self) -> Option<Expr> {
        let span = self.current_span();
        let mut pairs = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            self.advance();
            let key = self.parse_expression(Prec::Lowest)?;
            if !self.expect_peek_kind(TokenKind::Colon, ":") {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Prec::Lowest)?;
            pairs.push((key, value));
            if self.peek().kind != TokenKind::RBrace && !self.expect_peek_kind(TokenKind::Comma, ", or }") {
                return None;
            }
        }
        if !self.expect_peek_kind(TokenKind::RBrace, "}") {
            return None;
        }
        Some(Expr { kind: ExprKind::HashLiteral(pairs), span })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut list = Vec::new();
        if self.peek().kind == end {
            self.advance();
            return Some(list);
        }
        self.advance();
        list.push(self.parse_expression(Prec::Lowest)?);
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            self.advance();
            list.push(self.parse_expression(Prec::Lowest)?);
        }
        if !self.expect_peek_kind(end, ") or ]") {
            return None;
        }
        Some(list)
    }
}

/// A let-bound function literal records its own name so the compiler can
/// register a FUNCTION-scoped self-reference inside the body (see DESIGN.md).
fn stamp_function_name(expr: Expr, name: &str) -> Expr {
    match expr.kind {
        ExprKind::FunctionLiteral { params, body, .. } => Expr {
            kind: ExprKind::FunctionLiteral { name: Some(name.to_string()), params, body },
            span: expr.span,
        },
        other => Expr { kind: other, span: expr.span },
    }
}
