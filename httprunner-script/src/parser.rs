//! Recursive-descent parser for the guest script language.
//!
//! Semicolons are optional everywhere: a statement ends at `;` if one is present, or simply where
//! the next statement begins. `return` followed by a line break returns `undefined`.

use std::rc::Rc;

use crate::{
    ast::*,
    error::{Result, ScriptError},
    lexer::{tokenize, unescape, SourceMap, SpannedToken, Token},
};

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

fn parse_embedded_expression(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let expr = parser.expression()?;
    if !parser.at_end() {
        return Err(parser.error("unexpected token in template expression"));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    map: SourceMap,
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<SpannedToken>) -> Self {
        Parser {
            source,
            map: SourceMap::new(source),
            tokens,
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn newline_before(&self) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.newline_before)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.source.len());
        let (line, column) = self.map.position(offset);
        let message = message.into();
        let message = match self.tokens.get(self.pos) {
            Some(t) => format!("{message}, found {:?}", &self.source[t.span.clone()]),
            None => format!("{message}, found end of input"),
        };
        ScriptError::Syntax {
            message,
            line,
            column,
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    /// Property names may be any identifier-like word, keywords included.
    fn property_name(&mut self) -> Result<String> {
        let Some(spanned) = self.tokens.get(self.pos) else {
            return Err(self.error("expected property name"));
        };
        let text = &self.source[spanned.span.clone()];
        let is_word = text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
        if !is_word {
            return Err(self.error("expected property name"));
        }
        let name = text.to_string();
        self.pos += 1;
        Ok(name)
    }

    fn consume_semicolon(&mut self) {
        self.eat(&Token::Semicolon);
    }

    // Statements

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Token::Var | Token::Let | Token::Const) => {
                let decl = self.declaration()?;
                self.consume_semicolon();
                Ok(decl)
            }
            Some(Token::Function) if matches!(self.peek_at(1), Some(Token::Ident(_))) => {
                self.pos += 1;
                let def = self.function_rest(true)?;
                Ok(Stmt::Function(def))
            }
            Some(Token::If) => self.if_statement(),
            Some(Token::While) => {
                self.pos += 1;
                self.expect(Token::LParen, "'(' after while")?;
                let condition = self.expression()?;
                self.expect(Token::RParen, "')' after condition")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { condition, body })
            }
            Some(Token::For) => self.for_statement(),
            Some(Token::Return) => {
                self.pos += 1;
                let value = match self.peek() {
                    None | Some(Token::Semicolon | Token::RBrace) => None,
                    Some(_) if self.newline_before() => None,
                    Some(_) => Some(self.expression()?),
                };
                self.consume_semicolon();
                Ok(Stmt::Return(value))
            }
            Some(Token::Break) => {
                self.pos += 1;
                self.consume_semicolon();
                Ok(Stmt::Break)
            }
            Some(Token::Continue) => {
                self.pos += 1;
                self.consume_semicolon();
                Ok(Stmt::Continue)
            }
            Some(Token::Throw) => {
                self.pos += 1;
                let value = self.expression()?;
                self.consume_semicolon();
                Ok(Stmt::Throw(value))
            }
            Some(Token::Try) => self.try_statement(),
            Some(Token::LBrace) => Ok(Stmt::Block(self.block()?)),
            Some(Token::Semicolon) => {
                self.pos += 1;
                Ok(Stmt::Empty)
            }
            Some(_) => {
                let expr = self.expression()?;
                self.consume_semicolon();
                Ok(Stmt::Expr(expr))
            }
            None => Err(self.error("expected statement")),
        }
    }

    fn decl_kind(&mut self) -> Result<DeclKind> {
        let kind = match self.peek() {
            Some(Token::Var) => DeclKind::Var,
            Some(Token::Let) => DeclKind::Let,
            Some(Token::Const) => DeclKind::Const,
            _ => return Err(self.error("expected declaration")),
        };
        self.pos += 1;
        Ok(kind)
    }

    fn declaration(&mut self) -> Result<Stmt> {
        let kind = self.decl_kind()?;
        let mut declarations = Vec::new();
        loop {
            let name = self.identifier()?;
            let init = if self.eat(&Token::Assign) {
                Some(self.assignment()?)
            } else {
                if kind == DeclKind::Const {
                    return Err(self.error("missing initializer in const declaration"));
                }
                None
            };
            declarations.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Stmt::Decl { kind, declarations })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error("expected '}'"));
            }
            body.push(self.statement()?);
        }
        self.pos += 1;
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.expect(Token::If, "if")?;
        self.expect(Token::LParen, "'(' after if")?;
        let condition = self.expression()?;
        self.expect(Token::RParen, "')' after condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.eat(&Token::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn is_for_each_keyword(token: Option<&Token>) -> bool {
        match token {
            Some(Token::In) => true,
            Some(Token::Ident(word)) => word == "of",
            _ => false,
        }
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        self.expect(Token::For, "for")?;
        self.expect(Token::LParen, "'(' after for")?;

        let declared = matches!(self.peek(), Some(Token::Var | Token::Let | Token::Const));
        let offset = usize::from(declared);
        if matches!(self.peek_at(offset), Some(Token::Ident(_)))
            && Self::is_for_each_keyword(self.peek_at(offset + 1))
        {
            let kind = if declared {
                self.decl_kind()?
            } else {
                DeclKind::Var
            };
            let name = self.identifier()?;
            let keys = self.advance() == Some(Token::In);
            let iterable = self.expression()?;
            self.expect(Token::RParen, "')' after for clause")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForEach {
                kind,
                name,
                iterable,
                keys,
                body,
            });
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else if declared {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect(Token::Semicolon, "';' after for initializer")?;
        let condition = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(Token::Semicolon, "';' after for condition")?;
        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(Token::RParen, "')' after for clause")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt> {
        self.expect(Token::Try, "try")?;
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat(&Token::Catch) {
            if self.eat(&Token::LParen) {
                param = Some(self.identifier()?);
                self.expect(Token::RParen, "')' after catch parameter")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat(&Token::Finally) {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("missing catch or finally after try"));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    /// Parses `name? (params) { body }` after the `function` keyword.
    fn function_rest(&mut self, require_name: bool) -> Result<Rc<FunctionDef>> {
        let name = match self.peek() {
            Some(Token::Ident(_)) => Some(self.identifier()?),
            _ if require_name => return Err(self.error("expected function name")),
            _ => None,
        };
        let params = self.parameters()?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
        }))
    }

    fn parameters(&mut self) -> Result<Vec<String>> {
        self.expect(Token::LParen, "'(' before parameters")?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            params.push(self.identifier()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, "')' after parameters")?;
                break;
            }
        }
        Ok(params)
    }

    // Expressions

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn is_arrow_ahead(&self) -> bool {
        match self.peek() {
            Some(Token::Ident(_)) => self.peek_at(1) == Some(&Token::Arrow),
            Some(Token::LParen) => {
                let mut depth = 0usize;
                let mut offset = 0;
                while let Some(token) = self.peek_at(offset) {
                    match token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return self.peek_at(offset + 1) == Some(&Token::Arrow);
                            }
                        }
                        _ => {}
                    }
                    offset += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self) -> Result<Expr> {
        let params = if self.check(&Token::LParen) {
            self.parameters()?
        } else {
            vec![self.identifier()?]
        };
        self.expect(Token::Arrow, "'=>'")?;
        let body = if self.check(&Token::LBrace) {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
        })))
    }

    fn assignment(&mut self) -> Result<Expr> {
        if self.is_arrow_ahead() {
            return self.arrow_function();
        }

        let target = self.conditional()?;
        let op = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::PlusAssign) => Some(BinaryOp::Add),
            Some(Token::MinusAssign) => Some(BinaryOp::Sub),
            Some(Token::StarAssign) => Some(BinaryOp::Mul),
            Some(Token::SlashAssign) => Some(BinaryOp::Div),
            Some(Token::PercentAssign) => Some(BinaryOp::Rem),
            _ => return Ok(target),
        };
        if !matches!(
            target,
            Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }
        ) {
            return Err(self.error("invalid assignment target"));
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> Result<Expr> {
        let condition = self.logical(0)?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then_expr = self.assignment()?;
        self.expect(Token::Colon, "':' in conditional expression")?;
        let else_expr = self.assignment()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    /// `??` binds loosest, then `||`, then `&&`.
    fn logical(&mut self, level: u8) -> Result<Expr> {
        let (token, op) = match level {
            0 => (Token::QuestionQuestion, LogicalOp::Nullish),
            1 => (Token::OrOr, LogicalOp::Or),
            2 => (Token::AndAnd, LogicalOp::And),
            _ => return self.equality(),
        };
        let mut left = self.logical(level + 1)?;
        while self.eat(&token) {
            let right = self.logical(level + 1)?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr>,
        ops: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.peek().and_then(ops) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(Self::relational, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::EqEqEq => Some(BinaryOp::StrictEq),
            Token::NotEqEq => Some(BinaryOp::StrictNotEq),
            _ => None,
        })
    }

    fn relational(&mut self) -> Result<Expr> {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Typeof) => UnaryOp::Typeof,
            Some(Token::PlusPlus | Token::MinusMinus) => {
                let increment = self.advance() == Some(Token::PlusPlus);
                let target = self.unary()?;
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let expr = self.call_member()?;
        if matches!(self.peek(), Some(Token::PlusPlus | Token::MinusMinus)) && !self.newline_before()
        {
            let increment = self.advance() == Some(Token::PlusPlus);
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            args.push(self.assignment()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, "')' after arguments")?;
                break;
            }
        }
        Ok(args)
    }

    fn call_member(&mut self) -> Result<Expr> {
        let mut expr = if self.eat(&Token::New) {
            let mut callee = self.primary()?;
            while self.eat(&Token::Dot) {
                let property = self.property_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                };
            }
            let args = if self.check(&Token::LParen) {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                Some(Token::QuestionDot) => {
                    self.pos += 1;
                    expr = match self.peek() {
                        Some(Token::LParen) => Expr::Call {
                            callee: Box::new(expr),
                            args: self.arguments()?,
                            optional: true,
                        },
                        Some(Token::LBracket) => {
                            self.pos += 1;
                            let index = self.expression()?;
                            self.expect(Token::RBracket, "']'")?;
                            Expr::Index {
                                object: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            }
                        }
                        _ => Expr::Member {
                            object: Box::new(expr),
                            property: self.property_name()?,
                            optional: true,
                        },
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    };
                }
                Some(Token::LParen) => {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: false,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("expected expression"));
        };
        let expr = match token {
            Token::Number(n) => Expr::Number(n),
            Token::Str(s) => Expr::Str(s),
            Token::Template(raw) => {
                let parts = self.template_parts(&raw)?;
                self.pos += 1;
                return Ok(Expr::Template(parts));
            }
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::This => Expr::This,
            Token::Ident(name) => Expr::Ident(name),
            Token::LParen => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                return Ok(inner);
            }
            Token::LBracket => return self.array_literal(),
            Token::LBrace => return self.object_literal(),
            Token::Function => {
                self.pos += 1;
                return Ok(Expr::Function(self.function_rest(false)?));
            }
            _ => return Err(self.error("expected expression")),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn array_literal(&mut self) -> Result<Expr> {
        self.expect(Token::LBracket, "'['")?;
        let mut items = Vec::new();
        while !self.eat(&Token::RBracket) {
            items.push(self.assignment()?);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBracket, "']' after array elements")?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> Result<Expr> {
        self.expect(Token::LBrace, "'{'")?;
        let mut props = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.peek().cloned() {
                Some(Token::Str(s)) => {
                    self.pos += 1;
                    s
                }
                Some(Token::Number(n)) => {
                    self.pos += 1;
                    crate::value::format_number(n)
                }
                _ => self.property_name()?,
            };
            let value = if self.eat(&Token::Colon) {
                self.assignment()?
            } else if self.check(&Token::LParen) {
                let params = self.parameters()?;
                let body = self.block()?;
                Expr::Function(Rc::new(FunctionDef {
                    name: Some(key.clone()),
                    params,
                    body: FunctionBody::Block(body),
                    is_arrow: false,
                }))
            } else {
                Expr::Ident(key.clone())
            };
            props.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace, "'}' after object properties")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    fn template_parts(&self, raw: &str) -> Result<Vec<TemplatePart>> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = raw.char_indices().peekable();
        while let Some((i, ch)) = chars.next() {
            match ch {
                '\\' => {
                    text.push(ch);
                    if let Some((_, escaped)) = chars.next() {
                        text.push(escaped);
                    }
                }
                '$' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                    chars.next();
                    let start = i + 2;
                    let mut depth = 1usize;
                    let mut end = None;
                    for (j, c) in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    end = Some(j);
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    let Some(end) = end else {
                        return Err(self.error("unterminated template expression"));
                    };
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(self.unescape_template(&text)?));
                        text.clear();
                    }
                    parts.push(TemplatePart::Expr(parse_embedded_expression(
                        &raw[start..end],
                    )?));
                }
                _ => text.push(ch),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(self.unescape_template(&text)?));
        }
        Ok(parts)
    }

    fn unescape_template(&self, text: &str) -> Result<String> {
        unescape(text).ok_or_else(|| self.error("invalid escape sequence in template"))
    }
}
