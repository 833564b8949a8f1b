//! Recursive-descent parser producing a `Module`

use std::sync::Arc;

use super::ast::*;
use super::lexer::{tokenize, Kw, Sym, Tok, Token};
use crate::error::ScriptError;

/// Deepest nesting of blocks and sub-expressions accepted
pub const MAX_NESTING: usize = 64;

/// Parse a complete source text
pub fn parse(source: &str) -> Result<Module, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        body.extend(parser.statement()?);
    }
    Ok(Module { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    // ========================================================================
    // TOKEN HELPERS
    // ========================================================================

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_next(&self) -> &Tok {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_sym(&self, sym: Sym) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn at_kw(&self, kw: Kw) -> bool {
        matches!(self.peek(), Tok::Kw(k) if *k == kw)
    }

    fn eat_sym(&mut self, sym: Sym) -> bool {
        if self.at_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    /// Run one level of nested parsing, failing past `MAX_NESTING`
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("too many nested blocks or expressions"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self, wanted: &str) -> ScriptError {
        match self.peek() {
            Tok::Kw(Kw::Unsupported(word)) => self.error(format!("'{}' is not supported", word)),
            other => self.error(format!("expected {}, found {:?}", wanted, other)),
        }
    }

    fn expect_sym(&mut self, sym: Sym, wanted: &str) -> Result<(), ScriptError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(wanted))
        }
    }

    fn expect_kw(&mut self, kw: Kw, wanted: &str) -> Result<(), ScriptError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(wanted))
        }
    }

    fn expect_name(&mut self) -> Result<String, ScriptError> {
        match self.peek().clone() {
            Tok::Name(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn dotted_name(&mut self) -> Result<String, ScriptError> {
        let mut name = self.expect_name()?;
        while self.eat_sym(Sym::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn statement(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Kw(Kw::Def) => self.def()?,
            Tok::Kw(Kw::If) => self.if_stmt()?,
            Tok::Kw(Kw::While) => self.while_stmt()?,
            Tok::Kw(Kw::For) => self.for_stmt()?,
            Tok::Kw(Kw::Try) => self.try_stmt()?,
            Tok::Sym(Sym::At) => return Err(self.error("decorators are not supported")),
            Tok::Indent => return Err(self.error("unexpected indent")),
            _ => return self.simple_statements(),
        };
        Ok(vec![Stmt { kind, line }])
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = vec![self.small_statement()?];
        while self.eat_sym(Sym::Semicolon) {
            if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                break;
            }
            stmts.push(self.small_statement()?);
        }
        if !self.at(&Tok::Eof) && self.advance() != Tok::Newline {
            self.pos -= 1;
            return Err(self.unexpected("end of line"));
        }
        Ok(stmts)
    }

    fn small_statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Kw(Kw::Pass) => {
                self.pos += 1;
                StmtKind::Pass
            }
            Tok::Kw(Kw::Break) => {
                self.pos += 1;
                StmtKind::Break
            }
            Tok::Kw(Kw::Continue) => {
                self.pos += 1;
                StmtKind::Continue
            }
            Tok::Kw(Kw::Return) => {
                self.pos += 1;
                if self.at(&Tok::Newline) || self.at_sym(Sym::Semicolon) || self.at(&Tok::Eof) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expr_list()?))
                }
            }
            Tok::Kw(Kw::Import) => {
                self.pos += 1;
                let mut names = Vec::new();
                loop {
                    let module = self.dotted_name()?;
                    let alias = if self.eat_kw(Kw::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push((module, alias));
                    if !self.eat_sym(Sym::Comma) {
                        break;
                    }
                }
                StmtKind::Import(names)
            }
            Tok::Kw(Kw::From) => {
                self.pos += 1;
                let module = self.dotted_name()?;
                self.expect_kw(Kw::Import, "'import'")?;
                let mut names = Vec::new();
                if !self.eat_sym(Sym::Star) {
                    let parens = self.eat_sym(Sym::LParen);
                    loop {
                        let name = self.expect_name()?;
                        let alias = if self.eat_kw(Kw::As) {
                            Some(self.expect_name()?)
                        } else {
                            None
                        };
                        names.push((name, alias));
                        if !self.eat_sym(Sym::Comma) {
                            break;
                        }
                        if parens && self.at_sym(Sym::RParen) {
                            break;
                        }
                    }
                    if parens {
                        self.expect_sym(Sym::RParen, "')'")?;
                    }
                }
                StmtKind::FromImport { module, names }
            }
            Tok::Kw(Kw::Global) => {
                self.pos += 1;
                let mut names = vec![self.expect_name()?];
                while self.eat_sym(Sym::Comma) {
                    names.push(self.expect_name()?);
                }
                StmtKind::Global(names)
            }
            Tok::Kw(Kw::Unsupported(word)) => {
                return Err(self.error(format!("'{}' is not supported", word)))
            }
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn expression_statement(&mut self) -> Result<StmtKind, ScriptError> {
        let first = self.expr_list()?;

        let aug = match self.peek() {
            Tok::Sym(Sym::PlusEq) => Some(BinOp::Add),
            Tok::Sym(Sym::MinusEq) => Some(BinOp::Sub),
            Tok::Sym(Sym::StarEq) => Some(BinOp::Mul),
            Tok::Sym(Sym::SlashEq) => Some(BinOp::Div),
            Tok::Sym(Sym::DoubleSlashEq) => Some(BinOp::FloorDiv),
            Tok::Sym(Sym::PercentEq) => Some(BinOp::Mod),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error("illegal target for augmented assignment"));
            }
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        // Annotated assignment: `x: float = 0.0`
        if self.eat_sym(Sym::Colon) {
            let target = self.to_target(first)?;
            self.expr()?;
            if self.eat_sym(Sym::Assign) {
                let value = self.expr_list()?;
                return Ok(StmtKind::Assign {
                    targets: vec![target],
                    value,
                });
            }
            return Ok(StmtKind::Pass);
        }

        if !self.at_sym(Sym::Assign) {
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat_sym(Sym::Assign) {
            exprs.push(self.expr_list()?);
        }
        let value = exprs.pop().ok_or_else(|| self.error("missing assignment value"))?;
        let targets = exprs
            .into_iter()
            .map(|e| self.to_target(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StmtKind::Assign { targets, value })
    }

    fn to_target(&self, expr: Expr) -> Result<Target, ScriptError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript(obj, index) => Ok(Target::Subscript(*obj, *index)),
            Expr::Attribute(obj, attr) => Ok(Target::Attribute(*obj, attr)),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_sym(Sym::Colon, "':'")?;
        if !self.at(&Tok::Newline) {
            return self.simple_statements();
        }
        self.pos += 1;
        if !self.at(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.pos += 1;

        self.nested(|p| {
            let mut body = Vec::new();
            while !p.at(&Tok::Dedent) && !p.at(&Tok::Eof) {
                body.extend(p.statement()?);
            }
            p.eat_dedent();
            Ok(body)
        })
    }

    fn eat_dedent(&mut self) {
        if self.at(&Tok::Dedent) {
            self.pos += 1;
        }
    }

    fn def(&mut self) -> Result<StmtKind, ScriptError> {
        let line = self.line();
        self.pos += 1;
        let name = self.expect_name()?;
        self.expect_sym(Sym::LParen, "'('")?;

        let mut params = Vec::new();
        while !self.at_sym(Sym::RParen) {
            if self.at_sym(Sym::Star) || self.at_sym(Sym::DoubleStar) {
                return Err(self.error("variadic parameters are not supported"));
            }
            let param = self.expect_name()?;
            if self.eat_sym(Sym::Colon) {
                self.expr()?;
            }
            let default = if self.eat_sym(Sym::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p: &Param| p.default.is_some()) {
                return Err(self.error("non-default parameter follows default parameter"));
            }
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat_sym(Sym::Comma) {
                break;
            }
        }
        self.expect_sym(Sym::RParen, "')'")?;

        if self.eat_sym(Sym::Arrow) {
            self.expr()?;
        }

        let body = self.block()?;
        let mut globals = Vec::new();
        collect_globals(&body, &mut globals);

        Ok(StmtKind::Def(Arc::new(FunctionDef {
            name,
            params,
            body,
            globals,
            line,
        })))
    }

    fn if_stmt(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let mut branches = vec![(self.expr()?, self.block()?)];
        let mut orelse = Vec::new();
        loop {
            if self.eat_kw(Kw::Elif) {
                branches.push((self.expr()?, self.block()?));
            } else if self.eat_kw(Kw::Else) {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let cond = self.expr()?;
        let body = self.block()?;
        if self.at_kw(Kw::Else) {
            return Err(self.error("'while ... else' is not supported"));
        }
        Ok(StmtKind::While { cond, body })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let target = self.target_list()?;
        self.expect_kw(Kw::In, "'in'")?;
        let iter = self.expr_list()?;
        let body = self.block()?;
        if self.at_kw(Kw::Else) {
            return Err(self.error("'for ... else' is not supported"));
        }
        Ok(StmtKind::For { target, iter, body })
    }

    fn try_stmt(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let body = self.block()?;

        let mut handler = None;
        while self.eat_kw(Kw::Except) {
            let mut alias = None;
            if !self.at_sym(Sym::Colon) {
                self.expr()?;
                if self.eat_kw(Kw::As) {
                    alias = Some(self.expect_name()?);
                }
            }
            let handler_body = self.block()?;
            // Every clause catches everything, so only the first can run
            if handler.is_none() {
                handler = Some(Handler {
                    alias,
                    body: handler_body,
                });
            }
        }

        let orelse = if handler.is_some() && self.eat_kw(Kw::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        let finally = if self.eat_kw(Kw::Finally) {
            self.block()?
        } else {
            Vec::new()
        };

        if handler.is_none() && finally.is_empty() {
            return Err(self.error("'try' requires 'except' or 'finally'"));
        }
        Ok(StmtKind::Try {
            body,
            handler,
            orelse,
            finally,
        })
    }

    /// Assignment targets for `for` loops and comprehensions.
    ///
    /// Parsed from postfix expressions so that `in` is not consumed as an
    /// operator.
    fn target_list(&mut self) -> Result<Target, ScriptError> {
        let first = self.postfix()?;
        if !self.at_sym(Sym::Comma) {
            return self.to_target(first);
        }
        let mut items = vec![first];
        while self.eat_sym(Sym::Comma) {
            if self.at_kw(Kw::In) {
                break;
            }
            items.push(self.postfix()?);
        }
        self.to_target(Expr::Tuple(items))
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    /// Comma-separated expressions; more than one (or a trailing comma) builds a tuple
    fn expr_list(&mut self) -> Result<Expr, ScriptError> {
        let first = self.expr()?;
        if !self.at_sym(Sym::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_sym(Sym::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Newline
                | Tok::Eof
                | Tok::Sym(Sym::Assign)
                | Tok::Sym(Sym::RParen)
                | Tok::Sym(Sym::RBracket)
                | Tok::Sym(Sym::Semicolon)
                | Tok::Sym(Sym::Colon)
        )
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let body = self.or_test()?;
        if !self.eat_kw(Kw::If) {
            return Ok(body);
        }
        let cond = self.or_test()?;
        self.expect_kw(Kw::Else, "'else'")?;
        let orelse = self.expr()?;
        Ok(Expr::IfExp {
            cond: Box::new(cond),
            then: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_test(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_test()?;
        while self.eat_kw(Kw::Or) {
            let right = self.and_test()?;
            left = Expr::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_test()?;
        while self.eat_kw(Kw::And) {
            let right = self.not_test()?;
            left = Expr::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_kw(Kw::Not) {
            let operand = self.nested(Self::not_test)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let left = self.arith()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::EqEq) => CmpOp::Eq,
                Tok::Sym(Sym::NotEq) => CmpOp::NotEq,
                Tok::Sym(Sym::Lt) => CmpOp::Lt,
                Tok::Sym(Sym::Le) => CmpOp::Le,
                Tok::Sym(Sym::Gt) => CmpOp::Gt,
                Tok::Sym(Sym::Ge) => CmpOp::Ge,
                Tok::Kw(Kw::In) => CmpOp::In,
                Tok::Kw(Kw::Not) if matches!(self.peek_next(), Tok::Kw(Kw::In)) => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Tok::Kw(Kw::Is) => {
                    if matches!(self.peek_next(), Tok::Kw(Kw::Not)) {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.pos += 1;
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), ops))
        }
    }

    fn arith(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::Plus) => BinOp::Add,
                Tok::Sym(Sym::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Sym(Sym::Star) => BinOp::Mul,
                Tok::Sym(Sym::Slash) => BinOp::Div,
                Tok::Sym(Sym::DoubleSlash) => BinOp::FloorDiv,
                Tok::Sym(Sym::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Tok::Sym(Sym::Minus) => UnaryOp::Neg,
            Tok::Sym(Sym::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.nested(Self::factor)?;
        // Fold negative literals
        match (op, operand) {
            (UnaryOp::Neg, Expr::Int(v)) => Ok(Expr::Int(-v)),
            (UnaryOp::Neg, Expr::Float(v)) => Ok(Expr::Float(-v)),
            (op, operand) => Ok(Expr::Unary(op, Box::new(operand))),
        }
    }

    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.postfix()?;
        if self.eat_sym(Sym::DoubleStar) {
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_sym(Sym::LParen) {
                expr = self.call(expr)?;
            } else if self.eat_sym(Sym::LBracket) {
                let index = self.subscript()?;
                self.expect_sym(Sym::RBracket, "']'")?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else if self.eat_sym(Sym::Dot) {
                let attr = self.expect_name()?;
                expr = Expr::Attribute(Box::new(expr), attr);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call(&mut self, func: Expr) -> Result<Expr, ScriptError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.at_sym(Sym::RParen) {
            if self.at_sym(Sym::Star) || self.at_sym(Sym::DoubleStar) {
                return Err(self.error("argument unpacking is not supported"));
            }
            let is_keyword = matches!(self.peek(), Tok::Name(_))
                && matches!(self.peek_next(), Tok::Sym(Sym::Assign));
            if is_keyword {
                let name = self.expect_name()?;
                self.pos += 1;
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.at_kw(Kw::For) {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::ListComp {
                        elt: Box::new(arg),
                        generators,
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_sym(Sym::Comma) {
                break;
            }
        }
        self.expect_sym(Sym::RParen, "')'")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> Result<Expr, ScriptError> {
        let start = if self.at_sym(Sym::Colon) {
            None
        } else {
            let first = self.expr_list()?;
            if !self.at_sym(Sym::Colon) {
                return Ok(first);
            }
            Some(Box::new(first))
        };
        self.expect_sym(Sym::Colon, "':'")?;

        let stop = if self.at_sym(Sym::Colon) || self.at_sym(Sym::RBracket) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat_sym(Sym::Colon) && !self.at_sym(Sym::RBracket) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice(start, stop, step))
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, ScriptError> {
        let mut generators = Vec::new();
        while self.eat_kw(Kw::For) {
            let target = self.target_list()?;
            self.expect_kw(Kw::In, "'in'")?;
            let iter = self.or_test()?;
            let mut conds = Vec::new();
            while self.eat_kw(Kw::If) {
                conds.push(self.or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conds,
            });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Tok::Name(name) => Ok(Expr::Name(name)),
            Tok::Int(v) => Ok(Expr::Int(v)),
            Tok::Float(v) => Ok(Expr::Float(v)),
            Tok::Str(s) => {
                let mut text = s;
                while let Tok::Str(more) = self.peek().clone() {
                    self.pos += 1;
                    text.push_str(&more);
                }
                Ok(Expr::Str(Arc::from(text)))
            }
            Tok::Kw(Kw::True) => Ok(Expr::Bool(true)),
            Tok::Kw(Kw::False) => Ok(Expr::Bool(false)),
            Tok::Kw(Kw::None) => Ok(Expr::None),
            Tok::Sym(Sym::LParen) => {
                if self.eat_sym(Sym::RParen) {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.expr()?;
                if self.at_kw(Kw::For) {
                    let generators = self.comprehension_clauses()?;
                    self.expect_sym(Sym::RParen, "')'")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                if self.eat_sym(Sym::RParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_sym(Sym::Comma) {
                    if self.at_sym(Sym::RParen) {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect_sym(Sym::RParen, "')'")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Sym(Sym::LBracket) => {
                if self.eat_sym(Sym::RBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expr()?;
                if self.at_kw(Kw::For) {
                    let generators = self.comprehension_clauses()?;
                    self.expect_sym(Sym::RBracket, "']'")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_sym(Sym::Comma) {
                    if self.at_sym(Sym::RBracket) {
                        break;
                    }
                    items.push(self.expr()?);
                }
                self.expect_sym(Sym::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Tok::Sym(Sym::LBrace) => {
                if self.eat_sym(Sym::RBrace) {
                    return Ok(Expr::Dict(Vec::new()));
                }
                let key = self.expr()?;
                if !self.eat_sym(Sym::Colon) {
                    return Err(self.error("set literals are not supported"));
                }
                let value = self.expr()?;
                if self.at_kw(Kw::For) {
                    let generators = self.comprehension_clauses()?;
                    self.expect_sym(Sym::RBrace, "'}'")?;
                    return Ok(Expr::DictComp {
                        key: Box::new(key),
                        value: Box::new(value),
                        generators,
                    });
                }
                let mut entries = vec![(key, value)];
                while self.eat_sym(Sym::Comma) {
                    if self.at_sym(Sym::RBrace) {
                        break;
                    }
                    let k = self.expr()?;
                    self.expect_sym(Sym::Colon, "':'")?;
                    entries.push((k, self.expr()?));
                }
                self.expect_sym(Sym::RBrace, "'}'")?;
                Ok(Expr::Dict(entries))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("an expression"))
            }
        }
    }
}

fn collect_globals(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Global(names) => {
                for name in names {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
            }
            StmtKind::If { branches, orelse } => {
                for (_, block) in branches {
                    collect_globals(block, out);
                }
                collect_globals(orelse, out);
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => collect_globals(body, out),
            StmtKind::Try {
                body,
                handler,
                orelse,
                finally,
            } => {
                collect_globals(body, out);
                if let Some(h) = handler {
                    collect_globals(&h.body, out);
                }
                collect_globals(orelse, out);
                collect_globals(finally, out);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        parse(source).unwrap_or_else(|e| panic!("parse failed: {}", e))
    }

    #[test]
    fn test_parse_act_function() {
        let module = parse_ok("def act(state):\n    return 1\n");
        assert_eq!(module.body.len(), 1);
        match &module.body[0].kind {
            StmtKind::Def(def) => {
                assert_eq!(def.name, "act");
                assert_eq!(def.params.len(), 1);
                assert_eq!(def.body.len(), 1);
            }
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_annotations_are_accepted() {
        let module = parse_ok("def act(state: list) -> int:\n    x: int = 3\n    return x\n");
        let StmtKind::Def(def) = &module.body[0].kind else {
            panic!("expected def");
        };
        assert!(matches!(def.body[0].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn test_precedence() {
        let module = parse_ok("x = 1 + 2 * 3 ** 2\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assign");
        };
        match value {
            Expr::Binary(BinOp::Add, _, right) => {
                assert!(matches!(**right, Expr::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_chained_comparison_and_not_in() {
        let module = parse_ok("ok = 0 < x <= 5 and y not in z\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected assign");
        };
        let Expr::BoolOp(BoolOp::And, left, right) = value else {
            panic!("expected and");
        };
        assert!(matches!(&**left, Expr::Compare(_, ops) if ops.len() == 2));
        assert!(matches!(&**right, Expr::Compare(_, ops) if ops[0].0 == CmpOp::NotIn));
    }

    #[test]
    fn test_for_with_tuple_target() {
        let module = parse_ok("for i, v in enumerate(xs):\n    pass\n");
        let StmtKind::For { target, .. } = &module.body[0].kind else {
            panic!("expected for");
        };
        assert!(matches!(target, Target::Tuple(t) if t.len() == 2));
    }

    #[test]
    fn test_comprehensions_and_generators() {
        parse_ok("a = [x * 2 for x in xs if x > 0]\n");
        parse_ok("b = sum(x for x in xs)\n");
        parse_ok("c = {k: v for k, v in pairs}\n");
    }

    #[test]
    fn test_if_elif_else_and_try() {
        parse_ok(
            "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n\
             try:\n    y = 1 / 0\nexcept ZeroDivisionError as e:\n    y = 0\nfinally:\n    pass\n",
        );
    }

    #[test]
    fn test_function_globals_collected() {
        let module = parse_ok("n = 0\ndef act(s):\n    global n\n    n += 1\n    return 0\n");
        let StmtKind::Def(def) = &module.body[1].kind else {
            panic!("expected def");
        };
        assert_eq!(def.globals, vec!["n".to_string()]);
    }

    #[test]
    fn test_imports() {
        let module = parse_ok("import math, random as r\nfrom math import sqrt, pi\nfrom math import *\n");
        assert!(matches!(&module.body[0].kind, StmtKind::Import(names) if names.len() == 2));
        assert!(matches!(&module.body[2].kind, StmtKind::FromImport { names, .. } if names.is_empty()));
    }

    #[test]
    fn test_unsupported_constructs() {
        for source in [
            "class A:\n    pass\n",
            "f = lambda x: x\n",
            "with open('x') as f:\n    pass\n",
            "@decorator\ndef act(s):\n    return 0\n",
            "s = {1, 2}\n",
        ] {
            assert!(
                matches!(parse(source), Err(ScriptError::Syntax { .. })),
                "should reject {:?}",
                source
            );
        }
    }

    #[test]
    fn test_syntax_error_line_number() {
        let err = parse("x = 1\ny = (2 +\n").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));
        let err = parse("def act(s)\n    return 0\n").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let deep = format!("x = {}0{}\n", "(".repeat(19_000), ")".repeat(19_000));
        assert!(matches!(parse(&deep), Err(ScriptError::Syntax { line: 1, .. })));
        let negations = format!("x = {}1\n", "-".repeat(5_000));
        assert!(matches!(parse(&negations), Err(ScriptError::Syntax { .. })));
        let nots = format!("x = {}True\n", "not ".repeat(5_000));
        assert!(matches!(parse(&nots), Err(ScriptError::Syntax { .. })));

        let mut blocks = String::new();
        for level in 0..MAX_NESTING + 1 {
            blocks.push_str(&format!("{}if x:\n", "  ".repeat(level)));
        }
        blocks.push_str(&format!("{}pass\n", "  ".repeat(MAX_NESTING + 1)));
        assert!(matches!(parse(&blocks), Err(ScriptError::Syntax { .. })));
    }

    #[test]
    fn test_moderate_nesting_accepted() {
        parse_ok(&format!("x = {}0{}\n", "(".repeat(20), ")".repeat(20)));
        parse_ok("x = - - 1\ny = not not True\nz = 2 ** 3 ** 2\n");
    }

    #[test]
    fn test_one_line_blocks() {
        parse_ok("def act(s): return 0\n");
        parse_ok("if x: y = 1; z = 2\n");
    }
}
