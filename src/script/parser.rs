//! Recursive-descent parser producing a [`Program`].
//!
//! Parsing is all-or-nothing: the first problem aborts with a [`SyntaxError`]
//! and no partial tree is returned.

use std::rc::Rc;

use crate::error::SyntaxError;
use crate::script::ast::*;
use crate::script::lexer::{tokenize, Token, TokenKind};

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Keywords that belong to the full language but not to the sandbox subset.
const UNSUPPORTED: &[&str] = &[
    "async", "await", "class", "global", "nonlocal", "raise", "try", "with", "yield",
];

/// Deepest nesting of expressions and blocks a script may use.
pub const MAX_NESTING: usize = 100;

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Parse script source into a syntax tree.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        loop_depth: 0,
        in_function: false,
        nesting: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    in_function: bool,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error_here<T>(&self, message: impl Into<String>) -> Result<T, SyntaxError> {
        let token = self.peek();
        Err(SyntaxError::new(message, token.line, token.column))
    }

    /// Run `parse` one nesting level deeper; the recursion depth of the
    /// parser and of everything walking the tree is bounded by this.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        self.check_nesting(1)?;
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    /// Left-associative chains deepen the tree without recursing here.
    fn check_nesting(&self, extra: usize) -> Result<(), SyntaxError> {
        if self.nesting + extra > MAX_NESTING {
            return self.error_here("too many nested expressions");
        }
        Ok(())
    }

    fn invalid_syntax<T>(&self) -> Result<T, SyntaxError> {
        let message = match &self.peek().kind {
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "unexpected unindent".to_string(),
            TokenKind::Eof => "unexpected end of input".to_string(),
            TokenKind::Newline => "invalid syntax".to_string(),
            TokenKind::Name(name) if UNSUPPORTED.contains(&name.as_str()) => {
                format!("'{name}' is not supported in sandboxed scripts")
            }
            _ => "invalid syntax".to_string(),
        };
        self.error_here(message)
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SyntaxError> {
        if self.eat_op(op) {
            Ok(())
        } else if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
            self.error_here(format!("expected '{op}'"))
        } else {
            self.invalid_syntax()
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), SyntaxError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            self.error_here(format!("expected '{kw}'"))
        }
    }

    fn identifier(&mut self) -> Result<String, SyntaxError> {
        match &self.peek().kind {
            TokenKind::Name(name) if !is_keyword(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.invalid_syntax(),
        }
    }

    fn peek_name(&self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Name(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn at_newline(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof)
    }

    // ---- statements ----

    fn program(mut self) -> Result<Program, SyntaxError> {
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => self.statement(&mut body)?,
            }
        }
        Ok(Program { body })
    }

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        let line = self.peek().line;
        if self.at_op("@") {
            return self.error_here("decorators are not supported in sandboxed scripts");
        }
        let kind = match self.peek_name().as_deref() {
            Some("if") => Some(self.if_stmt()?),
            Some("for") => Some(self.for_stmt()?),
            Some("while") => Some(self.while_stmt()?),
            Some("def") => Some(self.def_stmt()?),
            _ => None,
        };
        match kind {
            Some(kind) => out.push(Stmt { kind, line }),
            None => self.simple_statements(out)?,
        }
        Ok(())
    }

    fn simple_statements(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        loop {
            let line = self.peek().line;
            let kind = self.small_statement()?;
            out.push(Stmt { kind, line });
            if !self.eat_op(";") || self.at_newline() {
                break;
            }
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => self.invalid_syntax(),
        }
    }

    fn small_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        if let Some(kw) = self.peek_name() {
            match kw.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(StmtKind::Pass);
                }
                "break" => {
                    if self.loop_depth == 0 {
                        return self.error_here("'break' outside loop");
                    }
                    self.advance();
                    return Ok(StmtKind::Break);
                }
                "continue" => {
                    if self.loop_depth == 0 {
                        return self.error_here("'continue' not properly in loop");
                    }
                    self.advance();
                    return Ok(StmtKind::Continue);
                }
                "return" => {
                    if !self.in_function {
                        return self.error_here("'return' outside function");
                    }
                    self.advance();
                    if self.at_newline() || self.at_op(";") {
                        return Ok(StmtKind::Return(None));
                    }
                    return Ok(StmtKind::Return(Some(self.testlist()?)));
                }
                "import" => return self.import_stmt(),
                "from" => return self.from_stmt(),
                "del" => {
                    self.advance();
                    let mut targets = vec![self.expr()?];
                    while self.eat_op(",") {
                        if self.at_newline() {
                            break;
                        }
                        targets.push(self.expr()?);
                    }
                    for target in &targets {
                        if !matches!(target, Expr::Name(_) | Expr::Subscript { .. }) {
                            return self.error_here("cannot delete expression");
                        }
                    }
                    return Ok(StmtKind::Delete(targets));
                }
                "assert" => {
                    self.advance();
                    let test = self.test()?;
                    let msg = if self.eat_op(",") { Some(self.test()?) } else { None };
                    return Ok(StmtKind::Assert { test, msg });
                }
                _ => {}
            }
        }
        self.expr_statement()
    }

    fn expr_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        let first = self.testlist()?;

        if let TokenKind::Op(op) = self.peek().kind {
            let aug = match op {
                "+=" => Some(BinOp::Add),
                "-=" => Some(BinOp::Sub),
                "*=" => Some(BinOp::Mul),
                "/=" => Some(BinOp::Div),
                "//=" => Some(BinOp::FloorDiv),
                "%=" => Some(BinOp::Mod),
                "**=" => Some(BinOp::Pow),
                _ => None,
            };
            if let Some(op) = aug {
                if !matches!(first, Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }) {
                    return self.error_here("illegal expression for augmented assignment");
                }
                self.advance();
                let value = self.testlist()?;
                return Ok(StmtKind::AugAssign {
                    target: first,
                    op,
                    value,
                });
            }
        }

        if !self.at_op("=") {
            return Ok(StmtKind::Expr(first));
        }

        let mut targets = vec![first];
        while self.eat_op("=") {
            targets.push(self.testlist()?);
        }
        let value = targets.pop().unwrap_or(Expr::Constant(Constant::None));
        for target in &targets {
            self.check_target(target)?;
        }
        Ok(StmtKind::Assign { targets, value })
    }

    fn check_target(&self, target: &Expr) -> Result<(), SyntaxError> {
        match target {
            Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => Ok(()),
            Expr::Tuple(items) | Expr::List(items) => {
                items.iter().try_for_each(|item| self.check_target(item))
            }
            Expr::Call { .. } => self.error_here("cannot assign to function call"),
            Expr::Constant(_) => self.error_here("cannot assign to literal"),
            _ => self.error_here("cannot assign to expression"),
        }
    }

    fn dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn import_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_keyword("import")?;
        let mut names = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let asname = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn from_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_keyword("from")?;
        let mut level = 0;
        while self.at_op(".") {
            self.advance();
            level += 1;
        }
        let module = if self.at_keyword("import") {
            if level == 0 {
                return self.invalid_syntax();
            }
            None
        } else {
            Some(self.dotted_name()?)
        };
        self.expect_keyword("import")?;

        if self.eat_op("*") {
            return self.error_here("wildcard imports are not supported in sandboxed scripts");
        }
        let parenthesized = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            let name = self.identifier()?;
            let asname = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.at_op(")") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            level,
            names,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.nested(Self::suite)
    }

    fn suite(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect_op(":")?;
        let mut body = Vec::new();
        if !matches!(self.peek().kind, TokenKind::Newline) {
            self.simple_statements(&mut body)?;
            return Ok(body);
        }
        self.advance();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return self.error_here("expected an indented block");
        }
        self.advance();
        while !matches!(self.peek().kind, TokenKind::Dedent | TokenKind::Eof) {
            self.statement(&mut body)?;
        }
        if matches!(self.peek().kind, TokenKind::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.loop_depth += 1;
        let body = self.block();
        self.loop_depth -= 1;
        body
    }

    fn if_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let test = self.test()?;
        let body = self.block()?;
        let orelse = if self.at_keyword("elif") {
            let line = self.peek().line;
            let kind = self.if_stmt()?;
            vec![Stmt { kind, line }]
        } else if self.eat_keyword("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.testlist()?;
        let body = self.loop_body()?;
        if self.at_keyword("else") {
            return self.error_here("'for ... else' is not supported in sandboxed scripts");
        }
        Ok(StmtKind::For { target, iter, body })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let test = self.test()?;
        let body = self.loop_body()?;
        if self.at_keyword("else") {
            return self.error_here("'while ... else' is not supported in sandboxed scripts");
        }
        Ok(StmtKind::While { test, body })
    }

    fn def_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let name = self.identifier()?;
        self.expect_op("(")?;
        let params = self.parameters(")")?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.test()?;
        }
        let saved = (self.loop_depth, self.in_function);
        self.loop_depth = 0;
        self.in_function = true;
        let body = self.block();
        (self.loop_depth, self.in_function) = saved;
        let body = body?;
        Ok(StmtKind::FunctionDef(Rc::new(FunctionDef { name, params, body })))
    }

    fn parameters(&mut self, close: &str) -> Result<Vec<Param>, SyntaxError> {
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(close) {
            if self.at_op("*") || self.at_op("**") {
                return self.error_here("star parameters are not supported in sandboxed scripts");
            }
            let name = self.identifier()?;
            if params.iter().any(|p| p.name == name) {
                return self.error_here(format!("duplicate argument '{name}' in function definition"));
            }
            if close == ")" && self.eat_op(":") {
                self.test()?;
            }
            let default = if self.eat_op("=") {
                Some(self.test()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return self.error_here("non-default argument follows default argument");
                }
                None
            };
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    // ---- expressions ----

    /// `a, b, c` with an optional trailing comma; a bare comma list becomes a tuple.
    fn testlist(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.test()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Newline | TokenKind::Eof => true,
            TokenKind::Op(op) => matches!(*op, "=" | ")" | "]" | "}" | ":" | ";"),
            TokenKind::Name(kw) => kw == "in",
            _ => false,
        }
    }

    /// Loop targets: stops before `in`.
    fn target_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.expr()?;
        let target = if self.at_op(",") {
            let mut items = vec![first];
            while self.eat_op(",") {
                if self.at_keyword("in") {
                    break;
                }
                items.push(self.expr()?);
            }
            Expr::Tuple(items)
        } else {
            first
        };
        self.check_target(&target)?;
        Ok(target)
    }

    fn test(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if self.eat_keyword("if") {
            let test = self.or_test()?;
            self.expect_keyword("else")?;
            let orelse = self.test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn test_no_cond(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        self.or_test()
    }

    fn lambda(&mut self) -> Result<Expr, SyntaxError> {
        self.advance();
        let params = self.parameters(":")?;
        self.expect_op(":")?;
        let body = self.test()?;
        Ok(Expr::Lambda(Rc::new(Lambda { params, body })))
    }

    fn or_test(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.and_test()?;
        if !self.at_keyword("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("or") {
            values.push(self.and_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn and_test(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.not_test()?;
        if !self.at_keyword("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword("and") {
            values.push(self.not_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn not_test(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::not_test)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let kind = self.peek().kind.clone();
        let op = match &kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(kw) if kw == "in" => CmpOp::In,
            TokenKind::Name(kw) if kw == "is" => {
                self.advance();
                return Some(if self.eat_keyword("not") {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            TokenKind::Name(kw)
                if kw == "not"
                    && matches!(self.peek_kind_at(1), Some(TokenKind::Name(n)) if n == "in") =>
            {
                self.advance();
                self.advance();
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.expr()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.expr()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    /// Arithmetic expression: everything that binds tighter than comparisons.
    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.at_op("|") || self.at_op("&") || self.at_op("^") || self.at_op("~") {
            return self.error_here("bitwise operators are not supported in sandboxed scripts");
        }
        let mut left = self.term()?;
        let mut chain = 0;
        loop {
            let op = if self.at_op("+") {
                BinOp::Add
            } else if self.at_op("-") {
                BinOp::Sub
            } else if self.at_op("|") || self.at_op("&") || self.at_op("^") {
                return self.error_here("bitwise operators are not supported in sandboxed scripts");
            } else {
                break;
            };
            self.advance();
            chain += 1;
            self.check_nesting(chain)?;
            let right = self.term()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.factor()?;
        let mut chain = 0;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Op("*") => BinOp::Mul,
                TokenKind::Op("/") => BinOp::Div,
                TokenKind::Op("//") => BinOp::FloorDiv,
                TokenKind::Op("%") => BinOp::Mod,
                TokenKind::Op("@") => {
                    return self.error_here("matrix multiplication is not supported in sandboxed scripts")
                }
                _ => break,
            };
            self.advance();
            chain += 1;
            self.check_nesting(chain)?;
            let right = self.factor()?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match &self.peek().kind {
            TokenKind::Op("-") => Some(UnaryOp::Neg),
            TokenKind::Op("+") => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(Self::factor)?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.primary()?;
        if self.eat_op("**") {
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        let mut chain = 0;
        loop {
            if self.at_op(".") || self.at_op("(") || self.at_op("[") {
                chain += 1;
                self.check_nesting(chain)?;
            }
            if self.eat_op(".") {
                let attr = self.identifier()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("(") {
                let (args, keywords) = self.call_arguments()?;
                self.expect_op(")")?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.eat_op("[") {
                let index = self.subscript_list()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), SyntaxError> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return self.error_here("star arguments are not supported in sandboxed scripts");
            }
            let is_keyword_arg = matches!(&self.peek().kind, TokenKind::Name(n) if !is_keyword(n))
                && matches!(self.peek_kind_at(1), Some(TokenKind::Op("=")));
            if is_keyword_arg {
                let name = self.identifier()?;
                self.advance();
                if keywords.iter().any(|k| k.name == name) {
                    return self.error_here(format!("keyword argument repeated: {name}"));
                }
                let value = self.test()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return self.error_here("positional argument follows keyword argument");
                }
                let value = self.test()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    args.push(Expr::ListComp {
                        elt: Box::new(value),
                        generators,
                    });
                    if !self.at_op(")") {
                        return self.error_here("Generator expression must be parenthesized");
                    }
                    break;
                }
                args.push(value);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn subscript_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.subscript()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript(&mut self) -> Result<Expr, SyntaxError> {
        let lower = if self.at_op(":") {
            None
        } else {
            let value = self.test()?;
            if !self.at_op(":") {
                return Ok(value);
            }
            Some(Box::new(value))
        };
        self.expect_op(":")?;
        let upper = if self.at_op(":") || self.at_op("]") || self.at_op(",") {
            None
        } else {
            Some(Box::new(self.test()?))
        };
        let step = if self.eat_op(":") && !self.at_op("]") && !self.at_op(",") {
            Some(Box::new(self.test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, SyntaxError> {
        let mut generators = Vec::new();
        while self.eat_keyword("for") {
            let target = self.target_list()?;
            self.expect_keyword("in")?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat_keyword("if") {
                ifs.push(self.test_no_cond()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::Constant(Constant::Int(v)))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::Constant(Constant::Float(v)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Constant(Constant::Str(s)))
            }
            TokenKind::Name(name) => match name.as_str() {
                "None" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::None))
                }
                "True" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::Bool(true)))
                }
                "False" => {
                    self.advance();
                    Ok(Expr::Constant(Constant::Bool(false)))
                }
                _ if is_keyword(&name) => self.invalid_syntax(),
                _ => {
                    self.advance();
                    Ok(Expr::Name(name))
                }
            },
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.test()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op(")")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.test()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            TokenKind::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.test()?;
                if self.at_keyword("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.test()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            TokenKind::Op("{") => {
                self.advance();
                self.brace_display()
            }
            _ => self.invalid_syntax(),
        }
    }

    /// Dict and set displays and comprehensions; the opening brace is consumed.
    fn brace_display(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.test()?;
        if self.eat_op(":") {
            let value = self.test()?;
            if self.at_keyword("for") {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut pairs = vec![(first, value)];
            while self.eat_op(",") {
                if self.at_op("}") {
                    break;
                }
                let key = self.test()?;
                self.expect_op(":")?;
                let value = self.test()?;
                pairs.push((key, value));
            }
            self.expect_op("}")?;
            return Ok(Expr::Dict(pairs));
        }

        if self.at_keyword("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            items.push(self.test()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> StmtKind {
        let mut program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "expected one statement");
        program.body.remove(0).kind
    }

    #[test]
    fn test_precedence() {
        let StmtKind::Assign { value, .. } = single("result = 1 + 2 * 3 ** 2") else {
            panic!("Expected Assign");
        };
        let Expr::BinOp { op: BinOp::Add, right, .. } = value else {
            panic!("Expected addition at the root");
        };
        assert!(matches!(*right, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_chained_assignment_and_unpacking() {
        let StmtKind::Assign { targets, .. } = single("a, b = result = (1, 2)") else {
            panic!("Expected Assign");
        };
        assert_eq!(targets.len(), 2);
        assert!(matches!(&targets[0], Expr::Tuple(items) if items.len() == 2));
        assert_eq!(targets[1], Expr::Name("result".into()));
    }

    #[test]
    fn test_imports() {
        let StmtKind::Import(names) = single("import oci.core as core, json") else {
            panic!("Expected Import");
        };
        assert_eq!(names[0].name, "oci.core");
        assert_eq!(names[0].asname.as_deref(), Some("core"));
        assert_eq!(names[1].name, "json");

        let StmtKind::ImportFrom { module, level, names } = single("from . import helpers") else {
            panic!("Expected ImportFrom");
        };
        assert_eq!(module, None);
        assert_eq!(level, 1);
        assert_eq!(names[0].name, "helpers");

        let StmtKind::ImportFrom { module, .. } = single("from operator import (itemgetter, attrgetter,)") else {
            panic!("Expected ImportFrom");
        };
        assert_eq!(module.as_deref(), Some("operator"));
    }

    #[test]
    fn test_if_elif_else_nesting() {
        let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
        let StmtKind::If { orelse, .. } = single(source) else {
            panic!("Expected If");
        };
        assert_eq!(orelse.len(), 1);
        let StmtKind::If { orelse: inner, .. } = &orelse[0].kind else {
            panic!("Expected nested If for elif");
        };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_same_line_suite() {
        let StmtKind::If { body, .. } = single("if x: y = 1; z = 2") else {
            panic!("Expected If");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_comprehensions_and_lambda() {
        let program = parse(
            "names = [i.name for i in items if i.ok]\n\
             by_id = {i.id: i for i in items}\n\
             total = sum(x * 2 for x in values)\n\
             key = lambda item, default=0: item.get('k', default)\n",
        )
        .unwrap();
        assert_eq!(program.body.len(), 4);
        let StmtKind::Assign { value, .. } = &program.body[2].kind else {
            panic!("Expected Assign");
        };
        let Expr::Call { args, .. } = value else {
            panic!("Expected Call");
        };
        assert!(matches!(args[0], Expr::ListComp { .. }));
    }

    #[test]
    fn test_slices() {
        let StmtKind::Expr(Expr::Subscript { index, .. }) = single("items[1:-1:2]") else {
            panic!("Expected Subscript");
        };
        assert!(matches!(*index, Expr::Slice { lower: Some(_), upper: Some(_), step: Some(_) }));
        let StmtKind::Expr(Expr::Subscript { index, .. }) = single("items[:]") else {
            panic!("Expected Subscript");
        };
        assert!(matches!(*index, Expr::Slice { lower: None, upper: None, step: None }));
    }

    #[test]
    fn test_comparison_chain() {
        let StmtKind::Expr(Expr::Compare { ops, .. }) = single("a < b <= c not in d is not e") else {
            panic!("Expected Compare");
        };
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE, CmpOp::NotIn, CmpOp::IsNot]);
    }

    #[test]
    fn test_function_definition() {
        let source = "def pick(items, limit=3):\n    return items[:limit]\n";
        let StmtKind::FunctionDef(def) = single(source) else {
            panic!("Expected FunctionDef");
        };
        assert_eq!(def.name, "pick");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
    }

    #[test]
    fn test_unsupported_constructs() {
        let err = parse("class A:\n    pass\n").unwrap_err();
        assert_eq!(err.message, "'class' is not supported in sandboxed scripts");
        let err = parse("try:\n    x = 1\nexcept:\n    pass\n").unwrap_err();
        assert!(err.message.contains("'try'"));
    }

    #[test]
    fn test_invalid_targets() {
        assert_eq!(parse("f() = 1").unwrap_err().message, "cannot assign to function call");
        assert_eq!(parse("1 = x").unwrap_err().message, "cannot assign to literal");
    }

    #[test]
    fn test_missing_block() {
        let err = parse("if x:\ny = 1\n").unwrap_err();
        assert_eq!(err.message, "expected an indented block");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_control_flow_outside_context() {
        assert_eq!(parse("break").unwrap_err().message, "'break' outside loop");
        assert_eq!(parse("return 1").unwrap_err().message, "'return' outside function");
        let err = parse("for x in y:\n    def f():\n        continue\n").unwrap_err();
        assert_eq!(err.message, "'continue' not properly in loop");
        assert!(parse("while True:\n    if x:\n        break\n").is_ok());
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("result = 1 2").unwrap_err();
        assert_eq!(err.message, "invalid syntax");
        assert_eq!(err.column, 12);
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("result = {}1{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(parse(&deep).unwrap_err().message, "too many nested expressions");

        let chain = format!("result = 1{}", " + 1".repeat(500));
        assert_eq!(parse(&chain).unwrap_err().message, "too many nested expressions");

        let unary = format!("result = {}1", "-".repeat(500));
        assert!(parse(&unary).is_err());

        let shallow = format!("result = {}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&shallow).is_ok());
    }
}
