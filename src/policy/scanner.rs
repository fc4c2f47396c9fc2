//! Static capability scan of a parsed script.
//!
//! The scan is purely structural: it visits every statement and expression,
//! including both branches of conditionals, loop bodies, function bodies and
//! lambdas, and records what the script *could* do without running it.

use std::collections::BTreeSet;

use crate::script::ast::{Comprehension, Constant, Expr, Program, Stmt, StmtKind};

/// Recorded for `from . import x`, where no module name follows the dots.
pub const RELATIVE_IMPORT: &str = "<relative>";

/// What a script references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Every module named by an import statement or a literal `__import__` call.
    pub imports: BTreeSet<String>,
    /// Whether any assignment targets the output variable.
    pub binds_output: bool,
}

/// Scan `program` for imports and assignments to `output`.
pub fn scan(program: &Program, output: &str) -> ScanReport {
    let mut scanner = Scanner {
        output,
        report: ScanReport::default(),
    };
    scanner.block(&program.body);
    scanner.report
}

struct Scanner<'a> {
    output: &'a str,
    report: ScanReport,
}

impl Scanner<'_> {
    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.target(target);
                }
                self.expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.target(target);
                self.expr(value);
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.report.imports.insert(alias.name.clone());
                }
            }
            StmtKind::ImportFrom { module, level, .. } => {
                let name = match (module, *level) {
                    (Some(module), 0) => module.clone(),
                    (Some(module), level) => format!("{}{module}", ".".repeat(level)),
                    (None, _) => RELATIVE_IMPORT.to_string(),
                };
                self.report.imports.insert(name);
            }
            StmtKind::If { test, body, orelse } => {
                self.expr(test);
                self.block(body);
                self.block(orelse);
            }
            StmtKind::For { target, iter, body } => {
                self.target(target);
                self.expr(iter);
                self.block(body);
            }
            StmtKind::While { test, body } => {
                self.expr(test);
                self.block(body);
            }
            StmtKind::FunctionDef(def) => {
                for param in &def.params {
                    if let Some(default) = &param.default {
                        self.expr(default);
                    }
                }
                self.block(&def.body);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.expr(target);
                }
            }
            StmtKind::Assert { test, msg } => {
                self.expr(test);
                if let Some(msg) = msg {
                    self.expr(msg);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
        }
    }

    /// An assignment target; unpacking targets are searched recursively.
    fn target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) if name == self.output => self.report.binds_output = true,
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.target(item);
                }
            }
            other => self.expr(other),
        }
    }

    fn comprehension(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.expr(&generator.iter);
            self.expr(&generator.target);
            for cond in &generator.ifs {
                self.expr(cond);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Constant(_) | Expr::Name(_) => {}
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                if let (Expr::Name(name), Some(Expr::Constant(Constant::Str(module)))) =
                    (func.as_ref(), args.first())
                {
                    if name == "__import__" {
                        self.report.imports.insert(module.clone());
                    }
                }
                self.expr(func);
                for arg in args {
                    self.expr(arg);
                }
                for keyword in keywords {
                    self.expr(&keyword.value);
                }
            }
            Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Dict(entries) => {
                for (key, value) in entries {
                    self.expr(key);
                    self.expr(value);
                }
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::BoolOp { values, .. } => {
                for value in values {
                    self.expr(value);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                for comparator in comparators {
                    self.expr(comparator);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::Lambda(lambda) => {
                for param in &lambda.params {
                    if let Some(default) = &param.default {
                        self.expr(default);
                    }
                }
                self.expr(&lambda.body);
            }
            Expr::ListComp { elt, generators } | Expr::SetComp { elt, generators } => {
                self.comprehension(generators);
                self.expr(elt);
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.comprehension(generators);
                self.expr(key);
                self.expr(value);
            }
        }
    }
}
