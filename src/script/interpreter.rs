//! Tree-walking evaluator for parsed scripts.
//!
//! Every statement, loop iteration and function call consumes one step of
//! the invocation's [`Budget`]. Exceptions carry the line of the innermost
//! statement that raised them.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::sandbox::limits::Budget;
use crate::sandbox::namespace::RestrictedNamespace;
use crate::script::ast::{
    BinOp, BoolOp, Comprehension, Constant, Expr, Param, Program, Stmt, StmtKind,
};
use crate::script::builtins;
use crate::script::host::CallArgs;
use crate::script::methods;
use crate::script::ops::{self, SliceSpec};
use crate::script::scope::Scope;
use crate::script::value::{release, Dict, Function, FunctionBody, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

/// Run `program` to completion in `namespace`.
pub fn execute(
    program: &Program,
    namespace: &mut RestrictedNamespace,
    budget: &mut Budget,
) -> Result<()> {
    let globals = Rc::clone(namespace.globals());
    let mut interp = Interpreter {
        ns: namespace,
        budget,
        depth: 0,
    };
    interp.exec_block(&program.body, &globals)?;
    Ok(())
}

/// How a block finished.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Where a comprehension puts what it produces.
enum Collector<'e> {
    List(&'e Expr, Vec<Value>),
    Set(&'e Expr, Dict),
    Dict(&'e Expr, &'e Expr, Dict),
}

pub struct Interpreter<'a> {
    ns: &'a mut RestrictedNamespace,
    budget: &'a mut Budget,
    depth: usize,
}

impl Interpreter<'_> {
    pub(crate) fn budget(&self) -> &Budget {
        &*self.budget
    }

    pub(crate) fn tick(&mut self) -> Result<()> {
        self.budget.tick()
    }

    pub(crate) fn print(&mut self, text: &str) {
        self.ns.stdout_mut().push(text);
    }

    // ---- statements ----

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> Result<Flow> {
        for stmt in body {
            self.budget.tick()?;
            let flow = self
                .exec_stmt(stmt, scope)
                .map_err(|e| e.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                release(self.eval(expr, scope)?);
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, scope)?;
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    match &alias.asname {
                        Some(asname) => {
                            let module = self.import_module(&alias.name, false)?;
                            scope.set(asname.as_str(), module);
                        }
                        None => {
                            let module = self.import_module(&alias.name, true)?;
                            let root = alias.name.split('.').next().unwrap_or(&alias.name);
                            scope.set(root, module);
                        }
                    }
                }
            }
            StmtKind::ImportFrom {
                module,
                level,
                names,
            } => {
                let Some(module) = module.as_deref().filter(|_| *level == 0) else {
                    return Err(RuntimeError::raise(
                        "ImportError",
                        "attempted relative import with no known parent package",
                    ));
                };
                let source = self.import_module(module, false)?;
                for alias in names {
                    let value = self.import_name(&source, module, &alias.name)?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    scope.set(bound, value);
                }
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, scope)?;
                for item in ops::iterate(&iterable)? {
                    self.budget.tick()?;
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::While { test, body } => loop {
                self.budget.tick()?;
                if !self.eval(test, scope)?.truthy() {
                    break;
                }
                match self.exec_block(body, scope)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            },
            StmtKind::FunctionDef(def) => {
                let defaults = self.eval_defaults(&def.params, scope)?;
                let function = Function {
                    name: def.name.clone(),
                    body: FunctionBody::Def(Rc::clone(def)),
                    defaults,
                    closure: Rc::clone(scope),
                };
                self.ns.track(scope);
                scope.set(def.name.as_str(), Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg, scope)?.try_to_str(self.budget)?,
                        None => String::new(),
                    };
                    return Err(RuntimeError::raise("AssertionError", message));
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> Result<()> {
        match target {
            Expr::Name(name) => {
                scope.set(name.as_str(), value);
                Ok(())
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                let values = ops::collect(&value, self.budget)?;
                if values.len() < targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        values.len()
                    )));
                }
                if values.len() > targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value, scope)?;
                }
                Ok(())
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                ops::set_attr(&object, attr, value)
            }
            Expr::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container, scope)?;
                if matches!(index.as_ref(), Expr::Slice { .. }) {
                    return Err(RuntimeError::type_error(
                        "slice assignment is not supported",
                    ));
                }
                let index = self.eval(index, scope)?;
                ops::set_item(&container, &index, value, self.budget)
            }
            _ => Err(RuntimeError::type_error("cannot assign to expression")),
        }
    }

    fn aug_assign(
        &mut self,
        target: &Expr,
        op: BinOp,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<()> {
        match target {
            Expr::Name(name) => {
                let current = scope
                    .lookup(name)
                    .ok_or_else(|| RuntimeError::name_error(name))?;
                let rhs = self.eval(value, scope)?;
                let updated = self.in_place(op, current, &rhs)?;
                scope.set(name.as_str(), updated);
                Ok(())
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                let current = ops::get_attr(&object, attr)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.in_place(op, current, &rhs)?;
                ops::set_attr(&object, attr, updated)
            }
            Expr::Subscript {
                value: container,
                index,
            } => {
                if matches!(index.as_ref(), Expr::Slice { .. }) {
                    return Err(RuntimeError::type_error(
                        "slice assignment is not supported",
                    ));
                }
                let container = self.eval(container, scope)?;
                let index = self.eval(index, scope)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.in_place(op, current, &rhs)?;
                ops::set_item(&container, &index, updated, self.budget)
            }
            _ => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// `current op= rhs`; lists extend in place like Python's `+=`.
    fn in_place(
        &mut self,
        op: BinOp,
        current: Value,
        rhs: &Value,
    ) -> Result<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let extra = ops::collect(rhs, self.budget)?;
            let len = items.borrow().len() + extra.len();
            self.budget.check_len(len)?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        ops::binary_op(op, &current, rhs, self.budget)
    }

    fn delete(&mut self, target: &Expr, scope: &Rc<Scope>) -> Result<()> {
        match target {
            Expr::Name(name) => match scope.remove(name) {
                Some(old) => {
                    release(old);
                    Ok(())
                }
                None => Err(RuntimeError::name_error(name)),
            },
            Expr::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container, scope)?;
                let index = self.eval(index, scope)?;
                ops::del_item(&container, &index)
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
                Ok(())
            }
            _ => Err(RuntimeError::type_error("cannot delete expression")),
        }
    }

    // ---- imports ----

    /// Resolve a module for `import` or `__import__`.
    ///
    /// The allow-list is consulted again here because `__import__` can be
    /// called with a name computed at runtime. With `top_level`, the first
    /// component of a dotted name is returned, as `import a.b` binds `a`.
    pub(crate) fn import_module(&mut self, name: &str, top_level: bool) -> Result<Value> {
        let allow_list = self.ns.allow_list();
        if !allow_list.permits(name) {
            return Err(RuntimeError::raise(
                "ImportError",
                format!(
                    "import of '{name}' is not allowed; allowed modules are {}",
                    allow_list.names().join(", ")
                ),
            ));
        }
        let registry = &self.ns.context().modules;
        let module = registry.resolve(name)?;
        match name.split_once('.') {
            Some((root, _)) if top_level => {
                if !allow_list.permits(root) {
                    return Err(RuntimeError::raise(
                        "ImportError",
                        format!("import of '{root}' is not allowed; use 'import {name} as ...'"),
                    ));
                }
                registry.resolve(root)
            }
            _ => Ok(module),
        }
    }

    fn import_name(&mut self, source: &Value, module: &str, name: &str) -> Result<Value> {
        match ops::get_attr(source, name) {
            Ok(value) => Ok(value),
            Err(_) => {
                let path = format!("{module}.{name}");
                if self.ns.allow_list().permits(&path) {
                    if let Ok(value) = self.ns.context().modules.resolve(&path) {
                        return Ok(value);
                    }
                }
                Err(RuntimeError::raise(
                    "ImportError",
                    format!("cannot import name '{name}' from '{module}'"),
                ))
            }
        }
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value> {
        match expr {
            Expr::Constant(constant) => Ok(match constant {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::from(s.as_str()),
            }),
            Expr::Name(name) => scope
                .lookup(name)
                .ok_or_else(|| RuntimeError::name_error(name)),
            Expr::Attribute { value, attr } => {
                let value = self.eval(value, scope)?;
                ops::get_attr(&value, attr)
            }
            Expr::Subscript { value, index } => {
                let value = self.eval(value, scope)?;
                if let Expr::Slice { lower, upper, step } = index.as_ref() {
                    let slice = SliceSpec {
                        lower: self.slice_bound(lower.as_deref(), scope)?,
                        upper: self.slice_bound(upper.as_deref(), scope)?,
                        step: self.slice_bound(step.as_deref(), scope)?,
                    };
                    return ops::get_slice(&value, &slice);
                }
                let index = self.eval(index, scope)?;
                ops::get_item(&value, &index)
            }
            Expr::Slice { .. } => Err(RuntimeError::type_error(
                "slices are only valid inside a subscript",
            )),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let callee = self.eval(func, scope)?;
                let mut call_args = CallArgs::new(self.eval_all(args, scope)?);
                for keyword in keywords {
                    let value = self.eval(&keyword.value, scope)?;
                    call_args.keywords.push((keyword.name.clone(), value));
                }
                self.call_value(&callee, call_args)
            }
            Expr::List(items) => Ok(Value::list(self.eval_all(items, scope)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items, scope)?)),
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key, value)?;
                }
                self.budget.check_len(dict.len())?;
                Ok(Value::dict(dict))
            }
            Expr::Set(items) => {
                let mut set = Dict::new();
                for item in self.eval_all(items, scope)? {
                    set.insert(item, Value::None)?;
                }
                Ok(Value::set(set))
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.eval(operand, scope)?;
                ops::unary_op(*op, &operand)
            }
            Expr::BinOp { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::binary_op(*op, &left, &right, self.budget)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value, scope)?;
                    let decided = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops: operators,
                comparators,
            } => {
                let mut left = self.eval(left, scope)?;
                for (op, comparator) in operators.iter().zip(comparators) {
                    let right = self.eval(comparator, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            Expr::Lambda(lambda) => {
                let defaults = self.eval_defaults(&lambda.params, scope)?;
                self.ns.track(scope);
                Ok(Value::Function(Rc::new(Function {
                    name: "<lambda>".to_string(),
                    body: FunctionBody::Lambda(Rc::clone(lambda)),
                    defaults,
                    closure: Rc::clone(scope),
                })))
            }
            Expr::ListComp { elt, generators } => {
                match self.comprehension(generators, scope, Collector::List(&**elt, Vec::new()))? {
                    Collector::List(_, items) => Ok(Value::list(items)),
                    _ => Ok(Value::None),
                }
            }
            Expr::SetComp { elt, generators } => {
                match self.comprehension(generators, scope, Collector::Set(&**elt, Dict::new()))? {
                    Collector::Set(_, set) => Ok(Value::set(set)),
                    _ => Ok(Value::None),
                }
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let collector = Collector::Dict(&**key, &**value, Dict::new());
                match self.comprehension(generators, scope, collector)? {
                    Collector::Dict(_, _, dict) => Ok(Value::dict(dict)),
                    _ => Ok(Value::None),
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>> {
        self.budget.check_len(exprs.len())?;
        exprs.iter().map(|expr| self.eval(expr, scope)).collect()
    }

    fn eval_defaults(&mut self, params: &[Param], scope: &Rc<Scope>) -> Result<Vec<Value>> {
        params
            .iter()
            .filter_map(|param| param.default.as_ref())
            .map(|default| self.eval(default, scope))
            .collect()
    }

    fn slice_bound(&mut self, bound: Option<&Expr>, scope: &Rc<Scope>) -> Result<Option<i64>> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr, scope)? {
            Value::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                RuntimeError::type_error(
                    "slice indices must be integers or None or have an __index__ method",
                )
            }),
        }
    }

    /// Comprehensions get their own scope so loop variables do not leak.
    fn comprehension<'e>(
        &mut self,
        generators: &[Comprehension],
        scope: &Rc<Scope>,
        collector: Collector<'e>,
    ) -> Result<Collector<'e>> {
        let inner = Scope::child(scope);
        let mut collector = collector;
        self.generate(generators, &inner, &mut collector)?;
        Ok(collector)
    }

    fn generate(
        &mut self,
        generators: &[Comprehension],
        scope: &Rc<Scope>,
        collector: &mut Collector<'_>,
    ) -> Result<()> {
        let Some((generator, rest)) = generators.split_first() else {
            return self.collect_one(scope, collector);
        };
        let iterable = self.eval(&generator.iter, scope)?;
        'items: for item in ops::iterate(&iterable)? {
            self.budget.tick()?;
            self.assign(&generator.target, item, scope)?;
            for condition in &generator.ifs {
                if !self.eval(condition, scope)?.truthy() {
                    continue 'items;
                }
            }
            self.generate(rest, scope, collector)?;
        }
        Ok(())
    }

    fn collect_one(&mut self, scope: &Rc<Scope>, collector: &mut Collector<'_>) -> Result<()> {
        match collector {
            Collector::List(elt, items) => {
                let value = self.eval(elt, scope)?;
                items.push(value);
                self.budget.check_len(items.len())
            }
            Collector::Set(elt, set) => {
                let value = self.eval(elt, scope)?;
                set.insert(value, Value::None)?;
                self.budget.check_len(set.len())
            }
            Collector::Dict(key, value, dict) => {
                let key = self.eval(key, scope)?;
                let value = self.eval(value, scope)?;
                dict.insert(key, value)?;
                self.budget.check_len(dict.len())
            }
        }
    }

    // ---- calls ----

    /// Call any callable value.
    pub(crate) fn call_value(&mut self, callee: &Value, args: CallArgs) -> Result<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Builtin(builtin) => builtins::call(self, *builtin, args),
            Value::Native(native) => self.host_result(native.call(&args)?),
            Value::Method(method) => methods::call(self, &method.receiver, &method.name, args),
            Value::Object(object) if object.is_callable() => self.host_result(object.call(&args)?),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Strings built outside the interpreter still count against the string limit.
    pub(crate) fn host_result(&self, value: Value) -> Result<Value> {
        if let Value::Str(text) = &value {
            self.budget.check_str_len(text.len())?;
        }
        Ok(value)
    }

    fn call_function(&mut self, function: &Rc<Function>, args: CallArgs) -> Result<Value> {
        self.budget.tick()?;
        let depth = self.depth + 1;
        self.budget.check_depth(depth)?;
        let frame = Scope::child(&function.closure);
        bind_arguments(function, args, &frame)?;

        self.depth = depth;
        let result = match &function.body {
            FunctionBody::Def(def) => self.exec_block(&def.body, &frame).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Lambda(lambda) => self.eval(&lambda.body, &frame),
        };
        self.depth -= 1;
        result
    }

    /// Stable sort by `key(item)` (or the items themselves).
    pub(crate) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> Result<Vec<Value>> {
        let keys = match key {
            Some(key) if !key.is_none() => items
                .iter()
                .map(|item| self.call_value(key, CallArgs::new(vec![item.clone()])))
                .collect::<Result<Vec<_>>>()?,
            _ => items.clone(),
        };
        let mut order: Vec<usize> = (0..items.len()).collect();
        let mut failure = None;
        order.sort_by(|&a, &b| {
            if failure.is_some() {
                return Ordering::Equal;
            }
            match keys[a].compare(&keys[b], "<") {
                Ok(ordering) if reverse => ordering.reverse(),
                Ok(ordering) => ordering,
                Err(err) => {
                    failure = Some(err);
                    Ordering::Equal
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Key/value pairs of a dict, or of an iterable of 2-item sequences.
    pub(crate) fn mapping_pairs(&self, source: &Value) -> Result<Vec<(Value, Value)>> {
        if let Value::Dict(dict) = source {
            return Ok(dict.borrow().items());
        }
        let mut pairs = Vec::new();
        for (i, element) in ops::collect(source, self.budget())?.into_iter().enumerate() {
            let parts = ops::collect(&element, self.budget()).map_err(|_| {
                RuntimeError::type_error(format!(
                    "cannot convert dictionary update sequence element #{i} to a sequence"
                ))
            })?;
            let [key, value]: [Value; 2] = parts.try_into().map_err(|parts: Vec<Value>| {
                RuntimeError::value_error(format!(
                    "dictionary update sequence element #{i} has length {}; 2 is required",
                    parts.len()
                ))
            })?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}

/// Bind call arguments to parameters in a fresh frame.
fn bind_arguments(function: &Function, args: CallArgs, frame: &Scope) -> Result<()> {
    let params = function.param_names();
    let name = &function.name;
    let required = params.len() - function.defaults.len();

    if args.positional.len() > params.len() {
        let expected = if function.defaults.is_empty() {
            format!("{}", params.len())
        } else {
            format!("from {required} to {}", params.len())
        };
        return Err(RuntimeError::type_error(format!(
            "{name}() takes {expected} positional argument{} but {} {} given",
            if params.len() == 1 && function.defaults.is_empty() { "" } else { "s" },
            args.positional.len(),
            if args.positional.len() == 1 { "was" } else { "were" },
        )));
    }

    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in slots.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (keyword, value) in args.keywords {
        match params.iter().position(|p| *p == keyword) {
            Some(i) if slots[i].is_some() => {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got multiple values for argument '{keyword}'"
                )))
            }
            Some(i) => slots[i] = Some(value),
            None => {
                return Err(RuntimeError::type_error(format!(
                    "{name}() got an unexpected keyword argument '{keyword}'"
                )))
            }
        }
    }

    let mut missing = Vec::new();
    for (i, slot) in slots.into_iter().enumerate() {
        let value = match slot {
            Some(value) => value,
            None if i >= required => function.defaults[i - required].clone(),
            None => {
                missing.push(format!("'{}'", params[i]));
                continue;
            }
        };
        frame.set(params[i], value);
    }
    if !missing.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{name}() missing {} required positional argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            join_names(&missing)
        )));
    }
    Ok(())
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`.
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::policy::AllowList;
    use crate::sandbox::config::SandboxConfig;
    use crate::sandbox::context::ExecutionContext;
    use crate::sandbox::io::CapturedOutput;
    use crate::sandbox::limits::{CancelToken, ExecutionLimits};
    use crate::sandbox::namespace::OutputSlot;
    use crate::script::builtins::BuiltinTable;
    use crate::script::parser::parse;

    fn run_with(source: &str, config: &SandboxConfig) -> (Result<()>, RestrictedNamespace) {
        let program = parse(source).unwrap();
        let mut ns = RestrictedNamespace::build(
            Arc::new(ExecutionContext::new()),
            &BuiltinTable::default(),
            AllowList::new(config.allowed_modules.clone()),
            &config.output_variable,
            CapturedOutput::new(config.max_output_bytes),
        );
        let mut budget = Budget::new(ExecutionLimits::from(config), CancelToken::new());
        let outcome = execute(&program, &mut ns, &mut budget);
        (outcome, ns)
    }

    fn run(source: &str) -> Value {
        let (outcome, ns) = run_with(source, &SandboxConfig::default());
        outcome.unwrap();
        match ns.extract() {
            OutputSlot::Bound(value) => value,
            OutputSlot::Unset => panic!("result was not assigned"),
        }
    }

    fn run_err(source: &str) -> RuntimeError {
        run_with(source, &SandboxConfig::default()).0.unwrap_err()
    }

    #[test]
    fn test_arithmetic_and_assignment() {
        assert_eq!(run("result = 1 + 1").as_int(), Some(2));
        assert_eq!(run("a = b = 3\nresult = a * b").as_int(), Some(9));
        assert_eq!(run("x = 10\nx -= 3\nx *= 2\nresult = x").as_int(), Some(14));
        assert_eq!(run("a, (b, c) = 1, [2, 3]\nresult = a + b + c").as_int(), Some(6));
    }

    #[test]
    fn test_control_flow() {
        let source = "\
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
n = 0
while n < 3:
    n += 1
result = (total, n)
";
        assert_eq!(run(source).repr(), "(16, 3)");
    }

    #[test]
    fn test_functions_and_closures() {
        let source = "\
def make_adder(n):
    def add(x, y=0):
        return x + n + y
    return add

add5 = make_adder(5)
result = [add5(1), add5(1, y=2), (lambda a, b=2: a * b)(4)]
";
        assert_eq!(run(source).repr(), "[6, 8, 8]");
    }

    #[test]
    fn test_recursion_limit() {
        let err = run_err("def f(n):\n    return f(n + 1)\nresult = f(0)\n");
        assert_eq!(err.kind(), Some("RecursionError"));
    }

    #[test]
    fn test_argument_errors() {
        let err = run_err("def f(a, b):\n    return a\nresult = f(1, 2, 3)\n");
        assert_eq!(err.to_string(), "f() takes 2 positional arguments but 3 were given");

        let err = run_err("def f(a, b=1):\n    return a\nresult = f(1, 2, 3)\n");
        assert_eq!(
            err.to_string(),
            "f() takes from 1 to 2 positional arguments but 3 were given"
        );

        let err = run_err("def f(a, b, c):\n    return a\nresult = f()\n");
        assert_eq!(
            err.to_string(),
            "f() missing 3 required positional arguments: 'a', 'b', and 'c'"
        );

        let err = run_err("def f(a):\n    return a\nresult = f(1, a=2)\n");
        assert_eq!(err.to_string(), "f() got multiple values for argument 'a'");

        let err = run_err("def f(a):\n    return a\nresult = f(b=2)\n");
        assert_eq!(err.to_string(), "f() got an unexpected keyword argument 'b'");
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(
            run("result = [x * y for x in range(3) for y in (1, 10) if x]").repr(),
            "[1, 10, 2, 20]"
        );
        assert_eq!(run("result = {k: len(k) for k in ['a', 'bb']}").repr(), "{'a': 1, 'bb': 2}");
        assert_eq!(run("result = sorted({x % 3 for x in range(10)})").repr(), "[0, 1, 2]");
        let err = run_err("squares = [i for i in range(3)]\nresult = i\n");
        assert_eq!(err.to_string(), "name 'i' is not defined");
    }

    #[test]
    fn test_errors_carry_line() {
        let err = run_err("x = 1\ny = {}\nresult = y['missing']\n");
        match err {
            RuntimeError::Unhandled { kind, message, line } => {
                assert_eq!(kind, "KeyError");
                assert_eq!(message, "'missing'");
                assert_eq!(line, Some(3));
            }
            other => panic!("Expected Unhandled, got {other:?}"),
        }
    }

    #[test]
    fn test_unpack_errors() {
        assert_eq!(
            run_err("a, b = [1]").to_string(),
            "not enough values to unpack (expected 2, got 1)"
        );
        assert_eq!(
            run_err("a, b = 1, 2, 3").to_string(),
            "too many values to unpack (expected 2)"
        );
    }

    #[test]
    fn test_imports() {
        assert_eq!(run("import json\nresult = json.dumps([1])").as_str(), Some("[1]"));
        assert_eq!(run("from math import sqrt as root\nresult = root(16)").repr(), "4.0");
        assert_eq!(run("m = __import__('math')\nresult = m.floor(2.5)").as_int(), Some(2));

        let err = run_err("m = __import__('o' + 's')\nresult = 1\n");
        assert_eq!(err.kind(), Some("ImportError"));
        let err = run_err("from json import nothing\nresult = 1\n");
        assert_eq!(err.to_string(), "cannot import name 'nothing' from 'json'");
        let err = run_err("from . import x\nresult = 1\n");
        assert_eq!(err.kind(), Some("ImportError"));
    }

    #[test]
    fn test_print_is_captured() {
        let (outcome, mut ns) = run_with(
            "print('a', 1, sep='-')\nprint('b', end='')\nresult = 0",
            &SandboxConfig::default(),
        );
        outcome.unwrap();
        assert_eq!(ns.take_stdout(), "a-1\nb");
    }

    #[test]
    fn test_fuel_and_limits() {
        let config = SandboxConfig::builder().max_steps(100).build();
        let (outcome, _) = run_with("while True:\n    pass\n", &config);
        assert!(matches!(outcome, Err(RuntimeError::OutOfFuel { consumed: 100 })));

        let config = SandboxConfig::builder().max_collection_len(10).build();
        let (outcome, _) = run_with("result = [i for i in range(100)]", &config);
        assert!(matches!(outcome, Err(RuntimeError::LimitExceeded(_))));
    }

    #[test]
    fn test_del_unsets_output() {
        let (outcome, ns) = run_with("result = 1\ndel result\n", &SandboxConfig::default());
        outcome.unwrap();
        assert!(matches!(ns.extract(), OutputSlot::Unset));
    }

    #[test]
    fn test_list_augmented_add_is_in_place() {
        assert_eq!(
            run("a = [1]\nb = a\na += (2, 3)\nresult = b").repr(),
            "[1, 2, 3]"
        );
    }

    #[test]
    fn test_sort_is_stable_with_key_and_reverse() {
        let source = "\
pairs = [('b', 1), ('a', 2), ('c', 1), ('d', 2)]
result = [p[0] for p in sorted(pairs, key=lambda p: p[1], reverse=True)]
";
        assert_eq!(run(source).repr(), "['a', 'd', 'b', 'c']");
        assert_eq!(run_err("result = sorted([1, 'a'])").kind(), Some("TypeError"));
    }

    #[test]
    fn test_assert() {
        let err = run_err("assert 1 == 2, 'mismatch'\nresult = 1\n");
        assert_eq!(err.kind(), Some("AssertionError"));
        assert_eq!(err.to_string(), "mismatch");
    }
}
