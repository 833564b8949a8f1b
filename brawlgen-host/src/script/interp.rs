//! Tree-walking evaluator
//!
//! Execution is metered: every statement, loop iteration, call and
//! comprehension element consumes one unit of fuel, and the wall-clock
//! deadline is polled every [`DEADLINE_POLL_INTERVAL`] units. Either limit
//! raises [`ScriptError::Timeout`], which `try` blocks cannot catch.

use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use super::ast::*;
use super::builtins::{get_attr, Builtin, ModuleKind};
use super::value::{
    check_len, contains, lock, normalize_index, py_cmp, py_eq, range_item, range_len, slice_positions,
    Function, Value,
};
use crate::error::ScriptError;

/// Instructions between wall-clock checks
pub const DEADLINE_POLL_INTERVAL: u32 = 256;

/// Value bound to `__name__`
const MODULE_NAME: &str = "__agent__";

/// Module-level state of one agent: globals plus its private RNG
pub struct Namespace {
    vars: FxHashMap<String, Value>,
    pub(super) rng: ChaCha8Rng,
}

impl Namespace {
    pub fn new(seed: u64) -> Self {
        Self {
            vars: FxHashMap::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Execution limits for one interpreter run
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub fuel: u64,
    pub max_depth: usize,
    pub deadline: Option<Instant>,
}

struct Frame {
    locals: FxHashMap<String, Value>,
    def: Arc<FunctionDef>,
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter<'a> {
    pub(super) ns: &'a mut Namespace,
    frames: Vec<Frame>,
    fuel: u64,
    ticks: u32,
    deadline: Option<Instant>,
    max_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(ns: &'a mut Namespace, limits: Limits) -> Self {
        Self {
            ns,
            frames: Vec::new(),
            fuel: limits.fuel,
            ticks: 0,
            deadline: limits.deadline,
            max_depth: limits.max_depth,
        }
    }

    /// Run top-level statements, binding definitions into the namespace
    pub fn exec_module(&mut self, module: &Module) -> Result<(), ScriptError> {
        match self.exec_block(&module.body)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(ScriptError::runtime("SyntaxError: 'return' outside function")),
            Flow::Break | Flow::Continue => {
                Err(ScriptError::runtime("SyntaxError: loop control outside loop"))
            }
        }
    }

    /// Call a module-level function by name
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let func = self
            .ns
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::runtime(format!("NameError: name '{}' is not defined", name)))?;
        self.call_value(func, args, Vec::new())
    }

    pub(super) fn tick(&mut self) -> Result<(), ScriptError> {
        if self.fuel == 0 {
            return Err(ScriptError::Timeout);
        }
        self.fuel -= 1;
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % DEADLINE_POLL_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(ScriptError::Timeout);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // NAMES
    // ========================================================================

    fn load(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(frame) = self.frames.last() {
            if let Some(v) = frame.locals.get(name) {
                return Ok(v.clone());
            }
        }
        if let Some(v) = self.ns.vars.get(name) {
            return Ok(v.clone());
        }
        if let Some(b) = Builtin::lookup(name) {
            return Ok(Value::Builtin(b));
        }
        if name == "__name__" {
            return Ok(Value::str(MODULE_NAME));
        }
        Err(ScriptError::runtime(format!(
            "NameError: name '{}' is not defined",
            name
        )))
    }

    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.def.globals.iter().any(|g| g == name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                self.ns.vars.insert(name.to_string(), value);
            }
        }
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    fn exec_block(&mut self, body: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.eval(e)?;
            }
            StmtKind::Assign { targets, value } => {
                let v = self.eval(value)?;
                for target in targets {
                    self.assign(target, v.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                for item in iterate(iterable)? {
                    self.tick()?;
                    self.assign(target, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Return(e) => {
                let v = match e {
                    Some(e) => self.eval(e)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass | StmtKind::Global(_) => {}
            StmtKind::Def(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(e) => Some(self.eval(e)?),
                        None => None,
                    });
                }
                let function = Function {
                    def: def.clone(),
                    defaults,
                };
                self.store(&def.name, Value::Function(Arc::new(function)));
            }
            StmtKind::Import(names) => {
                for (module, alias) in names {
                    let kind = resolve_module(module)?;
                    let bind = alias.as_deref().unwrap_or(module.as_str());
                    self.store(bind, Value::Module(kind));
                }
            }
            StmtKind::FromImport { module, names } => {
                let kind = resolve_module(module)?;
                if names.is_empty() {
                    for (name, value) in kind.members() {
                        self.store(name, value);
                    }
                }
                for (name, alias) in names {
                    let value = kind.attr(name).ok_or_else(|| {
                        ScriptError::runtime(format!(
                            "ImportError: cannot import name '{}' from '{}'",
                            name, module
                        ))
                    })?;
                    self.store(alias.as_deref().unwrap_or(name.as_str()), value);
                }
            }
            StmtKind::Try {
                body,
                handler,
                orelse,
                finally,
            } => return self.exec_try(body, handler.as_ref(), orelse, finally),
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handler: Option<&Handler>,
        orelse: &[Stmt],
        finally: &[Stmt],
    ) -> Result<Flow, ScriptError> {
        let outcome = match (self.exec_block(body), handler) {
            (Err(ScriptError::Runtime(message)), Some(handler)) => {
                if let Some(alias) = &handler.alias {
                    self.store(alias, Value::str(&message));
                }
                self.exec_block(&handler.body)
            }
            (Ok(Flow::Normal), _) => self.exec_block(orelse),
            (other, _) => other,
        };

        if !finally.is_empty() {
            match self.exec_block(finally)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        outcome
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Subscript(obj, index) => {
                let container = self.eval(obj)?;
                let key = self.eval(index)?;
                set_item(&container, key, value)
            }
            Target::Attribute(..) => Err(ScriptError::runtime(
                "AttributeError: attribute assignment is not supported",
            )),
            Target::Tuple(targets) => {
                let items = value.to_vec()?;
                if items.len() != targets.len() {
                    return Err(ScriptError::runtime(format!(
                        "ValueError: expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                let current = self.load(name)?;
                let rhs = self.eval(value)?;
                let updated = aug_value(current, op, &rhs)?;
                self.store(name, updated);
                Ok(())
            }
            Target::Subscript(obj, index) => {
                let container = self.eval(obj)?;
                let key = self.eval(index)?;
                let current = get_item(&container, &key)?;
                let rhs = self.eval(value)?;
                let updated = aug_value(current, op, &rhs)?;
                set_item(&container, key, updated)
            }
            _ => Err(ScriptError::runtime(
                "SyntaxError: illegal target for augmented assignment",
            )),
        }
    }

    // ========================================================================
    // EXPRESSIONS
    // ========================================================================

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_opt_int(&mut self, expr: &Option<Box<Expr>>) -> Result<Option<i64>, ScriptError> {
        match expr {
            None => Ok(None),
            Some(e) => match self.eval(e)? {
                Value::None => Ok(None),
                v => Ok(Some(v.expect_int("slice index")?)),
            },
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        let value = match expr {
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::None => Value::None,
            Expr::Name(name) => self.load(name)?,
            Expr::List(items) => {
                let values = self.eval_all(items)?;
                Value::new_list(values)?
            }
            Expr::Tuple(items) => Value::new_tuple(self.eval_all(items)?),
            Expr::Dict(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push((self.eval(k)?, self.eval(v)?));
                }
                Value::new_dict(pairs)?
            }
            Expr::Attribute(obj, name) => get_attr(self.eval(obj)?, name)?,
            Expr::Subscript(obj, index) => {
                let container = self.eval(obj)?;
                if let Expr::Slice(start, stop, step) = index.as_ref() {
                    let start = self.eval_opt_int(start)?;
                    let stop = self.eval_opt_int(stop)?;
                    let step = self.eval_opt_int(step)?;
                    slice_value(&container, start, stop, step)?
                } else {
                    let key = self.eval(index)?;
                    get_item(&container, &key)?
                }
            }
            Expr::Slice(..) => {
                return Err(ScriptError::runtime("SyntaxError: slice outside of subscript"))
            }
            Expr::Call { func, args, kwargs } => {
                let func = self.eval(func)?;
                let args = self.eval_all(args)?;
                let mut kw = Vec::with_capacity(kwargs.len());
                for (name, e) in kwargs {
                    kw.push((name.clone(), self.eval(e)?));
                }
                self.call_value(func, args, kw)?
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                unary_op(*op, v)?
            }
            Expr::Binary(op, left, right) => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                binary_op(*op, &a, &b)?
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, e) in rest {
                    let right = self.eval(e)?;
                    if !compare_op(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::BoolOp(op, left, right) => {
                let a = self.eval(left)?;
                match (op, a.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => a,
                    _ => self.eval(right)?,
                }
            }
            Expr::IfExp { cond, then, orelse } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)?
                } else {
                    self.eval(orelse)?
                }
            }
            Expr::ListComp { elt, generators } => {
                let mut out = Vec::new();
                self.comprehend(generators, &mut |interp| {
                    out.push(interp.eval(elt)?);
                    check_len(out.len())
                })?;
                Value::new_list(out)?
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let mut pairs = Vec::new();
                self.comprehend(generators, &mut |interp| {
                    let k = interp.eval(key)?;
                    let v = interp.eval(value)?;
                    pairs.push((k, v));
                    check_len(pairs.len())
                })?;
                Value::new_dict(pairs)?
            }
        };
        Ok(value)
    }

    fn comprehend(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> Result<(), ScriptError>,
    ) -> Result<(), ScriptError> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self);
        };
        let iterable = self.eval(&first.iter)?;
        'items: for item in iterate(iterable)? {
            self.tick()?;
            self.assign(&first.target, item)?;
            for cond in &first.conds {
                if !self.eval(cond)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehend(rest, emit)?;
        }
        Ok(())
    }

    // ========================================================================
    // CALLS
    // ========================================================================

    pub(super) fn call_value(
        &mut self,
        func: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        self.tick()?;
        match func {
            Value::Function(f) => self.call_function(&f, args, kwargs),
            Value::Builtin(b) => self.call_builtin(b, args, kwargs),
            Value::Method(receiver, name) => self.call_method(*receiver, &name, args, kwargs),
            other => Err(ScriptError::runtime(format!(
                "TypeError: '{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        f: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        if self.frames.len() >= self.max_depth {
            return Err(ScriptError::runtime(
                "RecursionError: maximum recursion depth exceeded",
            ));
        }

        let def = &f.def;
        if args.len() > def.params.len() {
            return Err(ScriptError::runtime(format!(
                "TypeError: {}() takes {} positional arguments but {} were given",
                def.name,
                def.params.len(),
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; def.params.len()];
        for (slot, arg) in slots.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for (name, value) in kwargs {
            let pos = def.params.iter().position(|p| p.name == name).ok_or_else(|| {
                ScriptError::runtime(format!(
                    "TypeError: {}() got an unexpected keyword argument '{}'",
                    def.name, name
                ))
            })?;
            if slots[pos].is_some() {
                return Err(ScriptError::runtime(format!(
                    "TypeError: {}() got multiple values for argument '{}'",
                    def.name, name
                )));
            }
            slots[pos] = Some(value);
        }

        let mut locals = FxHashMap::default();
        for (i, (param, slot)) in def.params.iter().zip(slots).enumerate() {
            let value = match slot.or_else(|| f.defaults.get(i).cloned().flatten()) {
                Some(v) => v,
                None => {
                    return Err(ScriptError::runtime(format!(
                        "TypeError: {}() missing required argument '{}'",
                        def.name, param.name
                    )))
                }
            };
            locals.insert(param.name.clone(), value);
        }

        self.frames.push(Frame {
            locals,
            def: def.clone(),
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();

        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }
}

// ============================================================================
// OPERATORS
// ============================================================================

fn resolve_module(name: &str) -> Result<ModuleKind, ScriptError> {
    ModuleKind::from_name(name).ok_or_else(|| {
        ScriptError::runtime(format!("ModuleNotFoundError: No module named '{}'", name))
    })
}

/// Lazily iterate ranges; snapshot everything else
fn iterate(value: Value) -> Result<Box<dyn Iterator<Item = Value>>, ScriptError> {
    match value {
        Value::Range { start, stop, step } => {
            let len = i64::try_from(range_len(start, stop, step)).unwrap_or(i64::MAX);
            Ok(Box::new((0..len).map(move |i| Value::Int(range_item(start, step, i)))))
        }
        other => Ok(Box::new(other.to_vec()?.into_iter())),
    }
}

fn overflow() -> ScriptError {
    ScriptError::runtime("OverflowError: integer overflow")
}

fn zero_division() -> ScriptError {
    ScriptError::runtime("ZeroDivisionError: division by zero")
}

fn aug_value(current: Value, op: BinOp, rhs: &Value) -> Result<Value, ScriptError> {
    // `list += iterable` extends in place so aliases observe the change
    if op == BinOp::Add {
        if let Value::List(list) = &current {
            let extra = rhs.to_vec()?;
            {
                let mut items = lock(list);
                check_len(items.len() + extra.len())?;
                items.extend(extra);
            }
            return Ok(current.clone());
        }
    }
    binary_op(op, &current, rhs)
}

fn unary_op(op: UnaryOp, v: Value) -> Result<Value, ScriptError> {
    match (op, &v) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (_, other) => {
            let i = other.as_int().ok_or_else(|| {
                ScriptError::runtime(format!(
                    "TypeError: bad operand type for unary operator: '{}'",
                    other.type_name()
                ))
            })?;
            match op {
                UnaryOp::Neg => Ok(Value::Int(i.checked_neg().ok_or_else(overflow)?)),
                _ => Ok(Value::Int(i)),
            }
        }
    }
}

fn repeat(items: &[Value], times: i64) -> Result<Vec<Value>, ScriptError> {
    let times = times.max(0) as usize;
    check_len(items.len().saturating_mul(times))?;
    Ok(items.iter().cloned().cycle().take(items.len() * times).collect())
}

/// Python floor division on integers
fn floor_div(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(zero_division());
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Python modulo on integers (result takes the divisor's sign)
fn floor_mod(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(zero_division());
    }
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub(super) fn binary_op(op: BinOp, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    // Integer arithmetic (bools count as ints)
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return match op {
            BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Div => {
                if y == 0 {
                    Err(zero_division())
                } else {
                    Ok(Value::Float(x as f64 / y as f64))
                }
            }
            BinOp::FloorDiv => floor_div(x, y).map(Value::Int),
            BinOp::Mod => floor_mod(x, y).map(Value::Int),
            BinOp::Pow => {
                if y >= 0 {
                    let exp = u32::try_from(y).map_err(|_| overflow())?;
                    x.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
                } else if x == 0 {
                    Err(zero_division())
                } else {
                    Ok(Value::Float((x as f64).powf(y as f64)))
                }
            }
        };
    }

    // Mixed or float arithmetic
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        let result = match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => {
                if y == 0.0 {
                    return Err(zero_division());
                }
                x / y
            }
            BinOp::FloorDiv => {
                if y == 0.0 {
                    return Err(zero_division());
                }
                (x / y).floor()
            }
            BinOp::Mod => {
                if y == 0.0 {
                    return Err(zero_division());
                }
                x - y * (x / y).floor()
            }
            BinOp::Pow => {
                if x == 0.0 && y < 0.0 {
                    return Err(zero_division());
                }
                let p = x.powf(y);
                if p.is_nan() && !x.is_nan() && !y.is_nan() {
                    return Err(ScriptError::runtime(
                        "ValueError: negative number cannot be raised to a fractional power",
                    ));
                }
                p
            }
        };
        return Ok(Value::Float(result));
    }

    // Sequences
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            check_len(x.chars().count() + y.chars().count())?;
            Ok(Value::str(&format!("{}{}", x, y)))
        }
        (BinOp::Add, Value::List(_), Value::List(_)) => {
            let mut items = a.to_vec()?;
            items.extend(b.to_vec()?);
            Value::new_list(items)
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            check_len(x.len() + y.len())?;
            Ok(Value::new_tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::List(_), n) | (BinOp::Mul, n, Value::List(_)) if n.as_int().is_some() => {
            let seq = if matches!(a, Value::List(_)) { a } else { b };
            Value::new_list(repeat(&seq.to_vec()?, n.as_int().unwrap_or(0))?)
        }
        (BinOp::Mul, Value::Tuple(t), n) | (BinOp::Mul, n, Value::Tuple(t)) if n.as_int().is_some() => {
            Ok(Value::new_tuple(repeat(t, n.as_int().unwrap_or(0))?))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let times = n.as_int().unwrap_or(0).max(0) as usize;
            check_len(s.chars().count().saturating_mul(times))?;
            Ok(Value::str(&s.repeat(times)))
        }
        _ => Err(ScriptError::runtime(format!(
            "TypeError: unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    }
}

fn compare_op(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ScriptError> {
    use std::cmp::Ordering::*;
    let result = match op {
        CmpOp::Eq => py_eq(a, b),
        CmpOp::NotEq => !py_eq(a, b),
        CmpOp::Lt => py_cmp(a, b)? == Some(Less),
        CmpOp::Le => matches!(py_cmp(a, b)?, Some(Less | Equal)),
        CmpOp::Gt => py_cmp(a, b)? == Some(Greater),
        CmpOp::Ge => matches!(py_cmp(a, b)?, Some(Greater | Equal)),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => is_same(a, b),
        CmpOp::IsNot => !is_same(a, b),
    };
    Ok(result)
}

fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Arc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Arc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

// ============================================================================
// SUBSCRIPTS
// ============================================================================

fn index_error(kind: &str) -> ScriptError {
    ScriptError::runtime(format!("IndexError: {} index out of range", kind))
}

fn get_item(container: &Value, key: &Value) -> Result<Value, ScriptError> {
    match container {
        Value::List(list) => {
            let i = key.expect_int("list indices")?;
            let items = lock(list);
            normalize_index(i, items.len())
                .map(|p| items[p].clone())
                .ok_or_else(|| index_error("list"))
        }
        Value::Tuple(items) => {
            let i = key.expect_int("tuple indices")?;
            normalize_index(i, items.len())
                .map(|p| items[p].clone())
                .ok_or_else(|| index_error("tuple"))
        }
        Value::Str(s) => {
            let i = key.expect_int("string indices")?;
            let len = s.chars().count();
            normalize_index(i, len)
                .and_then(|p| s.chars().nth(p))
                .map(|c| Value::str(c.encode_utf8(&mut [0; 4])))
                .ok_or_else(|| index_error("string"))
        }
        Value::Dict(dict) => lock(dict)
            .iter()
            .find(|(k, _)| py_eq(k, key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ScriptError::runtime(format!("KeyError: {}", key.repr()))),
        Value::Range { start, stop, step } => {
            let i = key.expect_int("range indices")?;
            normalize_index(i, range_len(*start, *stop, *step))
                .map(|p| Value::Int(start + p as i64 * step))
                .ok_or_else(|| index_error("range object"))
        }
        other => Err(ScriptError::runtime(format!(
            "TypeError: '{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn set_item(container: &Value, key: Value, value: Value) -> Result<(), ScriptError> {
    match container {
        Value::List(list) => {
            let i = key.expect_int("list indices")?;
            let mut items = lock(list);
            let pos = normalize_index(i, items.len())
                .ok_or_else(|| index_error("list assignment"))?;
            items[pos] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            key.check_hashable()?;
            let mut entries = lock(dict);
            match entries.iter_mut().find(|(k, _)| py_eq(k, &key)) {
                Some(slot) => slot.1 = value,
                None => {
                    check_len(entries.len() + 1)?;
                    entries.push((key, value));
                }
            }
            Ok(())
        }
        other => Err(ScriptError::runtime(format!(
            "TypeError: '{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_value(
    container: &Value,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Value, ScriptError> {
    match container {
        Value::List(_) | Value::Tuple(_) => {
            let items = container.to_vec()?;
            let picked = slice_positions(items.len(), start, stop, step)?
                .into_iter()
                .map(|p| items[p].clone())
                .collect();
            if matches!(container, Value::List(_)) {
                Value::new_list(picked)
            } else {
                Ok(Value::new_tuple(picked))
            }
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_positions(chars.len(), start, stop, step)?
                .into_iter()
                .map(|p| chars[p])
                .collect();
            Ok(Value::str(&picked))
        }
        other => Err(ScriptError::runtime(format!(
            "TypeError: '{}' object is not sliceable",
            other.type_name()
        ))),
    }
}
