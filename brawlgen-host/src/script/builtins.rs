//! Builtin functions, the `math` and `random` modules, and container methods

use std::cmp::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use super::interp::Interpreter;
use super::value::{check_len, lock, normalize_index, py_cmp, py_eq, Value};
use crate::error::ScriptError;

/// Modules agents may import
pub const ALLOWED_MODULES: &[&str] = &["math", "random"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    All,
    Any,
    Bool,
    Dict,
    Enumerate,
    Float,
    Int,
    Len,
    List,
    Max,
    Min,
    Pow,
    Print,
    Range,
    Reversed,
    Round,
    Sorted,
    Str,
    Sum,
    Tuple,
    Zip,
    Math(MathFn),
    Random(RandomFn),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathFn {
    Sqrt,
    Exp,
    Log,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Hypot,
    Floor,
    Ceil,
    Trunc,
    Fabs,
    Copysign,
    Fmod,
    Pow,
    Degrees,
    Radians,
    IsNan,
    IsInf,
    IsFinite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomFn {
    Random,
    Randint,
    Uniform,
    Choice,
    Randrange,
    Shuffle,
    Gauss,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleKind {
    Math,
    Random,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("abs", Builtin::Abs),
    ("all", Builtin::All),
    ("any", Builtin::Any),
    ("bool", Builtin::Bool),
    ("dict", Builtin::Dict),
    ("enumerate", Builtin::Enumerate),
    ("float", Builtin::Float),
    ("int", Builtin::Int),
    ("len", Builtin::Len),
    ("list", Builtin::List),
    ("max", Builtin::Max),
    ("min", Builtin::Min),
    ("pow", Builtin::Pow),
    ("print", Builtin::Print),
    ("range", Builtin::Range),
    ("reversed", Builtin::Reversed),
    ("round", Builtin::Round),
    ("sorted", Builtin::Sorted),
    ("str", Builtin::Str),
    ("sum", Builtin::Sum),
    ("tuple", Builtin::Tuple),
    ("zip", Builtin::Zip),
];

const MATH_FUNCTIONS: &[(&str, MathFn)] = &[
    ("sqrt", MathFn::Sqrt),
    ("exp", MathFn::Exp),
    ("log", MathFn::Log),
    ("log10", MathFn::Log10),
    ("log2", MathFn::Log2),
    ("sin", MathFn::Sin),
    ("cos", MathFn::Cos),
    ("tan", MathFn::Tan),
    ("asin", MathFn::Asin),
    ("acos", MathFn::Acos),
    ("atan", MathFn::Atan),
    ("atan2", MathFn::Atan2),
    ("sinh", MathFn::Sinh),
    ("cosh", MathFn::Cosh),
    ("tanh", MathFn::Tanh),
    ("hypot", MathFn::Hypot),
    ("floor", MathFn::Floor),
    ("ceil", MathFn::Ceil),
    ("trunc", MathFn::Trunc),
    ("fabs", MathFn::Fabs),
    ("copysign", MathFn::Copysign),
    ("fmod", MathFn::Fmod),
    ("pow", MathFn::Pow),
    ("degrees", MathFn::Degrees),
    ("radians", MathFn::Radians),
    ("isnan", MathFn::IsNan),
    ("isinf", MathFn::IsInf),
    ("isfinite", MathFn::IsFinite),
];

const MATH_CONSTANTS: &[(&str, f64)] = &[
    ("pi", std::f64::consts::PI),
    ("e", std::f64::consts::E),
    ("tau", std::f64::consts::TAU),
    ("inf", f64::INFINITY),
    ("nan", f64::NAN),
];

const RANDOM_FUNCTIONS: &[(&str, RandomFn)] = &[
    ("random", RandomFn::Random),
    ("randint", RandomFn::Randint),
    ("uniform", RandomFn::Uniform),
    ("choice", RandomFn::Choice),
    ("randrange", RandomFn::Randrange),
    ("shuffle", RandomFn::Shuffle),
    ("gauss", RandomFn::Gauss),
];

const LIST_METHODS: &[&str] = &[
    "append", "pop", "extend", "insert", "index", "count", "clear", "copy", "reverse", "sort",
];
const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "clear", "copy",
];
const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "split", "join", "startswith", "endswith", "replace",
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        BUILTINS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Math(f) => MATH_FUNCTIONS
                .iter()
                .find(|(_, m)| m == f)
                .map_or("math", |(n, _)| *n),
            Builtin::Random(f) => RANDOM_FUNCTIONS
                .iter()
                .find(|(_, r)| r == f)
                .map_or("random", |(n, _)| *n),
            other => BUILTINS
                .iter()
                .find(|(_, b)| b == other)
                .map_or("builtin", |(n, _)| *n),
        }
    }
}

impl ModuleKind {
    pub fn from_name(name: &str) -> Option<ModuleKind> {
        match name {
            "math" => Some(ModuleKind::Math),
            "random" => Some(ModuleKind::Random),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Math => "math",
            ModuleKind::Random => "random",
        }
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        match self {
            ModuleKind::Math => MATH_FUNCTIONS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, f)| Value::Builtin(Builtin::Math(*f)))
                .or_else(|| {
                    MATH_CONSTANTS
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, v)| Value::Float(*v))
                }),
            ModuleKind::Random => RANDOM_FUNCTIONS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, f)| Value::Builtin(Builtin::Random(*f))),
        }
    }

    /// Every public member, for `from module import *`
    pub fn members(&self) -> Vec<(&'static str, Value)> {
        match self {
            ModuleKind::Math => MATH_FUNCTIONS
                .iter()
                .map(|(n, f)| (*n, Value::Builtin(Builtin::Math(*f))))
                .chain(MATH_CONSTANTS.iter().map(|(n, v)| (*n, Value::Float(*v))))
                .collect(),
            ModuleKind::Random => RANDOM_FUNCTIONS
                .iter()
                .map(|(n, f)| (*n, Value::Builtin(Builtin::Random(*f))))
                .collect(),
        }
    }
}

/// Attribute lookup on a value: module members and container methods
pub fn get_attr(value: Value, name: &str) -> Result<Value, ScriptError> {
    let has_method = match &value {
        Value::Module(m) => {
            return m.attr(name).ok_or_else(|| {
                ScriptError::runtime(format!(
                    "AttributeError: module '{}' has no attribute '{}'",
                    m.name(),
                    name
                ))
            })
        }
        Value::List(_) => LIST_METHODS.contains(&name),
        Value::Dict(_) => DICT_METHODS.contains(&name),
        Value::Str(_) => STR_METHODS.contains(&name),
        _ => false,
    };
    if !has_method {
        return Err(ScriptError::runtime(format!(
            "AttributeError: '{}' object has no attribute '{}'",
            value.type_name(),
            name
        )));
    }
    Ok(Value::Method(Box::new(value), Arc::from(name)))
}

// ============================================================================
// ARGUMENT HELPERS
// ============================================================================

fn type_error(message: impl Into<String>) -> ScriptError {
    ScriptError::runtime(format!("TypeError: {}", message.into()))
}

fn value_error(message: impl Into<String>) -> ScriptError {
    ScriptError::runtime(format!("ValueError: {}", message.into()))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        return Err(type_error(format!(
            "{}() takes {} to {} arguments ({} given)",
            name,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

fn take_kwarg(kwargs: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(pos).1)
}

fn no_kwargs(name: &str, kwargs: &[(String, Value)]) -> Result<(), ScriptError> {
    match kwargs.first() {
        Some((k, _)) => Err(type_error(format!(
            "{}() got an unexpected keyword argument '{}'",
            name, k
        ))),
        None => Ok(()),
    }
}

fn float_to_int(f: f64) -> Result<i64, ScriptError> {
    if !f.is_finite() {
        return Err(ScriptError::runtime(
            "OverflowError: cannot convert non-finite float to integer",
        ));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(ScriptError::runtime("OverflowError: float too large for int"));
    }
    Ok(t as i64)
}

fn math_result(value: f64) -> Result<Value, ScriptError> {
    if value.is_nan() {
        return Err(value_error("math domain error"));
    }
    Ok(Value::Float(value))
}

impl Interpreter<'_> {
    // ========================================================================
    // BUILTIN FUNCTIONS
    // ========================================================================

    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        let name = builtin.name();
        match builtin {
            Builtin::Math(f) => {
                no_kwargs(name, &kwargs)?;
                return call_math(f, &args);
            }
            Builtin::Random(f) => {
                no_kwargs(name, &kwargs)?;
                return self.call_random(f, &args);
            }
            Builtin::Sorted | Builtin::Max | Builtin::Min | Builtin::Sum | Builtin::Enumerate
            | Builtin::Dict => {}
            _ => no_kwargs(name, &kwargs)?,
        }

        let result = match builtin {
            Builtin::Abs => {
                arity(name, &args, 1, 1)?;
                match &args[0] {
                    Value::Float(f) => Value::Float(f.abs()),
                    other => Value::Int(
                        other
                            .expect_int("abs() argument")?
                            .checked_abs()
                            .ok_or_else(|| ScriptError::runtime("OverflowError: integer overflow"))?,
                    ),
                }
            }
            Builtin::All => {
                arity(name, &args, 1, 1)?;
                Value::Bool(args[0].to_vec()?.iter().all(Value::truthy))
            }
            Builtin::Any => {
                arity(name, &args, 1, 1)?;
                Value::Bool(args[0].to_vec()?.iter().any(Value::truthy))
            }
            Builtin::Bool => {
                arity(name, &args, 0, 1)?;
                Value::Bool(args.first().is_some_and(Value::truthy))
            }
            Builtin::Float => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::Float(0.0),
                    Some(Value::Str(s)) => {
                        let text = s.trim().to_ascii_lowercase();
                        let parsed = match text.as_str() {
                            "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                            "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                            "nan" => Ok(f64::NAN),
                            _ => text.parse::<f64>(),
                        };
                        Value::Float(parsed.map_err(|_| {
                            value_error(format!("could not convert string to float: '{}'", s))
                        })?)
                    }
                    Some(other) => Value::Float(other.expect_f64("float() argument")?),
                }
            }
            Builtin::Int => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::Int(0),
                    Some(Value::Float(f)) => Value::Int(float_to_int(*f)?),
                    Some(Value::Str(s)) => Value::Int(s.trim().parse::<i64>().map_err(|_| {
                        value_error(format!("invalid literal for int(): '{}'", s))
                    })?),
                    Some(other) => Value::Int(other.expect_int("int() argument")?),
                }
            }
            Builtin::Len => {
                arity(name, &args, 1, 1)?;
                Value::Int(args[0].len()? as i64)
            }
            Builtin::List => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::new_list(Vec::new())?,
                    Some(v) => Value::new_list(v.to_vec()?)?,
                }
            }
            Builtin::Tuple => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::new_tuple(Vec::new()),
                    Some(v) => Value::new_tuple(v.to_vec()?),
                }
            }
            Builtin::Dict => {
                arity(name, &args, 0, 1)?;
                let mut entries = Vec::new();
                if let Some(source) = args.first() {
                    entries = match source {
                        Value::Dict(d) => lock(d).clone(),
                        other => {
                            let mut pairs = Vec::new();
                            for item in other.to_vec()? {
                                let pair = item.to_vec()?;
                                if pair.len() != 2 {
                                    return Err(value_error(
                                        "dictionary update sequence element has wrong length",
                                    ));
                                }
                                let mut pair = pair.into_iter();
                                if let (Some(k), Some(v)) = (pair.next(), pair.next()) {
                                    pairs.push((k, v));
                                }
                            }
                            pairs
                        }
                    };
                }
                for (k, v) in kwargs.drain(..) {
                    entries.push((Value::str(&k), v));
                }
                Value::new_dict(entries)?
            }
            Builtin::Enumerate => {
                arity(name, &args, 1, 1)?;
                let start = match take_kwarg(&mut kwargs, "start") {
                    Some(v) => v.expect_int("start")?,
                    None => 0,
                };
                no_kwargs(name, &kwargs)?;
                let items = args[0].to_vec()?;
                Value::new_list(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::new_tuple(vec![Value::Int(start + i as i64), v]))
                        .collect(),
                )?
            }
            Builtin::Zip => {
                let columns = args
                    .iter()
                    .map(Value::to_vec)
                    .collect::<Result<Vec<_>, _>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                Value::new_list(
                    (0..len)
                        .map(|i| Value::new_tuple(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                )?
            }
            Builtin::Reversed => {
                arity(name, &args, 1, 1)?;
                let mut items = args[0].to_vec()?;
                items.reverse();
                Value::new_list(items)?
            }
            Builtin::Range => {
                arity(name, &args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|a| a.expect_int("range() argument"))
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => (0, 0, 1),
                };
                if step == 0 {
                    return Err(value_error("range() arg 3 must not be zero"));
                }
                Value::Range { start, stop, step }
            }
            Builtin::Round => {
                arity(name, &args, 1, 2)?;
                let digits = match args.get(1) {
                    None | Some(Value::None) => None,
                    Some(d) => Some(d.expect_int("ndigits")?),
                };
                match (&args[0], digits) {
                    (Value::Float(f), None) => Value::Int(float_to_int(f.round_ties_even())?),
                    (Value::Float(f), Some(d)) => {
                        let scale = 10f64.powi(d.clamp(-300, 300) as i32);
                        Value::Float((f * scale).round_ties_even() / scale)
                    }
                    (other, _) => Value::Int(other.expect_int("round() argument")?),
                }
            }
            Builtin::Pow => {
                arity(name, &args, 2, 2)?;
                super::interp::binary_op(super::ast::BinOp::Pow, &args[0], &args[1])?
            }
            Builtin::Print => Value::None,
            Builtin::Str => {
                arity(name, &args, 0, 1)?;
                match args.first() {
                    None => Value::str(""),
                    Some(v) => Value::str(&v.to_display()),
                }
            }
            Builtin::Sum => {
                arity(name, &args, 1, 2)?;
                let start = take_kwarg(&mut kwargs, "start");
                let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
                no_kwargs(name, &kwargs)?;
                for item in args[0].to_vec()? {
                    total = super::interp::binary_op(super::ast::BinOp::Add, &total, &item)?;
                }
                total
            }
            Builtin::Sorted => {
                arity(name, &args, 1, 1)?;
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
                no_kwargs(name, &kwargs)?;
                let items = args[0].to_vec()?;
                Value::new_list(self.sort_values(items, key, reverse)?)?
            }
            Builtin::Max | Builtin::Min => {
                let key = take_kwarg(&mut kwargs, "key");
                let default = take_kwarg(&mut kwargs, "default");
                no_kwargs(name, &kwargs)?;
                let items = match args.len() {
                    0 => return Err(type_error(format!("{} expected at least 1 argument", name))),
                    1 => args[0].to_vec()?,
                    _ => args,
                };
                let want = if builtin == Builtin::Max {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                match self.extreme(items, key, want)? {
                    Some(v) => v,
                    None => default
                        .ok_or_else(|| value_error(format!("{}() arg is an empty sequence", name)))?,
                }
            }
            Builtin::Math(_) | Builtin::Random(_) => Value::None,
        };
        Ok(result)
    }

    fn key_of(&mut self, key: &Option<Value>, item: &Value) -> Result<Value, ScriptError> {
        match key {
            None | Some(Value::None) => Ok(item.clone()),
            Some(f) => self.call_value(f.clone(), vec![item.clone()], Vec::new()),
        }
    }

    /// Stable sort by (optional) key
    pub(super) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
    ) -> Result<Vec<Value>, ScriptError> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            self.tick()?;
            keyed.push((self.key_of(&key, &item)?, item));
        }

        // Comparison errors surface after the sort; `sort_by` cannot fail
        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| match py_cmp(a, b) {
            Ok(Some(ord)) => ord,
            Ok(None) => Ordering::Equal,
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        if reverse {
            // Reverse while keeping equal elements in original order
            keyed.reverse();
            let mut out: Vec<(Value, Value)> = Vec::with_capacity(keyed.len());
            let mut run: Vec<(Value, Value)> = Vec::new();
            for entry in keyed {
                if run.last().is_some_and(|(k, _)| !py_eq(k, &entry.0)) {
                    out.extend(run.drain(..).rev());
                }
                run.push(entry);
            }
            out.extend(run.drain(..).rev());
            return Ok(out.into_iter().map(|(_, v)| v).collect());
        }
        Ok(keyed.into_iter().map(|(_, v)| v).collect())
    }

    /// First element whose key is strictly more `want` than all earlier ones
    fn extreme(
        &mut self,
        items: Vec<Value>,
        key: Option<Value>,
        want: Ordering,
    ) -> Result<Option<Value>, ScriptError> {
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            self.tick()?;
            let k = self.key_of(&key, &item)?;
            let replace = match &best {
                None => true,
                Some((best_key, _)) => py_cmp(&k, best_key)? == Some(want),
            };
            if replace {
                best = Some((k, item));
            }
        }
        Ok(best.map(|(_, v)| v))
    }

    // ========================================================================
    // RANDOM MODULE
    // ========================================================================

    fn call_random(&mut self, f: RandomFn, args: &[Value]) -> Result<Value, ScriptError> {
        let rng = &mut self.ns.rng;
        let value = match f {
            RandomFn::Random => {
                arity("random", args, 0, 0)?;
                Value::Float(rng.gen::<f64>())
            }
            RandomFn::Uniform => {
                arity("uniform", args, 2, 2)?;
                let a = args[0].expect_f64("a")?;
                let b = args[1].expect_f64("b")?;
                Value::Float(a + (b - a) * rng.gen::<f64>())
            }
            RandomFn::Randint => {
                arity("randint", args, 2, 2)?;
                let a = args[0].expect_int("a")?;
                let b = args[1].expect_int("b")?;
                if a > b {
                    return Err(value_error("empty range for randint()"));
                }
                Value::Int(rng.gen_range(a..=b))
            }
            RandomFn::Randrange => {
                arity("randrange", args, 1, 3)?;
                let ints = args
                    .iter()
                    .map(|a| a.expect_int("randrange() argument"))
                    .collect::<Result<Vec<_>, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => (0, 0, 1),
                };
                if step == 0 {
                    return Err(value_error("zero step for randrange()"));
                }
                let n = super::value::range_len(start, stop, step);
                if n == 0 {
                    return Err(value_error("empty range for randrange()"));
                }
                Value::Int(super::value::range_item(start, step, rng.gen_range(0..n) as i64))
            }
            RandomFn::Choice => {
                arity("choice", args, 1, 1)?;
                let items = args[0].to_vec()?;
                items
                    .choose(rng)
                    .cloned()
                    .ok_or_else(|| ScriptError::runtime("IndexError: cannot choose from an empty sequence"))?
            }
            RandomFn::Shuffle => {
                arity("shuffle", args, 1, 1)?;
                match &args[0] {
                    Value::List(l) => lock(l).shuffle(rng),
                    other => {
                        return Err(type_error(format!(
                            "'{}' object does not support item assignment",
                            other.type_name()
                        )))
                    }
                }
                Value::None
            }
            RandomFn::Gauss => {
                arity("gauss", args, 0, 2)?;
                let mu = args.first().map_or(Ok(0.0), |v| v.expect_f64("mu"))?;
                let sigma = args.get(1).map_or(Ok(1.0), |v| v.expect_f64("sigma"))?;
                // Box-Muller
                let u1: f64 = 1.0 - rng.gen::<f64>();
                let u2: f64 = rng.gen::<f64>();
                let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                Value::Float(mu + sigma * z)
            }
        };
        Ok(value)
    }

    // ========================================================================
    // CONTAINER METHODS
    // ========================================================================

    pub(super) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
        mut kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        match &receiver {
            Value::List(list) => {
                if name == "sort" {
                    arity(name, &args, 0, 0)?;
                    let key = take_kwarg(&mut kwargs, "key");
                    let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
                    no_kwargs(name, &kwargs)?;
                    let items = lock(list).clone();
                    let sorted = self.sort_values(items, key, reverse)?;
                    *lock(list) = sorted;
                    return Ok(Value::None);
                }
                no_kwargs(name, &kwargs)?;
                list_method(list, name, args)
            }
            Value::Dict(dict) => {
                no_kwargs(name, &kwargs)?;
                dict_method(dict, name, args)
            }
            Value::Str(s) => {
                no_kwargs(name, &kwargs)?;
                str_method(s, name, args)
            }
            other => Err(ScriptError::runtime(format!(
                "AttributeError: '{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }
}

fn call_math(f: MathFn, args: &[Value]) -> Result<Value, ScriptError> {
    let two_args = matches!(
        f,
        MathFn::Atan2 | MathFn::Hypot | MathFn::Copysign | MathFn::Fmod | MathFn::Pow
    );
    match f {
        MathFn::Log => arity("log", args, 1, 2)?,
        _ if two_args => arity("math", args, 2, 2)?,
        _ => arity("math", args, 1, 1)?,
    }
    let x = args[0].expect_f64("math argument")?;
    let y = match args.get(1) {
        Some(v) => v.expect_f64("math argument")?,
        None => 0.0,
    };

    match f {
        MathFn::Sqrt => {
            if x < 0.0 {
                return Err(value_error("math domain error"));
            }
            math_result(x.sqrt())
        }
        MathFn::Exp => Ok(Value::Float(x.exp())),
        MathFn::Log => {
            if x <= 0.0 {
                return Err(value_error("math domain error"));
            }
            match args.get(1) {
                Some(_) => math_result(x.ln() / y.ln()),
                None => Ok(Value::Float(x.ln())),
            }
        }
        MathFn::Log10 | MathFn::Log2 => {
            if x <= 0.0 {
                return Err(value_error("math domain error"));
            }
            Ok(Value::Float(if f == MathFn::Log10 { x.log10() } else { x.log2() }))
        }
        MathFn::Sin => math_result(x.sin()),
        MathFn::Cos => math_result(x.cos()),
        MathFn::Tan => math_result(x.tan()),
        MathFn::Asin => math_result(x.asin()),
        MathFn::Acos => math_result(x.acos()),
        MathFn::Atan => Ok(Value::Float(x.atan())),
        MathFn::Atan2 => Ok(Value::Float(x.atan2(y))),
        MathFn::Sinh => Ok(Value::Float(x.sinh())),
        MathFn::Cosh => Ok(Value::Float(x.cosh())),
        MathFn::Tanh => Ok(Value::Float(x.tanh())),
        MathFn::Hypot => Ok(Value::Float(x.hypot(y))),
        MathFn::Floor => Ok(Value::Int(float_to_int(x.floor())?)),
        MathFn::Ceil => Ok(Value::Int(float_to_int(x.ceil())?)),
        MathFn::Trunc => Ok(Value::Int(float_to_int(x)?)),
        MathFn::Fabs => Ok(Value::Float(x.abs())),
        MathFn::Copysign => Ok(Value::Float(x.copysign(y))),
        MathFn::Fmod => {
            if y == 0.0 {
                return Err(value_error("math domain error"));
            }
            Ok(Value::Float(x % y))
        }
        MathFn::Pow => math_result(x.powf(y)),
        MathFn::Degrees => Ok(Value::Float(x.to_degrees())),
        MathFn::Radians => Ok(Value::Float(x.to_radians())),
        MathFn::IsNan => Ok(Value::Bool(x.is_nan())),
        MathFn::IsInf => Ok(Value::Bool(x.is_infinite())),
        MathFn::IsFinite => Ok(Value::Bool(x.is_finite())),
    }
}

fn list_method(
    list: &super::value::ListRef,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let mut items = lock(list);
            check_len(items.len() + 1)?;
            items.extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = args[0].to_vec()?;
            let mut items = lock(list);
            check_len(items.len() + extra.len())?;
            items.extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let index = args[0].expect_int("index")?;
            let mut items = lock(list);
            check_len(items.len() + 1)?;
            let len = items.len() as i64;
            let pos = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(pos as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let index = match args.first() {
                Some(v) => v.expect_int("index")?,
                None => -1,
            };
            let mut items = lock(list);
            let pos = normalize_index(index, items.len())
                .ok_or_else(|| ScriptError::runtime("IndexError: pop index out of range"))?;
            Ok(items.remove(pos))
        }
        "index" => {
            arity(name, &args, 1, 1)?;
            let items = lock(list).clone();
            items
                .iter()
                .position(|v| py_eq(v, &args[0]))
                .map(|p| Value::Int(p as i64))
                .ok_or_else(|| value_error(format!("{} is not in list", args[0].repr())))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let items = lock(list).clone();
            Ok(Value::Int(
                items.iter().filter(|v| py_eq(v, &args[0])).count() as i64,
            ))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            lock(list).clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            let items = lock(list).clone();
            Value::new_list(items)
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            lock(list).reverse();
            Ok(Value::None)
        }
        other => Err(ScriptError::runtime(format!(
            "AttributeError: 'list' object has no attribute '{}'",
            other
        ))),
    }
}

fn dict_method(
    dict: &super::value::DictRef,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let lookup = |key: &Value| -> Option<Value> {
        lock(dict)
            .iter()
            .find(|(k, _)| py_eq(k, key))
            .map(|(_, v)| v.clone())
    };

    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            Ok(lookup(&args[0]).unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            let keys = lock(dict).iter().map(|(k, _)| k.clone()).collect();
            Value::new_list(keys)
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            let values = lock(dict).iter().map(|(_, v)| v.clone()).collect();
            Value::new_list(values)
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            let items = lock(dict)
                .iter()
                .map(|(k, v)| Value::new_tuple(vec![k.clone(), v.clone()]))
                .collect();
            Value::new_list(items)
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let mut entries = lock(dict);
            match entries.iter().position(|(k, _)| py_eq(k, &args[0])) {
                Some(pos) => Ok(entries.remove(pos).1),
                None => args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| ScriptError::runtime(format!("KeyError: {}", args[0].repr()))),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            args[0].check_hashable()?;
            if let Some(existing) = lookup(&args[0]) {
                return Ok(existing);
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut entries = lock(dict);
            check_len(entries.len() + 1)?;
            entries.push((args[0].clone(), default.clone()));
            Ok(default)
        }
        "update" => {
            arity(name, &args, 1, 1)?;
            let incoming = match &args[0] {
                Value::Dict(other) => lock(other).clone(),
                other => {
                    return Err(type_error(format!(
                        "'{}' object is not a mapping",
                        other.type_name()
                    )))
                }
            };
            let mut entries = lock(dict);
            for (k, v) in incoming {
                match entries.iter_mut().find(|(existing, _)| py_eq(existing, &k)) {
                    Some(slot) => slot.1 = v,
                    None => entries.push((k, v)),
                }
            }
            check_len(entries.len())?;
            Ok(Value::None)
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            lock(dict).clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            let entries = lock(dict).clone();
            Value::new_dict(entries)
        }
        other => Err(ScriptError::runtime(format!(
            "AttributeError: 'dict' object has no attribute '{}'",
            other
        ))),
    }
}

fn str_method(s: &str, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let str_arg = |i: usize| -> Result<String, ScriptError> {
        match args.get(i) {
            Some(Value::Str(v)) => Ok(v.to_string()),
            Some(other) => Err(type_error(format!(
                "expected str argument, got {}",
                other.type_name()
            ))),
            None => Err(type_error(format!("{}() missing argument", name))),
        }
    };

    match name {
        "upper" => Ok(Value::str(&s.to_uppercase())),
        "lower" => Ok(Value::str(&s.to_lowercase())),
        "strip" => Ok(Value::str(s.trim())),
        "split" => {
            let parts: Vec<Value> = if args.is_empty() {
                s.split_whitespace().map(Value::str).collect()
            } else {
                let sep = str_arg(0)?;
                if sep.is_empty() {
                    return Err(value_error("empty separator"));
                }
                s.split(sep.as_str()).map(Value::str).collect()
            };
            Value::new_list(parts)
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let mut pieces = Vec::new();
            for item in args[0].to_vec()? {
                match item {
                    Value::Str(p) => pieces.push(p.to_string()),
                    other => {
                        return Err(type_error(format!(
                            "sequence item: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            let joined = pieces.join(s);
            check_len(joined.chars().count())?;
            Ok(Value::str(&joined))
        }
        "startswith" => Ok(Value::Bool(s.starts_with(str_arg(0)?.as_str()))),
        "endswith" => Ok(Value::Bool(s.ends_with(str_arg(0)?.as_str()))),
        "replace" => {
            let replaced = s.replace(str_arg(0)?.as_str(), str_arg(1)?.as_str());
            check_len(replaced.chars().count())?;
            Ok(Value::str(&replaced))
        }
        other => Err(ScriptError::runtime(format!(
            "AttributeError: 'str' object has no attribute '{}'",
            other
        ))),
    }
}
