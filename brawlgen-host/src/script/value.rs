//! Runtime values
//!
//! Containers are shared (`Arc<Mutex<..>>`) so that aliasing behaves as
//! agents expect and a whole namespace can live inside a `Send + Sync`
//! handle. A container lock is never held while another one is taken:
//! readers snapshot with [`Value::to_vec`] first.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::ast::FunctionDef;
use super::builtins::{Builtin, ModuleKind};
use crate::error::ScriptError;

/// Maximum number of elements any list, dict, or string may hold
pub const MAX_CONTAINER_LEN: usize = 10_000;

/// Nesting depth at which printing and comparison give up
const MAX_NESTING: usize = 32;

pub type ListRef = Arc<Mutex<Vec<Value>>>;
pub type DictRef = Arc<Mutex<Vec<(Value, Value)>>>;

/// A user-defined function with its defaults evaluated at definition time
#[derive(Debug)]
pub struct Function {
    pub def: Arc<FunctionDef>,
    pub defaults: Vec<Option<Value>>,
}

#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ListRef),
    Tuple(Arc<Vec<Value>>),
    Dict(DictRef),
    Range { start: i64, stop: i64, step: i64 },
    Function(Arc<Function>),
    Builtin(Builtin),
    Module(ModuleKind),
    Method(Box<Value>, Arc<str>),
}

/// Lock a container, recovering from poisoning
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn check_len(len: usize) -> Result<(), ScriptError> {
    if len > MAX_CONTAINER_LEN {
        return Err(ScriptError::runtime(format!(
            "MemoryError: container exceeds {} elements",
            MAX_CONTAINER_LEN
        )));
    }
    Ok(())
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn new_list(items: Vec<Value>) -> Result<Value, ScriptError> {
        check_len(items.len())?;
        Ok(Value::List(Arc::new(Mutex::new(items))))
    }

    /// A list of floats, as handed to `act`
    pub fn float_list(xs: &[f32]) -> Value {
        let items = xs.iter().map(|&x| Value::Float(x as f64)).collect();
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn new_tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Arc::new(items))
    }

    pub fn new_dict(entries: Vec<(Value, Value)>) -> Result<Value, ScriptError> {
        let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            k.check_hashable()?;
            match out.iter_mut().find(|(existing, _)| py_eq(existing, &k)) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        check_len(out.len())?;
        Ok(Value::Dict(Arc::new(Mutex::new(out))))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range { .. } => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Module(_) => "module",
            Value::Method(..) => "method",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !lock(l).is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !lock(d).is_empty(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// Integer view of ints and bools
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Float view of any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Bool(_) | Value::Float(_))
    }

    pub fn expect_int(&self, what: &str) -> Result<i64, ScriptError> {
        self.as_int().ok_or_else(|| {
            ScriptError::runtime(format!(
                "TypeError: {} must be an integer, not {}",
                what,
                self.type_name()
            ))
        })
    }

    pub fn expect_f64(&self, what: &str) -> Result<f64, ScriptError> {
        self.as_f64().ok_or_else(|| {
            ScriptError::runtime(format!(
                "TypeError: {} must be a number, not {}",
                what,
                self.type_name()
            ))
        })
    }

    pub fn check_hashable(&self) -> Result<(), ScriptError> {
        match self {
            Value::List(_) | Value::Dict(_) => Err(ScriptError::runtime(format!(
                "TypeError: unhashable type: '{}'",
                self.type_name()
            ))),
            Value::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            _ => Ok(()),
        }
    }

    /// Snapshot the elements produced by iterating this value
    pub fn to_vec(&self) -> Result<Vec<Value>, ScriptError> {
        match self {
            Value::List(l) => Ok(lock(l).clone()),
            Value::Tuple(t) => Ok(t.as_ref().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.encode_utf8(&mut [0; 4]))).collect()),
            Value::Dict(d) => Ok(lock(d).iter().map(|(k, _)| k.clone()).collect()),
            Value::Range { start, stop, step } => {
                let len = range_len(*start, *stop, *step);
                check_len(len)?;
                Ok((0..len as i64).map(|i| Value::Int(range_item(*start, *step, i))).collect())
            }
            other => Err(ScriptError::runtime(format!(
                "TypeError: '{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> Result<usize, ScriptError> {
        match self {
            Value::List(l) => Ok(lock(l).len()),
            Value::Tuple(t) => Ok(t.len()),
            Value::Str(s) => Ok(s.chars().count()),
            Value::Dict(d) => Ok(lock(d).len()),
            Value::Range { start, stop, step } => Ok(range_len(*start, *stop, *step)),
            other => Err(ScriptError::runtime(format!(
                "TypeError: object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }

    /// `str(value)`
    pub fn to_display(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_NESTING {
            out.push_str("...");
            return;
        }
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => {
                let _ = write!(out, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"));
            }
            Value::List(l) => {
                let items = lock(l).clone();
                write_seq(out, "[", "]", &items, depth);
            }
            Value::Tuple(t) => {
                if t.len() == 1 {
                    out.push('(');
                    t[0].write_repr(out, depth + 1);
                    out.push_str(",)");
                } else {
                    write_seq(out, "(", ")", t, depth);
                }
            }
            Value::Dict(d) => {
                let entries = lock(d).clone();
                out.push('{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    let _ = write!(out, "range({}, {})", start, stop);
                } else {
                    let _ = write!(out, "range({}, {}, {})", start, stop, step);
                }
            }
            Value::Function(f) => {
                let _ = write!(out, "<function {}>", f.def.name);
            }
            Value::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name());
            }
            Value::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name());
            }
            Value::Method(_, name) => {
                let _ = write!(out, "<method {}>", name);
            }
        }
    }
}

fn write_seq(out: &mut String, open: &str, close: &str, items: &[Value], depth: usize) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
    out.push_str(close);
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        (if f > 0.0 { "inf" } else { "-inf" }).to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Element `i` of a range; wraps like the i128 value truncated to i64
pub fn range_item(start: i64, step: i64, i: i64) -> i64 {
    start.wrapping_add(step.wrapping_mul(i))
}

pub fn range_len(start: i64, stop: i64, step: i64) -> usize {
    if step > 0 && start < stop {
        ((stop as i128 - start as i128 - 1) / step as i128 + 1) as usize
    } else if step < 0 && start > stop {
        ((start as i128 - stop as i128 - 1) / (-(step as i128)) + 1) as usize
    } else {
        0
    }
}

/// Python `==`
pub fn py_eq(a: &Value, b: &Value) -> bool {
    eq_depth(a, b, 0)
}

fn eq_depth(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_NESTING {
        return false;
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        _ if a.is_numeric() && b.is_numeric() => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            let xs = lock(x).clone();
            let ys = lock(y).clone();
            seq_eq(&xs, &ys, depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_eq(x, y, depth),
        (Value::Dict(x), Value::Dict(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            let xs = lock(x).clone();
            let ys = lock(y).clone();
            xs.len() == ys.len()
                && xs.iter().all(|(k, v)| {
                    ys.iter()
                        .find(|(k2, _)| eq_depth(k, k2, depth + 1))
                        .is_some_and(|(_, v2)| eq_depth(v, v2, depth + 1))
                })
        }
        (
            Value::Range { start, stop, step },
            Value::Range {
                start: s2,
                stop: e2,
                step: st2,
            },
        ) => start == s2 && stop == e2 && step == st2,
        (Value::Function(x), Value::Function(y)) => Arc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

fn seq_eq(xs: &[Value], ys: &[Value], depth: usize) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| eq_depth(x, y, depth + 1))
}

/// Python ordering for `<`, `sorted`, `min` and `max`.
///
/// Returns `Ok(None)` for unordered float comparisons (NaN).
pub fn py_cmp(a: &Value, b: &Value) -> Result<Option<Ordering>, ScriptError> {
    cmp_depth(a, b, 0)
}

fn cmp_depth(a: &Value, b: &Value, depth: usize) -> Result<Option<Ordering>, ScriptError> {
    if depth > MAX_NESTING {
        return Err(ScriptError::runtime("RecursionError: comparison nested too deeply"));
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return Ok(Some(x.cmp(&y)));
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Ok(x.partial_cmp(&y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let xs = lock(x).clone();
            let ys = lock(y).clone();
            seq_cmp(&xs, &ys, depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y, depth),
        _ => Err(ScriptError::runtime(format!(
            "TypeError: '<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn seq_cmp(xs: &[Value], ys: &[Value], depth: usize) -> Result<Option<Ordering>, ScriptError> {
    for (x, y) in xs.iter().zip(ys) {
        if eq_depth(x, y, depth + 1) {
            continue;
        }
        return cmp_depth(x, y, depth + 1);
    }
    Ok(Some(xs.len().cmp(&ys.len())))
}

/// Python `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => Err(ScriptError::runtime(format!(
                "TypeError: 'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::Range { start, stop, step } => Ok(match item.as_int() {
            Some(i) => {
                let in_bounds = if *step > 0 {
                    i >= *start && i < *stop
                } else {
                    i <= *start && i > *stop
                };
                in_bounds && (i - start) % step == 0
            }
            None => false,
        }),
        other => Ok(other.to_vec()?.iter().any(|v| py_eq(v, item))),
    }
}

/// Resolve a possibly negative index against a length
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    if (0..len).contains(&i) {
        Some(i as usize)
    } else {
        None
    }
}

/// Positions selected by a slice, following Python's clamping rules
pub fn slice_positions(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, ScriptError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(ScriptError::runtime("ValueError: slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |v: i64, low: i64, high: i64| -> i64 {
        let v = if v < 0 { v + len } else { v };
        v.clamp(low, high)
    };

    let mut out = Vec::new();
    if step > 0 {
        let start = start.map_or(0, |s| clamp(s, 0, len));
        let stop = stop.map_or(len, |s| clamp(s, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let start = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::Float(0.5).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::new_list(vec![]).unwrap().truthy());
        assert!(Value::new_tuple(vec![Value::None]).truthy());
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert!(py_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(!py_eq(&Value::Int(1), &Value::str("1")));
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_repr_nested() {
        let inner = Value::new_list(vec![Value::Int(1), Value::str("a")]).unwrap();
        let outer = Value::new_tuple(vec![inner, Value::None]);
        assert_eq!(outer.repr(), "([1, 'a'], None)");
    }

    #[test]
    fn test_self_referencing_list_does_not_hang() {
        let list = Value::new_list(vec![]).unwrap();
        if let Value::List(l) = &list {
            lock(l).push(list.clone());
        }
        assert!(list.repr().contains("..."));
        assert!(py_eq(&list, &list));
    }

    #[test]
    fn test_slices() {
        assert_eq!(slice_positions(5, Some(1), None, None).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(slice_positions(5, None, Some(-1), None).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(slice_positions(5, None, None, Some(-2)).unwrap(), vec![4, 2, 0]);
        assert!(slice_positions(5, None, None, Some(0)).is_err());
        assert_eq!(slice_positions(5, Some(1), None, Some(i64::MAX)).unwrap(), vec![1]);
        assert_eq!(slice_positions(5, Some(-1), None, Some(i64::MIN)).unwrap(), vec![4]);
        assert_eq!(slice_positions(5, Some(i64::MIN), Some(i64::MAX), Some(i64::MAX)).unwrap(), vec![0]);
    }

    #[test]
    fn test_range_len_and_contains() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -1), 10);
        assert_eq!(range_len(5, 5, 1), 0);
        let r = Value::Range {
            start: 0,
            stop: 10,
            step: 2,
        };
        assert!(contains(&r, &Value::Int(4)).unwrap());
        assert!(!contains(&r, &Value::Int(5)).unwrap());

        let wide = Value::Range {
            start: i64::MIN,
            stop: i64::MAX,
            step: i64::MAX,
        };
        let items: Vec<i64> = wide
            .to_vec()
            .unwrap()
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(items, vec![i64::MIN, -1, i64::MAX - 1]);
        assert_eq!(range_item(0, i64::MAX, 2), -2);
    }

    #[test]
    fn test_container_cap() {
        let items = vec![Value::None; MAX_CONTAINER_LEN + 1];
        assert!(Value::new_list(items).is_err());
    }

    #[test]
    fn test_dict_rejects_list_keys() {
        let key = Value::new_list(vec![]).unwrap();
        assert!(Value::new_dict(vec![(key, Value::None)]).is_err());
    }
}
