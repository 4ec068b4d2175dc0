// Document interpreter
//
// Evaluates a document's action on a JSON input record. Used by the
// reference engine to smoke-test documents and by tests to check compiled
// predictions numerically against the fitted models.
//
// Numbers follow the operator library: int and long share one integer
// representation, integer arithmetic is checked, `/` always divides as
// doubles (IEEE semantics, so division by zero is infinite), `%` takes the
// sign of the divisor.

use crate::document::Document;
use crate::expr::ExprNode;
use crate::schema::{PrimitiveKind, TypeDescriptor};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_1_SQRT_2, PI};
use thiserror::Error;

/// Errors that can occur while evaluating a document
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Operator '{op}': {message}")]
    TypeError { op: String, message: String },

    #[error("Index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Key not found in map: {0}")]
    MissingKey(String),

    #[error("Integer overflow in '{0}'")]
    Overflow(String),

    #[error("Integer division by zero in '{0}'")]
    DivisionByZero(String),

    #[error("Operator '{0}' applied to an empty array")]
    EmptyArray(String),

    #[error("Input field '{field}': {message}")]
    InvalidInput { field: String, message: String },
}

// ============================================================================
// VALUES
// ============================================================================

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Datum>),
    Map(BTreeMap<String, Datum>),
}

impl Datum {
    /// Decode a JSON value of the given type
    pub fn from_json(value: &JsonValue, ty: &TypeDescriptor) -> Option<Datum> {
        match ty {
            TypeDescriptor::Primitive(kind) => match kind {
                PrimitiveKind::Null => value.is_null().then_some(Datum::Null),
                PrimitiveKind::Boolean => value.as_bool().map(Datum::Boolean),
                PrimitiveKind::Int | PrimitiveKind::Long => value.as_i64().map(Datum::Int),
                PrimitiveKind::Float | PrimitiveKind::Double => value.as_f64().map(Datum::Double),
                PrimitiveKind::String => value.as_str().map(|s| Datum::String(s.to_string())),
            },
            TypeDescriptor::Enum { symbols, .. } => value
                .as_str()
                .filter(|s| symbols.iter().any(|sym| sym == *s))
                .map(|s| Datum::String(s.to_string())),
            TypeDescriptor::Array(items) => value
                .as_array()?
                .iter()
                .map(|v| Datum::from_json(v, items))
                .collect::<Option<Vec<_>>>()
                .map(Datum::Array),
            TypeDescriptor::Map(values) => value
                .as_object()?
                .iter()
                .map(|(k, v)| Datum::from_json(v, values).map(|d| (k.clone(), d)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Datum::Map),
            TypeDescriptor::Record { fields, .. } => {
                let obj = value.as_object()?;
                fields
                    .iter()
                    .map(|f| Datum::from_json(obj.get(&f.name)?, &f.ty).map(|d| (f.name.clone(), d)))
                    .collect::<Option<BTreeMap<_, _>>>()
                    .map(Datum::Map)
            }
            TypeDescriptor::Union(alternatives) => alternatives
                .iter()
                .find_map(|alt| Datum::from_json(value, alt)),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Datum::Null => JsonValue::Null,
            Datum::Boolean(b) => JsonValue::Bool(*b),
            Datum::Int(i) => JsonValue::from(*i),
            Datum::Double(d) => JsonValue::from(*d),
            Datum::String(s) => JsonValue::String(s.clone()),
            Datum::Array(items) => JsonValue::Array(items.iter().map(Datum::to_json).collect()),
            Datum::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    /// Whether this value is a member of `ty`
    ///
    /// Non-finite doubles are doubles.
    pub fn conforms(&self, ty: &TypeDescriptor) -> bool {
        match (self, ty) {
            (_, TypeDescriptor::Union(alternatives)) => alternatives.iter().any(|a| self.conforms(a)),
            (Datum::Null, TypeDescriptor::Primitive(PrimitiveKind::Null)) => true,
            (Datum::Boolean(_), TypeDescriptor::Primitive(PrimitiveKind::Boolean)) => true,
            (Datum::Int(i), TypeDescriptor::Primitive(PrimitiveKind::Int)) => i32::try_from(*i).is_ok(),
            (Datum::Int(_), TypeDescriptor::Primitive(PrimitiveKind::Long)) => true,
            (Datum::Double(_), TypeDescriptor::Primitive(PrimitiveKind::Float))
            | (Datum::Double(_), TypeDescriptor::Primitive(PrimitiveKind::Double)) => true,
            (Datum::String(_), TypeDescriptor::Primitive(PrimitiveKind::String)) => true,
            (Datum::String(s), TypeDescriptor::Enum { symbols, .. }) => symbols.contains(s),
            (Datum::Array(items), TypeDescriptor::Array(element)) => {
                items.iter().all(|i| i.conforms(element))
            }
            (Datum::Map(entries), TypeDescriptor::Map(values)) => {
                entries.values().all(|v| v.conforms(values))
            }
            (Datum::Map(entries), TypeDescriptor::Record { fields, .. }) => fields
                .iter()
                .all(|f| entries.get(&f.name).map_or(false, |v| v.conforms(&f.ty))),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Boolean(_) => "boolean",
            Datum::Int(_) => "int",
            Datum::Double(_) => "double",
            Datum::String(_) => "string",
            Datum::Array(_) => "array",
            Datum::Map(_) => "map",
        }
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Symbol lookup: innermost binding, then input field, then cell
#[derive(Debug, Default)]
struct Env {
    locals: Vec<(String, Datum)>,
    input: BTreeMap<String, Datum>,
    cells: BTreeMap<String, Datum>,
}

impl Env {
    fn lookup(&self, symbol: &str) -> Result<&Datum, EvalError> {
        self.locals
            .iter()
            .rev()
            .find(|(name, _)| name == symbol)
            .map(|(_, d)| d)
            .or_else(|| self.input.get(symbol))
            .or_else(|| self.cells.get(symbol))
            .ok_or_else(|| EvalError::UnboundSymbol(symbol.to_string()))
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Run a document's action on one input record
///
/// # Returns
///
/// The value of the action's last expression, JSON encoded.
pub fn evaluate_document(doc: &Document, input: &JsonValue) -> Result<JsonValue, EvalError> {
    run_document(doc, input).map(|datum| datum.to_json())
}

/// Same as `evaluate_document`, returning the runtime value
pub fn run_document(doc: &Document, input: &JsonValue) -> Result<Datum, EvalError> {
    let record = input.as_object().ok_or_else(|| EvalError::InvalidInput {
        field: "<record>".to_string(),
        message: "input is not a JSON object".to_string(),
    })?;

    let mut env = Env::default();
    if let TypeDescriptor::Record { fields, .. } = doc.input() {
        for field in fields {
            let value = record.get(&field.name).ok_or_else(|| EvalError::InvalidInput {
                field: field.name.clone(),
                message: "missing".to_string(),
            })?;
            let datum = Datum::from_json(value, &field.ty).ok_or_else(|| EvalError::InvalidInput {
                field: field.name.clone(),
                message: format!("{} is not a {}", value, field.ty),
            })?;
            env.input.insert(field.name.clone(), datum);
        }
    }
    for cell in doc.cells() {
        let datum = Datum::from_json(&cell.init, &cell.ty).ok_or_else(|| EvalError::InvalidInput {
            field: cell.name.clone(),
            message: "cell initial value does not match its type".to_string(),
        })?;
        env.cells.insert(cell.name.clone(), datum);
    }

    let mut last = Datum::Null;
    for expr in doc.action() {
        last = eval(expr, &mut env)?;
    }
    Ok(last)
}

/// Evaluate a standalone expression with the given symbols in scope
pub fn evaluate_expression(
    expr: &ExprNode,
    bindings: &BTreeMap<String, Datum>,
) -> Result<Datum, EvalError> {
    let mut env = Env {
        input: bindings.clone(),
        ..Env::default()
    };
    eval(expr, &mut env)
}

// ============================================================================
// EVALUATION
// ============================================================================

fn eval(expr: &ExprNode, env: &mut Env) -> Result<Datum, EvalError> {
    match expr {
        ExprNode::Literal { value, ty } => {
            Datum::from_json(value, ty).ok_or_else(|| EvalError::TypeError {
                op: "literal".to_string(),
                message: format!("{} is not a {}", value, ty),
            })
        }

        ExprNode::Ref(symbol) => env.lookup(symbol).cloned(),

        // Logical operators short-circuit
        ExprNode::Call { op, args } if (op == "&&" || op == "||") && args.len() == 2 => {
            let left = expect_bool(op, eval(&args[0], env)?)?;
            match (op.as_str(), left) {
                ("&&", false) => Ok(Datum::Boolean(false)),
                ("||", true) => Ok(Datum::Boolean(true)),
                _ => Ok(Datum::Boolean(expect_bool(op, eval(&args[1], env)?)?)),
            }
        }

        ExprNode::Call { op, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            apply(op, values)
        }

        ExprNode::Let { bindings, body } => {
            let depth = env.locals.len();
            for (name, value) in bindings {
                let datum = match eval(value, env) {
                    Ok(datum) => datum,
                    Err(e) => {
                        env.locals.truncate(depth);
                        return Err(e);
                    }
                };
                env.locals.push((name.clone(), datum));
            }
            let result = eval(body, env);
            env.locals.truncate(depth);
            result
        }

        ExprNode::If {
            cond,
            then,
            otherwise,
        } => {
            if expect_bool("if", eval(cond, env)?)? {
                eval(then, env)
            } else {
                match otherwise {
                    Some(otherwise) => eval(otherwise, env),
                    None => Ok(Datum::Null),
                }
            }
        }

        ExprNode::Block(statements) => {
            let mut last = Datum::Null;
            for statement in statements {
                last = eval(statement, env)?;
            }
            Ok(last)
        }

        ExprNode::NewArray { items, .. } => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Datum::Array),

        ExprNode::NewMap { entries, .. } => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval(value, env)?);
            }
            Ok(Datum::Map(map))
        }
    }
}

fn type_error(op: &str, message: impl Into<String>) -> EvalError {
    EvalError::TypeError {
        op: op.to_string(),
        message: message.into(),
    }
}

fn expect_bool(op: &str, value: Datum) -> Result<bool, EvalError> {
    match value {
        Datum::Boolean(b) => Ok(b),
        other => Err(type_error(op, format!("expected boolean, found {}", other.kind()))),
    }
}

fn expect_f64(op: &str, value: &Datum) -> Result<f64, EvalError> {
    value
        .as_f64()
        .ok_or_else(|| type_error(op, format!("expected number, found {}", value.kind())))
}

fn expect_array<'d>(op: &str, value: &'d Datum) -> Result<&'d [Datum], EvalError> {
    match value {
        Datum::Array(items) => Ok(items),
        other => Err(type_error(op, format!("expected array, found {}", other.kind()))),
    }
}

/// Integer op when both sides are integers, double op otherwise
fn arithmetic(
    op: &str,
    a: &Datum,
    b: &Datum,
    int_op: fn(i64, i64) -> Option<i64>,
    double_op: fn(f64, f64) -> f64,
) -> Result<Datum, EvalError> {
    match (a, b) {
        (Datum::Int(x), Datum::Int(y)) => int_op(*x, *y)
            .map(Datum::Int)
            .ok_or_else(|| EvalError::Overflow(op.to_string())),
        _ => Ok(Datum::Double(double_op(expect_f64(op, a)?, expect_f64(op, b)?))),
    }
}

fn floored_mod(x: f64, n: f64) -> f64 {
    let r = x % n;
    if r != 0.0 && (r < 0.0) != (n < 0.0) {
        r + n
    } else {
        r
    }
}

fn compare(op: &str, a: &Datum, b: &Datum) -> Result<std::cmp::Ordering, EvalError> {
    match (a, b) {
        (Datum::Int(x), Datum::Int(y)) => Ok(x.cmp(y)),
        (Datum::String(x), Datum::String(y)) => Ok(x.cmp(y)),
        _ => {
            let (x, y) = (expect_f64(op, a)?, expect_f64(op, b)?);
            // NaN compares as unordered; treat it as not less and not greater
            Ok(x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal))
        }
    }
}

fn equal(a: &Datum, b: &Datum) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn unary_double(op: &str, args: &[Datum], f: fn(f64) -> f64) -> Result<Datum, EvalError> {
    Ok(Datum::Double(f(expect_f64(op, &args[0])?)))
}

fn apply(op: &str, args: Vec<Datum>) -> Result<Datum, EvalError> {
    let arity = crate::expr::signature(op)
        .ok_or_else(|| EvalError::UnknownOperator(op.to_string()))?
        .arity;
    if !arity.admits(args.len()) {
        return Err(type_error(op, format!("expects {} argument(s), found {}", arity, args.len())));
    }

    match op {
        "+" => arithmetic(op, &args[0], &args[1], i64::checked_add, |x, y| x + y),
        "-" => arithmetic(op, &args[0], &args[1], i64::checked_sub, |x, y| x - y),
        "*" => arithmetic(op, &args[0], &args[1], i64::checked_mul, |x, y| x * y),
        "/" => Ok(Datum::Double(expect_f64(op, &args[0])? / expect_f64(op, &args[1])?)),
        "**" => match (&args[0], &args[1]) {
            (Datum::Int(base), Datum::Int(exp)) => {
                let exp = u32::try_from(*exp)
                    .map_err(|_| type_error(op, "negative integer exponent"))?;
                base.checked_pow(exp)
                    .map(Datum::Int)
                    .ok_or_else(|| EvalError::Overflow(op.to_string()))
            }
            (a, b) => Ok(Datum::Double(expect_f64(op, a)?.powf(expect_f64(op, b)?))),
        },
        "%" => match (&args[0], &args[1]) {
            (Datum::Int(_), Datum::Int(0)) => Err(EvalError::DivisionByZero(op.to_string())),
            (Datum::Int(x), Datum::Int(n)) => {
                let r = x
                    .checked_rem(*n)
                    .ok_or_else(|| EvalError::Overflow(op.to_string()))?;
                Ok(Datum::Int(if r != 0 && (r < 0) != (*n < 0) { r + n } else { r }))
            }
            (a, b) => Ok(Datum::Double(floored_mod(expect_f64(op, a)?, expect_f64(op, b)?))),
        },
        "u-" => match &args[0] {
            Datum::Int(x) => x
                .checked_neg()
                .map(Datum::Int)
                .ok_or_else(|| EvalError::Overflow(op.to_string())),
            other => Ok(Datum::Double(-expect_f64(op, other)?)),
        },

        "==" => Ok(Datum::Boolean(equal(&args[0], &args[1]))),
        "!=" => Ok(Datum::Boolean(!equal(&args[0], &args[1]))),
        "<" => Ok(Datum::Boolean(compare(op, &args[0], &args[1])?.is_lt())),
        "<=" => Ok(Datum::Boolean(compare(op, &args[0], &args[1])?.is_le() && !has_nan(&args))),
        ">" => Ok(Datum::Boolean(compare(op, &args[0], &args[1])?.is_gt())),
        ">=" => Ok(Datum::Boolean(compare(op, &args[0], &args[1])?.is_ge() && !has_nan(&args))),
        "!" => Ok(Datum::Boolean(!expect_bool(op, args[0].clone())?)),
        "&&" => Ok(Datum::Boolean(
            expect_bool(op, args[0].clone())? && expect_bool(op, args[1].clone())?,
        )),
        "||" => Ok(Datum::Boolean(
            expect_bool(op, args[0].clone())? || expect_bool(op, args[1].clone())?,
        )),

        "m.exp" => unary_double(op, &args, f64::exp),
        "m.ln" => unary_double(op, &args, f64::ln),
        "m.sqrt" => unary_double(op, &args, f64::sqrt),
        "m.floor" => unary_double(op, &args, f64::floor),
        "m.ceil" => unary_double(op, &args, f64::ceil),
        "m.round" => unary_double(op, &args, |x| (x + 0.5).floor()),
        "m.abs" => match &args[0] {
            Datum::Int(x) => x
                .checked_abs()
                .map(Datum::Int)
                .ok_or_else(|| EvalError::Overflow(op.to_string())),
            other => Ok(Datum::Double(expect_f64(op, other)?.abs())),
        },
        "m.max" => arithmetic(op, &args[0], &args[1], |x, y| Some(x.max(y)), f64::max),
        "m.min" => arithmetic(op, &args[0], &args[1], |x, y| Some(x.min(y)), f64::min),

        "m.link.logit" => unary_double(op, &args, |x| 1.0 / (1.0 + (-x).exp())),
        "m.link.probit" => unary_double(op, &args, |x| 0.5 * erfc(-x * FRAC_1_SQRT_2)),
        "m.link.cloglog" => unary_double(op, &args, |x| 1.0 - (-x.exp()).exp()),
        "m.link.cauchit" => unary_double(op, &args, |x| 0.5 + x.atan() / PI),
        "m.link.softmax" => softmax(op, &args[0]),

        "a.argmax" => {
            let items = expect_array(op, &args[0])?;
            if items.is_empty() {
                return Err(EvalError::EmptyArray(op.to_string()));
            }
            // NaN never wins; an all-NaN array picks the first element
            let mut best: Option<(usize, f64)> = None;
            for (i, item) in items.iter().enumerate() {
                let value = expect_f64(op, item)?;
                if value.is_nan() {
                    continue;
                }
                // Strict comparison keeps the first of equal maxima
                if best.map_or(true, |(_, b)| value > b) {
                    best = Some((i, value));
                }
            }
            Ok(Datum::Int(best.map_or(0, |(i, _)| i) as i64))
        }
        "a.mean" => {
            let items = expect_array(op, &args[0])?;
            if items.is_empty() {
                return Err(EvalError::EmptyArray(op.to_string()));
            }
            let mut total = 0.0;
            for item in items {
                total += expect_f64(op, item)?;
            }
            Ok(Datum::Double(total / items.len() as f64))
        }
        "a.sum" => {
            let items = expect_array(op, &args[0])?;
            let mut total = Datum::Int(0);
            for item in items {
                total = arithmetic(op, &total, item, i64::checked_add, |x, y| x + y)?;
            }
            Ok(total)
        }
        "a.get" => {
            let items = expect_array(op, &args[0])?;
            let index = match &args[1] {
                Datum::Int(i) => *i,
                other => return Err(type_error(op, format!("expected int index, found {}", other.kind()))),
            };
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or(EvalError::IndexOutOfRange {
                    index,
                    len: items.len(),
                })
        }
        "a.count" => {
            let items = expect_array(op, &args[0])?;
            let count = items.iter().filter(|item| equal(item, &args[1])).count();
            Ok(Datum::Int(count as i64))
        }
        "map.get" => match (&args[0], &args[1]) {
            (Datum::Map(entries), Datum::String(key)) => entries
                .get(key)
                .cloned()
                .ok_or_else(|| EvalError::MissingKey(key.clone())),
            _ => Err(type_error(op, "expected (map, string)")),
        },

        other => Err(EvalError::UnknownOperator(other.to_string())),
    }
}

fn has_nan(args: &[Datum]) -> bool {
    args.iter().any(|a| matches!(a, Datum::Double(d) if d.is_nan()))
}

fn softmax(op: &str, value: &Datum) -> Result<Datum, EvalError> {
    let normalize = |xs: Vec<f64>| -> Vec<f64> {
        let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = xs.iter().map(|x| (x - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    };
    match value {
        Datum::Array(items) => {
            let xs = items
                .iter()
                .map(|i| expect_f64(op, i))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Datum::Array(normalize(xs).into_iter().map(Datum::Double).collect()))
        }
        Datum::Map(entries) => {
            let xs = entries
                .values()
                .map(|v| expect_f64(op, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Datum::Map(
                entries
                    .keys()
                    .cloned()
                    .zip(normalize(xs).into_iter().map(Datum::Double))
                    .collect(),
            ))
        }
        other => Err(type_error(op, format!("expected array or map, found {}", other.kind()))),
    }
}

/// Complementary error function, fractional error below 1.2e-7
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_with(expr: &ExprNode, pairs: &[(&str, Datum)]) -> Result<Datum, EvalError> {
        let bindings = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        evaluate_expression(expr, &bindings)
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let expr = ExprNode::call("+", vec![ExprNode::int(2), ExprNode::int(2)]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Int(4)));
    }

    #[test]
    fn test_integer_overflow_detected() {
        let expr = ExprNode::call("*", vec![ExprNode::long(i64::MAX), ExprNode::int(2)]);
        assert_eq!(eval_with(&expr, &[]), Err(EvalError::Overflow("*".to_string())));
    }

    #[test]
    fn test_division_is_ieee() {
        let expr = ExprNode::call("/", vec![ExprNode::int(1), ExprNode::int(0)]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Double(f64::INFINITY)));
    }

    #[test]
    fn test_modulo_takes_divisor_sign() {
        let expr = ExprNode::call("%", vec![ExprNode::int(-7), ExprNode::int(3)]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Int(2)));
    }

    #[test]
    fn test_argmax_first_of_ties() {
        let scores = ExprNode::new_array(
            vec![ExprNode::double(0.4), ExprNode::double(0.4), ExprNode::double(0.2)],
            TypeDescriptor::double(),
        );
        let expr = ExprNode::call("a.argmax", vec![scores]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Int(0)));
    }

    #[test]
    fn test_argmax_skips_nan() {
        let nan = || ExprNode::call("/", vec![ExprNode::double(0.0), ExprNode::double(0.0)]);
        let scores = ExprNode::new_array(
            vec![nan(), ExprNode::double(0.1), ExprNode::double(0.7)],
            TypeDescriptor::double(),
        );
        let expr = ExprNode::call("a.argmax", vec![scores]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Int(2)));

        let all_nan = ExprNode::new_array(vec![nan(), nan()], TypeDescriptor::double());
        let expr = ExprNode::call("a.argmax", vec![all_nan]);
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Int(0)));
    }

    #[test]
    fn test_short_circuit_skips_unbound() {
        let expr = ExprNode::call(
            "&&",
            vec![ExprNode::boolean(false), ExprNode::reference("missing")],
        );
        assert_eq!(eval_with(&expr, &[]), Ok(Datum::Boolean(false)));
    }

    #[test]
    fn test_link_functions() {
        let logit = ExprNode::call("m.link.logit", vec![ExprNode::double(0.0)]);
        assert_eq!(eval_with(&logit, &[]), Ok(Datum::Double(0.5)));

        let probit = ExprNode::call("m.link.probit", vec![ExprNode::double(1.0)]);
        let value = eval_with(&probit, &[]).unwrap().as_f64().unwrap();
        assert!((value - 0.841_344_746).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let xs = ExprNode::new_array(
            vec![ExprNode::double(1.0), ExprNode::double(2.0), ExprNode::double(3.0)],
            TypeDescriptor::double(),
        );
        let out = eval_with(&ExprNode::call("m.link.softmax", vec![xs]), &[]).unwrap();
        let Datum::Array(items) = out else {
            panic!("expected array");
        };
        let total: f64 = items.iter().filter_map(Datum::as_f64).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_let_and_if() {
        let expr = ExprNode::let_in(
            vec![(
                "y".to_string(),
                ExprNode::call("*", vec![ExprNode::reference("x"), ExprNode::double(2.0)]),
            )],
            ExprNode::if_else(
                ExprNode::call(">", vec![ExprNode::reference("y"), ExprNode::double(1.0)]),
                ExprNode::string("big"),
                ExprNode::string("small"),
            ),
        );
        assert_eq!(
            eval_with(&expr, &[("x", Datum::Double(0.75))]),
            Ok(Datum::String("big".to_string()))
        );
    }

    #[test]
    fn test_array_get_out_of_range() {
        let items = ExprNode::new_array(vec![ExprNode::double(1.0)], TypeDescriptor::double());
        let expr = ExprNode::call("a.get", vec![items, ExprNode::int(3)]);
        assert_eq!(
            eval_with(&expr, &[]),
            Err(EvalError::IndexOutOfRange { index: 3, len: 1 })
        );
    }
}
