// Operator library
//
// Every Call node names one of these operators. Each entry declares its
// arity and how the result type follows from the argument types; the
// document assembler and the reference engine both go through `infer`.

use crate::schema::{PrimitiveKind, TypeDescriptor};
use thiserror::Error;

/// Errors from operator lookup and argument typing
#[derive(Debug, Error, PartialEq)]
pub enum OpError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Operator '{op}' expects {expected} argument(s), found {found}")]
    Arity {
        op: String,
        expected: String,
        found: usize,
    },

    #[error("Operator '{op}' argument {index}: expected {expected}, found {found}")]
    ArgumentType {
        op: String,
        index: usize,
        expected: String,
        found: String,
    },
}

/// Declared argument count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn admits(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// How the result type is derived from argument types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRule {
    /// Numeric arguments, result is the widest of them
    WidestNumeric,
    /// Numeric arguments, double result
    NumericToDouble,
    /// Two numeric or two string arguments, boolean result
    Ordering,
    /// Two arguments of the same type (or both numeric), boolean result
    Equality,
    /// Boolean arguments, boolean result
    Logical,
    /// Array or map of numbers, same container of doubles
    Normalize,
    /// Array of numbers, int index
    ArgMax,
    /// Array of numbers, double result
    ArrayMean,
    /// Array of numbers, element type result
    ArraySum,
    /// (array of T, int) -> T
    ArrayGet,
    /// (array of T, T) -> int
    ArrayCount,
    /// (map of T, string) -> T
    MapGet,
}

/// Operator signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub arity: Arity,
    pub rule: TypeRule,
}

const fn sig(name: &'static str, arity: Arity, rule: TypeRule) -> Signature {
    Signature { name, arity, rule }
}

/// The full operator library
pub const LIBRARY: &[Signature] = &[
    // Arithmetic
    sig("+", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("-", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("*", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("/", Arity::Exact(2), TypeRule::NumericToDouble),
    sig("**", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("%", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("u-", Arity::Exact(1), TypeRule::WidestNumeric),
    // Comparison
    sig("==", Arity::Exact(2), TypeRule::Equality),
    sig("!=", Arity::Exact(2), TypeRule::Equality),
    sig("<", Arity::Exact(2), TypeRule::Ordering),
    sig("<=", Arity::Exact(2), TypeRule::Ordering),
    sig(">", Arity::Exact(2), TypeRule::Ordering),
    sig(">=", Arity::Exact(2), TypeRule::Ordering),
    // Logical
    sig("&&", Arity::Exact(2), TypeRule::Logical),
    sig("||", Arity::Exact(2), TypeRule::Logical),
    sig("!", Arity::Exact(1), TypeRule::Logical),
    // Math
    sig("m.exp", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.ln", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.sqrt", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.abs", Arity::Exact(1), TypeRule::WidestNumeric),
    sig("m.floor", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.ceil", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.round", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.max", Arity::Exact(2), TypeRule::WidestNumeric),
    sig("m.min", Arity::Exact(2), TypeRule::WidestNumeric),
    // Inverse link functions
    sig("m.link.logit", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.link.probit", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.link.cloglog", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.link.cauchit", Arity::Exact(1), TypeRule::NumericToDouble),
    sig("m.link.softmax", Arity::Exact(1), TypeRule::Normalize),
    // Arrays and maps
    sig("a.argmax", Arity::Exact(1), TypeRule::ArgMax),
    sig("a.mean", Arity::Exact(1), TypeRule::ArrayMean),
    sig("a.sum", Arity::Exact(1), TypeRule::ArraySum),
    sig("a.get", Arity::Exact(2), TypeRule::ArrayGet),
    sig("a.count", Arity::Exact(2), TypeRule::ArrayCount),
    sig("map.get", Arity::Exact(2), TypeRule::MapGet),
];

/// Look up an operator by name
pub fn signature(name: &str) -> Option<&'static Signature> {
    LIBRARY.iter().find(|s| s.name == name)
}

/// Infer the result type of applying `op` to arguments of the given types
pub fn infer(op: &str, args: &[TypeDescriptor]) -> Result<TypeDescriptor, OpError> {
    let signature = signature(op).ok_or_else(|| OpError::UnknownOperator(op.to_string()))?;
    if !signature.arity.admits(args.len()) {
        return Err(OpError::Arity {
            op: op.to_string(),
            expected: signature.arity.to_string(),
            found: args.len(),
        });
    }

    let mismatch = |index: usize, expected: &str| OpError::ArgumentType {
        op: op.to_string(),
        index,
        expected: expected.to_string(),
        found: args[index].to_string(),
    };

    match signature.rule {
        TypeRule::WidestNumeric => {
            let mut widest = args[0].clone();
            if !widest.is_numeric() {
                return Err(mismatch(0, "number"));
            }
            for (i, arg) in args.iter().enumerate().skip(1) {
                widest = TypeDescriptor::widest_numeric(&widest, arg)
                    .ok_or_else(|| mismatch(i, "number"))?;
            }
            Ok(widest)
        }
        TypeRule::NumericToDouble => {
            for (i, arg) in args.iter().enumerate() {
                if !arg.is_numeric() {
                    return Err(mismatch(i, "number"));
                }
            }
            Ok(TypeDescriptor::double())
        }
        TypeRule::Ordering => {
            let both_numeric = args[0].is_numeric() && args[1].is_numeric();
            let both_strings = args[0] == TypeDescriptor::string() && args[1] == TypeDescriptor::string();
            if both_numeric || both_strings {
                Ok(TypeDescriptor::boolean())
            } else {
                Err(mismatch(1, &format!("comparable with {}", args[0])))
            }
        }
        TypeRule::Equality => {
            let both_numeric = args[0].is_numeric() && args[1].is_numeric();
            if both_numeric || args[0].matches_structurally(&args[1]) {
                Ok(TypeDescriptor::boolean())
            } else {
                Err(mismatch(1, &args[0].to_string()))
            }
        }
        TypeRule::Logical => {
            for (i, arg) in args.iter().enumerate() {
                if arg.primitive_kind() != Some(PrimitiveKind::Boolean) {
                    return Err(mismatch(i, "boolean"));
                }
            }
            Ok(TypeDescriptor::boolean())
        }
        TypeRule::Normalize => match &args[0] {
            TypeDescriptor::Array(items) if items.is_numeric() => {
                Ok(TypeDescriptor::array(TypeDescriptor::double()))
            }
            TypeDescriptor::Map(values) if values.is_numeric() => {
                Ok(TypeDescriptor::map(TypeDescriptor::double()))
            }
            _ => Err(mismatch(0, "array or map of numbers")),
        },
        TypeRule::ArgMax => match &args[0] {
            TypeDescriptor::Array(items) if items.is_numeric() => Ok(TypeDescriptor::int()),
            _ => Err(mismatch(0, "array of numbers")),
        },
        TypeRule::ArrayMean => match &args[0] {
            TypeDescriptor::Array(items) if items.is_numeric() => Ok(TypeDescriptor::double()),
            _ => Err(mismatch(0, "array of numbers")),
        },
        TypeRule::ArraySum => match &args[0] {
            TypeDescriptor::Array(items) if items.is_numeric() => Ok((**items).clone()),
            _ => Err(mismatch(0, "array of numbers")),
        },
        TypeRule::ArrayGet => {
            let items = match &args[0] {
                TypeDescriptor::Array(items) => items,
                _ => return Err(mismatch(0, "array")),
            };
            if !TypeDescriptor::long().accepts(&args[1]) {
                return Err(mismatch(1, "int or long"));
            }
            Ok((**items).clone())
        }
        TypeRule::ArrayCount => {
            let items = match &args[0] {
                TypeDescriptor::Array(items) => items,
                _ => return Err(mismatch(0, "array")),
            };
            if !items.accepts(&args[1]) {
                return Err(mismatch(1, &items.to_string()));
            }
            Ok(TypeDescriptor::int())
        }
        TypeRule::MapGet => {
            let values = match &args[0] {
                TypeDescriptor::Map(values) => values,
                _ => return Err(mismatch(0, "map")),
            };
            if args[1] != TypeDescriptor::string() {
                return Err(mismatch(1, "string"));
            }
            Ok((**values).clone())
        }
    }
}
