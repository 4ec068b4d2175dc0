//! Schema descriptors
//!
//! Avro-style type nodes used for document input/output schemas, literal
//! tagging, and cell declarations.
//!
//! # Encoding
//!
//! Types encode to the Avro JSON form used by PFA documents:
//! - primitives as bare strings (`"double"`, `"string"`, ...)
//! - records as `{"type": "record", "name": ..., "fields": [...]}`
//! - enums as `{"type": "enum", "name": ..., "symbols": [...]}`
//! - arrays as `{"type": "array", "items": ...}`
//! - maps as `{"type": "map", "values": ...}`
//! - unions as a JSON array of alternatives

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors raised when a type descriptor violates its structural invariants
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Record '{record}' declares field '{field}' more than once")]
    DuplicateField { record: String, field: String },

    #[error("Enum '{name}' declares symbol '{symbol}' more than once")]
    DuplicateSymbol { name: String, symbol: String },

    #[error("Union lists alternative {0} more than once")]
    DuplicateUnionBranch(String),

    #[error("Unknown type name: {0}")]
    UnknownType(String),

    #[error("Malformed type descriptor: {0}")]
    Malformed(String),

    #[error("Invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },
}

// ============================================================================
// NAMES
// ============================================================================

/// Whether `name` matches `[A-Za-z_][A-Za-z0-9_]*`
///
/// Record fields, enum symbols and action-local symbols all follow this rule.
pub fn is_avro_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Closest valid name: every other character becomes `_`, and a leading
/// digit gets a `_` prefix
///
/// ```rust
/// use pfa_export_core_rs::schema::avro_name;
///
/// assert_eq!(avro_name("Sepal.Length"), "Sepal_Length");
/// assert_eq!(avro_name("x1:x2"), "x1_x2");
/// assert_eq!(avro_name("2nd"), "_2nd");
/// ```
pub fn avro_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        out.insert(0, '_');
    }
    out
}

/// Record and enum names may carry a dotted namespace
fn is_full_name(name: &str) -> bool {
    name.split('.').all(is_avro_name)
}

fn check_name(kind: &'static str, name: &str, valid: fn(&str) -> bool) -> Result<(), SchemaError> {
    if valid(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

// ============================================================================
// PRIMITIVES
// ============================================================================

/// Primitive Avro kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Null => "null",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(PrimitiveKind::Null),
            "boolean" => Some(PrimitiveKind::Boolean),
            "int" => Some(PrimitiveKind::Int),
            "long" => Some(PrimitiveKind::Long),
            "float" => Some(PrimitiveKind::Float),
            "double" => Some(PrimitiveKind::Double),
            "string" => Some(PrimitiveKind::String),
            _ => None,
        }
    }

    /// Promotion rank for numeric kinds (int < long < float < double)
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            PrimitiveKind::Int => Some(0),
            PrimitiveKind::Long => Some(1),
            PrimitiveKind::Float => Some(2),
            PrimitiveKind::Double => Some(3),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }
}

// ============================================================================
// TYPE DESCRIPTORS
// ============================================================================

/// A named record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Free-text annotation, encoded as the Avro `doc` attribute
    pub doc: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// Type node for schemas, literals and cells
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Primitive(PrimitiveKind),
    Record { name: String, fields: Vec<Field> },
    Enum { name: String, symbols: Vec<String> },
    Array(Box<TypeDescriptor>),
    /// String-keyed map
    Map(Box<TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn null() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Null)
    }

    pub fn boolean() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Boolean)
    }

    pub fn int() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Int)
    }

    pub fn long() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Long)
    }

    pub fn double() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::Double)
    }

    pub fn string() -> Self {
        TypeDescriptor::Primitive(PrimitiveKind::String)
    }

    pub fn array(items: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(items))
    }

    pub fn map(values: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(values))
    }

    /// Build a record type from `(field name, type)` pairs
    pub fn record<N, I>(name: impl Into<String>, fields: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeDescriptor)>,
    {
        TypeDescriptor::Record {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(n, ty)| Field::new(n, ty))
                .collect(),
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            TypeDescriptor::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive_kind().map_or(false, |k| k.is_numeric())
    }

    /// Record type from fully built fields
    pub fn record_of(name: impl Into<String>, fields: Vec<Field>) -> Self {
        TypeDescriptor::Record {
            name: name.into(),
            fields,
        }
    }

    /// Look up a record field type
    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Record { fields, .. } => {
                fields.iter().find(|f| f.name == name).map(|f| &f.ty)
            }
            _ => None,
        }
    }

    /// Wider of two numeric types, `None` if either is not numeric
    pub fn widest_numeric(a: &TypeDescriptor, b: &TypeDescriptor) -> Option<TypeDescriptor> {
        let ka = a.primitive_kind()?;
        let kb = b.primitive_kind()?;
        let ra = ka.numeric_rank()?;
        let rb = kb.numeric_rank()?;
        Some(TypeDescriptor::Primitive(if ra >= rb { ka } else { kb }))
    }

    /// Check structural invariants recursively
    ///
    /// Names must be valid Avro names. Enum symbols and record field names
    /// must be unique, union alternatives pairwise distinct.
    pub fn check(&self) -> Result<(), SchemaError> {
        match self {
            TypeDescriptor::Primitive(_) => Ok(()),
            TypeDescriptor::Record { name, fields } => {
                check_name("record", name, is_full_name)?;
                let mut seen = HashSet::new();
                for field in fields {
                    check_name("field", &field.name, is_avro_name)?;
                    if !seen.insert(field.name.as_str()) {
                        return Err(SchemaError::DuplicateField {
                            record: name.clone(),
                            field: field.name.clone(),
                        });
                    }
                    field.ty.check()?;
                }
                Ok(())
            }
            TypeDescriptor::Enum { name, symbols } => {
                check_name("enum", name, is_full_name)?;
                let mut seen = HashSet::new();
                for symbol in symbols {
                    check_name("enum symbol", symbol, is_avro_name)?;
                    if !seen.insert(symbol.as_str()) {
                        return Err(SchemaError::DuplicateSymbol {
                            name: name.clone(),
                            symbol: symbol.clone(),
                        });
                    }
                }
                Ok(())
            }
            TypeDescriptor::Array(items) => items.check(),
            TypeDescriptor::Map(values) => values.check(),
            TypeDescriptor::Union(alternatives) => {
                for (i, alt) in alternatives.iter().enumerate() {
                    if alternatives[..i].contains(alt) {
                        return Err(SchemaError::DuplicateUnionBranch(alt.to_string()));
                    }
                    alt.check()?;
                }
                Ok(())
            }
        }
    }

    /// Whether a value of type `other` may be used where `self` is expected
    ///
    /// Numeric promotion follows Avro (double accepts float, long and int;
    /// float accepts long and int; long accepts int). Unions accept any of
    /// their alternatives.
    pub fn accepts(&self, other: &TypeDescriptor) -> bool {
        match (self, other) {
            (TypeDescriptor::Primitive(a), TypeDescriptor::Primitive(b)) => {
                match (a.numeric_rank(), b.numeric_rank()) {
                    (Some(ra), Some(rb)) => ra >= rb,
                    _ => a == b,
                }
            }
            (TypeDescriptor::Array(a), TypeDescriptor::Array(b)) => a.accepts(b),
            (TypeDescriptor::Map(a), TypeDescriptor::Map(b)) => a.accepts(b),
            (TypeDescriptor::Record { .. }, TypeDescriptor::Record { .. })
            | (TypeDescriptor::Enum { .. }, TypeDescriptor::Enum { .. }) => {
                self.matches_structurally(other)
            }
            (TypeDescriptor::Union(alts), TypeDescriptor::Union(others)) => others
                .iter()
                .all(|o| alts.iter().any(|a| a.accepts(o))),
            (TypeDescriptor::Union(alts), _) => alts.iter().any(|a| a.accepts(other)),
            _ => false,
        }
    }

    /// Exact structural compatibility, used for output-type checks
    ///
    /// Primitives must match exactly; records field-wise by name and order;
    /// arrays and maps element-wise; a union matches a non-union type it
    /// lists as an alternative.
    pub fn matches_structurally(&self, other: &TypeDescriptor) -> bool {
        match (self, other) {
            (TypeDescriptor::Primitive(a), TypeDescriptor::Primitive(b)) => a == b,
            (
                TypeDescriptor::Record { fields: fa, .. },
                TypeDescriptor::Record { fields: fb, .. },
            ) => {
                fa.len() == fb.len()
                    && fa
                        .iter()
                        .zip(fb)
                        .all(|(a, b)| a.name == b.name && a.ty.matches_structurally(&b.ty))
            }
            (
                TypeDescriptor::Enum {
                    name: na,
                    symbols: sa,
                },
                TypeDescriptor::Enum {
                    name: nb,
                    symbols: sb,
                },
            ) => na == nb && sa == sb,
            (TypeDescriptor::Array(a), TypeDescriptor::Array(b)) => a.matches_structurally(b),
            (TypeDescriptor::Map(a), TypeDescriptor::Map(b)) => a.matches_structurally(b),
            (TypeDescriptor::Union(a), TypeDescriptor::Union(b)) => {
                a.len() == b.len() && b.iter().all(|t| a.iter().any(|s| s.matches_structurally(t)))
            }
            (TypeDescriptor::Union(alts), _) => alts.iter().any(|a| a.matches_structurally(other)),
            _ => false,
        }
    }

    /// Whether a JSON datum conforms to this type
    pub fn conforms(&self, value: &JsonValue) -> bool {
        match self {
            TypeDescriptor::Primitive(kind) => match kind {
                PrimitiveKind::Null => value.is_null(),
                PrimitiveKind::Boolean => value.is_boolean(),
                PrimitiveKind::Int => value
                    .as_i64()
                    .map_or(false, |v| i32::try_from(v).is_ok()),
                PrimitiveKind::Long => value.is_i64(),
                PrimitiveKind::Float | PrimitiveKind::Double => value.is_number(),
                PrimitiveKind::String => value.is_string(),
            },
            TypeDescriptor::Record { fields, .. } => match value.as_object() {
                Some(obj) => fields.iter().all(|f| {
                    obj.get(&f.name)
                        .map_or(false, |v| f.ty.conforms(v))
                }),
                None => false,
            },
            TypeDescriptor::Enum { symbols, .. } => value
                .as_str()
                .map_or(false, |s| symbols.iter().any(|sym| sym == s)),
            TypeDescriptor::Array(items) => value
                .as_array()
                .map_or(false, |arr| arr.iter().all(|v| items.conforms(v))),
            TypeDescriptor::Map(values) => value
                .as_object()
                .map_or(false, |obj| obj.values().all(|v| values.conforms(v))),
            TypeDescriptor::Union(alternatives) => alternatives.iter().any(|a| a.conforms(value)),
        }
    }

    // ========================================================================
    // AVRO JSON ENCODING
    // ========================================================================

    pub fn to_json(&self) -> JsonValue {
        match self {
            TypeDescriptor::Primitive(kind) => JsonValue::String(kind.name().to_string()),
            TypeDescriptor::Record { name, fields } => json!({
                "type": "record",
                "name": name,
                "fields": fields
                    .iter()
                    .map(|f| match &f.doc {
                        Some(doc) => json!({"name": f.name, "type": f.ty.to_json(), "doc": doc}),
                        None => json!({"name": f.name, "type": f.ty.to_json()}),
                    })
                    .collect::<Vec<_>>(),
            }),
            TypeDescriptor::Enum { name, symbols } => json!({
                "type": "enum",
                "name": name,
                "symbols": symbols,
            }),
            TypeDescriptor::Array(items) => json!({"type": "array", "items": items.to_json()}),
            TypeDescriptor::Map(values) => json!({"type": "map", "values": values.to_json()}),
            TypeDescriptor::Union(alternatives) => {
                JsonValue::Array(alternatives.iter().map(|a| a.to_json()).collect())
            }
        }
    }

    pub fn from_json(value: &JsonValue) -> Result<Self, SchemaError> {
        match value {
            JsonValue::String(name) => PrimitiveKind::from_name(name)
                .map(TypeDescriptor::Primitive)
                .ok_or_else(|| SchemaError::UnknownType(name.clone())),
            JsonValue::Array(alternatives) => {
                let alts = alternatives
                    .iter()
                    .map(TypeDescriptor::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypeDescriptor::Union(alts))
            }
            JsonValue::Object(obj) => {
                let kind = obj
                    .get("type")
                    .ok_or_else(|| SchemaError::Malformed("missing \"type\"".to_string()))?;
                let kind_name = match kind {
                    JsonValue::String(s) => s.as_str(),
                    // {"type": {...}} wraps a nested descriptor
                    other => return TypeDescriptor::from_json(other),
                };
                match kind_name {
                    "record" => {
                        let name = required_str(obj, "name")?;
                        let fields = obj
                            .get("fields")
                            .and_then(|f| f.as_array())
                            .ok_or_else(|| {
                                SchemaError::Malformed(format!("record '{}' has no fields", name))
                            })?
                            .iter()
                            .map(|f| {
                                let field_obj = f.as_object().ok_or_else(|| {
                                    SchemaError::Malformed("field is not an object".to_string())
                                })?;
                                let field_name = required_str(field_obj, "name")?;
                                let ty = field_obj.get("type").ok_or_else(|| {
                                    SchemaError::Malformed(format!(
                                        "field '{}' has no type",
                                        field_name
                                    ))
                                })?;
                                let field = Field::new(field_name, TypeDescriptor::from_json(ty)?);
                                Ok(match field_obj.get("doc").and_then(|d| d.as_str()) {
                                    Some(doc) => field.with_doc(doc),
                                    None => field,
                                })
                            })
                            .collect::<Result<Vec<_>, SchemaError>>()?;
                        Ok(TypeDescriptor::Record { name, fields })
                    }
                    "enum" => {
                        let name = required_str(obj, "name")?;
                        let symbols = obj
                            .get("symbols")
                            .and_then(|s| s.as_array())
                            .ok_or_else(|| {
                                SchemaError::Malformed(format!("enum '{}' has no symbols", name))
                            })?
                            .iter()
                            .map(|s| {
                                s.as_str().map(str::to_string).ok_or_else(|| {
                                    SchemaError::Malformed("enum symbol is not a string".into())
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(TypeDescriptor::Enum { name, symbols })
                    }
                    "array" => {
                        let items = obj.get("items").ok_or_else(|| {
                            SchemaError::Malformed("array has no items".to_string())
                        })?;
                        Ok(TypeDescriptor::array(TypeDescriptor::from_json(items)?))
                    }
                    "map" => {
                        let values = obj.get("values").ok_or_else(|| {
                            SchemaError::Malformed("map has no values".to_string())
                        })?;
                        Ok(TypeDescriptor::map(TypeDescriptor::from_json(values)?))
                    }
                    other => PrimitiveKind::from_name(other)
                        .map(TypeDescriptor::Primitive)
                        .ok_or_else(|| SchemaError::UnknownType(other.to_string())),
                }
            }
            other => Err(SchemaError::Malformed(other.to_string())),
        }
    }
}

fn required_str(
    obj: &serde_json::Map<String, JsonValue>,
    key: &str,
) -> Result<String, SchemaError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SchemaError::Malformed(format!("missing \"{}\"", key)))
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        TypeDescriptor::from_json(&value).map_err(serde::de::Error::custom)
    }
}
