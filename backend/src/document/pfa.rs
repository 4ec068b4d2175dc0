// PFA encoding
//
// Document -> PFA JSON. References to input fields encode as `input.<field>`,
// cell references as {"cell": name}, local bindings as bare names. Let
// bindings become one `let` statement each inside a `do` block, so later
// bindings see earlier ones.

use crate::document::{Cell, Document};
use crate::expr::ExprNode;
use crate::schema::{PrimitiveKind, TypeDescriptor};
use serde_json::{json, Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Encode a document as a PFA JSON value
pub fn encode_document(doc: &Document) -> JsonValue {
    let mut encoder = Encoder::new(doc.input(), doc.cells());
    let action: Vec<JsonValue> = doc.action().iter().map(|e| encoder.expr(e)).collect();

    let mut out = Map::new();
    out.insert("name".to_string(), JsonValue::String(doc.name().to_string()));
    out.insert("input".to_string(), doc.input().to_json());
    out.insert("output".to_string(), doc.output().to_json());
    out.insert("action".to_string(), JsonValue::Array(action));

    if !doc.cells().is_empty() {
        let cells: Map<String, JsonValue> = doc
            .cells()
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    json!({"type": c.ty.to_json(), "init": c.init}),
                )
            })
            .collect();
        out.insert("cells".to_string(), JsonValue::Object(cells));
    }
    if !doc.metadata().is_empty() {
        out.insert("metadata".to_string(), json!(doc.metadata()));
    }
    JsonValue::Object(out)
}

struct Encoder<'a> {
    input: &'a TypeDescriptor,
    cells: &'a [Cell],
    locals: Vec<String>,
}

impl<'a> Encoder<'a> {
    fn new(input: &'a TypeDescriptor, cells: &'a [Cell]) -> Self {
        Self {
            input,
            cells,
            locals: Vec::new(),
        }
    }

    fn reference(&self, symbol: &str) -> JsonValue {
        if self.locals.iter().any(|l| l == symbol) {
            JsonValue::String(symbol.to_string())
        } else if self.input.field(symbol).is_some() {
            JsonValue::String(format!("input.{}", symbol))
        } else if self.cells.iter().any(|c| c.name == symbol) {
            json!({ "cell": symbol })
        } else {
            JsonValue::String(symbol.to_string())
        }
    }

    fn expr(&mut self, expr: &ExprNode) -> JsonValue {
        match expr {
            ExprNode::Literal { value, ty } => literal(value, ty),

            ExprNode::Ref(symbol) => self.reference(symbol),

            // Element and entry access are attribute paths in PFA
            ExprNode::Call { op, args } if (op == "a.get" || op == "map.get") && args.len() == 2 => {
                json!({
                    "attr": self.expr(&args[0]),
                    "path": [self.expr(&args[1])],
                })
            }

            ExprNode::Call { op, args } => {
                let args: Vec<JsonValue> = args.iter().map(|a| self.expr(a)).collect();
                let mut call = Map::new();
                call.insert(op.clone(), JsonValue::Array(args));
                JsonValue::Object(call)
            }

            ExprNode::Let { bindings, body } => {
                let depth = self.locals.len();
                let mut statements = Vec::with_capacity(bindings.len() + 1);
                for (name, value) in bindings {
                    let value = self.expr(value);
                    let mut binding = Map::new();
                    binding.insert(name.clone(), value);
                    statements.push(json!({ "let": binding }));
                    self.locals.push(name.clone());
                }
                match body.as_ref() {
                    ExprNode::Block(inner) => {
                        for statement in inner {
                            statements.push(self.expr(statement));
                        }
                    }
                    other => statements.push(self.expr(other)),
                }
                self.locals.truncate(depth);
                json!({ "do": statements })
            }

            ExprNode::If {
                cond,
                then,
                otherwise,
            } => {
                let mut out = Map::new();
                out.insert("if".to_string(), self.expr(cond));
                out.insert("then".to_string(), JsonValue::Array(vec![self.expr(then)]));
                if let Some(otherwise) = otherwise {
                    out.insert("else".to_string(), JsonValue::Array(vec![self.expr(otherwise)]));
                }
                JsonValue::Object(out)
            }

            ExprNode::Block(statements) => {
                let statements: Vec<JsonValue> = statements.iter().map(|s| self.expr(s)).collect();
                json!({ "do": statements })
            }

            ExprNode::NewArray { items, ty } => {
                let items: Vec<JsonValue> = items.iter().map(|i| self.expr(i)).collect();
                json!({ "new": items, "type": ty.to_json() })
            }

            ExprNode::NewMap { entries, ty } => {
                let mut values = Map::new();
                for (key, value) in entries {
                    let value = self.expr(value);
                    values.insert(key.clone(), value);
                }
                json!({ "new": values, "type": ty.to_json() })
            }
        }
    }
}

/// Type-tagged literal
fn literal(value: &JsonValue, ty: &TypeDescriptor) -> JsonValue {
    match ty.primitive_kind() {
        Some(PrimitiveKind::Null) => JsonValue::Null,
        Some(PrimitiveKind::Boolean) => value.clone(),
        Some(kind) => {
            let mut tagged = Map::new();
            tagged.insert(kind.name().to_string(), value.clone());
            JsonValue::Object(tagged)
        }
        None => json!({ "type": ty.to_json(), "value": value }),
    }
}

/// SHA-256 over the key-sorted serialization of `value`
pub fn fingerprint(value: &JsonValue) -> String {
    let canonical = canonicalize(value.clone());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let sorted: BTreeMap<String, JsonValue> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            JsonValue::Object(sorted.into_iter().collect())
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::assemble;

    fn doc(action: Vec<ExprNode>, output: TypeDescriptor, cells: Vec<Cell>) -> Document {
        let input = TypeDescriptor::record("Input", [("x", TypeDescriptor::double())]);
        assemble("test", input, output, action, cells).unwrap()
    }

    #[test]
    fn test_references_by_kind() {
        let cells = vec![Cell::new("w", TypeDescriptor::double(), json!(2.0))];
        let action = vec![ExprNode::let_in(
            vec![(
                "y".to_string(),
                ExprNode::call("*", vec![ExprNode::reference("x"), ExprNode::reference("w")]),
            )],
            ExprNode::reference("y"),
        )];
        let encoded = encode_document(&doc(action, TypeDescriptor::double(), cells));
        assert_eq!(
            encoded["action"][0],
            json!({"do": [
                {"let": {"y": {"*": ["input.x", {"cell": "w"}]}}},
                "y"
            ]})
        );
        assert_eq!(encoded["cells"]["w"]["type"], json!("double"));
    }

    #[test]
    fn test_literals_are_tagged() {
        let action = vec![ExprNode::call("+", vec![ExprNode::int(2), ExprNode::int(2)])];
        let encoded = encode_document(&doc(action, TypeDescriptor::int(), vec![]));
        assert_eq!(encoded["action"][0], json!({"+": [{"int": 2}, {"int": 2}]}));
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = json!({"b": 1, "a": [{"d": 2, "c": 3}]});
        let b = json!({"a": [{"c": 3, "d": 2}], "b": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_array_get_becomes_attr_path() {
        let labels = ExprNode::Literal {
            value: json!(["a", "b"]),
            ty: TypeDescriptor::array(TypeDescriptor::string()),
        };
        let action = vec![ExprNode::call("a.get", vec![labels, ExprNode::int(1)])];
        let encoded = encode_document(&doc(action, TypeDescriptor::string(), vec![]));
        assert_eq!(
            encoded["action"][0],
            json!({"attr": {"type": {"type": "array", "items": "string"}, "value": ["a", "b"]}, "path": [{"int": 1}]})
        );
    }
}
