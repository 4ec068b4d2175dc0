// Action typing
//
// Scope resolution and type inference over an action graph. A Ref resolves
// to the innermost Let binding, then to an input field, then to a cell.
// Nothing is coerced: a mismatch is an error, never a conversion.

use crate::document::{AssemblyError, Cell};
use crate::expr::{ops, ExprNode, OpError};
use crate::schema::{is_avro_name, TypeDescriptor};

/// Where a symbol resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Input,
    Cell,
}

/// Lexical scope for one action
pub struct Scope<'a> {
    input: &'a TypeDescriptor,
    cells: &'a [Cell],
    locals: Vec<(String, TypeDescriptor)>,
}

impl<'a> Scope<'a> {
    pub fn new(input: &'a TypeDescriptor, cells: &'a [Cell]) -> Self {
        Self {
            input,
            cells,
            locals: Vec::new(),
        }
    }

    /// Resolve a symbol to its binding kind and type
    pub fn resolve(&self, symbol: &str) -> Option<(Binding, &TypeDescriptor)> {
        if let Some((_, ty)) = self.locals.iter().rev().find(|(name, _)| name == symbol) {
            return Some((Binding::Local, ty));
        }
        if let Some(ty) = self.input.field(symbol) {
            return Some((Binding::Input, ty));
        }
        self.cells
            .iter()
            .find(|c| c.name == symbol)
            .map(|c| (Binding::Cell, &c.ty))
    }

    /// Declare a local; a visible local of the same name may not be redeclared
    fn declare(&mut self, name: &str, ty: TypeDescriptor) -> Result<(), AssemblyError> {
        if !is_avro_name(name) {
            return Err(AssemblyError::InvalidBinding {
                name: name.to_string(),
            });
        }
        if self.locals.iter().any(|(local, _)| local == name) {
            return Err(AssemblyError::DuplicateBinding {
                name: name.to_string(),
            });
        }
        self.locals.push((name.to_string(), ty));
        Ok(())
    }

    fn depth(&self) -> usize {
        self.locals.len()
    }

    fn truncate(&mut self, depth: usize) {
        self.locals.truncate(depth);
    }
}

/// Type of the last expression of an action
pub fn infer_action(
    input: &TypeDescriptor,
    cells: &[Cell],
    action: &[ExprNode],
) -> Result<TypeDescriptor, AssemblyError> {
    let mut scope = Scope::new(input, cells);
    let mut last = None;
    for expr in action {
        last = Some(infer(expr, &mut scope)?);
    }
    last.ok_or(AssemblyError::EmptyAction)
}

/// Infer the type of one expression
pub fn infer(expr: &ExprNode, scope: &mut Scope<'_>) -> Result<TypeDescriptor, AssemblyError> {
    match expr {
        ExprNode::Literal { value, ty } => {
            ty.check()?;
            if !ty.conforms(value) {
                return Err(AssemblyError::SchemaMismatch {
                    context: format!("literal {}", value),
                    expected: ty.to_string(),
                    found: json_kind(value).to_string(),
                });
            }
            Ok(ty.clone())
        }

        ExprNode::Ref(symbol) => scope
            .resolve(symbol)
            .map(|(_, ty)| ty.clone())
            .ok_or_else(|| AssemblyError::UnresolvedReference {
                symbol: symbol.clone(),
            }),

        ExprNode::Call { op, args } => {
            let arg_types = args
                .iter()
                .map(|arg| infer(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            ops::infer(op, &arg_types).map_err(AssemblyError::from)
        }

        ExprNode::Let { bindings, body } => {
            let depth = scope.depth();
            let result = infer_let(bindings, body, scope);
            scope.truncate(depth);
            result
        }

        ExprNode::If {
            cond,
            then,
            otherwise,
        } => {
            let cond_ty = infer(cond, scope)?;
            if cond_ty != TypeDescriptor::boolean() {
                return Err(AssemblyError::SchemaMismatch {
                    context: "if condition".to_string(),
                    expected: TypeDescriptor::boolean().to_string(),
                    found: cond_ty.to_string(),
                });
            }
            let then_ty = infer(then, scope)?;
            match otherwise {
                None => Ok(TypeDescriptor::null()),
                Some(otherwise) => {
                    let else_ty = infer(otherwise, scope)?;
                    unify_branches(then_ty, else_ty)
                }
            }
        }

        ExprNode::Block(statements) => {
            let mut last = TypeDescriptor::null();
            for statement in statements {
                last = infer(statement, scope)?;
            }
            Ok(last)
        }

        ExprNode::NewArray { items, ty } => {
            let element = match ty {
                TypeDescriptor::Array(element) => element,
                other => {
                    return Err(AssemblyError::SchemaMismatch {
                        context: "new array".to_string(),
                        expected: "array type".to_string(),
                        found: other.to_string(),
                    })
                }
            };
            for (i, item) in items.iter().enumerate() {
                let item_ty = infer(item, scope)?;
                if !element.accepts(&item_ty) {
                    return Err(AssemblyError::SchemaMismatch {
                        context: format!("array element {}", i),
                        expected: element.to_string(),
                        found: item_ty.to_string(),
                    });
                }
            }
            Ok(ty.clone())
        }

        ExprNode::NewMap { entries, ty } => {
            let values = match ty {
                TypeDescriptor::Map(values) => values,
                other => {
                    return Err(AssemblyError::SchemaMismatch {
                        context: "new map".to_string(),
                        expected: "map type".to_string(),
                        found: other.to_string(),
                    })
                }
            };
            for (key, value) in entries {
                let value_ty = infer(value, scope)?;
                if !values.accepts(&value_ty) {
                    return Err(AssemblyError::SchemaMismatch {
                        context: format!("map entry '{}'", key),
                        expected: values.to_string(),
                        found: value_ty.to_string(),
                    });
                }
            }
            Ok(ty.clone())
        }
    }
}

fn infer_let(
    bindings: &[(String, ExprNode)],
    body: &ExprNode,
    scope: &mut Scope<'_>,
) -> Result<TypeDescriptor, AssemblyError> {
    for (name, value) in bindings {
        let ty = infer(value, scope)?;
        scope.declare(name, ty)?;
    }
    infer(body, scope)
}

/// Branches must agree; two numeric branches widen to the wider one
fn unify_branches(
    then_ty: TypeDescriptor,
    else_ty: TypeDescriptor,
) -> Result<TypeDescriptor, AssemblyError> {
    if then_ty == else_ty {
        return Ok(then_ty);
    }
    TypeDescriptor::widest_numeric(&then_ty, &else_ty).ok_or_else(|| {
        AssemblyError::SchemaMismatch {
            context: "if branches".to_string(),
            expected: then_ty.to_string(),
            found: else_ty.to_string(),
        }
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl From<OpError> for AssemblyError {
    fn from(err: OpError) -> Self {
        match err {
            OpError::UnknownOperator(op) => AssemblyError::UnknownOperator { op },
            OpError::Arity {
                op,
                expected,
                found,
            } => AssemblyError::ArityMismatch {
                op,
                expected,
                found,
            },
            OpError::ArgumentType {
                op,
                index,
                expected,
                found,
            } => AssemblyError::SchemaMismatch {
                context: format!("argument {} of '{}'", index, op),
                expected,
                found,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> TypeDescriptor {
        TypeDescriptor::record(
            "Input",
            [("x", TypeDescriptor::double()), ("n", TypeDescriptor::int())],
        )
    }

    #[test]
    fn test_let_binding_shadows_input() {
        let expr = ExprNode::let_in(
            vec![("x".to_string(), ExprNode::string("s"))],
            ExprNode::reference("x"),
        );
        let input = input();
        let ty = infer(&expr, &mut Scope::new(&input, &[])).unwrap();
        assert_eq!(ty, TypeDescriptor::string());
    }

    #[test]
    fn test_binding_out_of_scope_after_let() {
        let action = vec![
            ExprNode::let_in(
                vec![("y".to_string(), ExprNode::double(1.0))],
                ExprNode::reference("y"),
            ),
            ExprNode::reference("y"),
        ];
        let err = infer_action(&input(), &[], &action).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::UnresolvedReference {
                symbol: "y".to_string()
            }
        );
    }

    #[test]
    fn test_rebinding_in_one_let_rejected() {
        let expr = ExprNode::let_in(
            vec![
                ("y".to_string(), ExprNode::double(1.0)),
                ("y".to_string(), ExprNode::double(2.0)),
            ],
            ExprNode::reference("y"),
        );
        let input = input();
        let err = infer(&expr, &mut Scope::new(&input, &[])).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::DuplicateBinding {
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn test_nested_shadowing_rejected() {
        let inner = ExprNode::let_in(
            vec![("y".to_string(), ExprNode::double(2.0))],
            ExprNode::reference("y"),
        );
        let expr = ExprNode::let_in(vec![("y".to_string(), ExprNode::double(1.0))], inner);
        let input = input();
        let err = infer(&expr, &mut Scope::new(&input, &[])).unwrap_err();
        assert!(matches!(err, AssemblyError::DuplicateBinding { .. }));
    }

    #[test]
    fn test_sibling_lets_may_reuse_a_name() {
        let action = vec![
            ExprNode::let_in(
                vec![("y".to_string(), ExprNode::double(1.0))],
                ExprNode::reference("y"),
            ),
            ExprNode::let_in(
                vec![("y".to_string(), ExprNode::double(2.0))],
                ExprNode::reference("y"),
            ),
        ];
        assert_eq!(infer_action(&input(), &[], &action), Ok(TypeDescriptor::double()));
    }

    #[test]
    fn test_dotted_local_rejected() {
        let expr = ExprNode::let_in(
            vec![("y.new".to_string(), ExprNode::double(1.0))],
            ExprNode::reference("y.new"),
        );
        let input = input();
        let err = infer(&expr, &mut Scope::new(&input, &[])).unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidBinding { .. }));
    }

    #[test]
    fn test_if_branches_widen() {
        let expr = ExprNode::if_else(
            ExprNode::call("<", vec![ExprNode::reference("x"), ExprNode::double(0.5)]),
            ExprNode::reference("n"),
            ExprNode::reference("x"),
        );
        let input = input();
        let ty = infer(&expr, &mut Scope::new(&input, &[])).unwrap();
        assert_eq!(ty, TypeDescriptor::double());
    }

    #[test]
    fn test_literal_must_conform() {
        let bad = ExprNode::Literal {
            value: serde_json::json!("text"),
            ty: TypeDescriptor::double(),
        };
        let input = input();
        let err = infer(&bad, &mut Scope::new(&input, &[])).unwrap_err();
        assert!(matches!(err, AssemblyError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_operator_errors_map_to_assembly_errors() {
        let expr = ExprNode::call("m.exp", vec![ExprNode::double(1.0), ExprNode::double(2.0)]);
        let input = input();
        let err = infer(&expr, &mut Scope::new(&input, &[])).unwrap_err();
        assert!(matches!(err, AssemblyError::ArityMismatch { found: 2, .. }));
    }

    #[test]
    fn test_empty_action() {
        assert_eq!(
            infer_action(&input(), &[], &[]),
            Err(AssemblyError::EmptyAction)
        );
    }
}
