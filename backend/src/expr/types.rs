// Document expression nodes
//
// The action graph of a scoring document is a tree of ExprNode values.
// Nodes are purely structural: nothing here evaluates or folds.

use crate::schema::TypeDescriptor;
use serde_json::Value as JsonValue;

// ============================================================================
// EXPRESSION NODES
// ============================================================================

/// A node in a document's action graph
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// Constant with an explicit type tag
    Literal { value: JsonValue, ty: TypeDescriptor },

    /// Reference to an input field, a Let binding, or a document cell
    Ref(String),

    /// Operator or library function application
    Call { op: String, args: Vec<ExprNode> },

    /// Sequential bindings (each sees the previous ones) scoping `body`
    Let {
        bindings: Vec<(String, ExprNode)>,
        body: Box<ExprNode>,
    },

    /// Conditional; a missing `otherwise` yields null
    If {
        cond: Box<ExprNode>,
        then: Box<ExprNode>,
        otherwise: Option<Box<ExprNode>>,
    },

    /// Statements evaluated in order, the last one is the value
    Block(Vec<ExprNode>),

    /// Array construction; `ty` is the full array type
    NewArray {
        items: Vec<ExprNode>,
        ty: TypeDescriptor,
    },

    /// String-keyed map construction; `ty` is the full map type
    NewMap {
        entries: Vec<(String, ExprNode)>,
        ty: TypeDescriptor,
    },
}

// ============================================================================
// CONSTRUCTORS
// ============================================================================

impl ExprNode {
    pub fn int(value: i32) -> Self {
        ExprNode::Literal {
            value: JsonValue::from(value),
            ty: TypeDescriptor::int(),
        }
    }

    pub fn long(value: i64) -> Self {
        ExprNode::Literal {
            value: JsonValue::from(value),
            ty: TypeDescriptor::long(),
        }
    }

    pub fn double(value: f64) -> Self {
        ExprNode::Literal {
            value: JsonValue::from(value),
            ty: TypeDescriptor::double(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        ExprNode::Literal {
            value: JsonValue::String(value.into()),
            ty: TypeDescriptor::string(),
        }
    }

    pub fn boolean(value: bool) -> Self {
        ExprNode::Literal {
            value: JsonValue::Bool(value),
            ty: TypeDescriptor::boolean(),
        }
    }

    pub fn null() -> Self {
        ExprNode::Literal {
            value: JsonValue::Null,
            ty: TypeDescriptor::null(),
        }
    }

    pub fn reference(symbol: impl Into<String>) -> Self {
        ExprNode::Ref(symbol.into())
    }

    pub fn call(op: impl Into<String>, args: Vec<ExprNode>) -> Self {
        ExprNode::Call {
            op: op.into(),
            args,
        }
    }

    pub fn let_in(bindings: Vec<(String, ExprNode)>, body: ExprNode) -> Self {
        ExprNode::Let {
            bindings,
            body: Box::new(body),
        }
    }

    pub fn if_else(cond: ExprNode, then: ExprNode, otherwise: ExprNode) -> Self {
        ExprNode::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Some(Box::new(otherwise)),
        }
    }

    pub fn new_array(items: Vec<ExprNode>, element: TypeDescriptor) -> Self {
        ExprNode::NewArray {
            items,
            ty: TypeDescriptor::array(element),
        }
    }

    pub fn new_map(entries: Vec<(String, ExprNode)>, values: TypeDescriptor) -> Self {
        ExprNode::NewMap {
            entries,
            ty: TypeDescriptor::map(values),
        }
    }

    /// Collapse a statement list: one statement stands alone, more become a Block
    pub fn sequence(mut statements: Vec<ExprNode>) -> Self {
        if statements.len() == 1 {
            statements.remove(0)
        } else {
            ExprNode::Block(statements)
        }
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    /// Operator name if this is a Call
    pub fn op(&self) -> Option<&str> {
        match self {
            ExprNode::Call { op, .. } => Some(op),
            _ => None,
        }
    }

    /// Symbols referenced without a binding inside this expression
    ///
    /// Returned in first-occurrence order without duplicates.
    pub fn free_symbols(&self) -> Vec<String> {
        let mut bound = Vec::new();
        let mut free = Vec::new();
        collect_free(self, &mut bound, &mut free);
        free
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + match self {
            ExprNode::Literal { .. } | ExprNode::Ref(_) => 0,
            ExprNode::Call { args, .. } => args.iter().map(ExprNode::size).sum(),
            ExprNode::Let { bindings, body } => {
                bindings.iter().map(|(_, e)| e.size()).sum::<usize>() + body.size()
            }
            ExprNode::If {
                cond,
                then,
                otherwise,
            } => cond.size() + then.size() + otherwise.as_ref().map_or(0, |e| e.size()),
            ExprNode::Block(statements) => statements.iter().map(ExprNode::size).sum(),
            ExprNode::NewArray { items, .. } => items.iter().map(ExprNode::size).sum(),
            ExprNode::NewMap { entries, .. } => entries.iter().map(|(_, e)| e.size()).sum(),
        }
    }
}

fn collect_free(expr: &ExprNode, bound: &mut Vec<String>, free: &mut Vec<String>) {
    match expr {
        ExprNode::Literal { .. } => {}
        ExprNode::Ref(symbol) => {
            if !bound.contains(symbol) && !free.contains(symbol) {
                free.push(symbol.clone());
            }
        }
        ExprNode::Call { args, .. } => {
            for arg in args {
                collect_free(arg, bound, free);
            }
        }
        ExprNode::Let { bindings, body } => {
            let depth = bound.len();
            for (name, value) in bindings {
                collect_free(value, bound, free);
                bound.push(name.clone());
            }
            collect_free(body, bound, free);
            bound.truncate(depth);
        }
        ExprNode::If {
            cond,
            then,
            otherwise,
        } => {
            collect_free(cond, bound, free);
            collect_free(then, bound, free);
            if let Some(otherwise) = otherwise {
                collect_free(otherwise, bound, free);
            }
        }
        ExprNode::Block(statements) => {
            for statement in statements {
                collect_free(statement, bound, free);
            }
        }
        ExprNode::NewArray { items, .. } => {
            for item in items {
                collect_free(item, bound, free);
            }
        }
        ExprNode::NewMap { entries, .. } => {
            for (_, value) in entries {
                collect_free(value, bound, free);
            }
        }
    }
}
