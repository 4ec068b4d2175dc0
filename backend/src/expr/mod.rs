// Document expressions
//
// - types.rs: ExprNode, the action-graph node
// - ops.rs: operator library (arity and result-type rules)
// - host.rs: host expression AST and parser
// - translate.rs: host expression → ExprNode

pub mod host;
pub mod ops;
pub mod translate;
pub mod types;

pub use host::{parse_host_expr, HostExpr};
pub use ops::{infer, signature, Arity, OpError, Signature, TypeRule};
pub use translate::{translate, TranslateError, Translator};
pub use types::ExprNode;
