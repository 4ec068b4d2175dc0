// Host expression translator
//
// Maps a host expression tree onto document expression nodes. Purely
// structural: operators become Call nodes, literals keep their lexical type,
// free variables become Ref nodes. Nothing is evaluated or folded.
//
// Documents never redeclare a visible local, so a host reassignment binds a
// fresh name and later references follow it.

use crate::expr::host::{parse_host_expr, HostExpr};
use crate::expr::ops;
use crate::expr::types::ExprNode;
use crate::schema::{avro_name, is_avro_name, TypeDescriptor};
use thiserror::Error;

/// Errors raised while translating host expressions
#[derive(Debug, Error, PartialEq)]
pub enum TranslateError {
    #[error("Unsupported construct: {construct}")]
    UnsupportedConstruct { construct: String },

    #[error("Unbound symbol '{symbol}': not an input field, cell, or earlier binding")]
    UnboundSymbol { symbol: String },

    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}

impl TranslateError {
    fn unsupported(construct: impl Into<String>) -> Self {
        TranslateError::UnsupportedConstruct {
            construct: construct.into(),
        }
    }
}

/// Host operator spelling → library operator name
fn binary_operator(op: &str) -> Option<&'static str> {
    match op {
        "+" => Some("+"),
        "-" => Some("-"),
        "*" => Some("*"),
        "/" => Some("/"),
        "^" | "**" => Some("**"),
        "%%" => Some("%"),
        "==" => Some("=="),
        "!=" => Some("!="),
        "<" => Some("<"),
        "<=" => Some("<="),
        ">" => Some(">"),
        ">=" => Some(">="),
        "&" | "&&" => Some("&&"),
        "|" | "||" => Some("||"),
        _ => None,
    }
}

fn unary_operator(op: &str) -> Option<&'static str> {
    match op {
        "-" => Some("u-"),
        "!" => Some("!"),
        _ => None,
    }
}

// ============================================================================
// SCOPE
// ============================================================================

/// Symbols visible while translating
struct Scope {
    declared: Vec<String>,
    /// (host name, document name), innermost last
    locals: Vec<(String, String)>,
}

impl Scope {
    fn new(declared: &[String]) -> Self {
        Self {
            declared: declared.to_vec(),
            locals: Vec::new(),
        }
    }

    /// Document name a host symbol refers to
    fn resolve(&self, symbol: &str) -> Option<String> {
        if let Some((_, name)) = self.locals.iter().rev().find(|(host, _)| host == symbol) {
            return Some(name.clone());
        }
        self.declared
            .iter()
            .any(|d| d == symbol)
            .then(|| symbol.to_string())
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|(_, local)| local == name)
    }

    /// Bind a host name, returning the document name it binds
    ///
    /// The host name is kept when it is a valid symbol not already bound as
    /// a local; otherwise the binding gets a fresh name that shadows no
    /// local, input field or cell.
    fn bind(&mut self, host: &str) -> String {
        let name = if is_avro_name(host) && !self.is_local(host) {
            host.to_string()
        } else {
            let base = avro_name(host);
            let mut candidate = base.clone();
            let mut n = 1;
            while self.is_local(&candidate) || self.declared.contains(&candidate) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        };
        self.locals.push((host.to_string(), name.clone()));
        name
    }

    fn depth(&self) -> usize {
        self.locals.len()
    }

    fn truncate(&mut self, depth: usize) {
        self.locals.truncate(depth);
    }
}

/// Host function name → (library operator, argument count)
const FUNCTIONS: &[(&str, &str, usize)] = &[
    ("exp", "m.exp", 1),
    ("log", "m.ln", 1),
    ("sqrt", "m.sqrt", 1),
    ("abs", "m.abs", 1),
    ("floor", "m.floor", 1),
    ("ceiling", "m.ceil", 1),
    ("round", "m.round", 1),
    ("max", "m.max", 2),
    ("min", "m.min", 2),
    ("plogis", "m.link.logit", 1),
    ("pnorm", "m.link.probit", 1),
];

// ============================================================================
// TRANSLATOR
// ============================================================================

/// Translator with a fixed set of declared symbols
///
/// Declared symbols are the document's input fields and cells; symbols bound
/// by assignments inside the translated expression are added while
/// translating the statements that follow them.
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::expr::{ExprNode, Translator};
///
/// let translator = Translator::new(["x"]);
/// let expr = translator.translate_source("x + 1").unwrap();
/// assert_eq!(
///     expr,
///     ExprNode::call("+", vec![ExprNode::reference("x"), ExprNode::double(1.0)])
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Translator {
    declared: Vec<String>,
}

impl Translator {
    pub fn new<I, S>(declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: declared.into_iter().map(Into::into).collect(),
        }
    }

    /// Translator whose scope is the fields of an input record plus cell names
    pub fn for_schema(input: &TypeDescriptor, cells: &[String]) -> Self {
        let mut declared: Vec<String> = match input {
            TypeDescriptor::Record { fields, .. } => {
                fields.iter().map(|f| f.name.clone()).collect()
            }
            _ => Vec::new(),
        };
        declared.extend(cells.iter().cloned());
        Self { declared }
    }

    /// Parse and translate host source text
    pub fn translate_source(&self, source: &str) -> Result<ExprNode, TranslateError> {
        let host = parse_host_expr(source)?;
        self.translate(&host)
    }

    /// Translate a host expression tree
    pub fn translate(&self, host: &HostExpr) -> Result<ExprNode, TranslateError> {
        let mut scope = Scope::new(&self.declared);
        self.translate_in(host, &mut scope)
    }

    fn translate_in(&self, host: &HostExpr, scope: &mut Scope) -> Result<ExprNode, TranslateError> {
        match host {
            // Literals keep their lexical type
            HostExpr::Int(value) => Ok(match i32::try_from(*value) {
                Ok(small) => ExprNode::int(small),
                Err(_) => ExprNode::long(*value),
            }),
            HostExpr::Double(value) => Ok(ExprNode::double(*value)),
            HostExpr::Str(value) => Ok(ExprNode::string(value.clone())),
            HostExpr::Bool(value) => Ok(ExprNode::boolean(*value)),
            HostExpr::Null => Ok(ExprNode::null()),

            HostExpr::Symbol(symbol) => {
                scope
                    .resolve(symbol)
                    .map(ExprNode::Ref)
                    .ok_or_else(|| TranslateError::UnboundSymbol {
                        symbol: symbol.clone(),
                    })
            }

            // Unary plus is the identity
            HostExpr::Unary { op, operand } if op == "+" => self.translate_in(operand, scope),

            HostExpr::Unary { op, operand } => {
                let name = unary_operator(op)
                    .ok_or_else(|| TranslateError::unsupported(format!("unary operator '{}'", op)))?;
                let operand = self.translate_in(operand, scope)?;
                Ok(ExprNode::call(name, vec![operand]))
            }

            HostExpr::Binary { op, left, right } => {
                let name = binary_operator(op)
                    .ok_or_else(|| TranslateError::unsupported(format!("operator '{}'", op)))?;
                let left = self.translate_in(left, scope)?;
                let right = self.translate_in(right, scope)?;
                Ok(ExprNode::call(name, vec![left, right]))
            }

            HostExpr::Call { function, args } => {
                let name = resolve_function(function, args.len())?;
                let args = args
                    .iter()
                    .map(|arg| self.translate_in(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ExprNode::call(name, args))
            }

            HostExpr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.translate_in(cond, scope)?;
                let then = self.translate_in(then, scope)?;
                let otherwise = match otherwise {
                    Some(branch) => Some(Box::new(self.translate_in(branch, scope)?)),
                    None => None,
                };
                Ok(ExprNode::If {
                    cond: Box::new(cond),
                    then: Box::new(then),
                    otherwise,
                })
            }

            HostExpr::Block(statements) => {
                Ok(ExprNode::Block(self.translate_sequence(statements, scope)?))
            }

            // A lone assignment yields the bound value
            HostExpr::Assign { .. } => {
                let mut statements = self.translate_sequence(std::slice::from_ref(host), scope)?;
                Ok(statements.remove(0))
            }

            HostExpr::For { .. } => Err(TranslateError::unsupported("for loop")),
            HostExpr::While { .. } => Err(TranslateError::unsupported("while loop")),
            HostExpr::Function { .. } => Err(TranslateError::unsupported("function definition")),
            HostExpr::Index { kind, .. } => Err(TranslateError::unsupported(format!(
                "indexing with '{}'",
                kind
            ))),
            HostExpr::Apply { .. } => {
                Err(TranslateError::unsupported("call of a non-name expression"))
            }
        }
    }

    /// Translate a statement list
    ///
    /// A run of assignments becomes one Let whose bindings scope the rest of
    /// the list. A trailing run of assignments yields the last bound symbol.
    fn translate_sequence(
        &self,
        statements: &[HostExpr],
        scope: &mut Scope,
    ) -> Result<Vec<ExprNode>, TranslateError> {
        let mut out = Vec::new();
        for (i, statement) in statements.iter().enumerate() {
            if !matches!(statement, HostExpr::Assign { .. }) {
                out.push(self.translate_in(statement, scope)?);
                continue;
            }

            let depth = scope.depth();
            let mut bindings = Vec::new();
            let mut next = i;
            while let Some(HostExpr::Assign { name, value }) = statements.get(next) {
                let value = self.translate_in(value, scope)?;
                bindings.push((scope.bind(name), value));
                next += 1;
            }

            let body = if next == statements.len() {
                let (last, _) = &bindings[bindings.len() - 1];
                ExprNode::Ref(last.clone())
            } else {
                ExprNode::sequence(self.translate_sequence(&statements[next..], scope)?)
            };
            scope.truncate(depth);

            out.push(ExprNode::let_in(bindings, body));
            return Ok(out);
        }
        Ok(out)
    }
}

fn resolve_function(function: &str, argc: usize) -> Result<&'static str, TranslateError> {
    if let Some((_, name, arity)) = FUNCTIONS.iter().find(|(host, _, _)| *host == function) {
        if *arity != argc {
            return Err(TranslateError::unsupported(format!(
                "{}() with {} argument(s)",
                function, argc
            )));
        }
        return Ok(*name);
    }

    // Library names pass through when written directly
    match ops::signature(function) {
        Some(signature) if signature.arity.admits(argc) => Ok(signature.name),
        Some(_) => Err(TranslateError::unsupported(format!(
            "{}() with {} argument(s)",
            function, argc
        ))),
        None => Err(TranslateError::unsupported(format!(
            "call to unknown function '{}'",
            function
        ))),
    }
}

/// Translate host source text against a set of declared symbols
pub fn translate<I, S>(source: &str, declared: I) -> Result<ExprNode, TranslateError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Translator::new(declared).translate_source(source)
}
