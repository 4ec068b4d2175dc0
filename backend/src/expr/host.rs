//! Host expressions
//!
//! User-supplied scoring expressions arrive in the modelling toolchain's own
//! syntax (R-flavoured: `<-` assignment, `^` power, `%%` modulo, `if`/`else`,
//! braces). This module holds the host AST and a nom grammar for it; the
//! translator in `translate.rs` maps the AST onto document expressions.
//!
//! The grammar accepts constructs the document language cannot express
//! (loops, function definitions, indexing) so that the translator can
//! reject them by name instead of failing with an opaque parse error.

use crate::expr::translate::TranslateError;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace1, one_of},
    combinator::{all_consuming, map, not, opt, peek, recognize, value, verify},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Parsed host expression
#[derive(Debug, Clone, PartialEq)]
pub enum HostExpr {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Null,
    Symbol(String),
    Unary {
        op: String,
        operand: Box<HostExpr>,
    },
    Binary {
        op: String,
        left: Box<HostExpr>,
        right: Box<HostExpr>,
    },
    Call {
        function: String,
        args: Vec<HostExpr>,
    },
    If {
        cond: Box<HostExpr>,
        then: Box<HostExpr>,
        otherwise: Option<Box<HostExpr>>,
    },
    Block(Vec<HostExpr>),
    Assign {
        name: String,
        value: Box<HostExpr>,
    },

    // Constructs with no document-level equivalent
    For {
        var: String,
        iterable: Box<HostExpr>,
        body: Box<HostExpr>,
    },
    While {
        cond: Box<HostExpr>,
        body: Box<HostExpr>,
    },
    Function {
        params: Vec<String>,
        body: Box<HostExpr>,
    },
    /// `x$name`, `x[[i]]`, `x[i]`
    Index {
        kind: String,
        target: Box<HostExpr>,
        index: Box<HostExpr>,
    },
    /// Call whose callee is not a plain name, e.g. `(f)(x)`
    Apply {
        target: Box<HostExpr>,
        args: Vec<HostExpr>,
    },
}

impl HostExpr {
    pub fn symbol(name: impl Into<String>) -> Self {
        HostExpr::Symbol(name.into())
    }

    pub fn binary(op: impl Into<String>, left: HostExpr, right: HostExpr) -> Self {
        HostExpr::Binary {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: impl Into<String>, operand: HostExpr) -> Self {
        HostExpr::Unary {
            op: op.into(),
            operand: Box::new(operand),
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<HostExpr>) -> Self {
        HostExpr::Call {
            function: function.into(),
            args,
        }
    }

    pub fn assign(name: impl Into<String>, value: HostExpr) -> Self {
        HostExpr::Assign {
            name: name.into(),
            value: Box::new(value),
        }
    }
}

// =============================================================================
// MAIN PARSER ENTRY POINT
// =============================================================================

/// Parse host source text into a `HostExpr`
///
/// Several top-level statements (separated by `;` or newlines) become a
/// `HostExpr::Block`.
///
/// # Example
///
/// ```rust
/// use pfa_export_core_rs::expr::host::{parse_host_expr, HostExpr};
///
/// let expr = parse_host_expr("2 + 2").unwrap();
/// assert_eq!(expr, HostExpr::binary("+", HostExpr::Double(2.0), HostExpr::Double(2.0)));
/// ```
pub fn parse_host_expr(source: &str) -> Result<HostExpr, TranslateError> {
    match all_consuming(terminated(statements, skip))(source) {
        Ok((_, mut stmts)) => {
            if stmts.len() == 1 {
                Ok(stmts.remove(0))
            } else {
                Ok(HostExpr::Block(stmts))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = source.len() - e.input.len();
            Err(TranslateError::Parse {
                offset,
                message: format!("unexpected input near '{}'", snippet(e.input)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(TranslateError::Parse {
            offset: source.len(),
            message: "incomplete expression".to_string(),
        }),
    }
}

fn snippet(rest: &str) -> String {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        "<end of input>".to_string()
    } else {
        trimmed.chars().take(16).collect()
    }
}

// =============================================================================
// LEXICAL HELPERS
// =============================================================================

const KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "repeat", "function", "in", "TRUE", "FALSE", "NULL", "NA",
    "break", "next",
];

/// Skip whitespace and `#` comments
fn skip(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            preceded(char('#'), take_while(|c: char| c != '\n')),
        ))),
    )(input)
}

/// Skip leading whitespace/comments before `inner`
fn lex<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(skip, inner)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_'
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    lex(terminated(tag(word), not(peek(take_while1(is_ident_char)))))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    lex(verify(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '.' || c == '_'),
            take_while(is_ident_char),
        )),
        |s: &str| !KEYWORDS.contains(&s),
    ))(input)
}

/// Statement separator: `;` or a newline, with blanks and comments before it
fn separator(input: &str) -> IResult<&str, ()> {
    value(
        (),
        tuple((
            take_while(|c: char| c == ' ' || c == '\t' || c == '\r'),
            opt(preceded(char('#'), take_while(|c: char| c != '\n'))),
            alt((char(';'), char('\n'))),
        )),
    )(input)
}

fn fold_binary(first: HostExpr, rest: Vec<(&str, HostExpr)>) -> HostExpr {
    rest.into_iter()
        .fold(first, |left, (op, right)| HostExpr::binary(op, left, right))
}

// =============================================================================
// STATEMENTS
// =============================================================================

fn statements(input: &str) -> IResult<&str, Vec<HostExpr>> {
    let (input, first) = statement(input)?;
    let (input, mut rest) = many0(preceded(many1(separator), statement))(input)?;
    let (input, _) = many0(separator)(input)?;
    let mut all = vec![first];
    all.append(&mut rest);
    Ok((input, all))
}

fn statement(input: &str) -> IResult<&str, HostExpr> {
    alt((assignment, expression))(input)
}

fn assignment(input: &str) -> IResult<&str, HostExpr> {
    let (input, name) = identifier(input)?;
    let (input, _) = lex(alt((tag("<-"), terminated(tag("="), not(char('='))))))(input)?;
    let (input, value) = expression(input)?;
    Ok((input, HostExpr::assign(name, value)))
}

// =============================================================================
// EXPRESSIONS (lowest to highest precedence)
// =============================================================================

fn expression(input: &str) -> IResult<&str, HostExpr> {
    alt((if_expr, for_expr, while_expr, function_expr, or_expr))(input)
}

fn if_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, _) = keyword("if")(input)?;
    let (input, cond) = delimited(lex(char('(')), expression, lex(char(')')))(input)?;
    let (input, then) = statement(input)?;
    let (input, otherwise) = opt(preceded(keyword("else"), statement))(input)?;
    Ok((
        input,
        HostExpr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        },
    ))
}

fn for_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, _) = keyword("for")(input)?;
    let (input, _) = lex(char('('))(input)?;
    let (input, var) = identifier(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, iterable) = expression(input)?;
    let (input, _) = lex(char(')'))(input)?;
    let (input, body) = statement(input)?;
    Ok((
        input,
        HostExpr::For {
            var: var.to_string(),
            iterable: Box::new(iterable),
            body: Box::new(body),
        },
    ))
}

fn while_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, _) = keyword("while")(input)?;
    let (input, cond) = delimited(lex(char('(')), expression, lex(char(')')))(input)?;
    let (input, body) = statement(input)?;
    Ok((
        input,
        HostExpr::While {
            cond: Box::new(cond),
            body: Box::new(body),
        },
    ))
}

fn function_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, _) = keyword("function")(input)?;
    let (input, params) = delimited(
        lex(char('(')),
        separated_list0(lex(char(',')), identifier),
        lex(char(')')),
    )(input)?;
    let (input, body) = statement(input)?;
    Ok((
        input,
        HostExpr::Function {
            params: params.into_iter().map(str::to_string).collect(),
            body: Box::new(body),
        },
    ))
}

fn or_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(lex(alt((tag("||"), tag("|")))), and_expr))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn and_expr(input: &str) -> IResult<&str, HostExpr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(pair(lex(alt((tag("&&"), tag("&")))), not_expr))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn not_expr(input: &str) -> IResult<&str, HostExpr> {
    alt((
        map(
            preceded(lex(terminated(char('!'), not(char('=')))), not_expr),
            |operand| HostExpr::unary("!", operand),
        ),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, HostExpr> {
    let (input, left) = additive(input)?;
    let (input, tail) = opt(pair(
        lex(alt((
            tag("=="),
            tag("!="),
            tag("<="),
            tag(">="),
            terminated(tag("<"), not(char('-'))),
            tag(">"),
        ))),
        additive,
    ))(input)?;
    Ok((
        input,
        match tail {
            Some((op, right)) => HostExpr::binary(op, left, right),
            None => left,
        },
    ))
}

fn additive(input: &str) -> IResult<&str, HostExpr> {
    let (input, first) = multiplicative(input)?;
    let (input, rest) = many0(pair(lex(alt((tag("+"), tag("-")))), multiplicative))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn multiplicative(input: &str) -> IResult<&str, HostExpr> {
    let (input, first) = special(input)?;
    let (input, rest) = many0(pair(
        lex(alt((terminated(tag("*"), not(char('*'))), tag("/")))),
        special,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

/// `%%`, `%/%`, `%in%` and other `%op%` forms
fn special(input: &str) -> IResult<&str, HostExpr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        lex(recognize(delimited(
            char('%'),
            take_while(|c: char| c != '%' && c != '\n'),
            char('%'),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn unary(input: &str) -> IResult<&str, HostExpr> {
    alt((
        map(preceded(lex(char('-')), unary), |e| HostExpr::unary("-", e)),
        map(preceded(lex(char('+')), unary), |e| HostExpr::unary("+", e)),
        power,
    ))(input)
}

fn power(input: &str) -> IResult<&str, HostExpr> {
    let (input, base) = postfix(input)?;
    let (input, exponent) = opt(preceded(lex(alt((tag("^"), tag("**")))), unary))(input)?;
    Ok((
        input,
        match exponent {
            Some(exp) => HostExpr::binary("^", base, exp),
            None => base,
        },
    ))
}

enum Postfix {
    Args(Vec<HostExpr>),
    Index(&'static str, HostExpr),
}

fn postfix(input: &str) -> IResult<&str, HostExpr> {
    let (input, target) = primary(input)?;
    let (input, suffixes) = many0(alt((
        map(
            delimited(
                lex(char('(')),
                separated_list0(lex(char(',')), expression),
                lex(char(')')),
            ),
            Postfix::Args,
        ),
        map(preceded(lex(char('$')), identifier), |name| {
            Postfix::Index("$", HostExpr::Str(name.to_string()))
        }),
        map(
            delimited(lex(tag("[[")), expression, lex(tag("]]"))),
            |e| Postfix::Index("[[", e),
        ),
        map(
            delimited(lex(char('[')), expression, lex(char(']'))),
            |e| Postfix::Index("[", e),
        ),
    )))(input)?;

    let expr = suffixes.into_iter().fold(target, |target, suffix| match suffix {
        Postfix::Args(args) => match target {
            HostExpr::Symbol(function) => HostExpr::Call { function, args },
            other => HostExpr::Apply {
                target: Box::new(other),
                args,
            },
        },
        Postfix::Index(kind, index) => HostExpr::Index {
            kind: kind.to_string(),
            target: Box::new(target),
            index: Box::new(index),
        },
    });
    Ok((input, expr))
}

fn primary(input: &str) -> IResult<&str, HostExpr> {
    alt((
        lex(number),
        lex(string_literal),
        value(HostExpr::Bool(true), keyword("TRUE")),
        value(HostExpr::Bool(false), keyword("FALSE")),
        value(HostExpr::Null, keyword("NULL")),
        map(identifier, |name: &str| HostExpr::Symbol(name.to_string())),
        delimited(lex(char('(')), expression, lex(char(')'))),
        map(
            delimited(lex(char('{')), opt(statements), lex(char('}'))),
            |stmts| HostExpr::Block(stmts.unwrap_or_default()),
        ),
    ))(input)
}

fn number(input: &str) -> IResult<&str, HostExpr> {
    let (rest, text) = recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    ))(input)?;
    let (rest, long_suffix) = opt(char('L'))(rest)?;

    // Only the `L` suffix makes an integer; `2` is a double on the host
    let parsed = match long_suffix {
        None => text.parse::<f64>().ok().map(HostExpr::Double),
        Some(_) => match text.parse::<i64>() {
            Ok(int) => Some(HostExpr::Int(int)),
            // `1e3L` is an integer, `1.5L` stays a double
            Err(_) => text.parse::<f64>().ok().map(|v| {
                if v.fract() == 0.0 && v.abs() < 9.0e18 {
                    HostExpr::Int(v as i64)
                } else {
                    HostExpr::Double(v)
                }
            }),
        },
    };

    match parsed {
        Some(expr) => Ok((rest, expr)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn string_literal(input: &str) -> IResult<&str, HostExpr> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        |s: &str| HostExpr::Str(s.to_string()),
    )(input)
}
