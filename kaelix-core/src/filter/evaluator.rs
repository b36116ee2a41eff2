//! Three-valued evaluation of filter expressions.
//!
//! `None` stands for SQL UNKNOWN: missing properties, nulls and type
//! mismatches all evaluate to it, and a filter only accepts a message when
//! the whole expression is TRUE.

use super::parser::{ArithOp, CompareOp, Expr, Literal};
use super::FilterContext;
use std::cmp::Ordering;

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Exact numeric.
    Int(i64),
    /// Approximate numeric.
    Float(f64),
    /// String.
    Str(String),
}

impl Value {
    fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn literal_value(literal: &Literal) -> Option<Value> {
    match literal {
        Literal::Bool(b) => Some(Value::Bool(*b)),
        Literal::Int(i) => Some(Value::Int(*i)),
        Literal::Float(f) => Some(Value::Float(*f)),
        Literal::Str(s) => Some(Value::Str(s.clone())),
        Literal::Null => None,
    }
}

pub(crate) fn evaluate(expr: &Expr, ctx: &dyn FilterContext) -> Option<Value> {
    match expr {
        Expr::Literal(literal) => literal_value(literal),
        Expr::Identifier(name) => ctx.value(name),
        Expr::Not(inner) => truth(inner, ctx).map(|b| Value::Bool(!b)),
        Expr::And(left, right) => {
            let l = truth(left, ctx);
            if l == Some(false) {
                return Some(Value::Bool(false));
            }
            match (l, truth(right, ctx)) {
                (_, Some(false)) => Some(Value::Bool(false)),
                (Some(true), Some(true)) => Some(Value::Bool(true)),
                _ => None,
            }
        },
        Expr::Or(left, right) => {
            let l = truth(left, ctx);
            if l == Some(true) {
                return Some(Value::Bool(true));
            }
            match (l, truth(right, ctx)) {
                (_, Some(true)) => Some(Value::Bool(true)),
                (Some(false), Some(false)) => Some(Value::Bool(false)),
                _ => None,
            }
        },
        Expr::Compare(op, left, right) => {
            compare(*op, &evaluate(left, ctx)?, &evaluate(right, ctx)?).map(Value::Bool)
        },
        Expr::Arith(op, left, right) => arith(*op, &evaluate(left, ctx)?, &evaluate(right, ctx)?),
        Expr::Negate(inner) => match evaluate(inner, ctx)? {
            Value::Int(i) => i.checked_neg().map(Value::Int),
            Value::Float(f) => Some(Value::Float(-f)),
            _ => None,
        },
        Expr::IsNull { expr, negated } => {
            Some(Value::Bool(evaluate(expr, ctx).is_none() != *negated))
        },
        Expr::In { expr, list, negated } => {
            let value = evaluate(expr, ctx)?;
            let found = list
                .iter()
                .filter_map(literal_value)
                .any(|candidate| compare(CompareOp::Eq, &value, &candidate) == Some(true));
            Some(Value::Bool(found != *negated))
        },
        Expr::Like { expr, pattern, escape, negated } => match evaluate(expr, ctx)? {
            Value::Str(s) => Some(Value::Bool(like(&s, pattern, *escape) != *negated)),
            _ => None,
        },
        Expr::Between { expr, low, high, negated } => {
            let value = evaluate(expr, ctx)?;
            let low = evaluate(low, ctx)?;
            let high = evaluate(high, ctx)?;
            let inside = compare(CompareOp::Ge, &value, &low)? && compare(CompareOp::Le, &value, &high)?;
            Some(Value::Bool(inside != *negated))
        },
    }
}

pub(crate) fn truth(expr: &Expr, ctx: &dyn FilterContext) -> Option<bool> {
    match evaluate(expr, ctx)? {
        Value::Bool(b) => Some(b),
        _ => None,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Option<bool> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => {
            return match op {
                CompareOp::Eq => Some(a == b),
                CompareOp::Ne => Some(a != b),
                _ => None,
            };
        },
        (Value::Bool(a), Value::Bool(b)) => {
            return match op {
                CompareOp::Eq => Some(a == b),
                CompareOp::Ne => Some(a != b),
                _ => None,
            };
        },
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
    };

    Some(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

fn arith(op: ArithOp, left: &Value, right: &Value) -> Option<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Div => a.checked_div(*b),
        };
        if let Some(value) = exact {
            return Some(Value::Int(value));
        }
        if op == ArithOp::Div {
            return None;
        }
    }

    let (a, b) = (left.as_f64()?, right.as_f64()?);
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    };
    Some(Value::Float(result))
}

/// SQL LIKE: `%` matches any run, `_` one character, `escape` quotes the next.
fn like(text: &str, pattern: &str, escape: Option<char>) -> bool {
    enum Part {
        Char(char),
        One,
        Any,
    }

    let mut parts = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if Some(c) == escape {
            match chars.next() {
                Some(quoted) => parts.push(Part::Char(quoted)),
                None => parts.push(Part::Char(c)),
            }
        } else if c == '%' {
            parts.push(Part::Any);
        } else if c == '_' {
            parts.push(Part::One);
        } else {
            parts.push(Part::Char(c));
        }
    }

    let text: Vec<char> = text.chars().collect();
    let n = text.len();
    let mut reachable = vec![false; n + 1];
    reachable[0] = true;

    for part in &parts {
        let mut next = vec![false; n + 1];
        match part {
            Part::Char(c) => {
                for i in 0..n {
                    next[i + 1] = reachable[i] && text[i] == *c;
                }
            },
            Part::One => next[1..].copy_from_slice(&reachable[..n]),
            Part::Any => {
                let mut seen = false;
                for (slot, &here) in next.iter_mut().zip(&reachable) {
                    seen |= here;
                    *slot = seen;
                }
            },
        }
        reachable = next;
    }
    reachable[n]
}
