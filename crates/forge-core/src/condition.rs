//! Condition expressions for step, job, and stage gating.
//!
//! Predicates are a small tagged expression tree evaluated against an
//! explicit context value set, never an implicit string-to-bool coercion.
//! Evaluation is total: an undefined context variable resolves to an absent
//! value for which equality and prefix tests are false.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One side of a comparison: a literal string or a context variable path
/// (e.g. `matrix.os`, `event.ref`, `stages.lint.status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Value(String),
    Var(String),
}

impl Operand {
    pub fn value(v: impl Into<String>) -> Self {
        Operand::Value(v.into())
    }

    pub fn var(path: impl Into<String>) -> Self {
        Operand::Var(path.into())
    }
}

/// A boolean predicate over the run context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(bool),
    Eq(Operand, Operand),
    StartsWith(Operand, Operand),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn eq(left: Operand, right: Operand) -> Self {
        Expr::Eq(left, right)
    }

    pub fn starts_with(subject: Operand, prefix: Operand) -> Self {
        Expr::StartsWith(subject, prefix)
    }

    pub fn all(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Expr::All(exprs.into_iter().collect())
    }

    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Any(exprs.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }
}

/// The value set a predicate is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    values: HashMap<String, String>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    fn resolve<'a>(&'a self, operand: &'a Operand) -> Option<&'a str> {
        match operand {
            Operand::Value(v) => Some(v.as_str()),
            Operand::Var(path) => self.values.get(path).map(String::as_str),
        }
    }

    /// Evaluate a predicate. Total and side-effect-free.
    pub fn eval(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Literal(b) => *b,
            Expr::Eq(left, right) => match (self.resolve(left), self.resolve(right)) {
                (Some(l), Some(r)) => l == r,
                _ => false,
            },
            Expr::StartsWith(subject, prefix) => {
                match (self.resolve(subject), self.resolve(prefix)) {
                    (Some(s), Some(p)) => s.starts_with(p),
                    _ => false,
                }
            }
            Expr::All(exprs) => exprs.iter().all(|e| self.eval(e)),
            Expr::Any(exprs) => exprs.iter().any(|e| self.eval(e)),
            Expr::Not(inner) => !self.eval(inner),
        }
    }
}
