//! Rule conditions: a predicate tree over expressions.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::expr::{compare, EvalContext, Expr};

/// Comparison and logical operators of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
    And,
    Or,
    Not,
}

/// A recursive condition node.
///
/// Comparisons use `left` and `right`, `exists` uses `left` only, and the
/// logical operators use `children` (`not` reads the first child).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub op: ConditionOp,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub left: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub right: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub children: Option<Vec<Condition>>,
}

impl Condition {
    /// Binary comparison of two expressions.
    #[must_use]
    pub fn compare(op: ConditionOp, left: Expr, right: Expr) -> Self {
        Self {
            op,
            left: Some(left),
            right: Some(right),
            children: None,
        }
    }

    /// Holds when `expr` evaluates to a value.
    #[must_use]
    pub fn exists(expr: Expr) -> Self {
        Self {
            op: ConditionOp::Exists,
            left: Some(expr),
            right: None,
            children: None,
        }
    }

    /// `AND`, `OR` or `NOT` over child conditions.
    #[must_use]
    pub fn logical(op: ConditionOp, children: Vec<Condition>) -> Self {
        Self {
            op,
            left: None,
            right: None,
            children: Some(children),
        }
    }

    /// Evaluates the condition. A comparison whose operand cannot be
    /// evaluated, or whose operands are of incomparable kinds, is false.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let children = self.children.as_deref().unwrap_or_default();
        match self.op {
            ConditionOp::And => children.iter().all(|c| c.evaluate(ctx)),
            ConditionOp::Or => children.iter().any(|c| c.evaluate(ctx)),
            ConditionOp::Not => children.first().is_some_and(|c| !c.evaluate(ctx)),
            ConditionOp::Exists => self.left.as_ref().is_some_and(|e| e.eval(ctx).is_ok()),
            ConditionOp::Eq
            | ConditionOp::Neq
            | ConditionOp::Gt
            | ConditionOp::Gte
            | ConditionOp::Lt
            | ConditionOp::Lte => self.evaluate_comparison(ctx).unwrap_or(false),
        }
    }

    fn evaluate_comparison(&self, ctx: &EvalContext<'_>) -> Option<bool> {
        let left = self.left.as_ref()?.eval(ctx);
        let right = self.right.as_ref()?.eval(ctx);
        let (left, right) = match (left, right) {
            (Ok(l), Ok(r)) => (l, r),
            (l, r) => {
                trace!(op = ?self.op, left = ?l, right = ?r, "condition operand unresolved");
                return None;
            }
        };
        let ordering = compare(&left, &right)?;
        Some(match self.op {
            ConditionOp::Eq => ordering == Ordering::Equal,
            ConditionOp::Neq => ordering != Ordering::Equal,
            ConditionOp::Gt => ordering == Ordering::Greater,
            ConditionOp::Gte => ordering != Ordering::Less,
            ConditionOp::Lt => ordering == Ordering::Less,
            ConditionOp::Lte => ordering != Ordering::Greater,
            _ => return None,
        })
    }
}
