//! Closed expression language used by policy parameters and conditions.
//!
//! Expressions are pure: they read the trigger, the live element state and
//! the named breakpoint lists, and never mutate anything.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use routing_core::types::{ElementKind, Value};
use routing_core::Trigger;
use serde::{Deserialize, Serialize};

use super::config::REQUESTING;
use super::state::StateView;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("trigger has no field {0}")]
    MissingField(String),
    #[error("lookup {kind} {name}.{key} found nothing")]
    LookupFailed {
        kind: ElementKind,
        name: String,
        key: String,
    },
    #[error("{0} is not a number")]
    NotNumeric(Value),
    #[error("unknown breakpoint list {0}")]
    UnknownBreakpoints(String),
    #[error("breakpoint lists {from} and {to} do not pair up")]
    InvalidBreakpoints { from: String, to: String },
    #[error("no table entry for {0}")]
    NoMatch(Value),
}

/// Inputs an expression may read.
pub struct EvalContext<'a> {
    pub trigger: &'a Trigger,
    pub state: &'a dyn StateView,
    pub breakpoints: &'a BTreeMap<String, Vec<i64>>,
}

/// Expression tree used in rule conditions and action parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Expr {
    /// Literal.
    Value { value: Value },
    /// Named trigger field.
    Trigger { field: String },
    /// Attribute of a live registry object. `name` may be `REQUESTING`.
    Lookup {
        kind: ElementKind,
        name: String,
        key: String,
    },
    /// Piecewise-linear interpolation from one breakpoint list to another.
    Scale {
        input: Box<Expr>,
        from: String,
        to: String,
    },
    /// Exact table lookup.
    Map {
        input: Box<Expr>,
        from: Vec<Value>,
        to: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
}

impl Expr {
    /// # Errors
    ///
    /// Returns an [`EvalError`] when an input is missing or not usable.
    pub fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
        match self {
            Expr::Value { value } => Ok(value.clone()),
            Expr::Trigger { field } => ctx
                .trigger
                .field(field)
                .ok_or_else(|| EvalError::MissingField(field.clone())),
            Expr::Lookup { kind, name, key } => {
                let name = if name == REQUESTING {
                    ctx.trigger
                        .field(kind.name_key())
                        .ok_or_else(|| EvalError::MissingField(kind.name_key().to_string()))?
                        .to_string()
                } else {
                    name.clone()
                };
                ctx.state
                    .lookup(*kind, &name, key)
                    .ok_or_else(|| EvalError::LookupFailed {
                        kind: *kind,
                        name,
                        key: key.clone(),
                    })
            }
            Expr::Scale { input, from, to } => {
                let value = input.eval(ctx)?;
                let x = value.as_int().ok_or(EvalError::NotNumeric(value))?;
                let xs = ctx
                    .breakpoints
                    .get(from)
                    .ok_or_else(|| EvalError::UnknownBreakpoints(from.clone()))?;
                let ys = ctx
                    .breakpoints
                    .get(to)
                    .ok_or_else(|| EvalError::UnknownBreakpoints(to.clone()))?;
                interpolate(x, xs, ys)
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::InvalidBreakpoints {
                        from: from.clone(),
                        to: to.clone(),
                    })
            }
            Expr::Map {
                input,
                from,
                to,
                default,
            } => {
                let value = input.eval(ctx)?;
                from.iter()
                    .position(|candidate| values_equal(candidate, &value))
                    .and_then(|index| to.get(index).cloned())
                    .or_else(|| default.clone())
                    .ok_or(EvalError::NoMatch(value))
            }
        }
    }
}

/// Interpolates `x` over the breakpoints `xs -> ys`, clamping outside the
/// range and rounding half away from zero. `None` if the lists are empty,
/// differ in length, `xs` is not ascending or the segment is too wide to
/// evaluate.
#[must_use]
pub fn interpolate(x: i64, xs: &[i64], ys: &[i64]) -> Option<i64> {
    if xs.is_empty() || xs.len() != ys.len() || xs.windows(2).any(|w| w[0] > w[1]) {
        return None;
    }
    let last = xs.len() - 1;
    if x <= xs[0] {
        return Some(ys[0]);
    }
    if x >= xs[last] {
        return Some(ys[last]);
    }
    let i = xs.windows(2).position(|w| w[0] <= x && x <= w[1])?;
    let dx = i128::from(xs[i + 1]) - i128::from(xs[i]);
    if dx == 0 {
        return Some(ys[i]);
    }
    let dy = i128::from(ys[i + 1]) - i128::from(ys[i]);
    let numerator = i128::from(ys[i])
        .checked_mul(dx)?
        .checked_add(dy.checked_mul(i128::from(x) - i128::from(xs[i]))?)?;
    i64::try_from(div_round(numerator, dx)).ok()
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    }
}

/// Loose equality: numbers compare numerically even when one side is text.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// Orders two values of compatible kinds.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => match (a.as_int(), b.as_int()) {
            (Some(m), Some(n)) => Some(m.cmp(&n)),
            _ => Some(x.cmp(y)),
        },
        _ => match (a.as_int(), b.as_int()) {
            (Some(m), Some(n)) => Some(m.cmp(&n)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use routing_core::types::MuteState;

    use super::*;

    struct NoState;

    impl StateView for NoState {
        fn lookup(&self, kind: ElementKind, name: &str, key: &str) -> Option<Value> {
            match (kind, name, key) {
                (ElementKind::Sink, "AMP", "mainVolume") => Some(Value::Int(7)),
                _ => None,
            }
        }
    }

    fn volume_trigger(main_volume: i16) -> Trigger {
        Trigger::UserSetVolume {
            sink_name: "AMP".into(),
            main_volume,
        }
    }

    fn eval(
        expr: &Expr,
        trigger: &Trigger,
        breakpoints: &BTreeMap<String, Vec<i64>>,
    ) -> Result<Value, EvalError> {
        expr.eval(&EvalContext {
            trigger,
            state: &NoState,
            breakpoints,
        })
    }

    #[test]
    fn interpolation_scenarios() {
        assert_eq!(interpolate(10, &[0, 20], &[-1500, -300]), Some(-900));
        assert_eq!(interpolate(5, &[0, 10], &[-1500, -300]), Some(-900));
        assert_eq!(interpolate(10, &[0, 10], &[-1500, -300]), Some(-300));
        assert_eq!(interpolate(-4, &[0, 10], &[-1500, -300]), Some(-1500));
        assert_eq!(interpolate(99, &[0, 10], &[-1500, -300]), Some(-300));
    }

    #[test]
    fn interpolation_rounds_half_away_from_zero() {
        // -1 + 1/2 => -0.5 => -1; 0 + 1/2 => 0.5 => 1
        assert_eq!(interpolate(1, &[0, 2], &[-1, 0]), Some(-1));
        assert_eq!(interpolate(1, &[0, 2], &[0, 1]), Some(1));
        assert_eq!(interpolate(1, &[0, 3], &[0, -2]), Some(-1));
    }

    #[test]
    fn interpolation_multi_segment() {
        let xs = [0, 10, 40];
        let ys = [-3000, -1000, 0];
        assert_eq!(interpolate(5, &xs, &ys), Some(-2000));
        assert_eq!(interpolate(25, &xs, &ys), Some(-500));
    }

    #[test]
    fn invalid_breakpoints() {
        assert_eq!(interpolate(1, &[], &[]), None);
        assert_eq!(interpolate(1, &[0, 1], &[0]), None);
        assert_eq!(interpolate(1, &[5, 1], &[0, 1]), None);
    }

    #[test]
    fn interpolation_over_wide_breakpoints() {
        let wide = 4_000_000_000_000;
        assert_eq!(
            interpolate(1, &[0, wide], &[-wide, wide]),
            Some(-3_999_999_999_998)
        );
        let full = [i64::MIN, i64::MAX];
        assert_eq!(interpolate(0, &full, &full), Some(0));
        assert_eq!(interpolate(i64::MAX - 1, &full, &full), None);
    }

    #[test]
    fn unevaluable_scale_is_invalid_breakpoints() {
        let breakpoints = BTreeMap::from([("full".to_string(), vec![i64::MIN, i64::MAX])]);
        let expr = Expr::Scale {
            input: Box::new(Expr::Value {
                value: Value::Int(i64::MAX - 1),
            }),
            from: "full".into(),
            to: "full".into(),
        };
        assert_eq!(
            eval(&expr, &volume_trigger(0), &breakpoints),
            Err(EvalError::InvalidBreakpoints {
                from: "full".into(),
                to: "full".into(),
            })
        );
    }

    #[test]
    fn scale_expression_reads_trigger() {
        let breakpoints = BTreeMap::from([
            ("userVolume".to_string(), vec![0, 20]),
            ("dbVolume".to_string(), vec![-1500, -300]),
        ]);
        let expr = Expr::Scale {
            input: Box::new(Expr::Trigger {
                field: "mainVolume".into(),
            }),
            from: "userVolume".into(),
            to: "dbVolume".into(),
        };
        assert_eq!(eval(&expr, &volume_trigger(10), &breakpoints), Ok(Value::Int(-900)));

        let missing = Expr::Scale {
            input: Box::new(Expr::Value { value: Value::Int(1) }),
            from: "nope".into(),
            to: "dbVolume".into(),
        };
        assert_eq!(
            eval(&missing, &volume_trigger(10), &breakpoints),
            Err(EvalError::UnknownBreakpoints("nope".into()))
        );
    }

    #[test]
    fn lookup_resolves_requesting_name() {
        let expr = Expr::Lookup {
            kind: ElementKind::Sink,
            name: REQUESTING.into(),
            key: "mainVolume".into(),
        };
        assert_eq!(
            eval(&expr, &volume_trigger(3), &BTreeMap::new()),
            Ok(Value::Int(7))
        );
        let unknown = Expr::Lookup {
            kind: ElementKind::Sink,
            name: "SPEAKER".into(),
            key: "mainVolume".into(),
        };
        assert!(matches!(
            eval(&unknown, &volume_trigger(3), &BTreeMap::new()),
            Err(EvalError::LookupFailed { .. })
        ));
    }

    #[test]
    fn map_with_default() {
        let trigger = Trigger::UserSetSinkMuteState {
            class_name: None,
            sink_name: "AMP".into(),
            mute_state: MuteState::Muted,
        };
        let expr: Expr = serde_json::from_str(
            r#"{"op":"map","input":{"op":"trigger","field":"muteState"},
                "from":["MS_MUTED","MS_UNMUTED"],"to":[1,0]}"#,
        )
        .unwrap();
        assert_eq!(eval(&expr, &trigger, &BTreeMap::new()), Ok(Value::Int(1)));

        let no_default = Expr::Map {
            input: Box::new(Expr::Value { value: Value::Int(3) }),
            from: vec![Value::Int(1)],
            to: vec![Value::Int(10)],
            default: None,
        };
        assert_eq!(
            eval(&no_default, &trigger, &BTreeMap::new()),
            Err(EvalError::NoMatch(Value::Int(3)))
        );
        let Expr::Map { input, from, to, .. } = no_default else {
            unreachable!()
        };
        let with_default = Expr::Map {
            input,
            from,
            to,
            default: Some(Value::Int(-1)),
        };
        assert_eq!(eval(&with_default, &trigger, &BTreeMap::new()), Ok(Value::Int(-1)));
    }

    #[test]
    fn loose_comparison() {
        assert!(values_equal(&Value::Str("10".into()), &Value::Int(10)));
        assert_eq!(
            compare(&Value::Int(3), &Value::Str("12".into())),
            Some(Ordering::Less)
        );
        assert_eq!(compare(&Value::Bool(true), &Value::Int(1)), None);
        assert!(!values_equal(&Value::Str("AMP".into()), &Value::Str("amp".into())));
    }
}
