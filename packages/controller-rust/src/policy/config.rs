//! Policy configuration: classes, trigger policies, rules and action
//! templates, as read from the `policy` section of the settings file.

use std::collections::BTreeMap;

use routing_core::types::{ClassDirection, SystemProperty};
use routing_core::{ActionType, TriggerType};
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::expr::Expr;

/// Literal that makes a parameter take the trigger field of the same name.
pub const REQUESTING: &str = "REQUESTING";

/// Classes, policies and breakpoint tables loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfig {
    pub classes: Vec<ClassConfig>,
    pub policies: Vec<Policy>,
    /// Named breakpoint lists used by `scale` expressions.
    pub breakpoints: BTreeMap<String, Vec<i64>>,
    /// System properties entered at startup.
    pub system_properties: Vec<SystemProperty>,
}

/// A class groups sources and sinks that share connection rules.
///
/// Empty member lists accept any endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassConfig {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub direction: ClassDirection,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub sinks: Vec<String>,
}

/// Rules evaluated for the listed trigger types, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub name: String,
    pub triggers: Vec<TriggerType>,
    pub rules: Vec<Rule>,
}

/// Conditions guarding a list of action templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    pub actions: Vec<ActionTemplate>,
}

/// An action type with parameter expressions resolved per trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTemplate {
    #[serde(rename = "type")]
    pub action: ActionType,
    #[serde(default)]
    pub params: BTreeMap<String, ParamTemplate>,
}

/// Value source of one descriptor parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamTemplate {
    Flag(bool),
    Number(i64),
    /// Literal text, or [`REQUESTING`].
    Text(String),
    Expr(Expr),
}
