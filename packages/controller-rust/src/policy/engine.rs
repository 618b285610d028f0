//! Trigger evaluation: maps one trigger to an ordered list of action
//! descriptors.

use std::collections::BTreeMap;

use routing_core::{ActionDescriptor, ControlError, ControlResult, Trigger};
use tracing::{debug, trace};

use super::config::{ActionTemplate, ParamTemplate, Policy, PolicyConfig, REQUESTING};
use super::expr::EvalContext;
use super::state::StateView;

/// Evaluates the configured policies. Holds no mutable state; every call
/// reads the live element state it is given.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    policies: Vec<Policy>,
    breakpoints: BTreeMap<String, Vec<i64>>,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            policies: config.policies.clone(),
            breakpoints: config.breakpoints.clone(),
        }
    }

    /// Visits the policies listening for the trigger's type in configured
    /// order and collects the actions of every rule whose condition holds.
    ///
    /// # Errors
    ///
    /// Returns `NoChange` when no rule produced an action.
    pub fn process_trigger(
        &self,
        trigger: &Trigger,
        state: &dyn StateView,
    ) -> ControlResult<Vec<ActionDescriptor>> {
        let trigger_type = trigger.trigger_type();
        let ctx = EvalContext {
            trigger,
            state,
            breakpoints: &self.breakpoints,
        };
        let mut actions = Vec::new();
        for policy in self
            .policies
            .iter()
            .filter(|p| p.triggers.contains(&trigger_type))
        {
            for (index, rule) in policy.rules.iter().enumerate() {
                if let Some(condition) = &rule.condition {
                    if !condition.evaluate(&ctx) {
                        trace!(policy = %policy.name, rule = index, "condition false");
                        continue;
                    }
                }
                actions.extend(rule.actions.iter().map(|t| instantiate(t, &ctx)));
            }
        }
        if actions.is_empty() {
            debug!(trigger = %trigger_type, "no policy action");
            return Err(ControlError::NoChange);
        }
        debug!(trigger = %trigger_type, count = actions.len(), "policy actions");
        Ok(actions)
    }
}

fn instantiate(template: &ActionTemplate, ctx: &EvalContext<'_>) -> ActionDescriptor {
    let mut descriptor = ActionDescriptor::new(template.action);
    for (key, param) in &template.params {
        match bind(key, param, ctx) {
            Some(value) => {
                descriptor.params.insert(key.clone(), value);
            }
            None => debug!(action = %template.action, param = %key, "parameter left unbound"),
        }
    }
    descriptor
}

/// Text of one parameter, or `None` to leave it unbound.
fn bind(key: &str, param: &ParamTemplate, ctx: &EvalContext<'_>) -> Option<String> {
    match param {
        ParamTemplate::Flag(flag) => Some(flag.to_string()),
        ParamTemplate::Number(n) => Some(n.to_string()),
        ParamTemplate::Text(text) if text == REQUESTING => {
            ctx.trigger.field(key).map(|v| v.to_string())
        }
        ParamTemplate::Text(text) => Some(text.clone()),
        ParamTemplate::Expr(expr) => match expr.eval(ctx) {
            Ok(value) => Some(value.to_string()),
            Err(err) => {
                debug!(param = %key, %err, "expression failed");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use routing_core::types::{ConnectionState, MuteState, SegmentState};
    use routing_core::{param, ActionType};

    use super::*;
    use crate::testing::TestBed;

    fn engine(json: &str) -> PolicyEngine {
        PolicyEngine::new(&serde_json::from_str::<PolicyConfig>(json).unwrap())
    }

    fn volume_engine() -> PolicyEngine {
        engine(
            r#"{
                "breakpoints": {"userVolume": [0, 20], "dbVolume": [-1500, -300]},
                "policies": [{
                    "name": "volume",
                    "triggers": ["USER_SET_VOLUME"],
                    "rules": [{
                        "actions": [{
                            "type": "ACTION_SET_VOLUME",
                            "params": {
                                "sinkName": "REQUESTING",
                                "mainVolume": "REQUESTING",
                                "volume": {"op": "scale",
                                           "input": {"op": "trigger", "field": "mainVolume"},
                                           "from": "userVolume", "to": "dbVolume"}
                            }
                        }]
                    }]
                }]
            }"#,
        )
    }

    #[test]
    fn main_volume_scales_to_engine_volume() {
        let bed = TestBed::new();
        let trigger = Trigger::UserSetVolume {
            sink_name: "Gateway0".into(),
            main_volume: 10,
        };
        let actions = volume_engine()
            .process_trigger(&trigger, &bed.elements)
            .unwrap();
        assert_eq!(
            actions,
            vec![ActionDescriptor::new(ActionType::SetVolume)
                .with_param(param::SINK_NAME, "Gateway0")
                .with_param(param::MAIN_VOLUME, 10)
                .with_param(param::VOLUME, -900)]
        );
    }

    #[test]
    fn unrelated_trigger_is_no_change() {
        let bed = TestBed::new();
        let trigger = Trigger::UserSetSinkMuteState {
            class_name: None,
            sink_name: "AMP".into(),
            mute_state: MuteState::Muted,
        };
        assert_eq!(
            volume_engine().process_trigger(&trigger, &bed.elements),
            Err(ControlError::NoChange)
        );
    }

    #[test]
    fn failed_expression_leaves_parameter_unbound() {
        let bed = TestBed::new();
        let engine = engine(
            r#"{
                "policies": [{
                    "triggers": ["USER_SET_VOLUME"],
                    "rules": [{"actions": [{
                        "type": "ACTION_SET_VOLUME",
                        "params": {
                            "sinkName": "REQUESTING",
                            "className": "REQUESTING",
                            "volume": {"op": "scale",
                                       "input": {"op": "trigger", "field": "mainVolume"},
                                       "from": "missing", "to": "missing"}
                        }
                    }]}]
                }]
            }"#,
        );
        let trigger = Trigger::UserSetVolume {
            sink_name: "AMP".into(),
            main_volume: 3,
        };
        let actions = engine.process_trigger(&trigger, &bed.elements).unwrap();
        assert_eq!(actions[0].param(param::SINK_NAME), Some("AMP"));
        assert_eq!(actions[0].param(param::VOLUME), None);
        assert_eq!(actions[0].param(param::CLASS_NAME), None);
    }

    fn mute_engine() -> PolicyEngine {
        engine(
            r#"{
                "policies": [
                    {
                        "name": "base mute",
                        "triggers": ["USER_SET_SINK_MUTE_STATE"],
                        "rules": [
                            {
                                "condition": {"op": "and", "children": [
                                    {"op": "eq", "left": {"op": "trigger", "field": "className"},
                                                 "right": {"op": "value", "value": "BASE"}},
                                    {"op": "eq", "left": {"op": "trigger", "field": "muteState"},
                                                 "right": {"op": "value", "value": "MS_MUTED"}},
                                    {"op": "gt", "left": {"op": "lookup", "kind": "CLASS",
                                                          "name": "PHONE", "key": "connectedCount"},
                                                 "right": {"op": "value", "value": 0}}
                                ]},
                                "actions": [
                                    {"type": "ACTION_MUTE", "params": {"className": "PHONE"}},
                                    {"type": "ACTION_DISCONNECT", "params": {"className": "PHONE"}}
                                ]
                            },
                            {
                                "condition": {"op": "eq", "left": {"op": "trigger", "field": "muteState"},
                                              "right": {"op": "value", "value": "MS_MUTED"}},
                                "actions": [
                                    {"type": "ACTION_UNLIMIT", "params": {"className": "BASE"}}
                                ]
                            }
                        ]
                    },
                    {
                        "name": "never",
                        "triggers": ["USER_SET_SINK_MUTE_STATE"],
                        "rules": [{
                            "condition": {"op": "eq", "left": {"op": "trigger", "field": "nothing"},
                                          "right": {"op": "value", "value": 1}},
                            "actions": [{"type": "ACTION_RESTORE_VOLUME"}]
                        }]
                    }
                ]
            }"#,
        )
    }

    #[test]
    fn mute_with_active_phone_yields_actions_in_rule_order() {
        let mut bed = TestBed::new();
        let phone = bed.connection("PHONE", "Phone", "AMP");
        bed.elements
            .set_segment_state(phone, 0, SegmentState::Connected)
            .unwrap();
        assert_eq!(
            bed.elements.connection(phone).unwrap().state(),
            ConnectionState::Connected
        );

        let trigger = Trigger::UserSetSinkMuteState {
            class_name: Some("BASE".into()),
            sink_name: "AMP".into(),
            mute_state: MuteState::Muted,
        };
        let actions = mute_engine()
            .process_trigger(&trigger, &bed.elements)
            .unwrap();
        let summary: Vec<(ActionType, Option<&str>)> = actions
            .iter()
            .map(|a| (a.action, a.param(param::CLASS_NAME)))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ActionType::Mute, Some("PHONE")),
                (ActionType::Disconnect, Some("PHONE")),
                (ActionType::Unlimit, Some("BASE")),
            ]
        );
    }

    #[test]
    fn false_condition_skips_rule() {
        let bed = TestBed::new();
        let trigger = Trigger::UserSetSinkMuteState {
            class_name: Some("BASE".into()),
            sink_name: "AMP".into(),
            mute_state: MuteState::Muted,
        };
        let actions = mute_engine()
            .process_trigger(&trigger, &bed.elements)
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, ActionType::Unlimit);

        let unmute = Trigger::UserSetSinkMuteState {
            class_name: Some("BASE".into()),
            sink_name: "AMP".into(),
            mute_state: MuteState::Unmuted,
        };
        assert_eq!(
            mute_engine().process_trigger(&unmute, &bed.elements),
            Err(ControlError::NoChange)
        );
    }
}
