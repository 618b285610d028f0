//! Action descriptors emitted by the policy engine and the `PolicySend`
//! interface that accepts them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ControlResult;

string_enum! {
    /// Catalogue of actions the controller knows how to build.
    pub enum ActionType {
        Connect => "ACTION_CONNECT",
        Disconnect => "ACTION_DISCONNECT",
        Suspend => "ACTION_SUSPEND",
        Resume => "ACTION_RESUME",
        SetVolume => "ACTION_SET_VOLUME",
        Limit => "ACTION_LIMIT",
        Unlimit => "ACTION_UNLIMIT",
        Mute => "ACTION_MUTE",
        Unmute => "ACTION_UNMUTE",
        SetProperty => "ACTION_SET_PROPERTY",
        SetNotificationConfiguration => "ACTION_SET_NOTIFICATION_CONFIGURATION",
        SetSystemProperty => "ACTION_SET_SYSTEM_PROPERTY",
        RestoreVolume => "ACTION_RESTORE_VOLUME",
    }
}

string_enum! {
    /// Queue an action list is submitted to. `System` jobs run first.
    #[derive(Default)]
    pub enum ListKind {
        #[default]
        Normal => "NORMAL",
        System => "SYSTEM",
    }
}

string_enum! {
    /// Order in which candidate connections are visited.
    #[derive(Default)]
    pub enum ConnectionOrder {
        #[default]
        Newest => "O_NEWEST",
        Oldest => "O_OLDEST",
        HighPriority => "O_HIGH_PRIORITY",
        LowPriority => "O_LOW_PRIORITY",
    }
}

/// Well-known parameter names.
pub mod param {
    pub const CLASS_NAME: &str = "className";
    pub const SOURCE_NAME: &str = "sourceName";
    pub const SINK_NAME: &str = "sinkName";
    pub const CONNECTION_NAME: &str = "connectionName";
    pub const CONNECTION_STATE: &str = "connectionState";
    pub const ORDER: &str = "order";
    pub const VOLUME: &str = "volume";
    pub const MAIN_VOLUME: &str = "mainVolume";
    pub const RAMP_TYPE: &str = "rampType";
    pub const RAMP_TIME: &str = "rampTime";
    pub const PROPERTY_TYPE: &str = "propertyType";
    pub const PROPERTY_VALUE: &str = "propertyValue";
    pub const NOTIFICATION_TYPE: &str = "notificationType";
    pub const NOTIFICATION_STATUS: &str = "notificationStatus";
    pub const NOTIFICATION_PARAMETER: &str = "notificationParameter";
    pub const CONNECTION_FORMAT: &str = "connectionFormat";
    pub const TIMEOUT: &str = "timeout";
    pub const ROLLBACK: &str = "rollback";
    pub const LIMIT_ID: &str = "limitId";
}

/// One instantiated action: the action name plus string parameters.
///
/// A parameter that is absent is "unbound"; the factory decides whether that
/// is an error or a default applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub action: ActionType,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ActionDescriptor {
    #[must_use]
    pub fn new(action: ActionType) -> Self {
        Self {
            action,
            params: BTreeMap::new(),
        }
    }

    /// Binds `key`, replacing any earlier value.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw bound value of `key`.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Entry point used by the policy engine to hand descriptor lists to the
/// controller.
pub trait PolicySend {
    /// Queues `actions` as one job on the given list.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Parameter` if an entry names an action the
    /// receiver cannot build.
    fn set_list_actions(
        &mut self,
        actions: Vec<ActionDescriptor>,
        kind: ListKind,
    ) -> ControlResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_params() {
        let descriptor = ActionDescriptor::new(ActionType::SetVolume)
            .with_param(param::SINK_NAME, "AMP")
            .with_param(param::VOLUME, -900);
        assert_eq!(descriptor.param(param::SINK_NAME), Some("AMP"));
        assert_eq!(descriptor.param(param::VOLUME), Some("-900"));
        assert_eq!(descriptor.param(param::RAMP_TYPE), None);
    }

    #[test]
    fn json_form() {
        let descriptor: ActionDescriptor = serde_json::from_str(
            r#"{"action":"ACTION_MUTE","params":{"sinkName":"AMP","className":"BASE"}}"#,
        )
        .unwrap();
        assert_eq!(descriptor.action, ActionType::Mute);
        assert_eq!(descriptor.params.len(), 2);
    }

    #[test]
    fn defaults() {
        assert_eq!(ConnectionOrder::default(), ConnectionOrder::Newest);
        assert_eq!(ListKind::default(), ListKind::Normal);
    }
}
