//! Trigger descriptors: one variant per external event that needs a policy
//! decision.
//!
//! Triggers arrive as JSON objects tagged by `type`, e.g.
//! `{"type":"USER_SET_VOLUME","sinkName":"AMP","mainVolume":10}`.

use serde::{Deserialize, Serialize};

use crate::types::{
    connection_name, Availability, DomainSpec, GatewaySpec, InterruptState, MainVolume, MuteState,
    NotificationPayload, SinkSpec, SoundProperty, SourceSpec, SystemProperty, Value,
};

string_enum! {
    /// Discriminant of [`Trigger`], used by policies to select rules.
    pub enum TriggerType {
        UserConnectionRequest => "USER_CONNECTION_REQUEST",
        UserDisconnectionRequest => "USER_DISCONNECTION_REQUEST",
        UserSetSinkMuteState => "USER_SET_SINK_MUTE_STATE",
        UserSetVolume => "USER_SET_VOLUME",
        UserSetSinkMainSoundProperty => "USER_SET_SINK_MAIN_SOUND_PROPERTY",
        UserSetSourceMainSoundProperty => "USER_SET_SOURCE_MAIN_SOUND_PROPERTY",
        UserSetSystemProperty => "USER_SET_SYSTEM_PROPERTY",
        SystemSinkAvailabilityChanged => "SYSTEM_SINK_AVAILABILITY_CHANGED",
        SystemSourceAvailabilityChanged => "SYSTEM_SOURCE_AVAILABILITY_CHANGED",
        SystemInterruptStateChanged => "SYSTEM_INTERRUPT_STATE_CHANGED",
        SystemSinkNotificationDataChanged => "SYSTEM_SINK_NOTIFICATION_DATA_CHANGED",
        SystemSourceNotificationDataChanged => "SYSTEM_SOURCE_NOTIFICATION_DATA_CHANGED",
        SystemRegisterDomain => "SYSTEM_REGISTER_DOMAIN",
        SystemRegisterSource => "SYSTEM_REGISTER_SOURCE",
        SystemRegisterSink => "SYSTEM_REGISTER_SINK",
        SystemRegisterGateway => "SYSTEM_REGISTER_GATEWAY",
        SystemUnregisterDomain => "SYSTEM_UNREGISTER_DOMAIN",
        SystemUnregisterSource => "SYSTEM_UNREGISTER_SOURCE",
        SystemUnregisterSink => "SYSTEM_UNREGISTER_SINK",
        SystemUnregisterGateway => "SYSTEM_UNREGISTER_GATEWAY",
        SystemDomainRegistrationComplete => "SYSTEM_DOMAIN_REGISTRATION_COMPLETE",
    }
}

/// External event descriptor carrying the minimal identifying fields and the
/// new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Trigger {
    UserConnectionRequest {
        class_name: String,
        source_name: String,
        sink_name: String,
    },
    UserDisconnectionRequest {
        class_name: String,
        source_name: String,
        sink_name: String,
    },
    UserSetSinkMuteState {
        #[serde(default)]
        class_name: Option<String>,
        sink_name: String,
        mute_state: MuteState,
    },
    UserSetVolume {
        sink_name: String,
        main_volume: MainVolume,
    },
    UserSetSinkMainSoundProperty {
        sink_name: String,
        property: SoundProperty,
    },
    UserSetSourceMainSoundProperty {
        source_name: String,
        property: SoundProperty,
    },
    UserSetSystemProperty {
        property: SystemProperty,
    },
    SystemSinkAvailabilityChanged {
        sink_name: String,
        availability: Availability,
    },
    SystemSourceAvailabilityChanged {
        source_name: String,
        availability: Availability,
    },
    SystemInterruptStateChanged {
        source_name: String,
        interrupt_state: InterruptState,
    },
    SystemSinkNotificationDataChanged {
        sink_name: String,
        payload: NotificationPayload,
    },
    SystemSourceNotificationDataChanged {
        source_name: String,
        payload: NotificationPayload,
    },
    SystemRegisterDomain {
        domain: DomainSpec,
    },
    SystemRegisterSource {
        source: SourceSpec,
    },
    SystemRegisterSink {
        sink: SinkSpec,
    },
    SystemRegisterGateway {
        gateway: GatewaySpec,
    },
    SystemUnregisterDomain {
        domain_name: String,
    },
    SystemUnregisterSource {
        source_name: String,
    },
    SystemUnregisterSink {
        sink_name: String,
    },
    SystemUnregisterGateway {
        gateway_name: String,
    },
    SystemDomainRegistrationComplete {
        domain_name: String,
    },
}

impl Trigger {
    /// Type policies match this trigger against.
    #[must_use]
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Trigger::UserConnectionRequest { .. } => TriggerType::UserConnectionRequest,
            Trigger::UserDisconnectionRequest { .. } => TriggerType::UserDisconnectionRequest,
            Trigger::UserSetSinkMuteState { .. } => TriggerType::UserSetSinkMuteState,
            Trigger::UserSetVolume { .. } => TriggerType::UserSetVolume,
            Trigger::UserSetSinkMainSoundProperty { .. } => {
                TriggerType::UserSetSinkMainSoundProperty
            }
            Trigger::UserSetSourceMainSoundProperty { .. } => {
                TriggerType::UserSetSourceMainSoundProperty
            }
            Trigger::UserSetSystemProperty { .. } => TriggerType::UserSetSystemProperty,
            Trigger::SystemSinkAvailabilityChanged { .. } => {
                TriggerType::SystemSinkAvailabilityChanged
            }
            Trigger::SystemSourceAvailabilityChanged { .. } => {
                TriggerType::SystemSourceAvailabilityChanged
            }
            Trigger::SystemInterruptStateChanged { .. } => TriggerType::SystemInterruptStateChanged,
            Trigger::SystemSinkNotificationDataChanged { .. } => {
                TriggerType::SystemSinkNotificationDataChanged
            }
            Trigger::SystemSourceNotificationDataChanged { .. } => {
                TriggerType::SystemSourceNotificationDataChanged
            }
            Trigger::SystemRegisterDomain { .. } => TriggerType::SystemRegisterDomain,
            Trigger::SystemRegisterSource { .. } => TriggerType::SystemRegisterSource,
            Trigger::SystemRegisterSink { .. } => TriggerType::SystemRegisterSink,
            Trigger::SystemRegisterGateway { .. } => TriggerType::SystemRegisterGateway,
            Trigger::SystemUnregisterDomain { .. } => TriggerType::SystemUnregisterDomain,
            Trigger::SystemUnregisterSource { .. } => TriggerType::SystemUnregisterSource,
            Trigger::SystemUnregisterSink { .. } => TriggerType::SystemUnregisterSink,
            Trigger::SystemUnregisterGateway { .. } => TriggerType::SystemUnregisterGateway,
            Trigger::SystemDomainRegistrationComplete { .. } => {
                TriggerType::SystemDomainRegistrationComplete
            }
        }
    }

    /// Reads a named field of the trigger, using the same camelCase names as
    /// the JSON form. Derived fields: `connectionName` (when both a source
    /// and a sink are named), `propertyType`/`propertyValue`,
    /// `notificationType`/`notificationValue`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "className" => self.class_name().map(Value::from),
            "sourceName" => self.source_name().map(Value::from),
            "sinkName" => self.sink_name().map(Value::from),
            "connectionName" => match (self.source_name(), self.sink_name()) {
                (Some(source), Some(sink)) => Some(Value::Str(connection_name(source, sink))),
                _ => None,
            },
            "domainName" => self.domain_name().map(Value::from),
            "gatewayName" => self.gateway_name().map(Value::from),
            "mainVolume" => match self {
                Trigger::UserSetVolume { main_volume, .. } => Some(Value::from(*main_volume)),
                _ => None,
            },
            "muteState" => match self {
                Trigger::UserSetSinkMuteState { mute_state, .. } => {
                    Some(Value::from(mute_state.as_str()))
                }
                _ => None,
            },
            "availability" => match self {
                Trigger::SystemSinkAvailabilityChanged { availability, .. }
                | Trigger::SystemSourceAvailabilityChanged { availability, .. } => {
                    Some(Value::from(availability.as_str()))
                }
                _ => None,
            },
            "interruptState" => match self {
                Trigger::SystemInterruptStateChanged {
                    interrupt_state, ..
                } => Some(Value::from(interrupt_state.as_str())),
                _ => None,
            },
            "propertyType" => self.property().map(|(kind, _)| Value::Int(i64::from(kind))),
            "propertyValue" => self.property().map(|(_, value)| Value::from(value)),
            "notificationType" => self.payload().map(|p| Value::Int(i64::from(p.kind))),
            "notificationValue" => self.payload().map(|p| Value::from(p.value)),
            _ => None,
        }
    }

    /// Class the trigger names, if any. Used to resolve `REQUESTING`.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Trigger::UserConnectionRequest { class_name, .. }
            | Trigger::UserDisconnectionRequest { class_name, .. } => Some(class_name),
            Trigger::UserSetSinkMuteState { class_name, .. } => class_name.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Trigger::UserConnectionRequest { source_name, .. }
            | Trigger::UserDisconnectionRequest { source_name, .. }
            | Trigger::UserSetSourceMainSoundProperty { source_name, .. }
            | Trigger::SystemSourceAvailabilityChanged { source_name, .. }
            | Trigger::SystemInterruptStateChanged { source_name, .. }
            | Trigger::SystemSourceNotificationDataChanged { source_name, .. }
            | Trigger::SystemUnregisterSource { source_name } => Some(source_name),
            Trigger::SystemRegisterSource { source } => Some(&source.name),
            Trigger::SystemRegisterGateway { gateway } => Some(&gateway.source_name),
            _ => None,
        }
    }

    #[must_use]
    pub fn sink_name(&self) -> Option<&str> {
        match self {
            Trigger::UserConnectionRequest { sink_name, .. }
            | Trigger::UserDisconnectionRequest { sink_name, .. }
            | Trigger::UserSetSinkMuteState { sink_name, .. }
            | Trigger::UserSetVolume { sink_name, .. }
            | Trigger::UserSetSinkMainSoundProperty { sink_name, .. }
            | Trigger::SystemSinkAvailabilityChanged { sink_name, .. }
            | Trigger::SystemSinkNotificationDataChanged { sink_name, .. }
            | Trigger::SystemUnregisterSink { sink_name } => Some(sink_name),
            Trigger::SystemRegisterSink { sink } => Some(&sink.name),
            Trigger::SystemRegisterGateway { gateway } => Some(&gateway.sink_name),
            _ => None,
        }
    }

    #[must_use]
    pub fn domain_name(&self) -> Option<&str> {
        match self {
            Trigger::SystemUnregisterDomain { domain_name }
            | Trigger::SystemDomainRegistrationComplete { domain_name } => Some(domain_name),
            Trigger::SystemRegisterDomain { domain } => Some(&domain.name),
            Trigger::SystemRegisterSource { source } => Some(&source.domain_name),
            Trigger::SystemRegisterSink { sink } => Some(&sink.domain_name),
            _ => None,
        }
    }

    #[must_use]
    pub fn gateway_name(&self) -> Option<&str> {
        match self {
            Trigger::SystemUnregisterGateway { gateway_name } => Some(gateway_name),
            Trigger::SystemRegisterGateway { gateway } => Some(&gateway.name),
            _ => None,
        }
    }

    fn property(&self) -> Option<(u16, i16)> {
        match self {
            Trigger::UserSetSinkMainSoundProperty { property, .. }
            | Trigger::UserSetSourceMainSoundProperty { property, .. } => {
                Some((property.kind, property.value))
            }
            Trigger::UserSetSystemProperty { property } => Some((property.kind, property.value)),
            _ => None,
        }
    }

    fn payload(&self) -> Option<NotificationPayload> {
        match self {
            Trigger::SystemSinkNotificationDataChanged { payload, .. }
            | Trigger::SystemSourceNotificationDataChanged { payload, .. } => Some(*payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_json() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"type":"USER_SET_VOLUME","sinkName":"Gateway0","mainVolume":10}"#,
        )
        .unwrap();
        assert_eq!(
            trigger,
            Trigger::UserSetVolume {
                sink_name: "Gateway0".into(),
                main_volume: 10
            }
        );
        assert_eq!(trigger.trigger_type(), TriggerType::UserSetVolume);
    }

    #[test]
    fn optional_class_on_mute_request() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"type":"USER_SET_SINK_MUTE_STATE","sinkName":"AMP","muteState":"MS_MUTED"}"#,
        )
        .unwrap();
        assert_eq!(trigger.class_name(), None);
        assert_eq!(trigger.field("muteState"), Some(Value::from("MS_MUTED")));
    }

    #[test]
    fn fields_use_wire_names() {
        let trigger = Trigger::UserConnectionRequest {
            class_name: "BASE".into(),
            source_name: "MediaPlayer".into(),
            sink_name: "AMP".into(),
        };
        assert_eq!(trigger.field("className"), Some(Value::from("BASE")));
        assert_eq!(
            trigger.field("connectionName"),
            Some(Value::from("MediaPlayer:AMP"))
        );
        assert_eq!(trigger.field("mainVolume"), None);
        assert_eq!(trigger.field("nonsense"), None);
    }

    #[test]
    fn registration_trigger_exposes_domain() {
        let trigger = Trigger::SystemRegisterSink {
            sink: SinkSpec::new("AMP", "Applications"),
        };
        assert_eq!(trigger.sink_name(), Some("AMP"));
        assert_eq!(trigger.domain_name(), Some("Applications"));
        assert_eq!(trigger.trigger_type().as_str(), "SYSTEM_REGISTER_SINK");
    }

    #[test]
    fn property_fields() {
        let trigger = Trigger::UserSetSinkMainSoundProperty {
            sink_name: "AMP".into(),
            property: SoundProperty { kind: 3, value: -4 },
        };
        assert_eq!(trigger.field("propertyType"), Some(Value::Int(3)));
        assert_eq!(trigger.field("propertyValue"), Some(Value::Int(-4)));
    }
}
