//! Domain types shared by the controller, the routing engine boundary and the
//! policy configuration.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type DomainId = u16;
pub type SourceId = u16;
pub type SinkId = u16;
pub type GatewayId = u16;
pub type ClassId = u16;
pub type MainConnectionId = u16;
/// Identifier the routing engine assigns to one established hop.
pub type ConnectionId = u16;
/// Volume in tenths of a decibel.
pub type Volume = i16;
/// User-facing volume step.
pub type MainVolume = i16;

/// Error returned when a wire name does not match any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// ---------------------------------------------------------------------------
// State enums
// ---------------------------------------------------------------------------

string_enum! {
    /// Published state of a main connection.
    pub enum ConnectionState {
        Connecting => "CS_CONNECTING",
        Connected => "CS_CONNECTED",
        Disconnecting => "CS_DISCONNECTING",
        Disconnected => "CS_DISCONNECTED",
        Suspended => "CS_SUSPENDED",
    }
}

string_enum! {
    /// State of one route segment.
    #[derive(Default)]
    pub enum SegmentState {
        #[default]
        Disconnected => "SS_DISCONNECTED",
        Connecting => "SS_CONNECTING",
        Connected => "SS_CONNECTED",
        Disconnecting => "SS_DISCONNECTING",
    }
}

string_enum! {
    /// Streaming state of a source. `Unknown` means "do not touch".
    #[derive(Default)]
    pub enum SourceState {
        #[default]
        Unknown => "SS_UNKNOWN",
        On => "SS_ON",
        Off => "SS_OFF",
        Paused => "SS_PAUSED",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum MuteState {
        #[default]
        Unknown => "MS_UNKNOWN",
        Muted => "MS_MUTED",
        Unmuted => "MS_UNMUTED",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum Availability {
        #[default]
        Unknown => "A_UNKNOWN",
        Available => "A_AVAILABLE",
        Unavailable => "A_UNAVAILABLE",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum InterruptState {
        #[default]
        Unknown => "IS_UNKNOWN",
        Off => "IS_OFF",
        Interrupted => "IS_INTERRUPTED",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum RampType {
        #[default]
        Immediate => "RAMP_IMMEDIATE",
        Linear => "RAMP_LINEAR",
        Exponential => "RAMP_EXPONENTIAL",
    }
}

string_enum! {
    #[derive(Default)]
    pub enum ConnectionFormat {
        Mono => "CF_MONO",
        #[default]
        Stereo => "CF_STEREO",
        Auto => "CF_AUTO",
    }
}

string_enum! {
    /// Order in which a class walks the segments of a connection when it
    /// activates or deactivates sources.
    #[derive(Default)]
    pub enum ClassDirection {
        SourceToSink => "SOURCE_TO_SINK",
        #[default]
        SinkToSource => "SINK_TO_SOURCE",
    }
}

string_enum! {
    pub enum NotificationStatus {
        Off => "NS_OFF",
        Periodic => "NS_PERIODIC",
        MinimumThreshold => "NS_MINIMUM",
        MaximumThreshold => "NS_MAXIMUM",
        ChangeNotification => "NS_CHANGE",
    }
}

string_enum! {
    /// Kind of registry object a policy lookup addresses.
    pub enum ElementKind {
        Source => "SOURCE",
        Sink => "SINK",
        Class => "CLASS",
        Connection => "CONNECTION",
        Domain => "DOMAIN",
        Gateway => "GATEWAY",
        System => "SYSTEM",
    }
}

impl ElementKind {
    /// Trigger field / action parameter that names an object of this kind.
    #[must_use]
    pub const fn name_key(self) -> &'static str {
        match self {
            ElementKind::Source => "sourceName",
            ElementKind::Sink => "sinkName",
            ElementKind::Class => "className",
            ElementKind::Connection => "connectionName",
            ElementKind::Domain => "domainName",
            ElementKind::Gateway => "gatewayName",
            ElementKind::System => "propertyType",
        }
    }
}

// ---------------------------------------------------------------------------
// Property records
// ---------------------------------------------------------------------------

/// Typed sound property value of a sink or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundProperty {
    #[serde(rename = "type")]
    pub kind: u16,
    pub value: i16,
}

/// Typed system-wide property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProperty {
    #[serde(rename = "type")]
    pub kind: u16,
    pub value: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfiguration {
    #[serde(rename = "type")]
    pub kind: u16,
    pub status: NotificationStatus,
    pub parameter: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: u16,
    pub value: i16,
}

// ---------------------------------------------------------------------------
// Registration specs
// ---------------------------------------------------------------------------

/// Domain announced by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    pub name: String,
    #[serde(default)]
    pub bus_name: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub early: bool,
    #[serde(default)]
    pub complete: bool,
}

/// Source announced by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub name: String,
    pub domain_name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub volume: Volume,
    #[serde(default)]
    pub state: SourceState,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub interrupt_state: InterruptState,
    #[serde(default)]
    pub sound_properties: Vec<SoundProperty>,
    #[serde(default)]
    pub main_sound_properties: Vec<SoundProperty>,
}

impl SourceSpec {
    /// Minimal spec for a source in `domain_name`, mostly for tests and tooling.
    #[must_use]
    pub fn new(name: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain_name: domain_name.into(),
            priority: 0,
            volume: 0,
            state: SourceState::Off,
            availability: Availability::Available,
            interrupt_state: InterruptState::Off,
            sound_properties: Vec::new(),
            main_sound_properties: Vec::new(),
        }
    }
}

/// Sink announced by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkSpec {
    pub name: String,
    pub domain_name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub volume: Volume,
    #[serde(default)]
    pub main_volume: MainVolume,
    #[serde(default)]
    pub mute_state: MuteState,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub sound_properties: Vec<SoundProperty>,
    #[serde(default)]
    pub main_sound_properties: Vec<SoundProperty>,
}

impl SinkSpec {
    /// Minimal spec for a sink in `domain_name`, mostly for tests and tooling.
    #[must_use]
    pub fn new(name: impl Into<String>, domain_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain_name: domain_name.into(),
            priority: 0,
            volume: 0,
            main_volume: 0,
            mute_state: MuteState::Unmuted,
            availability: Availability::Available,
            sound_properties: Vec::new(),
            main_sound_properties: Vec::new(),
        }
    }
}

/// Gateway bridging a sink of one domain to a source of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub name: String,
    pub sink_name: String,
    pub source_name: String,
    pub control_domain_name: String,
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Scalar produced by trigger fields, registry lookups and policy expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Integer view of the value; numeric text parses.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(s) => s.parse().ok(),
            Value::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Name of the main connection between `source` and `sink`.
#[must_use]
pub fn connection_name(source: &str, sink: &str) -> String {
    format!("{source}:{sink}")
}

/// Sound properties keyed by property type.
pub type PropertyMap = BTreeMap<u16, i16>;

/// Collects a property list into a map keyed by type; later entries win.
#[must_use]
pub fn property_map(properties: &[SoundProperty]) -> PropertyMap {
    properties.iter().map(|p| (p.kind, p.value)).collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn wire_names_parse_back() {
        for state in ConnectionState::ALL {
            assert_eq!(ConnectionState::from_str(state.as_str()), Ok(*state));
        }
        assert_eq!(SourceState::from_str("SS_ON"), Ok(SourceState::On));
        assert_eq!(MuteState::Muted.to_string(), "MS_MUTED");
    }

    #[test]
    fn unknown_wire_name_is_rejected() {
        let err = RampType::from_str("RAMP_SIDEWAYS").unwrap_err();
        assert_eq!(err.kind, "RampType");
        assert_eq!(err.value, "RAMP_SIDEWAYS");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ClassDirection::SourceToSink).unwrap();
        assert_eq!(json, "\"SOURCE_TO_SINK\"");
        let back: ConnectionFormat = serde_json::from_str("\"CF_MONO\"").unwrap();
        assert_eq!(back, ConnectionFormat::Mono);
    }

    #[test]
    fn value_deserializes_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[true, -12, "AMP"]"#).unwrap();
        assert_eq!(
            values,
            vec![Value::Bool(true), Value::Int(-12), Value::Str("AMP".into())]
        );
        assert_eq!(Value::Str("42".into()).as_int(), Some(42));
        assert_eq!(Value::Int(-900).to_string(), "-900");
    }

    #[test]
    fn spec_defaults_fill_missing_fields() {
        let spec: SinkSpec =
            serde_json::from_str(r#"{"name":"AMP","domainName":"Applications"}"#).unwrap();
        assert_eq!(spec.mute_state, MuteState::Unknown);
        assert_eq!(spec.priority, 0);
        assert!(spec.sound_properties.is_empty());
    }

    #[test]
    fn property_map_keeps_last_entry() {
        let map = property_map(&[
            SoundProperty { kind: 1, value: 3 },
            SoundProperty { kind: 1, value: 5 },
            SoundProperty { kind: 2, value: -1 },
        ]);
        assert_eq!(map.get(&1), Some(&5));
        assert_eq!(map.len(), 2);
    }
}
