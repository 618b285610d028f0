//! Read-only view of live element state for policy lookups.

use routing_core::types::{ElementKind, PropertyMap, Value};

use crate::elements::ElementRegistry;

/// Attribute lookup used by `lookup` expressions.
pub trait StateView {
    /// Value of `key` on the object of `kind` called `name`, or `None` if
    /// either is unknown.
    fn lookup(&self, kind: ElementKind, name: &str, key: &str) -> Option<Value>;
}

fn property(map: &PropertyMap, key: &str, prefix: &str) -> Option<Value> {
    let kind: u16 = key.strip_prefix(prefix)?.parse().ok()?;
    map.get(&kind).copied().map(Value::from)
}

fn int(n: impl Into<i64>) -> Option<Value> {
    Some(Value::Int(n.into()))
}

impl StateView for ElementRegistry {
    fn lookup(&self, kind: ElementKind, name: &str, key: &str) -> Option<Value> {
        match kind {
            ElementKind::Source => {
                let source = self.source(name).ok()?;
                match key {
                    "name" => Some(Value::from(source.name.as_str())),
                    "id" => int(source.id),
                    "domainName" => Some(Value::from(source.domain.as_str())),
                    "priority" => int(source.priority),
                    "volume" => int(source.volume),
                    "state" => Some(Value::from(source.state.as_str())),
                    "availability" => Some(Value::from(source.availability.as_str())),
                    "interruptState" => Some(Value::from(source.interrupt_state.as_str())),
                    _ => property(&source.sound_properties, key, "soundProperty.")
                        .or_else(|| property(&source.main_sound_properties, key, "mainSoundProperty.")),
                }
            }
            ElementKind::Sink => {
                let sink = self.sink(name).ok()?;
                match key {
                    "name" => Some(Value::from(sink.name.as_str())),
                    "id" => int(sink.id),
                    "domainName" => Some(Value::from(sink.domain.as_str())),
                    "priority" => int(sink.priority),
                    "volume" => int(sink.volume),
                    "mainVolume" => int(sink.main_volume),
                    "requestedVolume" => int(sink.requested_volume),
                    "muteState" => Some(Value::from(sink.mute_state.as_str())),
                    "availability" => Some(Value::from(sink.availability.as_str())),
                    _ => property(&sink.sound_properties, key, "soundProperty.")
                        .or_else(|| property(&sink.main_sound_properties, key, "mainSoundProperty.")),
                }
            }
            ElementKind::Class => {
                let class = self.class(name).ok()?;
                match key {
                    "name" => Some(Value::from(class.name.as_str())),
                    "id" => int(class.id),
                    "priority" => int(class.priority),
                    "direction" => Some(Value::from(class.direction.as_str())),
                    "connectionCount" => int(i64::try_from(class.connections.len()).ok()?),
                    "connectedCount" => int(i64::try_from(class.connected.len()).ok()?),
                    _ => None,
                }
            }
            ElementKind::Connection => {
                let connection = self.connection_by_name(name)?;
                match key {
                    "id" => int(connection.id),
                    "state" => Some(Value::from(connection.state().as_str())),
                    "className" => Some(Value::from(connection.class_name.as_str())),
                    "sourceName" => Some(Value::from(connection.source.as_str())),
                    "sinkName" => Some(Value::from(connection.sink.as_str())),
                    "priority" => int(connection.priority),
                    "suspended" => Some(Value::Bool(connection.suspended)),
                    _ => None,
                }
            }
            ElementKind::Domain => {
                let domain = self.domain(name).ok()?;
                match key {
                    "name" => Some(Value::from(domain.name.as_str())),
                    "id" => int(domain.id),
                    "complete" => Some(Value::Bool(domain.complete)),
                    _ => None,
                }
            }
            ElementKind::Gateway => {
                let gateway = self.gateway(name).ok()?;
                match key {
                    "id" => int(gateway.id),
                    "sinkName" => Some(Value::from(gateway.sink.as_str())),
                    "sourceName" => Some(Value::from(gateway.source.as_str())),
                    "controlDomainName" => Some(Value::from(gateway.control_domain.as_str())),
                    _ => None,
                }
            }
            ElementKind::System => match key {
                "value" => self.system_property(name.parse().ok()?).map(Value::from),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use routing_core::types::{ConnectionFormat, SystemProperty};

    use super::*;
    use crate::testing::TestBed;

    #[test]
    fn endpoint_attributes() {
        let bed = TestBed::new();
        let state: &dyn StateView = &bed.elements;
        assert_eq!(
            state.lookup(ElementKind::Sink, "AMP", "domainName"),
            Some(Value::from("Amplifier"))
        );
        assert_eq!(
            state.lookup(ElementKind::Source, "MediaPlayer", "state"),
            Some(Value::from("SS_OFF"))
        );
        assert_eq!(state.lookup(ElementKind::Sink, "Nowhere", "id"), None);
        assert_eq!(state.lookup(ElementKind::Sink, "AMP", "colour"), None);
    }

    #[test]
    fn sound_property_keys() {
        let mut bed = TestBed::new();
        bed.elements
            .sink_mut("AMP")
            .unwrap()
            .main_sound_properties
            .insert(3, -2);
        let state: &dyn StateView = &bed.elements;
        assert_eq!(
            state.lookup(ElementKind::Sink, "AMP", "mainSoundProperty.3"),
            Some(Value::Int(-2))
        );
        assert_eq!(state.lookup(ElementKind::Sink, "AMP", "mainSoundProperty.x"), None);
    }

    #[test]
    fn connection_and_class_attributes() {
        let mut bed = TestBed::new();
        bed.elements
            .create_connection("BASE", "MediaPlayer", "AMP", ConnectionFormat::Stereo)
            .unwrap();
        let state: &dyn StateView = &bed.elements;
        assert_eq!(
            state.lookup(ElementKind::Connection, "MediaPlayer:AMP", "state"),
            Some(Value::from("CS_DISCONNECTED"))
        );
        assert_eq!(
            state.lookup(ElementKind::Class, "BASE", "connectionCount"),
            Some(Value::Int(1))
        );
        assert_eq!(
            state.lookup(ElementKind::Class, "BASE", "connectedCount"),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn system_property_value() {
        let mut bed = TestBed::new();
        bed.elements
            .set_system_property(SystemProperty { kind: 7, value: 1 })
            .unwrap();
        let state: &dyn StateView = &bed.elements;
        assert_eq!(state.lookup(ElementKind::System, "7", "value"), Some(Value::Int(1)));
        assert_eq!(state.lookup(ElementKind::System, "8", "value"), None);
    }
}
