//! In-memory [`Database`] used by tests and the loopback binary.
//!
//! Ids are assigned from per-table counters starting at 1 (0 means "not yet
//! registered"). Routes are resolved breadth-first: a hop connects a source
//! to a sink of the same domain, and a gateway continues the search from its
//! source side when the hop ends at its sink side.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::traits::{Database, MainConnectionRecord, RouteHop};
use crate::types::{
    property_map, Availability, ClassId, ConnectionState, DomainId, DomainSpec, GatewayId,
    GatewaySpec, InterruptState, MainConnectionId, MainVolume, MuteState, PropertyMap, SinkId,
    SinkSpec, SoundProperty, SourceId, SourceSpec, SourceState, SystemProperty,
};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SourceRow {
    name: String,
    domain: DomainId,
    state: SourceState,
    availability: Availability,
    interrupt_state: InterruptState,
    main_sound_properties: PropertyMap,
}

#[derive(Debug, Clone)]
struct SinkRow {
    name: String,
    domain: DomainId,
    main_volume: MainVolume,
    mute_state: MuteState,
    availability: Availability,
    main_sound_properties: PropertyMap,
}

#[derive(Debug, Clone)]
struct GatewayRow {
    sink: SinkId,
    source: SourceId,
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Shared switchboard that makes named database operations fail.
///
/// Operation names are the [`Database`] method names, e.g.
/// `"change_sink_mute_state"`. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    failing: Arc<Mutex<BTreeSet<String>>>,
}

impl FaultInjector {
    /// Makes every later call of `op` fail with a database error.
    pub fn fail_on(&self, op: &str) {
        self.failing.lock().insert(op.to_string());
    }

    /// Lets `op` succeed again.
    pub fn clear(&self, op: &str) {
        self.failing.lock().remove(op);
    }

    fn check(&self, op: &str) -> ControlResult<()> {
        if self.failing.lock().contains(op) {
            Err(ControlError::Database(format!("{op} failed")))
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryDatabase
// ---------------------------------------------------------------------------

/// [`Database`] backed by in-process maps.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    domains: BTreeMap<DomainId, String>,
    sources: BTreeMap<SourceId, SourceRow>,
    sinks: BTreeMap<SinkId, SinkRow>,
    gateways: BTreeMap<GatewayId, GatewayRow>,
    classes: BTreeMap<ClassId, String>,
    main_connections: BTreeMap<MainConnectionId, MainConnectionRecord>,
    system_properties: BTreeMap<u16, i16>,
    counters: Counters,
    faults: FaultInjector,
}

#[derive(Debug, Default)]
struct Counters {
    domain: u16,
    source: u16,
    sink: u16,
    gateway: u16,
    class: u16,
    main_connection: u16,
}

fn next_id(counter: &mut u16, table: &str) -> ControlResult<u16> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| ControlError::Database(format!("{table} ids exhausted")))?;
    Ok(*counter)
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> ControlResult<()> {
    if *slot == value {
        return Err(ControlError::NoChange);
    }
    *slot = value;
    Ok(())
}

impl InMemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for switching failures on and off after the database has been
    /// handed to its owner.
    #[must_use]
    pub fn faults(&self) -> FaultInjector {
        self.faults.clone()
    }

    fn source_mut(&mut self, id: SourceId) -> ControlResult<&mut SourceRow> {
        self.sources
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("source", id.to_string()))
    }

    fn sink_mut(&mut self, id: SinkId) -> ControlResult<&mut SinkRow> {
        self.sinks
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("sink", id.to_string()))
    }

    fn check_domain(&self, id: DomainId) -> ControlResult<()> {
        if self.domains.contains_key(&id) {
            Ok(())
        } else {
            Err(ControlError::out_of_range("domain", id.to_string()))
        }
    }

    /// Stored name of a source, for assertions.
    #[must_use]
    pub fn source_name(&self, id: SourceId) -> Option<&str> {
        self.sources.get(&id).map(|row| row.name.as_str())
    }

    /// Stored name of a sink, for assertions.
    #[must_use]
    pub fn sink_name(&self, id: SinkId) -> Option<&str> {
        self.sinks.get(&id).map(|row| row.name.as_str())
    }

    /// Name of a registered class, for assertions.
    #[must_use]
    pub fn class_name(&self, id: ClassId) -> Option<&str> {
        self.classes.get(&id).map(String::as_str)
    }

    /// Stored state of a source.
    #[must_use]
    pub fn source_state(&self, id: SourceId) -> Option<SourceState> {
        self.sources.get(&id).map(|row| row.state)
    }

    #[must_use]
    pub fn sink_mute_state(&self, id: SinkId) -> Option<MuteState> {
        self.sinks.get(&id).map(|row| row.mute_state)
    }

    #[must_use]
    pub fn sink_main_volume(&self, id: SinkId) -> Option<MainVolume> {
        self.sinks.get(&id).map(|row| row.main_volume)
    }
}

impl Database for InMemoryDatabase {
    fn enter_domain(&mut self, domain: &DomainSpec) -> ControlResult<DomainId> {
        self.faults.check("enter_domain")?;
        let id = next_id(&mut self.counters.domain, "domain")?;
        self.domains.insert(id, domain.name.clone());
        Ok(id)
    }

    fn remove_domain(&mut self, id: DomainId) -> ControlResult<()> {
        self.faults.check("remove_domain")?;
        self.domains
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("domain", id.to_string()))
    }

    fn enter_source(&mut self, source: &SourceSpec, domain: DomainId) -> ControlResult<SourceId> {
        self.faults.check("enter_source")?;
        self.check_domain(domain)?;
        let id = next_id(&mut self.counters.source, "source")?;
        self.sources.insert(
            id,
            SourceRow {
                name: source.name.clone(),
                domain,
                state: source.state,
                availability: source.availability,
                interrupt_state: source.interrupt_state,
                main_sound_properties: property_map(&source.main_sound_properties),
            },
        );
        Ok(id)
    }

    fn remove_source(&mut self, id: SourceId) -> ControlResult<()> {
        self.faults.check("remove_source")?;
        self.sources
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("source", id.to_string()))
    }

    fn enter_sink(&mut self, sink: &SinkSpec, domain: DomainId) -> ControlResult<SinkId> {
        self.faults.check("enter_sink")?;
        self.check_domain(domain)?;
        let id = next_id(&mut self.counters.sink, "sink")?;
        self.sinks.insert(
            id,
            SinkRow {
                name: sink.name.clone(),
                domain,
                main_volume: sink.main_volume,
                mute_state: sink.mute_state,
                availability: sink.availability,
                main_sound_properties: property_map(&sink.main_sound_properties),
            },
        );
        Ok(id)
    }

    fn remove_sink(&mut self, id: SinkId) -> ControlResult<()> {
        self.faults.check("remove_sink")?;
        self.sinks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("sink", id.to_string()))
    }

    fn enter_gateway(
        &mut self,
        _gateway: &GatewaySpec,
        sink: SinkId,
        source: SourceId,
        control_domain: DomainId,
    ) -> ControlResult<GatewayId> {
        self.faults.check("enter_gateway")?;
        self.check_domain(control_domain)?;
        if !self.sinks.contains_key(&sink) {
            return Err(ControlError::out_of_range("sink", sink.to_string()));
        }
        if !self.sources.contains_key(&source) {
            return Err(ControlError::out_of_range("source", source.to_string()));
        }
        let id = next_id(&mut self.counters.gateway, "gateway")?;
        self.gateways.insert(id, GatewayRow { sink, source });
        Ok(id)
    }

    fn remove_gateway(&mut self, id: GatewayId) -> ControlResult<()> {
        self.faults.check("remove_gateway")?;
        self.gateways
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("gateway", id.to_string()))
    }

    fn enter_class(&mut self, name: &str) -> ControlResult<ClassId> {
        self.faults.check("enter_class")?;
        let id = next_id(&mut self.counters.class, "class")?;
        self.classes.insert(id, name.to_string());
        Ok(id)
    }

    fn remove_class(&mut self, id: ClassId) -> ControlResult<()> {
        self.faults.check("remove_class")?;
        self.classes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("class", id.to_string()))
    }

    fn enter_main_connection(
        &mut self,
        record: &MainConnectionRecord,
    ) -> ControlResult<MainConnectionId> {
        self.faults.check("enter_main_connection")?;
        let id = next_id(&mut self.counters.main_connection, "main connection")?;
        self.main_connections.insert(
            id,
            MainConnectionRecord {
                id,
                ..record.clone()
            },
        );
        Ok(id)
    }

    fn change_main_connection_state(
        &mut self,
        id: MainConnectionId,
        state: ConnectionState,
    ) -> ControlResult<()> {
        self.faults.check("change_main_connection_state")?;
        let record = self
            .main_connections
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))?;
        replace(&mut record.state, state)
    }

    fn remove_main_connection(&mut self, id: MainConnectionId) -> ControlResult<()> {
        self.faults.check("remove_main_connection")?;
        self.main_connections
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))
    }

    fn change_source_state(&mut self, id: SourceId, state: SourceState) -> ControlResult<()> {
        self.faults.check("change_source_state")?;
        replace(&mut self.source_mut(id)?.state, state)
    }

    fn change_sink_main_volume(&mut self, id: SinkId, volume: MainVolume) -> ControlResult<()> {
        self.faults.check("change_sink_main_volume")?;
        replace(&mut self.sink_mut(id)?.main_volume, volume)
    }

    fn change_sink_mute_state(&mut self, id: SinkId, state: MuteState) -> ControlResult<()> {
        self.faults.check("change_sink_mute_state")?;
        replace(&mut self.sink_mut(id)?.mute_state, state)
    }

    fn change_sink_main_sound_property(
        &mut self,
        id: SinkId,
        property: SoundProperty,
    ) -> ControlResult<()> {
        self.faults.check("change_sink_main_sound_property")?;
        let row = self.sink_mut(id)?;
        if row.main_sound_properties.insert(property.kind, property.value) == Some(property.value)
        {
            return Err(ControlError::NoChange);
        }
        Ok(())
    }

    fn change_source_main_sound_property(
        &mut self,
        id: SourceId,
        property: SoundProperty,
    ) -> ControlResult<()> {
        self.faults.check("change_source_main_sound_property")?;
        let row = self.source_mut(id)?;
        if row.main_sound_properties.insert(property.kind, property.value) == Some(property.value)
        {
            return Err(ControlError::NoChange);
        }
        Ok(())
    }

    fn change_sink_availability(
        &mut self,
        id: SinkId,
        availability: Availability,
    ) -> ControlResult<()> {
        self.faults.check("change_sink_availability")?;
        replace(&mut self.sink_mut(id)?.availability, availability)
    }

    fn change_source_availability(
        &mut self,
        id: SourceId,
        availability: Availability,
    ) -> ControlResult<()> {
        self.faults.check("change_source_availability")?;
        replace(&mut self.source_mut(id)?.availability, availability)
    }

    fn change_source_interrupt_state(
        &mut self,
        id: SourceId,
        state: InterruptState,
    ) -> ControlResult<()> {
        self.faults.check("change_source_interrupt_state")?;
        replace(&mut self.source_mut(id)?.interrupt_state, state)
    }

    fn change_system_property(&mut self, property: SystemProperty) -> ControlResult<()> {
        self.faults.check("change_system_property")?;
        if self.system_properties.insert(property.kind, property.value) == Some(property.value) {
            return Err(ControlError::NoChange);
        }
        Ok(())
    }

    fn get_main_connection(&self, id: MainConnectionId) -> ControlResult<MainConnectionRecord> {
        self.faults.check("get_main_connection")?;
        self.main_connections
            .get(&id)
            .cloned()
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))
    }

    fn list_main_connections(&self) -> ControlResult<Vec<MainConnectionRecord>> {
        self.faults.check("list_main_connections")?;
        Ok(self.main_connections.values().cloned().collect())
    }

    fn list_system_properties(&self) -> ControlResult<Vec<SystemProperty>> {
        self.faults.check("list_system_properties")?;
        Ok(self
            .system_properties
            .iter()
            .map(|(&kind, &value)| SystemProperty { kind, value })
            .collect())
    }

    fn get_route(&self, source: SourceId, sink: SinkId) -> ControlResult<Vec<RouteHop>> {
        self.faults.check("get_route")?;
        let start = self
            .sources
            .get(&source)
            .ok_or_else(|| ControlError::out_of_range("source", source.to_string()))?;
        let target = self
            .sinks
            .get(&sink)
            .ok_or_else(|| ControlError::out_of_range("sink", sink.to_string()))?;

        // Breadth-first over sources; `parent` maps a gateway source to the
        // hop that reached it.
        let mut parent: BTreeMap<SourceId, (SourceId, RouteHop)> = BTreeMap::new();
        let mut visited = BTreeSet::from([source]);
        let mut queue = VecDeque::from([(source, start.domain)]);

        while let Some((current, domain)) = queue.pop_front() {
            if target.domain == domain {
                let mut route = vec![RouteHop {
                    source: current,
                    sink,
                    domain,
                }];
                let mut cursor = current;
                while let Some((previous, hop)) = parent.get(&cursor) {
                    route.push(*hop);
                    cursor = *previous;
                }
                route.reverse();
                debug!(source, sink, hops = route.len(), "route resolved");
                return Ok(route);
            }
            for gateway in self.gateways.values() {
                let Some(gateway_sink) = self.sinks.get(&gateway.sink) else {
                    continue;
                };
                let Some(gateway_source) = self.sources.get(&gateway.source) else {
                    continue;
                };
                if gateway_sink.domain != domain || !visited.insert(gateway.source) {
                    continue;
                }
                parent.insert(
                    gateway.source,
                    (
                        current,
                        RouteHop {
                            source: current,
                            sink: gateway.sink,
                            domain,
                        },
                    ),
                );
                queue.push_back((gateway.source, gateway_source.domain));
            }
        }
        Ok(Vec::new())
    }
}
