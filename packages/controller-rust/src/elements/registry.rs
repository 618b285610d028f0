//! Element registry: the controller's authoritative view of the topology.
//!
//! Owns the database handle, every registered domain, source, sink, gateway
//! and class, and the main connections. All cross references are by name or
//! id; removing an element drops the main connections that depend on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use routing_core::types::{
    Availability, ClassId, ConnectionFormat, ConnectionState, DomainId, DomainSpec, GatewayId,
    GatewaySpec, InterruptState, MainConnectionId, SegmentState, SinkId, SinkSpec, SourceId,
    SourceSpec, SourceState, SystemProperty, Volume,
};
use routing_core::{ControlError, ControlResult, Database};
use tracing::{debug, info, warn};

use super::class::Class;
use super::endpoint::{Domain, Gateway, Sink, Source};
use crate::connection::{
    CompositeConnectionObserver, ConnectionObserver, MainConnection, RouteSegment, StateChange,
};
use crate::policy::config::ClassConfig;
use crate::volume_store::VolumeSnapshot;

/// Treats `NoChange` from the database as success.
fn tolerate_no_change(result: ControlResult<()>) -> ControlResult<()> {
    match result {
        Err(ControlError::NoChange) => Ok(()),
        other => other,
    }
}

/// In-memory model of domains, endpoints, gateways, classes and main
/// connections, kept in step with the database.
pub struct ElementRegistry {
    db: Box<dyn Database>,
    domains: BTreeMap<String, Domain>,
    sources: BTreeMap<String, Source>,
    sinks: BTreeMap<String, Sink>,
    gateways: BTreeMap<String, Gateway>,
    classes: BTreeMap<String, Class>,
    connections: BTreeMap<MainConnectionId, MainConnection>,
    system_properties: BTreeMap<u16, i16>,
    observers: CompositeConnectionObserver,
    connect_sequence: u64,
    volumes: VolumeSnapshot,
}

impl ElementRegistry {
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self {
            db,
            domains: BTreeMap::new(),
            sources: BTreeMap::new(),
            sinks: BTreeMap::new(),
            gateways: BTreeMap::new(),
            classes: BTreeMap::new(),
            connections: BTreeMap::new(),
            system_properties: BTreeMap::new(),
            observers: CompositeConnectionObserver::default(),
            connect_sequence: 0,
            volumes: VolumeSnapshot::default(),
        }
    }

    /// Registers an observer of connection lifecycle events.
    pub fn add_observer(&mut self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.add(observer);
    }

    #[must_use]
    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    pub fn database_mut(&mut self) -> &mut dyn Database {
        self.db.as_mut()
    }

    // -----------------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------------

    /// Enters a configured class and attaches already registered members.
    ///
    /// # Errors
    ///
    /// Returns `NotPossible` for a duplicate name, or the database error.
    pub fn add_class(&mut self, config: &ClassConfig) -> ControlResult<ClassId> {
        if self.classes.contains_key(&config.name) {
            return Err(ControlError::NotPossible(format!(
                "class {} already exists",
                config.name
            )));
        }
        let id = self.db.enter_class(&config.name)?;
        let mut class = Class::new(id, config);
        let sources: Vec<String> = self
            .sources
            .keys()
            .filter(|n| class.accepts_source(n))
            .cloned()
            .collect();
        class.sources.extend(sources);
        let sinks: Vec<String> = self
            .sinks
            .keys()
            .filter(|n| class.accepts_sink(n))
            .cloned()
            .collect();
        class.sinks.extend(sinks);
        debug!(class = %config.name, id, "class entered");
        self.classes.insert(config.name.clone(), class);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown class.
    pub fn class(&self, name: &str) -> ControlResult<&Class> {
        self.classes
            .get(name)
            .ok_or_else(|| ControlError::out_of_range("class", name))
    }

    pub fn classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    // -----------------------------------------------------------------------
    // Domains
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `NotPossible` for a duplicate name, or the database error.
    pub fn register_domain(&mut self, spec: &DomainSpec) -> ControlResult<DomainId> {
        if self.domains.contains_key(&spec.name) {
            return Err(ControlError::NotPossible(format!(
                "domain {} already registered",
                spec.name
            )));
        }
        let id = self.db.enter_domain(spec)?;
        self.domains.insert(spec.name.clone(), Domain::new(id, spec));
        info!(domain = %spec.name, id, "domain registered");
        Ok(id)
    }

    /// Removes a domain together with every element that lives in it.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown domain, or the database error.
    pub fn unregister_domain(&mut self, name: &str) -> ControlResult<()> {
        let id = self.domain(name)?.id;
        let gateways: Vec<String> = self
            .gateways
            .values()
            .filter(|g| {
                g.control_domain == name
                    || self.sinks.get(&g.sink).is_some_and(|s| s.domain == name)
                    || self.sources.get(&g.source).is_some_and(|s| s.domain == name)
            })
            .map(|g| g.name.clone())
            .collect();
        for gateway in gateways {
            self.unregister_gateway(&gateway)?;
        }
        let sources: Vec<String> = self
            .sources
            .values()
            .filter(|s| s.domain == name)
            .map(|s| s.name.clone())
            .collect();
        for source in sources {
            self.unregister_source(&source)?;
        }
        let sinks: Vec<String> = self
            .sinks
            .values()
            .filter(|s| s.domain == name)
            .map(|s| s.name.clone())
            .collect();
        for sink in sinks {
            self.unregister_sink(&sink)?;
        }
        self.db.remove_domain(id)?;
        self.domains.remove(name);
        info!(domain = name, "domain unregistered");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown domain and `NoChange` if it was
    /// already complete.
    pub fn domain_registration_complete(&mut self, name: &str) -> ControlResult<()> {
        let domain = self
            .domains
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("domain", name))?;
        if domain.complete {
            return Err(ControlError::NoChange);
        }
        domain.complete = true;
        info!(domain = name, "domain registration complete");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown domain.
    pub fn domain(&self, name: &str) -> ControlResult<&Domain> {
        self.domains
            .get(name)
            .ok_or_else(|| ControlError::out_of_range("domain", name))
    }

    fn domain_name(&self, id: DomainId) -> String {
        self.domains
            .values()
            .find(|d| d.id == id)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Sources and sinks
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown domain, `NotPossible` for a
    /// duplicate name, or the database error.
    pub fn register_source(&mut self, spec: &SourceSpec) -> ControlResult<SourceId> {
        let domain_id = self.domain(&spec.domain_name)?.id;
        if self.sources.contains_key(&spec.name) {
            return Err(ControlError::NotPossible(format!(
                "source {} already registered",
                spec.name
            )));
        }
        let id = self.db.enter_source(spec, domain_id)?;
        self.sources
            .insert(spec.name.clone(), Source::new(id, domain_id, spec));
        for class in self.classes.values_mut() {
            if class.accepts_source(&spec.name) {
                class.sources.insert(spec.name.clone());
            }
        }
        info!(source = %spec.name, id, "source registered");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source, or the database error.
    pub fn unregister_source(&mut self, name: &str) -> ControlResult<()> {
        let id = self.source(name)?.id;
        self.drop_connections(|c| c.uses_source(name) || c.source == name);
        let gateways: Vec<String> = self
            .gateways
            .values()
            .filter(|g| g.source == name)
            .map(|g| g.name.clone())
            .collect();
        for gateway in gateways {
            self.unregister_gateway(&gateway)?;
        }
        self.db.remove_source(id)?;
        self.sources.remove(name);
        for class in self.classes.values_mut() {
            class.sources.remove(name);
        }
        info!(source = name, "source unregistered");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown domain, `NotPossible` for a
    /// duplicate name, or the database error.
    pub fn register_sink(&mut self, spec: &SinkSpec) -> ControlResult<SinkId> {
        let domain_id = self.domain(&spec.domain_name)?.id;
        if self.sinks.contains_key(&spec.name) {
            return Err(ControlError::NotPossible(format!(
                "sink {} already registered",
                spec.name
            )));
        }
        let id = self.db.enter_sink(spec, domain_id)?;
        self.sinks
            .insert(spec.name.clone(), Sink::new(id, domain_id, spec));
        for class in self.classes.values_mut() {
            if class.accepts_sink(&spec.name) {
                class.sinks.insert(spec.name.clone());
            }
        }
        info!(sink = %spec.name, id, "sink registered");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown sink, or the database error.
    pub fn unregister_sink(&mut self, name: &str) -> ControlResult<()> {
        let id = self.sink(name)?.id;
        self.drop_connections(|c| c.uses_sink(name) || c.sink == name);
        let gateways: Vec<String> = self
            .gateways
            .values()
            .filter(|g| g.sink == name)
            .map(|g| g.name.clone())
            .collect();
        for gateway in gateways {
            self.unregister_gateway(&gateway)?;
        }
        self.db.remove_sink(id)?;
        self.sinks.remove(name);
        for class in self.classes.values_mut() {
            class.sinks.remove(name);
        }
        info!(sink = name, "sink unregistered");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source.
    pub fn source(&self, name: &str) -> ControlResult<&Source> {
        self.sources
            .get(name)
            .ok_or_else(|| ControlError::out_of_range("source", name))
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source.
    pub fn source_mut(&mut self, name: &str) -> ControlResult<&mut Source> {
        self.sources
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("source", name))
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown sink.
    pub fn sink(&self, name: &str) -> ControlResult<&Sink> {
        self.sinks
            .get(name)
            .ok_or_else(|| ControlError::out_of_range("sink", name))
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown sink.
    pub fn sink_mut(&mut self, name: &str) -> ControlResult<&mut Sink> {
        self.sinks
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("sink", name))
    }

    fn source_name(&self, id: SourceId) -> ControlResult<String> {
        self.sources
            .values()
            .find(|s| s.id == id)
            .map(|s| s.name.clone())
            .ok_or_else(|| ControlError::out_of_range("source", id.to_string()))
    }

    fn sink_name(&self, id: SinkId) -> ControlResult<String> {
        self.sinks
            .values()
            .find(|s| s.id == id)
            .map(|s| s.name.clone())
            .ok_or_else(|| ControlError::out_of_range("sink", id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Gateways
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `OutOfRange` if the gateway's sink, source or control domain is
    /// unknown, `NotPossible` for a duplicate name, or the database error.
    pub fn register_gateway(&mut self, spec: &GatewaySpec) -> ControlResult<GatewayId> {
        if self.gateways.contains_key(&spec.name) {
            return Err(ControlError::NotPossible(format!(
                "gateway {} already registered",
                spec.name
            )));
        }
        let sink = self.sink(&spec.sink_name)?.id;
        let source = self.source(&spec.source_name)?.id;
        let control_domain = self.domain(&spec.control_domain_name)?.id;
        let id = self.db.enter_gateway(spec, sink, source, control_domain)?;
        self.gateways.insert(
            spec.name.clone(),
            Gateway {
                id,
                name: spec.name.clone(),
                sink: spec.sink_name.clone(),
                source: spec.source_name.clone(),
                control_domain: spec.control_domain_name.clone(),
            },
        );
        info!(gateway = %spec.name, id, "gateway registered");
        Ok(id)
    }

    /// Removes a gateway and every main connection routed through it.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown gateway, or the database error.
    pub fn unregister_gateway(&mut self, name: &str) -> ControlResult<()> {
        let gateway = self
            .gateways
            .get(name)
            .cloned()
            .ok_or_else(|| ControlError::out_of_range("gateway", name))?;
        self.drop_connections(|c| {
            c.segments
                .iter()
                .any(|s| s.sink == gateway.sink || s.source == gateway.source)
        });
        self.db.remove_gateway(gateway.id)?;
        self.gateways.remove(name);
        info!(gateway = name, "gateway unregistered");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown gateway.
    pub fn gateway(&self, name: &str) -> ControlResult<&Gateway> {
        self.gateways
            .get(name)
            .ok_or_else(|| ControlError::out_of_range("gateway", name))
    }

    // -----------------------------------------------------------------------
    // Recorded state
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown sink, `NoChange` if the value is
    /// already set, or the database error.
    pub fn set_sink_availability(&mut self, name: &str, availability: Availability) -> ControlResult<()> {
        let sink = self
            .sinks
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("sink", name))?;
        if sink.availability == availability {
            return Err(ControlError::NoChange);
        }
        tolerate_no_change(self.db.change_sink_availability(sink.id, availability))?;
        sink.availability = availability;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source, `NoChange` if the value is
    /// already set, or the database error.
    pub fn set_source_availability(
        &mut self,
        name: &str,
        availability: Availability,
    ) -> ControlResult<()> {
        let source = self
            .sources
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("source", name))?;
        if source.availability == availability {
            return Err(ControlError::NoChange);
        }
        tolerate_no_change(self.db.change_source_availability(source.id, availability))?;
        source.availability = availability;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source, `NoChange` if the value is
    /// already set, or the database error.
    pub fn set_interrupt_state(&mut self, name: &str, state: InterruptState) -> ControlResult<()> {
        let source = self
            .sources
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("source", name))?;
        if source.interrupt_state == state {
            return Err(ControlError::NoChange);
        }
        tolerate_no_change(self.db.change_source_interrupt_state(source.id, state))?;
        source.interrupt_state = state;
        Ok(())
    }

    /// Records a confirmed source state in the model and the database.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown source, or the database error.
    pub fn set_source_state(&mut self, name: &str, state: SourceState) -> ControlResult<()> {
        let source = self
            .sources
            .get_mut(name)
            .ok_or_else(|| ControlError::out_of_range("source", name))?;
        tolerate_no_change(self.db.change_source_state(source.id, state))?;
        source.state = state;
        Ok(())
    }

    /// Stores a system property and returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns the database error.
    pub fn set_system_property(&mut self, property: SystemProperty) -> ControlResult<Option<i16>> {
        tolerate_no_change(self.db.change_system_property(property))?;
        Ok(self.system_properties.insert(property.kind, property.value))
    }

    /// Removes a system property that had no previous value.
    pub fn clear_system_property(&mut self, kind: u16) {
        self.system_properties.remove(&kind);
    }

    /// Current value of a system property, if set.
    #[must_use]
    pub fn system_property(&self, kind: u16) -> Option<i16> {
        self.system_properties.get(&kind).copied()
    }

    // -----------------------------------------------------------------------
    // Main connections
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown connection id.
    pub fn connection(&self, id: MainConnectionId) -> ControlResult<&MainConnection> {
        self.connections
            .get(&id)
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))
    }

    /// Every main connection in id order.
    pub fn connections(&self) -> impl Iterator<Item = &MainConnection> {
        self.connections.values()
    }

    /// First connection (lowest id) with the given `source:sink` name.
    #[must_use]
    pub fn connection_by_name(&self, name: &str) -> Option<&MainConnection> {
        self.connections.values().find(|c| c.name == name)
    }

    /// Looks up the connection joining `source` to `sink` within a class.
    #[must_use]
    pub fn find_connection(
        &self,
        class_name: &str,
        source: &str,
        sink: &str,
    ) -> Option<MainConnectionId> {
        self.connections
            .values()
            .find(|c| c.class_name == class_name && c.source == source && c.sink == sink)
            .map(|c| c.id)
    }

    /// Resolves the route, enters the main connection into the database and
    /// attaches it to its class. The new connection is Disconnected.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for unknown elements, `NotPossible` if the
    /// endpoints are not class members, unavailable, or unroutable, and any
    /// database error.
    pub fn create_connection(
        &mut self,
        class_name: &str,
        source_name: &str,
        sink_name: &str,
        format: ConnectionFormat,
    ) -> ControlResult<MainConnectionId> {
        let class = self.class(class_name)?;
        let source = self.source(source_name)?;
        let sink = self.sink(sink_name)?;
        if !class.sources.contains(source_name) || !class.sinks.contains(sink_name) {
            return Err(ControlError::NotPossible(format!(
                "{source_name}:{sink_name} is not in class {class_name}"
            )));
        }
        if source.availability == Availability::Unavailable
            || sink.availability == Availability::Unavailable
        {
            return Err(ControlError::NotPossible(format!(
                "{source_name}:{sink_name} is unavailable"
            )));
        }
        let (source_id, sink_id) = (source.id, sink.id);
        let priority = source.priority.saturating_add(sink.priority);

        let hops = self.db.get_route(source_id, sink_id)?;
        if hops.is_empty() {
            return Err(ControlError::NotPossible(format!(
                "no route from {source_name} to {sink_name}"
            )));
        }
        let mut segments = Vec::with_capacity(hops.len());
        for hop in hops {
            segments.push(RouteSegment::new(
                hop,
                self.source_name(hop.source)?,
                self.sink_name(hop.sink)?,
                self.domain_name(hop.domain),
                format,
            ));
        }

        let mut connection = MainConnection::new(
            class_name,
            source_name,
            source_id,
            sink_name,
            sink_id,
            segments,
            priority,
        );
        let id = self.db.enter_main_connection(&connection.record())?;
        connection.id = id;
        if let Some(class) = self.classes.get_mut(class_name) {
            class.connections.insert(id);
        }
        debug!(connection = %connection.name, id, hops = connection.segments.len(), "main connection entered");
        self.observers.on_created(&connection);
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown id, or the database error.
    pub fn remove_connection(&mut self, id: MainConnectionId) -> ControlResult<()> {
        if !self.connections.contains_key(&id) {
            return Err(ControlError::out_of_range("main connection", id.to_string()));
        }
        self.db.remove_main_connection(id)?;
        if let Some(connection) = self.connections.remove(&id) {
            if let Some(class) = self.classes.get_mut(&connection.class_name) {
                class.forget_connection(id);
            }
            debug!(connection = %connection.name, id, "main connection removed");
            self.observers.on_removed(&connection);
        }
        Ok(())
    }

    fn drop_connections(&mut self, predicate: impl Fn(&MainConnection) -> bool) {
        let ids: Vec<MainConnectionId> = self
            .connections
            .values()
            .filter(|c| predicate(c))
            .map(|c| c.id)
            .collect();
        for id in ids {
            if let Err(err) = self.remove_connection(id) {
                warn!(id, %err, "dependent main connection not removed");
            }
        }
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown connection or segment.
    pub fn segment(&self, id: MainConnectionId, index: usize) -> ControlResult<&RouteSegment> {
        self.connection(id)?
            .segment(index)
            .ok_or_else(|| ControlError::out_of_range("segment", index.to_string()))
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown connection or segment.
    pub fn segment_mut(
        &mut self,
        id: MainConnectionId,
        index: usize,
    ) -> ControlResult<&mut RouteSegment> {
        self.connections
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))?
            .segment_mut(index)
    }

    /// Applies a segment state and publishes the resulting connection state
    /// change, if any.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown connection or segment, or the
    /// database error from storing the new connection state.
    pub fn set_segment_state(
        &mut self,
        id: MainConnectionId,
        index: usize,
        state: SegmentState,
    ) -> ControlResult<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))?;
        let previous = connection
            .segment(index)
            .ok_or_else(|| ControlError::out_of_range("segment", index.to_string()))?
            .state;
        let Some(change) = connection.set_segment_state(index, state)? else {
            return Ok(());
        };
        if let Err(err) = self.store_state(id, change) {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.set_segment_state(index, previous)?;
            }
            return Err(err);
        }
        self.publish(id, change);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown connection, or the database error.
    pub fn set_suspended(&mut self, id: MainConnectionId, suspended: bool) -> ControlResult<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or_else(|| ControlError::out_of_range("main connection", id.to_string()))?;
        let previous = connection.suspended;
        let Some(change) = connection.set_suspended(suspended) else {
            return Ok(());
        };
        if let Err(err) = self.store_state(id, change) {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.set_suspended(previous);
            }
            return Err(err);
        }
        self.publish(id, change);
        Ok(())
    }

    /// Stores a published transition. On error the caller reverts the
    /// in-memory change.
    fn store_state(&mut self, id: MainConnectionId, change: StateChange) -> ControlResult<()> {
        tolerate_no_change(self.db.change_main_connection_state(id, change.to))
    }

    /// Announces a stored transition to the owning class and observers.
    fn publish(&mut self, id: MainConnectionId, change: StateChange) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        if change.to == ConnectionState::Connected {
            self.connect_sequence += 1;
            connection.last_connected = self.connect_sequence;
        }
        debug!(
            connection = %connection.name,
            from = %change.from,
            to = %change.to,
            "main connection state changed"
        );
        if let Some(class) = self.classes.get_mut(&connection.class_name) {
            class.on_connection_state(id, change.to);
        }
        self.observers.on_state_changed(connection, change.from);
    }

    /// Whether a connection other than `except` is Connected and streams
    /// from `source`.
    #[must_use]
    pub fn source_in_use(&self, source: &str, except: MainConnectionId) -> bool {
        self.connections.values().any(|c| {
            c.id != except && c.state() == ConnectionState::Connected && c.uses_source(source)
        })
    }

    // -----------------------------------------------------------------------
    // Volumes
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn volumes(&self) -> &VolumeSnapshot {
        &self.volumes
    }

    /// Replaces the recorded class volumes, e.g. with a snapshot read at startup.
    pub fn set_volumes(&mut self, snapshot: VolumeSnapshot) {
        self.volumes = snapshot;
    }

    /// Records the last requested volume of `sink`, under `class_name` or,
    /// without a class, under every class the sink belongs to.
    pub fn record_volume(&mut self, class_name: Option<&str>, sink: &str, volume: Volume) {
        match class_name {
            Some(class_name) => self.volumes.record(class_name, sink, volume),
            None => {
                for class in self.classes.values().filter(|c| c.sinks.contains(sink)) {
                    self.volumes.record(&class.name, sink, volume);
                }
            }
        }
    }

    /// Per-sink volumes of `class_name` to reapply from `snapshot`, skipping
    /// sinks that no longer exist or are not members of the class.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown class.
    pub fn restore_volume(
        &self,
        class_name: &str,
        snapshot: &VolumeSnapshot,
    ) -> ControlResult<Vec<(String, Volume)>> {
        let class = self.class(class_name)?;
        let Some(volumes) = snapshot.class_volumes(class_name) else {
            return Ok(Vec::new());
        };
        Ok(volumes
            .iter()
            .filter(|(sink, _)| self.sinks.contains_key(*sink) && class.sinks.contains(*sink))
            .map(|(sink, volume)| (sink.clone(), *volume))
            .collect())
    }
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("domains", &self.domains.len())
            .field("sources", &self.sources.len())
            .field("sinks", &self.sinks.len())
            .field("gateways", &self.gateways.len())
            .field("classes", &self.classes.len())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
