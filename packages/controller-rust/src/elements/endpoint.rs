//! Registered routing endpoints.

use std::collections::BTreeMap;
use std::fmt;

use routing_core::types::{
    property_map, Availability, DomainId, DomainSpec, GatewayId, InterruptState, MainVolume,
    MuteState, NotificationConfiguration, PropertyMap, SinkId, SinkSpec, SourceId, SourceSpec,
    SourceState, Volume,
};

/// A registered routing domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub bus_name: String,
    pub node_name: String,
    pub early: bool,
    pub complete: bool,
}

impl Domain {
    #[must_use]
    pub fn new(id: DomainId, spec: &DomainSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            bus_name: spec.bus_name.clone(),
            node_name: spec.node_name.clone(),
            early: spec.early,
            complete: spec.complete,
        }
    }
}

/// A registered audio source and its last known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub domain_id: DomainId,
    pub domain: String,
    pub priority: i32,
    pub volume: Volume,
    pub state: SourceState,
    pub availability: Availability,
    pub interrupt_state: InterruptState,
    pub sound_properties: PropertyMap,
    pub main_sound_properties: PropertyMap,
    pub notifications: BTreeMap<u16, NotificationConfiguration>,
}

impl Source {
    #[must_use]
    pub fn new(id: SourceId, domain_id: DomainId, spec: &SourceSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            domain_id,
            domain: spec.domain_name.clone(),
            priority: spec.priority,
            volume: spec.volume,
            state: spec.state,
            availability: spec.availability,
            interrupt_state: spec.interrupt_state,
            sound_properties: property_map(&spec.sound_properties),
            main_sound_properties: property_map(&spec.main_sound_properties),
            notifications: BTreeMap::new(),
        }
    }

    /// Sources in the don't-touch state or already streaming are never
    /// commanded on.
    #[must_use]
    pub fn needs_activation(&self) -> bool {
        !matches!(self.state, SourceState::Unknown | SourceState::On)
    }
}

/// A registered audio sink with its volume and mute state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sink {
    pub id: SinkId,
    pub name: String,
    pub domain_id: DomainId,
    pub domain: String,
    pub priority: i32,
    /// Volume last applied at the engine.
    pub volume: Volume,
    pub main_volume: MainVolume,
    /// Volume last asked for, before limits and mute.
    pub requested_volume: Volume,
    /// Active volume caps keyed by limit id.
    pub limits: BTreeMap<String, Volume>,
    pub mute_state: MuteState,
    pub availability: Availability,
    pub sound_properties: PropertyMap,
    pub main_sound_properties: PropertyMap,
    pub notifications: BTreeMap<u16, NotificationConfiguration>,
}

impl Sink {
    #[must_use]
    pub fn new(id: SinkId, domain_id: DomainId, spec: &SinkSpec) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            domain_id,
            domain: spec.domain_name.clone(),
            priority: spec.priority,
            volume: spec.volume,
            main_volume: spec.main_volume,
            requested_volume: spec.volume,
            limits: BTreeMap::new(),
            mute_state: spec.mute_state,
            availability: spec.availability,
            sound_properties: property_map(&spec.sound_properties),
            main_sound_properties: property_map(&spec.main_sound_properties),
            notifications: BTreeMap::new(),
        }
    }

    /// Volume the engine should apply for the given inputs: `mute_volume`
    /// while muted, otherwise the requested volume capped by every limit.
    #[must_use]
    pub fn target_volume(
        requested: Volume,
        limits: &BTreeMap<String, Volume>,
        mute_state: MuteState,
        mute_volume: Volume,
    ) -> Volume {
        if mute_state == MuteState::Muted {
            return mute_volume;
        }
        limits.values().copied().fold(requested, Volume::min)
    }

    /// Requested volume after limits, or `mute_volume` while muted.
    #[must_use]
    pub fn effective_volume(&self, mute_volume: Volume) -> Volume {
        Self::target_volume(
            self.requested_volume,
            &self.limits,
            self.mute_state,
            mute_volume,
        )
    }
}

/// Bridges a sink in one domain to a source in another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub id: GatewayId,
    pub name: String,
    pub sink: String,
    pub source: String,
    pub control_domain: String,
}

/// Addressable endpoint of a volume, property or notification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Source(String),
    Sink(String),
}

impl Endpoint {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Endpoint::Source(name) | Endpoint::Sink(name) => name,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source(name) => write!(f, "source {name}"),
            Endpoint::Sink(name) => write!(f, "sink {name}"),
        }
    }
}
