//! Boundary contracts the controller consumes: the routing engine and the
//! persistent database.

use serde::{Deserialize, Serialize};

use crate::error::ControlResult;
use crate::handle::Handle;
use crate::types::{
    Availability, ClassId, ConnectionFormat, ConnectionId, ConnectionState, DomainId, DomainSpec,
    GatewayId, GatewaySpec, InterruptState, MainConnectionId, MainVolume, MuteState,
    NotificationConfiguration, RampType, SinkId, SinkSpec, SoundProperty, SourceId, SourceSpec,
    SourceState, SystemProperty, Volume,
};

// ---------------------------------------------------------------------------
// Routing engine
// ---------------------------------------------------------------------------

/// Asynchronous command interface of the routing engine.
///
/// Every request returns a [`Handle`] immediately; the acknowledgement is
/// delivered later through the controller's event channel. Implementations
/// must never call back into the controller synchronously.
pub trait RoutingControl: Send {
    /// Establishes one hop. Returns the request handle and the connection id
    /// the engine reserved for the hop.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn connect(
        &mut self,
        source: SourceId,
        sink: SinkId,
        format: ConnectionFormat,
    ) -> ControlResult<(Handle, ConnectionId)>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn disconnect(&mut self, connection: ConnectionId) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_source_state(&mut self, source: SourceId, state: SourceState) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_sink_volume(
        &mut self,
        sink: SinkId,
        volume: Volume,
        ramp: RampType,
        ramp_time_ms: u16,
    ) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_source_volume(
        &mut self,
        source: SourceId,
        volume: Volume,
        ramp: RampType,
        ramp_time_ms: u16,
    ) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_sink_sound_property(
        &mut self,
        sink: SinkId,
        property: SoundProperty,
    ) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_source_sound_property(
        &mut self,
        source: SourceId,
        property: SoundProperty,
    ) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_sink_notification_configuration(
        &mut self,
        sink: SinkId,
        configuration: NotificationConfiguration,
    ) -> ControlResult<Handle>;

    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the request cannot be issued.
    fn set_source_notification_configuration(
        &mut self,
        source: SourceId,
        configuration: NotificationConfiguration,
    ) -> ControlResult<Handle>;

    /// Asks the engine to drop an outstanding request. No acknowledgement
    /// follows for an aborted handle.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Communication` if the engine no longer knows
    /// the handle.
    fn abort(&mut self, handle: Handle) -> ControlResult<()>;
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Main connection row as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainConnectionRecord {
    pub id: MainConnectionId,
    pub source: SourceId,
    pub sink: SinkId,
    pub state: ConnectionState,
}

/// One hop of a resolved route, segment 0 at the source end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHop {
    pub source: SourceId,
    pub sink: SinkId,
    pub domain: DomainId,
}

/// Synchronous CRUD store of the routing topology.
///
/// Change operations return `ControlError::NoChange` when the stored value
/// already equals the requested one and `ControlError::OutOfRange` for
/// unknown ids.
#[allow(clippy::missing_errors_doc)]
pub trait Database: Send {
    fn enter_domain(&mut self, domain: &DomainSpec) -> ControlResult<DomainId>;
    fn remove_domain(&mut self, id: DomainId) -> ControlResult<()>;
    fn enter_source(&mut self, source: &SourceSpec, domain: DomainId) -> ControlResult<SourceId>;
    fn remove_source(&mut self, id: SourceId) -> ControlResult<()>;
    fn enter_sink(&mut self, sink: &SinkSpec, domain: DomainId) -> ControlResult<SinkId>;
    fn remove_sink(&mut self, id: SinkId) -> ControlResult<()>;
    fn enter_gateway(
        &mut self,
        gateway: &GatewaySpec,
        sink: SinkId,
        source: SourceId,
        control_domain: DomainId,
    ) -> ControlResult<GatewayId>;
    fn remove_gateway(&mut self, id: GatewayId) -> ControlResult<()>;
    fn enter_class(&mut self, name: &str) -> ControlResult<ClassId>;
    fn remove_class(&mut self, id: ClassId) -> ControlResult<()>;

    /// Stores a new main connection; the `id` field of `record` is ignored
    /// and the assigned id returned.
    fn enter_main_connection(
        &mut self,
        record: &MainConnectionRecord,
    ) -> ControlResult<MainConnectionId>;
    fn change_main_connection_state(
        &mut self,
        id: MainConnectionId,
        state: ConnectionState,
    ) -> ControlResult<()>;
    fn remove_main_connection(&mut self, id: MainConnectionId) -> ControlResult<()>;

    fn change_source_state(&mut self, id: SourceId, state: SourceState) -> ControlResult<()>;
    fn change_sink_main_volume(&mut self, id: SinkId, volume: MainVolume) -> ControlResult<()>;
    fn change_sink_mute_state(&mut self, id: SinkId, state: MuteState) -> ControlResult<()>;
    fn change_sink_main_sound_property(
        &mut self,
        id: SinkId,
        property: SoundProperty,
    ) -> ControlResult<()>;
    fn change_source_main_sound_property(
        &mut self,
        id: SourceId,
        property: SoundProperty,
    ) -> ControlResult<()>;
    fn change_sink_availability(
        &mut self,
        id: SinkId,
        availability: Availability,
    ) -> ControlResult<()>;
    fn change_source_availability(
        &mut self,
        id: SourceId,
        availability: Availability,
    ) -> ControlResult<()>;
    fn change_source_interrupt_state(
        &mut self,
        id: SourceId,
        state: InterruptState,
    ) -> ControlResult<()>;
    fn change_system_property(&mut self, property: SystemProperty) -> ControlResult<()>;

    fn get_main_connection(&self, id: MainConnectionId) -> ControlResult<MainConnectionRecord>;
    fn list_main_connections(&self) -> ControlResult<Vec<MainConnectionRecord>>;
    fn list_system_properties(&self) -> ControlResult<Vec<SystemProperty>>;

    /// Resolves the hops from `source` to `sink`, crossing gateways. An empty
    /// route means no path exists.
    fn get_route(&self, source: SourceId, sink: SinkId) -> ControlResult<Vec<RouteHop>>;
}
